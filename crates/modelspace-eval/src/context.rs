//! The view a formula body gets of the model while it runs.

use modelspace_common::{ModelError, SpaceId, SpaceRef, Value};

use crate::engine::Model;
use crate::engine::node::Node;
use crate::engine::resolver::{RefTarget, Resolution, SpaceTarget};

/// Evaluation context of one formula invocation.
///
/// Names are resolved from the space the formula belongs to. Every cached
/// value read through the context becomes a dependency of the formula's
/// node.
pub struct EvalContext<'m> {
    model: &'m mut Model,
    space: SpaceId,
}

impl<'m> EvalContext<'m> {
    pub(crate) fn new(model: &'m mut Model, space: SpaceId) -> Self {
        Self { model, space }
    }

    /// Handle to the space the formula is evaluated in.
    pub fn current_space(&self) -> Result<SpaceRef, ModelError> {
        self.model.space_ref(self.space)
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Number of formulas currently being evaluated.
    pub fn depth(&self) -> usize {
        self.model.stack.len()
    }

    /// Read `name`: cells are called without arguments, spaces come back as
    /// [`Value::Space`] handles.
    pub fn get(&mut self, name: &str) -> Result<Value, ModelError> {
        self.lookup(self.space, name, None)
    }

    /// Call cells or a parameterized space named `name`.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, ModelError> {
        self.lookup(self.space, name, Some((args, &[])))
    }

    pub fn call_kw(
        &mut self,
        name: &str,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> Result<Value, ModelError> {
        self.lookup(self.space, name, Some((args, kwargs)))
    }

    /// Read `name` as seen from another space.
    pub fn get_in(&mut self, space: &SpaceRef, name: &str) -> Result<Value, ModelError> {
        self.lookup(space.id(), name, None)
    }

    pub fn call_in(&mut self, space: &SpaceRef, name: &str, args: &[Value]) -> Result<Value, ModelError> {
        self.lookup(space.id(), name, Some((args, &[])))
    }

    /// Instance of the parameterized space behind `space`.
    pub fn item(&mut self, space: &SpaceRef, args: &[Value]) -> Result<SpaceRef, ModelError> {
        self.model.call_space_inner(space.id(), args, &[])
    }

    /// Canonical arguments of `space` when it is an instance root.
    pub fn argvalues(&self, space: &SpaceRef) -> Result<Option<Vec<Value>>, ModelError> {
        self.model.argvalues(space.id())
    }

    fn space_value(&mut self, target: SpaceTarget) -> Result<SpaceId, ModelError> {
        self.model.materialize(target)
    }

    fn lookup(
        &mut self,
        space: SpaceId,
        name: &str,
        call: Option<(&[Value], &[(&str, Value)])>,
    ) -> Result<Value, ModelError> {
        let resolution = self.model.resolve(space, name)?;
        let value = match resolution {
            Resolution::Cell(cell) => {
                let (args, kwargs) = call.unwrap_or((&[], &[]));
                return self.model.eval_cell(cell, args, kwargs);
            }
            Resolution::Space(target) => {
                let id = self.space_value(target)?;
                Value::Space(self.model.space_ref(id)?)
            }
            Resolution::Ref { id, target } => {
                self.model.record_read(&Node::reference(id));
                match target {
                    RefTarget::Value(value) => value,
                    RefTarget::Space(target) => {
                        let id = self.space_value(target)?;
                        Value::Space(self.model.space_ref(id)?)
                    }
                }
            }
            Resolution::Param(value) => value,
            Resolution::Model => Value::Text(self.model.name().to_string()),
        };
        match (call, value) {
            (None, value) => Ok(value),
            (Some((args, kwargs)), Value::Space(target)) => self
                .model
                .call_space_inner(target.id(), args, kwargs)
                .map(Value::Space),
            (Some(_), _) => Err(ModelError::InvalidArguments {
                target: name.to_string(),
                detail: "not callable".into(),
            }),
        }
    }
}
