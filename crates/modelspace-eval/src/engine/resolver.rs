//! Name resolution inside a space.
//!
//! Lookup order for a bare name seen from space `S`:
//!
//! 1. system names (`_self`, `_space`, `_parent`, `_model`), never shadowed
//! 2. members of `S`: cells, child spaces, references. Dynamic spaces see
//!    their mirrored cells, their materialized children, the children of
//!    the static counterpart not yet materialized, and the counterpart's
//!    references re-scoped to their own position
//! 3. parameter bindings of the enclosing instances, innermost first
//! 4. model-level references
//!
//! Resolution reads the model only. Dependency recording and
//! materialization of dynamic children happen in the caller.

use modelspace_common::{CellId, ModelError, RefId, SpaceId, Value};
use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;

use super::model::Model;
use super::space::SpaceKind;

static SYSTEM_NAMES: Lazy<FxHashSet<&'static str>> =
    Lazy::new(|| ["_self", "_space", "_parent", "_model"].into_iter().collect());

pub(crate) fn is_system_name(name: &str) -> bool {
    SYSTEM_NAMES.contains(name)
}

/// A space found by resolution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SpaceTarget {
    Existing(SpaceId),
    /// Dynamic children named by `path`, below `from`, that have not been
    /// materialized yet.
    Pending { from: SpaceId, path: Vec<String> },
}

#[derive(Debug, Clone)]
pub(crate) enum RefTarget {
    Value(Value),
    Space(SpaceTarget),
}

#[derive(Debug, Clone)]
pub(crate) enum Resolution {
    Cell(CellId),
    Space(SpaceTarget),
    Ref { id: RefId, target: RefTarget },
    Param(Value),
    Model,
}

impl Model {
    pub(crate) fn resolve(&self, space: SpaceId, name: &str) -> Result<Resolution, ModelError> {
        let data = self.space(space)?;
        if is_system_name(name) {
            return Ok(match name {
                "_parent" => match data.parent {
                    Some(parent) => Resolution::Space(SpaceTarget::Existing(parent)),
                    None => Resolution::Model,
                },
                "_model" => Resolution::Model,
                _ => Resolution::Space(SpaceTarget::Existing(space)),
            });
        }
        if let Some(found) = self.resolve_member(space, name)? {
            return Ok(found);
        }
        if let Some(value) = self.param_binding(space, name)? {
            return Ok(Resolution::Param(value));
        }
        if let Some(&id) = self.globals.get(name) {
            return Ok(Resolution::Ref {
                id,
                target: RefTarget::Value(self.reference(id)?.value.clone()),
            });
        }
        Err(ModelError::NameNotFound {
            name: name.to_string(),
            scope: self.full_name(space),
        })
    }

    fn resolve_member(&self, space: SpaceId, name: &str) -> Result<Option<Resolution>, ModelError> {
        let data = self.space(space)?;
        if let Some(&cell) = data.cells.get(name) {
            return Ok(Some(Resolution::Cell(cell)));
        }
        if let Some(&child) = data.spaces.get(name) {
            return Ok(Some(Resolution::Space(SpaceTarget::Existing(child))));
        }
        let counterpart = self.static_of(space)?;
        let source = self.space(counterpart)?;
        if counterpart != space && source.spaces.contains_key(name) {
            return Ok(Some(Resolution::Space(SpaceTarget::Pending {
                from: space,
                path: vec![name.to_string()],
            })));
        }
        if let Some(&id) = source.refs.get(name) {
            return Ok(Some(Resolution::Ref {
                id,
                target: self.ref_target(id, space)?,
            }));
        }
        Ok(None)
    }

    /// Argument bound to parameter `name` by the instance enclosing `space`,
    /// or by instances enclosing that instance.
    pub(crate) fn param_binding(&self, space: SpaceId, name: &str) -> Result<Option<Value>, ModelError> {
        let mut cursor = self.root_item(space);
        while let Some(item) = cursor {
            let SpaceKind::Item {
                owner,
                counterpart,
                args,
                ..
            } = &self.space(item)?.kind
            else {
                break;
            };
            if let Some(spec) = &self.space(*counterpart)?.params
                && let Some(pos) = spec.params.iter().position(|p| p.name == name)
            {
                return Ok(args.get(pos).cloned());
            }
            cursor = self.root_item(*owner);
        }
        Ok(None)
    }

    /// Value of reference `id` as seen from `current`.
    pub(crate) fn ref_target(&self, id: RefId, current: SpaceId) -> Result<RefTarget, ModelError> {
        let data = self.reference(id)?;
        match (&data.value, data.relative, data.origin) {
            (Value::Space(target), true, Some(origin)) => Ok(RefTarget::Space(
                self.relative_target(origin, target.id(), current)?,
            )),
            (value, _, _) => Ok(RefTarget::Value(value.clone())),
        }
    }

    /// Replay the tree path `origin -> target` starting from `current`.
    ///
    /// Falls back to `target` itself when the path does not exist at the
    /// new position.
    fn relative_target(
        &self,
        origin: SpaceId,
        target: SpaceId,
        current: SpaceId,
    ) -> Result<SpaceTarget, ModelError> {
        if origin == current {
            return Ok(SpaceTarget::Existing(target));
        }
        let up_chain = self.lineage(origin);
        let target_chain = self.lineage(target);
        let Some((ups, common)) = up_chain
            .iter()
            .enumerate()
            .find(|(_, s)| target_chain.contains(*s))
        else {
            return Ok(SpaceTarget::Existing(target));
        };
        let mut downs: Vec<String> = Vec::new();
        for s in target_chain.iter().take_while(|s| *s != common) {
            downs.push(self.space(*s)?.name.clone());
        }
        downs.reverse();

        let depth = ups + downs.len();
        if depth > self.config.max_depth {
            return Err(ModelError::DeepReference {
                depth,
                max: self.config.max_depth,
            });
        }

        let mut pos = current;
        for _ in 0..ups {
            match self.space(pos)?.parent {
                Some(parent) => pos = parent,
                None => return Ok(SpaceTarget::Existing(target)),
            }
        }
        for (i, name) in downs.iter().enumerate() {
            let data = self.space(pos)?;
            if let Some(&child) = data.spaces.get(name) {
                pos = child;
                continue;
            }
            if !data.is_static() && self.space(self.static_of(pos)?)?.spaces.contains_key(name) {
                return Ok(SpaceTarget::Pending {
                    from: pos,
                    path: downs[i..].to_vec(),
                });
            }
            return Ok(SpaceTarget::Existing(target));
        }
        Ok(SpaceTarget::Existing(pos))
    }

    pub(crate) fn materialize(&mut self, target: SpaceTarget) -> Result<SpaceId, ModelError> {
        match target {
            SpaceTarget::Existing(id) => {
                self.space(id)?;
                Ok(id)
            }
            SpaceTarget::Pending { from, path } => {
                let mut pos = from;
                for name in &path {
                    pos = self.materialize_child(pos, name)?;
                }
                Ok(pos)
            }
        }
    }
}
