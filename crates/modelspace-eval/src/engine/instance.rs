//! Parameterized instantiation.
//!
//! Calling a space that declares parameters binds the call arguments,
//! optionally passes them through the space's binder formula, and looks the
//! canonical tuple up in the space's instance table. A miss creates an
//! instance: an item space mirroring the called space. Its children are
//! mirrored lazily on first access.
//!
//! An instance is reclaimable once its anchor has no holder besides the
//! model and no cached result read it. Explicit clears evict regardless.

use std::sync::Arc;

use modelspace_common::{Anchor, ModelError, SpaceId, SpaceRef, Value};

use super::model::Model;
use super::node::{ArgKey, EntityId, Node, make_key};
use super::space::{ParamSpec, SpaceData, SpaceKind};
use crate::context::EvalContext;
use crate::formula::{Formula, Param, bind_arguments};

impl Model {
    pub(crate) fn param_spec(&self, space: SpaceId) -> Result<ParamSpec, ModelError> {
        let counterpart = self.static_of(space)?;
        self.space(counterpart)?
            .params
            .clone()
            .ok_or_else(|| ModelError::InvalidArguments {
                target: self.full_name(space),
                detail: "space does not declare parameters".into(),
            })
    }

    /// Canonical instance key for a call of `space`.
    fn instance_key(
        &mut self,
        space: SpaceId,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> Result<ArgKey, ModelError> {
        let spec = self.param_spec(space)?;
        let bound = bind_arguments(&spec.params, args, kwargs, || self.full_name(space))?;
        let Some(binder) = spec.binder else {
            return make_key(&bound);
        };

        let produced = {
            let mut ctx = EvalContext::new(self, space);
            binder.invoke(&mut ctx, &bound)
        }
        .map_err(|err| self.wrap_formula_error(err))?;

        let canonical = match produced {
            Value::Empty => bound,
            Value::Tuple(items) | Value::List(items) if items.len() == spec.params.len() => items,
            other if spec.params.len() == 1 => vec![other],
            other => {
                return Err(ModelError::InvalidArguments {
                    target: self.full_name(space),
                    detail: format!(
                        "binder returned {other}, expected a tuple of {} values",
                        spec.params.len()
                    ),
                });
            }
        };
        make_key(&canonical)
    }

    pub(crate) fn call_space_inner(
        &mut self,
        space: SpaceId,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> Result<SpaceRef, ModelError> {
        let key = self.instance_key(space, args, kwargs)?;
        let node = Node::instance(space, key.clone());

        if let Some(item) = self.space(space)?.instances.get(&key)
            && self.spaces.contains(item)
        {
            self.record_read(&node);
            return self.space_ref(item);
        }

        let item = self.new_item(space, key.clone())?;
        self.space_mut(space)?.instances.insert(key, item);
        self.record_read(&node);
        self.space_ref(item)
    }

    fn new_item(&mut self, owner: SpaceId, args: ArgKey) -> Result<SpaceId, ModelError> {
        let counterpart = self.static_of(owner)?;
        let owner_data = self.space(owner)?;
        let name = owner_data.name.clone();
        let parent = owner_data.parent;
        let anchor = Anchor::new(self.anchor_of(owner));
        let item = self.spaces.insert(SpaceData::new(
            &name,
            parent,
            SpaceKind::Item {
                owner,
                counterpart,
                args,
                anchor,
            },
        ));
        self.mirror_cells(item, counterpart)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(instance = %self.full_name(item), "instantiate");
        Ok(item)
    }

    /// Child `name` of a dynamic space, materialized on first access.
    pub(crate) fn materialize_child(&mut self, parent: SpaceId, name: &str) -> Result<SpaceId, ModelError> {
        let data = self.space(parent)?;
        if let Some(&child) = data.spaces.get(name) {
            return Ok(child);
        }
        let Some(root) = self.root_item(parent) else {
            return Err(ModelError::NameNotFound {
                name: name.to_string(),
                scope: self.full_name(parent),
            });
        };
        let counterpart_parent = self.static_of(parent)?;
        let Some(&counterpart) = self.space(counterpart_parent)?.spaces.get(name) else {
            return Err(ModelError::NameNotFound {
                name: name.to_string(),
                scope: self.full_name(parent),
            });
        };
        let child = self.spaces.insert(SpaceData::new(
            name,
            Some(parent),
            SpaceKind::Dynamic { counterpart, root },
        ));
        self.mirror_cells(child, counterpart)?;
        self.space_mut(parent)?.spaces.insert(name.to_string(), child);
        Ok(child)
    }

    /// Evict one instance and everything that read it.
    pub(crate) fn destroy_instance(&mut self, owner: SpaceId, key: &ArgKey) -> Result<bool, ModelError> {
        let Some(item) = self.space_mut(owner)?.instances.evict(key) else {
            return Ok(false);
        };
        self.invalidate(&Node::instance(owner, key.clone()));

        #[cfg(feature = "tracing")]
        tracing::debug!(instance = %self.full_name(item), "destroy instance");

        self.destroy_space_tree(item);
        Ok(true)
    }

    /// Remove a space, its members, its instances and its children.
    /// Returns every space id removed.
    pub(crate) fn destroy_space_tree(&mut self, space: SpaceId) -> Vec<SpaceId> {
        let mut removed = Vec::new();
        let Some(mut data) = self.spaces.remove(space) else {
            return removed;
        };
        removed.push(space);

        for (key, item) in data.instances.drain() {
            self.invalidate(&Node::instance(space, key));
            removed.extend(self.destroy_space_tree(item));
        }
        self.graph.prune_entity(EntityId::Space(space));
        for cell in data.cells.values() {
            self.destroy_cell(*cell);
        }
        for reference in data.refs.values() {
            self.destroy_ref(*reference);
        }
        for child in data.spaces.values() {
            removed.extend(self.destroy_space_tree(*child));
        }
        removed
    }

    /// Drop every instance of `space`.
    pub(crate) fn drop_instances(&mut self, space: SpaceId) -> Result<usize, ModelError> {
        let keys: Vec<ArgKey> = self
            .space(space)?
            .instances
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        let mut dropped = 0;
        for key in keys {
            if self.destroy_instance(space, &key)? {
                dropped += 1;
            }
        }
        Ok(dropped)
    }

    /// Definitions inside `space` changed: instances of it, and of the
    /// static spaces enclosing it, mirror stale definitions.
    pub(crate) fn touch_instances(&mut self, space: SpaceId) -> Result<usize, ModelError> {
        let mut dropped = 0;
        for s in self.lineage(space) {
            if self.space(s)?.is_static() {
                dropped += self.drop_instances(s)?;
            }
        }
        Ok(dropped)
    }

    fn is_reclaimable(&self, owner: SpaceId, key: &ArgKey, item: SpaceId) -> bool {
        let Some(SpaceKind::Item { anchor, .. }) = self.spaces.get(item).map(|d| &d.kind) else {
            return true;
        };
        Arc::strong_count(anchor) == 1 && !self.graph.has_dependents(&Node::instance(owner, key.clone()))
    }

    // ---- public surface -------------------------------------------------

    /// Declare (or replace) the parameters of a static space. The binder,
    /// when given, receives the bound arguments and returns the canonical
    /// tuple (or `Empty` to keep them).
    ///
    /// The binder has no node of its own: what it reads is recorded against
    /// the formula that called the space, and not at all for calls made by
    /// the host. Keys already bound are never re-derived, so a binder should
    /// be a function of its arguments and of values its callers also depend
    /// on.
    pub fn set_parameters<P, I>(
        &mut self,
        space: SpaceId,
        params: I,
        binder: Option<Formula>,
    ) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
    {
        self.require_static(space)?;
        let spec = ParamSpec {
            params: params.into_iter().map(Into::into).collect(),
            binder,
        };
        let data = self.space_mut(space)?;
        data.params = Some(spec);
        data.params_local = true;
        self.touch_instances(space)?;
        self.propagate(vec![space])?;
        Ok(())
    }

    /// Declared parameter names, own or inherited.
    pub fn parameters(&self, space: SpaceId) -> Result<Option<Vec<String>>, ModelError> {
        let counterpart = self.static_of(space)?;
        Ok(self
            .space(counterpart)?
            .params
            .as_ref()
            .map(|spec| spec.params.iter().map(|p| p.name.clone()).collect()))
    }

    /// Canonical arguments of an instance root, `None` for other spaces.
    pub fn argvalues(&self, space: SpaceId) -> Result<Option<Vec<Value>>, ModelError> {
        Ok(match &self.space(space)?.kind {
            SpaceKind::Item { args, .. } => Some(args.to_vec()),
            _ => None,
        })
    }

    /// Argument tuples of the instances of `space` currently in its table.
    pub fn instances(&self, space: SpaceId) -> Result<Vec<Vec<Value>>, ModelError> {
        let mut out: Vec<Vec<Value>> = self
            .space(space)?
            .instances
            .iter()
            .map(|(k, _)| k.to_vec())
            .collect();
        out.sort_by_key(|args| super::space::join_values(args));
        Ok(out)
    }

    /// Evict the instance of `space` for `args`, held or not.
    pub fn clear_instance(&mut self, space: SpaceId, args: &[Value]) -> Result<bool, ModelError> {
        let key = self.instance_key(space, args, &[])?;
        self.destroy_instance(space, &key)
    }

    pub fn clear_instances(&mut self, space: SpaceId) -> Result<usize, ModelError> {
        self.drop_instances(space)
    }

    /// Reclamation pass: evict every instance nothing holds or depends on.
    pub fn reclaim_instances(&mut self) -> usize {
        let mut reclaimed = 0;
        loop {
            let this: &Model = self;
            let dead: Vec<(SpaceId, ArgKey)> = this
                .spaces
                .iter()
                .flat_map(|(owner, data)| {
                    data.instances
                        .iter()
                        .filter(move |(key, item)| this.is_reclaimable(owner, key, *item))
                        .map(move |(key, _)| (owner, key.clone()))
                })
                .collect();
            if dead.is_empty() {
                break;
            }
            for (owner, key) in dead {
                if self.spaces.contains(owner) && matches!(self.destroy_instance(owner, &key), Ok(true)) {
                    reclaimed += 1;
                }
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(reclaimed, "reclaim instances");
        reclaimed
    }
}
