//! The model: owner of every entity, the caches, the graph and the call
//! stack, and the host-facing API over them.

use std::collections::BTreeMap;

use modelspace_common::{CellId, ModelError, RefId, SpaceId, SpaceRef, Value};

use super::EvalConfig;
use super::arena::Arena;
use super::graph::DependencyGraph;
use super::inheritance::DerivationSummary;
use super::node::{EntityId, Node, make_node};
use super::resolver::is_system_name;
use super::space::{CellData, RefData, RefMode, SpaceData, SpaceKind};
use super::stack::CallStack;
use crate::context::EvalContext;
use crate::formula::Formula;

/// A recorded node, as exposed by the introspection API.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub entity: EntityId,
    pub args: Vec<Value>,
    /// Readable form, e.g. `Outer.Inner.foo(1, 2)`.
    pub label: String,
}

#[derive(Debug)]
pub struct Model {
    pub(crate) name: String,
    pub(crate) config: EvalConfig,
    pub(crate) spaces: Arena<SpaceId, SpaceData>,
    pub(crate) cells: Arena<CellId, CellData>,
    pub(crate) refs: Arena<RefId, RefData>,
    pub(crate) roots: BTreeMap<String, SpaceId>,
    pub(crate) globals: BTreeMap<String, RefId>,
    pub(crate) graph: DependencyGraph,
    pub(crate) stack: CallStack,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, EvalConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: EvalConfig) -> Self {
        Self {
            name: name.into(),
            config,
            spaces: Arena::default(),
            cells: Arena::default(),
            refs: Arena::default(),
            roots: BTreeMap::new(),
            globals: BTreeMap::new(),
            graph: DependencyGraph::default(),
            stack: CallStack::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    fn check_name(&self, name: &str) -> Result<(), ModelError> {
        if name.is_empty() || is_system_name(name) {
            return Err(ModelError::InvalidArguments {
                target: name.to_string(),
                detail: "reserved or empty name".into(),
            });
        }
        Ok(())
    }

    fn duplicate(&self, name: &str, space: Option<SpaceId>) -> ModelError {
        ModelError::DuplicateName {
            name: name.to_string(),
            space: match space {
                Some(s) => self.full_name(s),
                None => self.name.clone(),
            },
        }
    }

    /// After a member of `space` was removed or redefined.
    fn after_member_change(&mut self, space: SpaceId) -> Result<DerivationSummary, ModelError> {
        self.invalidate_space_cells(space);
        self.touch_instances(space)?;
        self.propagate(vec![space])
    }

    /// Re-derive after `name` was added to `space`. When the new member
    /// clashes with what a descendant inherits, it is taken back out and the
    /// descendants are re-derived as they were.
    fn settle_new_member(
        &mut self,
        space: SpaceId,
        name: &str,
        starts: Vec<SpaceId>,
    ) -> Result<DerivationSummary, ModelError> {
        self.invalidate_space_cells(space);
        self.shadow_global(name);
        self.touch_instances(space)?;
        match self.propagate(starts) {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.take_back_member(space, name);
                let mut starts = self.scrub_dead_bases();
                starts.push(space);
                self.propagate(starts)?;
                Err(err)
            }
        }
    }

    fn take_back_member(&mut self, space: SpaceId, name: &str) {
        let Some(data) = self.spaces.get_mut(space) else {
            return;
        };
        if let Some(cell) = data.cells.remove(name) {
            self.destroy_cell(cell);
        } else if let Some(reference) = data.refs.remove(name) {
            self.destroy_ref(reference);
        } else if let Some(child) = data.spaces.remove(name) {
            self.destroy_space_tree(child);
        }
    }

    /// A member called `name` appeared somewhere. Formulas that resolved
    /// `name` to the global of that name, from any space, read it again.
    pub(crate) fn shadow_global(&mut self, name: &str) {
        if let Some(&global) = self.globals.get(name) {
            self.invalidate(&Node::reference(global));
        }
    }

    fn begin_call(&mut self) {
        if self.stack.is_empty() && self.config.reclaim_on_call {
            self.reclaim_instances();
        }
    }

    // ---- spaces ---------------------------------------------------------

    /// Create a static space under `parent`, or a root space.
    ///
    /// Creating a space over a derived child of the same name turns that
    /// child into an authored one.
    pub fn new_space(&mut self, parent: Option<SpaceId>, name: &str) -> Result<SpaceId, ModelError> {
        self.check_name(name)?;
        let Some(parent) = parent else {
            if self.roots.contains_key(name) {
                return Err(self.duplicate(name, None));
            }
            let id = self.spaces.insert(SpaceData::new_static(name, None, false));
            self.roots.insert(name.to_string(), id);
            return Ok(id);
        };

        let data = self.require_static(parent)?;
        let (existing, taken) = (data.spaces.get(name).copied(), data.has_member(name));
        if let Some(existing) = existing {
            if let SpaceKind::Static { derived, .. } = &mut self.space_mut(existing)?.kind
                && *derived
            {
                *derived = false;
                return Ok(existing);
            }
            return Err(self.duplicate(name, Some(parent)));
        }
        if taken {
            return Err(self.duplicate(name, Some(parent)));
        }
        let id = self.spaces.insert(SpaceData::new_static(name, Some(parent), false));
        self.space_mut(parent)?.spaces.insert(name.to_string(), id);
        self.settle_new_member(parent, name, vec![parent, id])?;
        Ok(id)
    }

    /// Delete an authored static space with everything inside it.
    pub fn del_space(&mut self, space: SpaceId) -> Result<DerivationSummary, ModelError> {
        let data = self.require_static(space)?;
        if data.is_derived() {
            return Err(ModelError::DerivedMember {
                name: data.name.clone(),
                space: self.full_name(space),
            });
        }
        let (name, parent) = (data.name.clone(), data.parent);
        match parent {
            Some(p) => {
                self.touch_instances(p)?;
                self.space_mut(p)?.spaces.remove(&name);
            }
            None => {
                self.roots.remove(&name);
            }
        }
        self.destroy_space_tree(space);

        let mut starts = self.scrub_dead_bases();
        if let Some(p) = parent {
            self.invalidate_space_cells(p);
            starts.push(p);
        }
        self.propagate(starts)
    }

    pub fn root(&self, name: &str) -> Option<SpaceId> {
        self.roots.get(name).copied()
    }

    pub fn roots(&self) -> Vec<SpaceId> {
        self.roots.values().copied().collect()
    }

    /// Static space at a dotted path such as `Outer.Inner`.
    pub fn space_by_path(&self, path: &str) -> Result<SpaceId, ModelError> {
        let mut parts = path.split('.');
        let first = parts.next().unwrap_or_default();
        let mut current = self.root(first).ok_or_else(|| ModelError::NameNotFound {
            name: first.to_string(),
            scope: self.name.clone(),
        })?;
        for part in parts {
            current = *self
                .space(current)?
                .spaces
                .get(part)
                .ok_or_else(|| ModelError::NameNotFound {
                    name: part.to_string(),
                    scope: self.full_name(current),
                })?;
        }
        Ok(current)
    }

    /// Child space `name`; children of dynamic spaces are materialized.
    pub fn child(&mut self, space: SpaceId, name: &str) -> Result<SpaceId, ModelError> {
        if let Some(&child) = self.space(space)?.spaces.get(name) {
            return Ok(child);
        }
        if self.space(space)?.is_static() {
            return Err(ModelError::NameNotFound {
                name: name.to_string(),
                scope: self.full_name(space),
            });
        }
        self.materialize_child(space, name)
    }

    /// Names of the child spaces (materialized ones, for dynamic spaces).
    pub fn space_names(&self, space: SpaceId) -> Result<Vec<String>, ModelError> {
        Ok(self.space(space)?.spaces.keys().cloned().collect())
    }

    pub fn space_name(&self, space: SpaceId) -> Result<&str, ModelError> {
        Ok(&self.space(space)?.name)
    }

    pub fn qualified_name(&self, space: SpaceId) -> Result<String, ModelError> {
        self.space(space)?;
        Ok(self.full_name(space))
    }

    pub fn parent(&self, space: SpaceId) -> Result<Option<SpaceId>, ModelError> {
        Ok(self.space(space)?.parent)
    }

    pub fn is_dynamic(&self, space: SpaceId) -> Result<bool, ModelError> {
        Ok(!self.space(space)?.is_static())
    }

    pub fn is_derived_space(&self, space: SpaceId) -> Result<bool, ModelError> {
        Ok(self.space(space)?.is_derived())
    }

    pub fn contains_space(&self, space: SpaceId) -> bool {
        self.spaces.contains(space)
    }

    /// Handle to `space` usable as a value.
    pub fn handle(&self, space: SpaceId) -> Result<SpaceRef, ModelError> {
        self.space_ref(space)
    }

    pub fn set_space_allow_none(&mut self, space: SpaceId, allow: Option<bool>) -> Result<(), ModelError> {
        self.require_static(space)?;
        self.space_mut(space)?.allow_none = allow;
        // Nested spaces without a setting of their own follow this one.
        self.touch_instances(space)?;
        self.clear_all(space)?;
        Ok(())
    }

    pub fn set_doc(&mut self, space: SpaceId, doc: Option<String>) -> Result<(), ModelError> {
        self.require_static(space)?;
        self.space_mut(space)?.doc = doc;
        Ok(())
    }

    pub fn doc(&self, space: SpaceId) -> Result<Option<&str>, ModelError> {
        let counterpart = self.static_of(space)?;
        Ok(self.space(counterpart)?.doc.as_deref())
    }

    // ---- cells ----------------------------------------------------------

    /// Create cells `name` in `space`. Defining a name the space inherits
    /// overrides the derived cells.
    pub fn new_cells(
        &mut self,
        space: SpaceId,
        name: &str,
        formula: impl Into<Option<Formula>>,
    ) -> Result<CellId, ModelError> {
        self.check_name(name)?;
        let formula = formula.into();
        let data = self.require_static(space)?;
        let (existing, taken) = (data.cells.get(name).copied(), data.has_member(name));
        if let Some(existing) = existing {
            if !self.cell(existing)?.derived {
                return Err(self.duplicate(name, Some(space)));
            }
            let cell = self.cell_mut(existing)?;
            cell.formula = formula;
            cell.derived = false;
            self.invalidate_cell(existing);
            self.after_member_change(space)?;
            return Ok(existing);
        }
        if taken {
            return Err(self.duplicate(name, Some(space)));
        }
        let id = self.cells.insert(CellData::new(name, space, formula, false));
        self.space_mut(space)?.cells.insert(name.to_string(), id);
        self.settle_new_member(space, name, vec![space])?;
        Ok(id)
    }

    /// Replace the formula of static cells. Derived cells become authored.
    pub fn set_formula(&mut self, cell: CellId, formula: Formula) -> Result<DerivationSummary, ModelError> {
        let space = self.cell(cell)?.space;
        self.require_static(space)?;
        let data = self.cell_mut(cell)?;
        data.formula = Some(formula);
        data.derived = false;
        self.invalidate_cell(cell);
        self.touch_instances(space)?;
        self.propagate(vec![space])
    }

    /// Delete authored cells; a base defining the same name re-derives it.
    pub fn del_cells(&mut self, cell: CellId) -> Result<DerivationSummary, ModelError> {
        let data = self.cell(cell)?;
        let (space, name) = (data.space, data.name.clone());
        self.require_static(space)?;
        if data.derived {
            return Err(ModelError::DerivedMember {
                name,
                space: self.full_name(space),
            });
        }
        self.space_mut(space)?.cells.remove(&name);
        self.destroy_cell(cell);
        self.after_member_change(space)
    }

    pub fn cells(&self, space: SpaceId, name: &str) -> Result<CellId, ModelError> {
        self.space(space)?
            .cells
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::NameNotFound {
                name: name.to_string(),
                scope: self.full_name(space),
            })
    }

    pub fn cell_names(&self, space: SpaceId) -> Result<Vec<String>, ModelError> {
        Ok(self.space(space)?.cells.keys().cloned().collect())
    }

    pub fn cell_name(&self, cell: CellId) -> Result<&str, ModelError> {
        Ok(&self.cell(cell)?.name)
    }

    pub fn cell_space(&self, cell: CellId) -> Result<SpaceId, ModelError> {
        Ok(self.cell(cell)?.space)
    }

    pub fn is_derived(&self, cell: CellId) -> Result<bool, ModelError> {
        Ok(self.cell(cell)?.derived)
    }

    pub fn formula(&self, cell: CellId) -> Result<Option<Formula>, ModelError> {
        Ok(self.cell(cell)?.formula.clone())
    }

    pub fn set_cells_allow_none(&mut self, cell: CellId, allow: Option<bool>) -> Result<(), ModelError> {
        let space = self.cell(cell)?.space;
        self.require_static(space)?;
        self.cell_mut(cell)?.allow_none = allow;
        self.invalidate_cell(cell);
        self.touch_instances(space)?;
        self.propagate(vec![space])?;
        Ok(())
    }

    // ---- references -----------------------------------------------------

    fn is_relative(&self, space: SpaceId, value: &Value, mode: RefMode) -> bool {
        match (mode, value) {
            (RefMode::Absolute, _) | (_, Value::Opaque(_)) => false,
            (RefMode::Relative, Value::Space(_)) => true,
            (RefMode::Auto, Value::Space(target)) => {
                let same_root = |s: SpaceId| self.lineage(s).last().copied();
                self.spaces
                    .get(target.id())
                    .is_some_and(|t| t.is_static())
                    && same_root(space) == same_root(target.id())
            }
            _ => false,
        }
    }

    pub fn new_ref(
        &mut self,
        space: SpaceId,
        name: &str,
        value: impl Into<Value>,
        mode: RefMode,
    ) -> Result<RefId, ModelError> {
        self.check_name(name)?;
        let value = value.into();
        let relative = self.is_relative(space, &value, mode);
        let data = self.require_static(space)?;
        let (existing, taken) = (data.refs.get(name).copied(), data.has_member(name));
        if let Some(existing) = existing {
            if !self.reference(existing)?.derived {
                return Err(self.duplicate(name, Some(space)));
            }
            let r = self.reference_mut(existing)?;
            r.value = value;
            r.mode = mode;
            r.relative = relative;
            r.origin = Some(space);
            r.derived = false;
            self.invalidate(&Node::reference(existing));
            self.propagate(vec![space])?;
            return Ok(existing);
        }
        if taken {
            return Err(self.duplicate(name, Some(space)));
        }
        let id = self.refs.insert(RefData {
            name: name.to_string(),
            owner: Some(space),
            value,
            mode,
            relative,
            origin: Some(space),
            derived: false,
        });
        self.space_mut(space)?.refs.insert(name.to_string(), id);
        self.settle_new_member(space, name, vec![space])?;
        Ok(id)
    }

    /// Rebind a reference. Global references are accepted as well.
    pub fn set_ref(&mut self, reference: RefId, value: impl Into<Value>) -> Result<DerivationSummary, ModelError> {
        let value = value.into();
        let data = self.reference(reference)?;
        let Some(space) = data.owner else {
            self.reference_mut(reference)?.value = value;
            self.invalidate(&Node::reference(reference));
            return Ok(DerivationSummary::default());
        };
        self.require_static(space)?;
        let relative = self.is_relative(space, &value, self.reference(reference)?.mode);
        let r = self.reference_mut(reference)?;
        r.value = value;
        r.relative = relative;
        r.origin = Some(space);
        r.derived = false;
        self.invalidate(&Node::reference(reference));
        self.propagate(vec![space])
    }

    pub fn del_ref(&mut self, reference: RefId) -> Result<DerivationSummary, ModelError> {
        let data = self.reference(reference)?;
        let (owner, name) = (data.owner, data.name.clone());
        let Some(space) = owner else {
            self.globals.remove(&name);
            self.destroy_ref(reference);
            return Ok(DerivationSummary::default());
        };
        self.require_static(space)?;
        if data.derived {
            return Err(ModelError::DerivedMember {
                name,
                space: self.full_name(space),
            });
        }
        self.space_mut(space)?.refs.remove(&name);
        self.destroy_ref(reference);
        self.after_member_change(space)
    }

    pub fn ref_id(&self, space: SpaceId, name: &str) -> Result<RefId, ModelError> {
        let counterpart = self.static_of(space)?;
        self.space(counterpart)?
            .refs
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::NameNotFound {
                name: name.to_string(),
                scope: self.full_name(space),
            })
    }

    pub fn ref_names(&self, space: SpaceId) -> Result<Vec<String>, ModelError> {
        let counterpart = self.static_of(space)?;
        Ok(self.space(counterpart)?.refs.keys().cloned().collect())
    }

    pub fn ref_value(&self, reference: RefId) -> Result<Value, ModelError> {
        Ok(self.reference(reference)?.value.clone())
    }

    pub fn ref_mode(&self, reference: RefId) -> Result<RefMode, ModelError> {
        Ok(self.reference(reference)?.mode)
    }

    pub fn is_derived_ref(&self, reference: RefId) -> Result<bool, ModelError> {
        Ok(self.reference(reference)?.derived)
    }

    // ---- model-level references -----------------------------------------

    pub fn new_global(&mut self, name: &str, value: impl Into<Value>) -> Result<RefId, ModelError> {
        self.check_name(name)?;
        if self.globals.contains_key(name) {
            return Err(self.duplicate(name, None));
        }
        let id = self.refs.insert(RefData {
            name: name.to_string(),
            owner: None,
            value: value.into(),
            mode: RefMode::Absolute,
            relative: false,
            origin: None,
            derived: false,
        });
        self.globals.insert(name.to_string(), id);
        Ok(id)
    }

    fn global_id(&self, name: &str) -> Result<RefId, ModelError> {
        self.globals
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::NameNotFound {
                name: name.to_string(),
                scope: self.name.clone(),
            })
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let id = self.global_id(name)?;
        self.set_ref(id, value)?;
        Ok(())
    }

    pub fn del_global(&mut self, name: &str) -> Result<(), ModelError> {
        let id = self.global_id(name)?;
        self.del_ref(id)?;
        Ok(())
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        let id = self.globals.get(name)?;
        self.refs.get(*id).map(|r| r.value.clone())
    }

    // ---- evaluation -----------------------------------------------------

    pub fn call(&mut self, cell: CellId, args: &[Value]) -> Result<Value, ModelError> {
        self.call_kw(cell, args, &[])
    }

    pub fn call_kw(
        &mut self,
        cell: CellId,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> Result<Value, ModelError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("call", target = %self.cell_label(cell)).entered();
        self.begin_call();
        self.eval_cell(cell, args, kwargs)
    }

    /// Instance of parameterized `space` for `args`.
    pub fn call_space(&mut self, space: SpaceId, args: &[Value]) -> Result<SpaceRef, ModelError> {
        self.call_space_kw(space, args, &[])
    }

    pub fn call_space_kw(
        &mut self,
        space: SpaceId,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> Result<SpaceRef, ModelError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("call_space", target = %self.full_name(space)).entered();
        self.begin_call();
        self.call_space_inner(space, args, kwargs)
    }

    /// Evaluate `name` in `space` the way a formula there would read it.
    pub fn get(&mut self, space: SpaceId, name: &str) -> Result<Value, ModelError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("get", name).entered();
        self.begin_call();
        EvalContext::new(self, space).get(name)
    }

    // ---- clearing -------------------------------------------------------

    /// Evict every computed value of `cell` and what depends on them.
    pub fn clear_cells(&mut self, cell: CellId) -> Result<usize, ModelError> {
        self.cell(cell)?;
        Ok(self.invalidate_cell(cell))
    }

    /// Evict one node of `cell`; a no-op when nothing is cached for it.
    pub fn clear_at(&mut self, cell: CellId, args: &[Value]) -> Result<usize, ModelError> {
        let key = self.bind_cell_args(cell, args, &[])?;
        Ok(self.invalidate(&Node::cell(cell, key)))
    }

    /// Clear every cells of `space` and its (materialized) subspaces, and
    /// drop the instances of parameterized spaces among them.
    pub fn clear_all(&mut self, space: SpaceId) -> Result<usize, ModelError> {
        let mut evicted = 0;
        let mut stack = vec![space];
        while let Some(s) = stack.pop() {
            let data = self.space(s)?;
            let children: Vec<SpaceId> = data.spaces.values().copied().collect();
            evicted += self.invalidate_space_cells(s);
            self.drop_instances(s)?;
            stack.extend(children.into_iter().filter(|c| self.spaces.contains(*c)));
        }
        Ok(evicted)
    }

    // ---- inputs ---------------------------------------------------------

    /// Pin the value of `cell(args)`, bypassing its formula.
    pub fn set_input(&mut self, cell: CellId, args: &[Value], value: impl Into<Value>) -> Result<(), ModelError> {
        let key = self.bind_cell_args(cell, args, &[])?;
        self.invalidate(&Node::cell(cell, key.clone()));
        self.cell_mut(cell)?.cache.set_input(key, value.into());
        Ok(())
    }

    pub fn clear_input(&mut self, cell: CellId, args: &[Value]) -> Result<bool, ModelError> {
        let key = self.bind_cell_args(cell, args, &[])?;
        if self.cell_mut(cell)?.cache.remove_input(&key).is_none() {
            return Ok(false);
        }
        self.invalidate(&Node::cell(cell, key));
        Ok(true)
    }

    pub fn is_input(&self, cell: CellId, args: &[Value]) -> Result<bool, ModelError> {
        let key = self.bind_cell_args(cell, args, &[])?;
        Ok(self.cell(cell)?.cache.is_input(&key))
    }

    /// Argument tuples and values of every input of `cell`.
    pub fn inputs(&self, cell: CellId) -> Result<Vec<(Vec<Value>, Value)>, ModelError> {
        let mut out: Vec<(Vec<Value>, Value)> = self
            .cell(cell)?
            .cache
            .inputs()
            .map(|(k, v)| (k.to_vec(), v.clone()))
            .collect();
        out.sort_by_key(|(args, _)| super::space::join_values(args));
        Ok(out)
    }

    // ---- introspection --------------------------------------------------

    /// True when a computed value is cached for `cell(args)`.
    pub fn is_cached(&self, cell: CellId, args: &[Value]) -> Result<bool, ModelError> {
        let key = self.bind_cell_args(cell, args, &[])?;
        Ok(self.cell(cell)?.cache.has_value(&key))
    }

    pub fn cached_args(&self, cell: CellId) -> Result<Vec<Vec<Value>>, ModelError> {
        let mut out: Vec<Vec<Value>> = self.cell(cell)?.cache.keys().map(|k| k.to_vec()).collect();
        out.sort_by_key(|args| super::space::join_values(args));
        Ok(out)
    }

    fn node_infos(&self, nodes: Vec<Node>) -> Vec<NodeInfo> {
        let mut out: Vec<NodeInfo> = nodes
            .into_iter()
            .map(|n| NodeInfo {
                label: self.node_label(&n),
                entity: n.entity,
                args: n.args.to_vec(),
            })
            .collect();
        out.sort_by(|a, b| a.label.cmp(&b.label));
        out
    }

    /// Nodes `cell(args)` read when it was last computed.
    pub fn precedents(&self, cell: CellId, args: &[Value]) -> Result<Vec<NodeInfo>, ModelError> {
        let key = self.bind_cell_args(cell, args, &[])?;
        Ok(self.node_infos(self.graph.precedents_of(&Node::cell(cell, key))))
    }

    /// Cached nodes that read `cell(args)`.
    pub fn dependents(&self, cell: CellId, args: &[Value]) -> Result<Vec<NodeInfo>, ModelError> {
        let key = self.bind_cell_args(cell, args, &[])?;
        Ok(self.node_infos(self.graph.dependents_of(&Node::cell(cell, key))))
    }

    /// Cached nodes that read reference `reference`.
    pub fn ref_dependents(&self, reference: RefId) -> Result<Vec<NodeInfo>, ModelError> {
        self.reference(reference)?;
        Ok(self.node_infos(self.graph.dependents_of(&Node::reference(reference))))
    }

    /// Number of recorded read-edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Drop every cached value, instance and edge. Definitions stay.
    pub fn clear_everything(&mut self) -> Result<(), ModelError> {
        for root in self.roots() {
            self.clear_all(root)?;
        }
        self.graph.clear();
        Ok(())
    }

    /// Make a node key from raw arguments without binding them.
    pub fn node(&self, entity: EntityId, args: &[Value]) -> Result<Node, ModelError> {
        make_node(entity, args)
    }
}
