//! Entity records and the structural helpers shared by the engine modules.
//!
//! Spaces come in three kinds, stored as one tagged record:
//!
//! * **Static**  - authored by the host; editable; may declare bases.
//! * **Item**    - root of a parameterized instance, mirror of a static
//!   space for one argument tuple.
//! * **Dynamic** - a mirrored child inside an instance, materialized on
//!   first access.
//!
//! Dynamic and item spaces never hold authored members: their cells are
//! copied from the static counterpart when the space is materialized, and
//! their references are read through the counterpart.

use std::collections::BTreeMap;
use std::sync::Arc;

use modelspace_common::{Anchor, CellId, ModelError, RefId, SpaceId, SpaceRef, Value};
use serde::{Deserialize, Serialize};

use super::cache::{CacheStore, InstanceTable};
use super::model::Model;
use super::node::{ArgKey, EntityId, Node};
use crate::formula::{Formula, Param};

/// How a reference bound to a space is resolved where it is inherited.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefMode {
    /// Relative when the target shares the referencing space's root,
    /// absolute otherwise. Decided when the value is bound.
    #[default]
    Auto,
    Absolute,
    Relative,
}

#[derive(Debug)]
pub(crate) struct CellData {
    pub name: String,
    pub space: SpaceId,
    pub formula: Option<Formula>,
    pub derived: bool,
    pub allow_none: Option<bool>,
    pub cache: CacheStore,
}

impl CellData {
    pub fn new(name: &str, space: SpaceId, formula: Option<Formula>, derived: bool) -> Self {
        Self {
            name: name.to_string(),
            space,
            formula,
            derived,
            allow_none: None,
            cache: CacheStore::default(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RefData {
    pub name: String,
    /// `None` for model-level references.
    pub owner: Option<SpaceId>,
    pub value: Value,
    pub mode: RefMode,
    /// Effective mode after resolving `Auto`.
    pub relative: bool,
    /// Space whose position anchors relative resolution: the space the
    /// reference was authored in, also for its derived copies.
    pub origin: Option<SpaceId>,
    pub derived: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ParamSpec {
    pub params: Vec<Param>,
    pub binder: Option<Formula>,
}

impl ParamSpec {
    pub fn same_as(&self, other: &ParamSpec) -> bool {
        self.params == other.params
            && match (&self.binder, &other.binder) {
                (Some(a), Some(b)) => a.same_as(b),
                (None, None) => true,
                _ => false,
            }
    }
}

#[derive(Debug)]
pub(crate) enum SpaceKind {
    Static {
        bases: Vec<SpaceId>,
        /// Same-named children of the parent's bases.
        implicit_bases: Vec<SpaceId>,
        /// Created by derivation rather than by the host.
        derived: bool,
    },
    Item {
        /// The parameterized space that was called.
        owner: SpaceId,
        counterpart: SpaceId,
        args: ArgKey,
        anchor: Arc<Anchor>,
    },
    Dynamic {
        counterpart: SpaceId,
        root: SpaceId,
    },
}

#[derive(Debug)]
pub(crate) struct SpaceData {
    pub name: String,
    pub parent: Option<SpaceId>,
    pub kind: SpaceKind,
    pub cells: BTreeMap<String, CellId>,
    pub spaces: BTreeMap<String, SpaceId>,
    pub refs: BTreeMap<String, RefId>,
    pub params: Option<ParamSpec>,
    /// Parameters were set on this space rather than inherited.
    pub params_local: bool,
    pub instances: InstanceTable,
    pub allow_none: Option<bool>,
    pub doc: Option<String>,
}

impl SpaceData {
    pub fn new(name: &str, parent: Option<SpaceId>, kind: SpaceKind) -> Self {
        Self {
            name: name.to_string(),
            parent,
            kind,
            cells: BTreeMap::new(),
            spaces: BTreeMap::new(),
            refs: BTreeMap::new(),
            params: None,
            params_local: false,
            instances: InstanceTable::default(),
            allow_none: None,
            doc: None,
        }
    }

    pub fn new_static(name: &str, parent: Option<SpaceId>, derived: bool) -> Self {
        Self::new(
            name,
            parent,
            SpaceKind::Static {
                bases: Vec::new(),
                implicit_bases: Vec::new(),
                derived,
            },
        )
    }

    pub fn is_static(&self) -> bool {
        matches!(self.kind, SpaceKind::Static { .. })
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, SpaceKind::Static { derived: true, .. })
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.cells.contains_key(name) || self.spaces.contains_key(name) || self.refs.contains_key(name)
    }
}

impl Model {
    pub(crate) fn space(&self, id: SpaceId) -> Result<&SpaceData, ModelError> {
        self.spaces.get(id).ok_or_else(|| deleted("space", id))
    }

    pub(crate) fn space_mut(&mut self, id: SpaceId) -> Result<&mut SpaceData, ModelError> {
        self.spaces.get_mut(id).ok_or_else(|| deleted("space", id))
    }

    pub(crate) fn cell(&self, id: CellId) -> Result<&CellData, ModelError> {
        self.cells.get(id).ok_or_else(|| deleted("cells", id))
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> Result<&mut CellData, ModelError> {
        self.cells.get_mut(id).ok_or_else(|| deleted("cells", id))
    }

    pub(crate) fn reference(&self, id: RefId) -> Result<&RefData, ModelError> {
        self.refs.get(id).ok_or_else(|| deleted("reference", id))
    }

    pub(crate) fn reference_mut(&mut self, id: RefId) -> Result<&mut RefData, ModelError> {
        self.refs.get_mut(id).ok_or_else(|| deleted("reference", id))
    }

    /// The space must exist and be editable.
    pub(crate) fn require_static(&self, id: SpaceId) -> Result<&SpaceData, ModelError> {
        let data = self.space(id)?;
        if !data.is_static() {
            return Err(ModelError::ReadOnlySpace {
                space: self.full_name(id),
            });
        }
        Ok(data)
    }

    /// Static space a space mirrors; a static space is its own counterpart.
    pub(crate) fn static_of(&self, id: SpaceId) -> Result<SpaceId, ModelError> {
        Ok(match self.space(id)?.kind {
            SpaceKind::Static { .. } => id,
            SpaceKind::Item { counterpart, .. } | SpaceKind::Dynamic { counterpart, .. } => {
                counterpart
            }
        })
    }

    /// Instance root enclosing a dynamic space.
    pub(crate) fn root_item(&self, id: SpaceId) -> Option<SpaceId> {
        match self.spaces.get(id)?.kind {
            SpaceKind::Static { .. } => None,
            SpaceKind::Item { .. } => Some(id),
            SpaceKind::Dynamic { root, .. } => Some(root),
        }
    }

    pub(crate) fn anchor_of(&self, id: SpaceId) -> Option<Arc<Anchor>> {
        let root = self.root_item(id)?;
        match &self.spaces.get(root)?.kind {
            SpaceKind::Item { anchor, .. } => Some(anchor.clone()),
            _ => None,
        }
    }

    /// Handle to a space; handles into an instance pin that instance.
    pub(crate) fn space_ref(&self, id: SpaceId) -> Result<SpaceRef, ModelError> {
        self.space(id)?;
        Ok(SpaceRef::new(id, self.anchor_of(id)))
    }

    /// Static ancestors of `id`, nearest first, including `id` itself.
    pub(crate) fn lineage(&self, id: SpaceId) -> Vec<SpaceId> {
        let mut out = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(data) = self.spaces.get(current) else {
                break;
            };
            out.push(current);
            cursor = data.parent;
        }
        out
    }

    pub(crate) fn is_ancestor(&self, ancestor: SpaceId, of: SpaceId) -> bool {
        self.lineage(of).into_iter().skip(1).any(|s| s == ancestor)
    }

    /// Explicit bases followed by implicit ones, without duplicates.
    pub(crate) fn effective_bases(&self, id: SpaceId) -> Vec<SpaceId> {
        let Some(SpaceData {
            kind:
                SpaceKind::Static {
                    bases,
                    implicit_bases,
                    ..
                },
            ..
        }) = self.spaces.get(id)
        else {
            return Vec::new();
        };
        let mut out: Vec<SpaceId> = Vec::with_capacity(bases.len() + implicit_bases.len());
        for b in bases.iter().chain(implicit_bases) {
            if !out.contains(b) && self.spaces.contains(*b) {
                out.push(*b);
            }
        }
        out
    }

    /// Dotted name used in errors and traces: `Outer.Inner`, `Outer[1, 2].Inner`.
    pub(crate) fn full_name(&self, id: SpaceId) -> String {
        let Some(data) = self.spaces.get(id) else {
            return format!("<deleted {id:?}>");
        };
        match &data.kind {
            SpaceKind::Item { owner, args, .. } => {
                format!("{}[{}]", self.full_name(*owner), join_values(args))
            }
            _ => match data.parent {
                Some(parent) => format!("{}.{}", self.full_name(parent), data.name),
                None => data.name.clone(),
            },
        }
    }

    pub(crate) fn node_label(&self, node: &Node) -> String {
        match node.entity {
            EntityId::Cell(id) => match self.cells.get(id) {
                Some(cell) => format!(
                    "{}.{}({})",
                    self.full_name(cell.space),
                    cell.name,
                    join_values(&node.args)
                ),
                None => format!("<deleted {id:?}>"),
            },
            EntityId::Space(id) => format!("{}[{}]", self.full_name(id), join_values(&node.args)),
            EntityId::Ref(id) => match self.refs.get(id) {
                Some(RefData {
                    owner: Some(owner),
                    name,
                    ..
                }) => format!("{}.{}", self.full_name(*owner), name),
                Some(data) => data.name.clone(),
                None => format!("<deleted {id:?}>"),
            },
        }
    }

    pub(crate) fn cell_label(&self, id: CellId) -> String {
        match self.cells.get(id) {
            Some(cell) => format!("{}.{}", self.full_name(cell.space), cell.name),
            None => format!("<deleted {id:?}>"),
        }
    }

    /// Copy the cells of `counterpart` into a freshly materialized dynamic
    /// space.
    pub(crate) fn mirror_cells(&mut self, dynamic: SpaceId, counterpart: SpaceId) -> Result<(), ModelError> {
        let sources: Vec<(String, Option<Formula>, Option<bool>)> = self
            .space(counterpart)?
            .cells
            .values()
            .filter_map(|cid| self.cells.get(*cid))
            .map(|c| (c.name.clone(), c.formula.clone(), c.allow_none))
            .collect();
        for (name, formula, allow_none) in sources {
            let mut data = CellData::new(&name, dynamic, formula, true);
            data.allow_none = allow_none;
            let id = self.cells.insert(data);
            self.space_mut(dynamic)?.cells.insert(name, id);
        }
        Ok(())
    }
}

fn deleted(what: &str, id: impl std::fmt::Debug) -> ModelError {
    ModelError::DeletedObject {
        what: format!("{what} {id:?}"),
    }
}

pub(crate) fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
