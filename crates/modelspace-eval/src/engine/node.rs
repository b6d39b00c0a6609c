//! Node identity: "this entity evaluated with these arguments".

use std::fmt;
use std::sync::Arc;

use modelspace_common::{CellId, ModelError, RefId, SpaceId, Value};

/// Canonical, immutable argument tuple.
pub type ArgKey = Arc<[Value]>;

/// The cached entity a [`Node`] is about.
#[derive(Copy, Clone, Hash, PartialEq, Eq)]
pub enum EntityId {
    Cell(CellId),
    /// A parameterized space; the node's arguments select one instance.
    Space(SpaceId),
    /// A reference; reads of its value are recorded against this entity.
    Ref(RefId),
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Cell(id) => write!(f, "{id:?}"),
            EntityId::Space(id) => write!(f, "{id:?}"),
            EntityId::Ref(id) => write!(f, "{id:?}"),
        }
    }
}

/// Vertex of the dependency graph and key of the cache stores.
///
/// Equality and hashing follow value equality of the arguments, so two
/// calls with equal arguments address the same node.
#[derive(Clone, Hash, PartialEq, Eq)]
pub struct Node {
    pub entity: EntityId,
    pub args: ArgKey,
}

impl Node {
    pub fn new(entity: EntityId, args: ArgKey) -> Self {
        Self { entity, args }
    }

    pub fn cell(id: CellId, args: ArgKey) -> Self {
        Self::new(EntityId::Cell(id), args)
    }

    pub fn instance(space: SpaceId, args: ArgKey) -> Self {
        Self::new(EntityId::Space(space), args)
    }

    pub fn reference(id: RefId) -> Self {
        Self::new(EntityId::Ref(id), empty_key())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}", self.entity, Value::Tuple(self.args.to_vec()))
    }
}

pub fn empty_key() -> ArgKey {
    Arc::from(Vec::new())
}

/// Coerce a value into its immutable, hashable form.
///
/// Lists become tuples (recursively). Opaque host values have no such form
/// and are rejected.
pub fn normalize(value: &Value) -> Result<Value, ModelError> {
    match value {
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(normalize)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Tuple),
        Value::Opaque(_) => Err(ModelError::UnhashableArgument {
            detail: format!("{value:?} has no immutable value form"),
        }),
        other => Ok(other.clone()),
    }
}

pub fn make_key(args: &[Value]) -> Result<ArgKey, ModelError> {
    args.iter()
        .map(normalize)
        .collect::<Result<Vec<_>, _>>()
        .map(Arc::from)
}

/// Build the node of `entity` called with already-bound positional `args`.
pub fn make_node(entity: EntityId, args: &[Value]) -> Result<Node, ModelError> {
    Ok(Node::new(entity, make_key(args)?))
}
