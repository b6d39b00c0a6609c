//! Stable, generational identifiers for model entities.
//!
//! Every space, cells and reference lives in an arena owned by the model.
//! Identifiers are plain data: copying one never extends the lifetime of the
//! entity it names, and an identifier that outlives its entity is detected by
//! its generation instead of dangling.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl $name {
            pub fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            #[inline]
            pub fn index(self) -> u32 {
                self.index
            }

            #[inline]
            pub fn generation(self) -> u32 {
                self.generation
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}v{}", $tag, self.index, self.generation)
            }
        }
    };
}

entity_id!(
    /// Identity of a space (static, dynamic, or parameterized instance root).
    SpaceId,
    "space"
);
entity_id!(
    /// Identity of a cells object.
    CellId,
    "cells"
);
entity_id!(
    /// Identity of a reference, either space-scoped or model-scoped.
    RefId,
    "ref"
);

/// Liveness token of a parameterized instance.
///
/// The model holds one handle to the anchor of each instance; the instance
/// may be reclaimed once every other handle has been dropped. Anchors of
/// nested instances hold their enclosing anchor so that an inner handle keeps
/// the whole chain alive.
#[derive(Debug)]
pub struct Anchor {
    _parent: Option<Arc<Anchor>>,
}

impl Anchor {
    pub fn new(parent: Option<Arc<Anchor>>) -> Arc<Self> {
        Arc::new(Self { _parent: parent })
    }
}

/// A handle to a space as seen by formulas and hosts.
///
/// Equality and hashing only consider the space identity. A handle to a
/// space inside a parameterized instance carries that instance's anchor and
/// therefore keeps the instance from being reclaimed.
#[derive(Clone)]
pub struct SpaceRef {
    id: SpaceId,
    anchor: Option<Arc<Anchor>>,
}

impl SpaceRef {
    pub fn new(id: SpaceId, anchor: Option<Arc<Anchor>>) -> Self {
        Self { id, anchor }
    }

    #[inline]
    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// True when this handle pins a parameterized instance.
    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }
}

impl PartialEq for SpaceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SpaceRef {}

impl Hash for SpaceRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SpaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceRef")
            .field("id", &self.id)
            .field("anchored", &self.anchor.is_some())
            .finish()
    }
}
