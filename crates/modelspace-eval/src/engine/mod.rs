//! Modelspace evaluation engine
//!
//! Cached formula evaluation over a tree of spaces, with dependency tracking,
//! invalidation, inheritance between spaces and parameterized instances.

mod arena;
mod cache;
mod eval;
mod graph;
mod inheritance;
mod instance;
mod model;
pub mod node;
mod persist;
pub(crate) mod resolver;
mod space;
mod stack;

#[cfg(test)]
mod tests;

pub use inheritance::DerivationSummary;
pub use model::{Model, NodeInfo};
pub use node::{ArgKey, EntityId, Node};
pub use space::RefMode;

use serde::{Deserialize, Serialize};

/// Configuration for the evaluation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Maximum number of nested formula calls, also the longest walk a
    /// relative reference may take through the space tree.
    pub max_depth: usize,
    /// Model-wide default of the none policy. Spaces and cells override it.
    pub allow_none: bool,
    /// Reclaim unreferenced parameterized instances at the start of every
    /// top-level call.
    pub reclaim_on_call: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            allow_none: false,
            reclaim_on_call: true,
        }
    }
}
