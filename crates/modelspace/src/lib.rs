//! Meta crate that re-exports the Modelspace building blocks. Downstream
//! users can depend on this crate and pick layers via feature flags while
//! keeping access to the underlying crates.

#[cfg(feature = "common")]
pub use modelspace_common as common;

#[cfg(feature = "eval")]
pub use modelspace_eval as eval;

#[cfg(feature = "common")]
pub use modelspace_common::{CellId, ErrorKind, ModelError, RefId, SpaceId, SpaceRef, Value};

#[cfg(feature = "eval")]
pub use modelspace_eval::{
    DerivationSummary, EvalConfig, EvalContext, Formula, FormulaLoader, FormulaRegistry, Model,
    ModelSnapshot, Param, RefMode, SharedModel,
};

#[cfg(feature = "eval")]
pub mod doc_examples;
