pub mod context;
pub mod engine;
pub mod formula;
pub mod shared;
pub mod snapshot;

pub use context::EvalContext;
pub use engine::{DerivationSummary, EvalConfig, Model, NodeInfo, RefMode};
pub use formula::{Formula, FormulaBody, Param};
pub use shared::SharedModel;
pub use snapshot::{FormulaLoader, FormulaRegistry, ModelSnapshot};

#[cfg(test)]
pub mod test_utils;

pub mod telemetry;
