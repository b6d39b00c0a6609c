//! Persistence of model definitions.
//!
//! A [`ModelSnapshot`] captures what the host authored: the static space
//! tree, bases, parameters, cells, references, inputs and globals. Cached
//! results, instances and the dependency graph are not part of it; they are
//! rebuilt on demand after loading.
//!
//! Formula bodies are host code and cannot be serialized. A formula is
//! stored by its source key (see [`Formula::with_source`]) and a
//! [`FormulaLoader`] turns keys back into formulas when a snapshot is
//! rebuilt.

use modelspace_common::{ModelError, Value};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::engine::{EvalConfig, Model, RefMode};
use crate::formula::{Formula, Param};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub name: String,
    #[serde(default)]
    pub config: EvalConfig,
    #[serde(default)]
    pub spaces: Vec<SpaceSnapshot>,
    #[serde(default)]
    pub globals: Vec<RefSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceSnapshot {
    pub name: String,
    /// Created by inheritance rather than by the host.
    #[serde(default)]
    pub derived: bool,
    /// Dotted paths of the explicit bases, in declaration order.
    #[serde(default)]
    pub bases: Vec<String>,
    /// Parameters declared on this space; inherited ones are not stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Param>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binder: Option<FormulaSnapshot>,
    #[serde(default)]
    pub cells: Vec<CellSnapshot>,
    #[serde(default)]
    pub refs: Vec<RefSnapshot>,
    #[serde(default)]
    pub children: Vec<SpaceSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_none: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub name: String,
    /// Derived cells are re-created by inheritance; only their inputs are
    /// restored.
    #[serde(default)]
    pub derived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<FormulaSnapshot>,
    #[serde(default)]
    pub inputs: Vec<InputSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_none: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub args: Vec<Value>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaSnapshot {
    pub source: String,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefSnapshot {
    pub name: String,
    pub value: SnapshotValue,
    #[serde(default)]
    pub mode: RefMode,
}

/// A reference value; spaces are stored by dotted path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotValue {
    Value(Value),
    Space(String),
}

/// Turns stored source keys back into formulas.
pub trait FormulaLoader {
    fn load(&self, source: &str, params: &[Param]) -> Result<Formula, ModelError>;
}

impl<F> FormulaLoader for F
where
    F: Fn(&str, &[Param]) -> Result<Formula, ModelError>,
{
    fn load(&self, source: &str, params: &[Param]) -> Result<Formula, ModelError> {
        (self)(source, params)
    }
}

/// Formulas keyed by source, handed out as clones of one registered value.
#[derive(Debug, Default, Clone)]
pub struct FormulaRegistry {
    formulas: FxHashMap<String, Formula>,
}

impl FormulaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a formula under its source key.
    pub fn register(&mut self, formula: Formula) -> Result<(), ModelError> {
        let Some(source) = formula.source() else {
            return Err(ModelError::Persistence {
                detail: "cannot register a formula without a source key".into(),
            });
        };
        self.formulas.insert(source.to_string(), formula);
        Ok(())
    }

    pub fn with(mut self, formula: Formula) -> Result<Self, ModelError> {
        self.register(formula)?;
        Ok(self)
    }

    pub fn get(&self, source: &str) -> Option<&Formula> {
        self.formulas.get(source)
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}

impl FormulaLoader for FormulaRegistry {
    fn load(&self, source: &str, params: &[Param]) -> Result<Formula, ModelError> {
        let formula = self.get(source).ok_or_else(|| ModelError::Persistence {
            detail: format!("no formula registered for `{source}`"),
        })?;
        if formula.params() != params {
            return Err(ModelError::Persistence {
                detail: format!("parameters of `{source}` do not match the stored ones"),
            });
        }
        Ok(formula.clone())
    }
}

impl ModelSnapshot {
    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(persistence)
    }

    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        serde_json::from_str(text).map_err(persistence)
    }
}

impl Model {
    /// Serialize the model definitions to JSON.
    pub fn to_json(&self) -> Result<String, ModelError> {
        self.snapshot()?.to_json()
    }

    /// Build a model from JSON written by [`Model::to_json`].
    pub fn from_json(text: &str, loader: &dyn FormulaLoader) -> Result<Model, ModelError> {
        Model::rebuild(&ModelSnapshot::from_json(text)?, loader)
    }
}

fn persistence(err: serde_json::Error) -> ModelError {
    ModelError::Persistence {
        detail: err.to_string(),
    }
}
