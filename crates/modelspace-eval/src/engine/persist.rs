//! Capturing and rebuilding model definitions.

use modelspace_common::{ModelError, SpaceId, Value};

use super::model::Model;
use super::space::{SpaceKind, join_values};
use crate::formula::Formula;
use crate::snapshot::{
    CellSnapshot, FormulaLoader, FormulaSnapshot, InputSnapshot, ModelSnapshot, RefSnapshot,
    SnapshotValue, SpaceSnapshot,
};

fn persistence(detail: String) -> ModelError {
    ModelError::Persistence { detail }
}

/// Spaces and opaque host values cannot be written out, except for a
/// reference bound directly to a static space.
fn storable(value: &Value) -> bool {
    match value {
        Value::Space(_) | Value::Opaque(_) => false,
        Value::Tuple(items) | Value::List(items) => items.iter().all(storable),
        _ => true,
    }
}

impl Model {
    /// Capture the authored definitions of the model.
    ///
    /// Fails when a formula carries no source key, or when a reference or
    /// input holds a value that has no stored form.
    pub fn snapshot(&self) -> Result<ModelSnapshot, ModelError> {
        let mut spaces = Vec::with_capacity(self.roots.len());
        for root in self.roots.values() {
            spaces.push(self.snapshot_space(*root)?);
        }
        let mut globals = Vec::with_capacity(self.globals.len());
        for (name, id) in &self.globals {
            let data = self.reference(*id)?;
            globals.push(RefSnapshot {
                name: name.clone(),
                value: self.snapshot_value(&data.value, name)?,
                mode: data.mode,
            });
        }
        Ok(ModelSnapshot {
            name: self.name.clone(),
            config: self.config.clone(),
            spaces,
            globals,
        })
    }

    fn snapshot_formula(&self, formula: &Formula, owner: &str) -> Result<FormulaSnapshot, ModelError> {
        let source = formula
            .source()
            .ok_or_else(|| persistence(format!("formula of {owner} has no source key")))?;
        Ok(FormulaSnapshot {
            source: source.to_string(),
            params: formula.params().to_vec(),
        })
    }

    fn snapshot_value(&self, value: &Value, owner: &str) -> Result<SnapshotValue, ModelError> {
        if let Value::Space(target) = value {
            let data = self.space(target.id())?;
            if !data.is_static() {
                return Err(persistence(format!(
                    "{owner} is bound to the instance space {}",
                    self.full_name(target.id())
                )));
            }
            return Ok(SnapshotValue::Space(self.full_name(target.id())));
        }
        if !storable(value) {
            return Err(persistence(format!("value of {owner} cannot be stored")));
        }
        Ok(SnapshotValue::Value(value.clone()))
    }

    fn snapshot_space(&self, id: SpaceId) -> Result<SpaceSnapshot, ModelError> {
        let data = self.space(id)?;
        let path = self.full_name(id);

        let (params, binder) = match &data.params {
            Some(spec) if data.params_local => (
                Some(spec.params.clone()),
                spec.binder
                    .as_ref()
                    .map(|b| self.snapshot_formula(b, &path))
                    .transpose()?,
            ),
            _ => (None, None),
        };

        let mut cells = Vec::with_capacity(data.cells.len());
        for cid in data.cells.values() {
            let cell = self.cell(*cid)?;
            let label = self.cell_label(*cid);
            let formula = match (&cell.formula, cell.derived) {
                (Some(f), false) => Some(self.snapshot_formula(f, &label)?),
                _ => None,
            };
            let mut inputs = Vec::new();
            for (args, value) in cell.cache.inputs() {
                if !storable(value) || !args.iter().all(storable) {
                    return Err(persistence(format!("an input of {label} cannot be stored")));
                }
                inputs.push(InputSnapshot {
                    args: args.to_vec(),
                    value: value.clone(),
                });
            }
            inputs.sort_by_key(|i| join_values(&i.args));
            if cell.derived && inputs.is_empty() {
                continue;
            }
            cells.push(CellSnapshot {
                name: cell.name.clone(),
                derived: cell.derived,
                formula,
                inputs,
                allow_none: if cell.derived { None } else { cell.allow_none },
            });
        }

        let mut refs = Vec::new();
        for rid in data.refs.values() {
            let r = self.reference(*rid)?;
            if r.derived {
                continue;
            }
            refs.push(RefSnapshot {
                name: r.name.clone(),
                value: self.snapshot_value(&r.value, &format!("{path}.{}", r.name))?,
                mode: r.mode,
            });
        }

        let mut children = Vec::with_capacity(data.spaces.len());
        for child in data.spaces.values() {
            children.push(self.snapshot_space(*child)?);
        }

        Ok(SpaceSnapshot {
            name: data.name.clone(),
            derived: data.is_derived(),
            bases: self.bases(id)?.into_iter().map(|b| self.full_name(b)).collect(),
            params,
            binder,
            cells,
            refs,
            children,
            allow_none: data.allow_none,
            doc: data.doc.clone(),
        })
    }

    /// Rebuild a model from a snapshot.
    ///
    /// Spaces are created first, then bases are linked so inheritance can
    /// run, then members are defined. Derived spaces are created as authored
    /// ones and flagged back at the end.
    pub fn rebuild(snapshot: &ModelSnapshot, loader: &dyn FormulaLoader) -> Result<Model, ModelError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("rebuild", model = %snapshot.name).entered();

        let mut model = Model::with_config(snapshot.name.clone(), snapshot.config.clone());

        let mut order: Vec<(Option<String>, &SpaceSnapshot)> = Vec::new();
        let mut stack: Vec<(Option<String>, &SpaceSnapshot)> =
            snapshot.spaces.iter().rev().map(|s| (None, s)).collect();
        while let Some((parent, space)) = stack.pop() {
            let path = match &parent {
                Some(p) => format!("{p}.{}", space.name),
                None => space.name.clone(),
            };
            for child in space.children.iter().rev() {
                stack.push((Some(path.clone()), child));
            }
            order.push((parent, space));
        }

        let mut ids: Vec<SpaceId> = Vec::with_capacity(order.len());
        for (parent, space) in &order {
            let parent = parent.as_deref().map(|p| model.space_by_path(p)).transpose()?;
            ids.push(model.new_space(parent, &space.name)?);
        }

        for (id, (_, space)) in ids.iter().zip(&order) {
            for base in &space.bases {
                let base = model.space_by_path(base)?;
                model.add_base(*id, base)?;
            }
            if let Some(params) = &space.params {
                let binder = space
                    .binder
                    .as_ref()
                    .map(|b| loader.load(&b.source, &b.params))
                    .transpose()?;
                model.set_parameters(*id, params.iter().cloned(), binder)?;
            }
        }

        for (id, (_, space)) in ids.iter().zip(&order) {
            for r in &space.refs {
                let value = model.restore_value(&r.value)?;
                model.new_ref(*id, &r.name, value, r.mode)?;
            }
            for cell in space.cells.iter().filter(|c| !c.derived) {
                let formula = cell
                    .formula
                    .as_ref()
                    .map(|f| loader.load(&f.source, &f.params))
                    .transpose()?;
                let cid = model.new_cells(*id, &cell.name, formula)?;
                if cell.allow_none.is_some() {
                    model.set_cells_allow_none(cid, cell.allow_none)?;
                }
            }
            if space.allow_none.is_some() {
                model.set_space_allow_none(*id, space.allow_none)?;
            }
            if space.doc.is_some() {
                model.set_doc(*id, space.doc.clone())?;
            }
        }

        for (id, (_, space)) in ids.iter().zip(&order) {
            if space.derived
                && let SpaceKind::Static { derived, .. } = &mut model.space_mut(*id)?.kind
            {
                *derived = true;
            }
        }

        for (id, (_, space)) in ids.iter().zip(&order) {
            for cell in &space.cells {
                let cid = model.cells(*id, &cell.name)?;
                for input in &cell.inputs {
                    model.set_input(cid, &input.args, input.value.clone())?;
                }
            }
        }

        for global in &snapshot.globals {
            let value = model.restore_value(&global.value)?;
            model.new_global(&global.name, value)?;
        }
        Ok(model)
    }

    fn restore_value(&self, value: &SnapshotValue) -> Result<Value, ModelError> {
        Ok(match value {
            SnapshotValue::Value(v) => v.clone(),
            SnapshotValue::Space(path) => Value::Space(self.space_ref(self.space_by_path(path)?)?),
        })
    }
}
