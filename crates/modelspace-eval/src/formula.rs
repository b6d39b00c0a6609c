//! Formula wrapper: declared parameters plus an opaque body.
//!
//! Formula bodies are authored by the host. The engine only relies on the
//! declared parameter list (used to bind call arguments into the canonical
//! argument tuple) and on `invoke`.

use std::fmt;
use std::sync::Arc;

use modelspace_common::{ModelError, Value};
use serde::{Deserialize, Serialize};

use crate::context::EvalContext;

/// A declared formula parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

impl From<&str> for Param {
    fn from(name: &str) -> Self {
        Param::new(name)
    }
}

impl From<String> for Param {
    fn from(name: String) -> Self {
        Param::new(name)
    }
}

/// The callable part of a formula.
///
/// Implemented for every closure of the right shape; implement it by hand
/// for bodies that carry their own state.
pub trait FormulaBody: Send + Sync {
    fn invoke(&self, ctx: &mut EvalContext<'_>, args: &[Value]) -> Result<Value, ModelError>;
}

impl<F> FormulaBody for F
where
    F: Fn(&mut EvalContext<'_>, &[Value]) -> Result<Value, ModelError> + Send + Sync,
{
    fn invoke(&self, ctx: &mut EvalContext<'_>, args: &[Value]) -> Result<Value, ModelError> {
        (self)(ctx, args)
    }
}

/// Parameters + body + optional source key.
///
/// Cloning is cheap and two clones are the *same* formula; formulas built
/// separately are different even when their bodies behave identically.
#[derive(Clone)]
pub struct Formula {
    params: Arc<[Param]>,
    body: Arc<dyn FormulaBody>,
    source: Option<Arc<str>>,
}

impl Formula {
    pub fn new<P, I, F>(params: I, body: F) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
        F: Fn(&mut EvalContext<'_>, &[Value]) -> Result<Value, ModelError> + Send + Sync + 'static,
    {
        Self::from_body(params, Arc::new(body))
    }

    pub fn from_body<P, I>(params: I, body: Arc<dyn FormulaBody>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            body,
            source: None,
        }
    }

    /// A parameterless formula that always returns `value`.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(Vec::<Param>::new(), move |_, _| Ok(value.clone()))
    }

    /// Attach the key under which persistence stores this formula.
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn invoke(&self, ctx: &mut EvalContext<'_>, args: &[Value]) -> Result<Value, ModelError> {
        self.body.invoke(ctx, args)
    }

    pub fn same_as(&self, other: &Formula) -> bool {
        Arc::ptr_eq(&self.body, &other.body) && Arc::ptr_eq(&self.params, &other.params)
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("params", &self.parameter_names().collect::<Vec<_>>())
            .field("source", &self.source)
            .finish()
    }
}

/// Bind positional and keyword arguments to `params`, filling defaults.
///
/// The result is the canonical positional tuple: keyword order never
/// matters.
pub fn bind_arguments(
    params: &[Param],
    args: &[Value],
    kwargs: &[(&str, Value)],
    target: impl Fn() -> String,
) -> Result<Vec<Value>, ModelError> {
    let invalid = |detail: String| ModelError::InvalidArguments {
        target: target(),
        detail,
    };

    if args.len() > params.len() {
        return Err(invalid(format!(
            "takes {} positional arguments but {} were given",
            params.len(),
            args.len()
        )));
    }

    let mut slots: Vec<Option<Value>> = args.iter().cloned().map(Some).collect();
    slots.resize(params.len(), None);

    for (name, value) in kwargs {
        let Some(pos) = params.iter().position(|p| p.name == *name) else {
            return Err(invalid(format!("unexpected keyword argument '{name}'")));
        };
        if slots[pos].is_some() {
            return Err(invalid(format!("got multiple values for argument '{name}'")));
        }
        slots[pos] = Some(value.clone());
    }

    slots
        .into_iter()
        .zip(params)
        .map(|(slot, param)| {
            slot.or_else(|| param.default.clone())
                .ok_or_else(|| invalid(format!("missing required argument '{}'", param.name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<Param> {
        vec![Param::new("x"), Param::new("y"), Param::with_default("z", 10)]
    }

    #[test]
    fn keyword_order_does_not_change_binding() {
        let a = bind_arguments(
            &params(),
            &[],
            &[("y", Value::Int(2)), ("x", Value::Int(1))],
            || "f".into(),
        )
        .unwrap();
        let b = bind_arguments(&params(), &[Value::Int(1), Value::Int(2)], &[], || "f".into())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, vec![Value::Int(1), Value::Int(2), Value::Int(10)]);
    }

    #[test]
    fn binding_rejects_bad_calls() {
        let p = params();
        let too_many = vec![Value::Int(0); 4];
        for (args, kwargs) in [
            (too_many.as_slice(), &[][..]),
            (&[Value::Int(1)][..], &[][..]),
            (&[Value::Int(1)][..], &[("x", Value::Int(1))][..]),
            (&[Value::Int(1)][..], &[("w", Value::Int(1))][..]),
        ] {
            let err = bind_arguments(&p, args, kwargs, || "f".into()).unwrap_err();
            assert_eq!(err.kind(), modelspace_common::ErrorKind::InvalidArguments);
        }
    }

    #[test]
    fn clones_are_the_same_formula() {
        let f = Formula::constant(1);
        let g = f.clone();
        assert!(f.same_as(&g));
        assert!(!f.same_as(&Formula::constant(1)));
    }
}
