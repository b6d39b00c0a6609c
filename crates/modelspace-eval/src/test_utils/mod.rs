#![cfg(test)]

pub mod fixtures;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use modelspace_common::{ModelError, Value};

use crate::context::EvalContext;
use crate::formula::{Formula, Param};

/// Shared counter of formula invocations.
#[derive(Debug, Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    /// Wrap `body` so every invocation bumps the counter.
    pub fn formula<P, I, F>(&self, params: I, body: F) -> Formula
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
        F: Fn(&mut EvalContext<'_>, &[Value]) -> Result<Value, ModelError> + Send + Sync + 'static,
    {
        let counter = self.0.clone();
        Formula::new(params, move |ctx: &mut EvalContext<'_>, args: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
            body(ctx, args)
        })
    }
}

/// Integer view of a value, panicking in tests on anything else.
pub fn int(value: &Value) -> i64 {
    value.as_int().unwrap_or_else(|| panic!("expected an int, got {value:?}"))
}
