//! Small models reused across engine tests.

use modelspace_common::{CellId, SpaceId, Value};

use super::Calls;
use crate::engine::Model;
use crate::formula::Formula;

/// `S.x = 1`, `S.y = x + 1`, `S.z = y * 10`, with invocation counting.
pub struct Chain {
    pub model: Model,
    pub space: SpaceId,
    pub x: CellId,
    pub y: CellId,
    pub z: CellId,
    pub calls: Calls,
}

pub fn chain() -> Chain {
    let mut model = Model::new("chain");
    let calls = Calls::new();
    let space = model.new_space(None, "S").unwrap();
    let x = model
        .new_cells(space, "x", calls.formula(Vec::<&str>::new(), |_, _| Ok(Value::Int(1))))
        .unwrap();
    let y = model
        .new_cells(
            space,
            "y",
            calls.formula(Vec::<&str>::new(), |ctx, _| {
                Ok(Value::Int(ctx.get("x")?.try_int()? + 1))
            }),
        )
        .unwrap();
    let z = model
        .new_cells(
            space,
            "z",
            calls.formula(Vec::<&str>::new(), |ctx, _| {
                Ok(Value::Int(ctx.get("y")?.try_int()? * 10))
            }),
        )
        .unwrap();
    Chain {
        model,
        space,
        x,
        y,
        z,
        calls,
    }
}

/// `fib(n)` defined recursively over cached calls.
pub fn fibonacci(model: &mut Model, space: SpaceId) -> CellId {
    model
        .new_cells(
            space,
            "fib",
            Formula::new(["n"], |ctx, args| {
                let n = args[0].try_int()?;
                if n < 2 {
                    return Ok(Value::Int(n));
                }
                let a = ctx.call("fib", &[Value::Int(n - 1)])?.try_int()?;
                let b = ctx.call("fib", &[Value::Int(n - 2)])?.try_int()?;
                Ok(Value::Int(a + b))
            }),
        )
        .unwrap()
}
