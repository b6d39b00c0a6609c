//! Circular references, recursion depth and error traces.
use modelspace_common::{ErrorKind, ModelError, Value};
use pretty_assertions::assert_eq;

use crate::engine::{EvalConfig, Model};
use crate::formula::Formula;

fn reads(name: &'static str) -> Formula {
    Formula::new(Vec::<&str>::new(), move |ctx, _| ctx.get(name))
}

#[test]
fn test_two_node_cycle_detection() {
    let mut model = Model::new("m");
    let space = model.new_space(None, "S").unwrap();
    let a = model.new_cells(space, "a", reads("b")).unwrap();
    let b = model.new_cells(space, "b", reads("a")).unwrap();

    let err = model.call(a, &[]).unwrap_err();
    assert_eq!(
        err,
        ModelError::CircularReference {
            cycle: vec!["S.a()".to_string(), "S.b()".to_string()],
        }
    );
    assert!(!model.is_cached(a, &[]).unwrap());
    assert!(!model.is_cached(b, &[]).unwrap());
    assert_eq!(model.edge_count(), 0);
}

#[test]
fn test_cycle_through_arguments() {
    let mut model = Model::new("m");
    let space = model.new_space(None, "S").unwrap();
    // f(n) reads f(n + 1) up to 3, which reads f(1) again.
    let f = model
        .new_cells(
            space,
            "f",
            Formula::new(["n"], |ctx, args| {
                let n = args[0].try_int()?;
                let next = if n >= 3 { 1 } else { n + 1 };
                ctx.call("f", &[Value::Int(next)])
            }),
        )
        .unwrap();

    let err = model.call(f, &[Value::Int(1)]).unwrap_err();
    let ModelError::CircularReference { cycle } = err else {
        panic!("expected a circular reference, got {err:?}");
    };
    assert_eq!(cycle, vec!["S.f(1)", "S.f(2)", "S.f(3)"]);
}

#[test]
fn test_model_usable_after_cycle() {
    let mut model = Model::new("m");
    let space = model.new_space(None, "S").unwrap();
    let a = model.new_cells(space, "a", reads("b")).unwrap();
    let b = model.new_cells(space, "b", reads("a")).unwrap();
    assert!(model.call(a, &[]).is_err());

    model.set_formula(b, Formula::constant(5)).unwrap();
    assert_eq!(model.call(a, &[]).unwrap(), Value::Int(5));
}

#[test]
fn test_deep_reference_limit() {
    let mut model = Model::with_config(
        "m",
        EvalConfig {
            max_depth: 50,
            ..EvalConfig::default()
        },
    );
    let space = model.new_space(None, "S").unwrap();
    let count = model
        .new_cells(
            space,
            "count",
            Formula::new(["n"], |ctx, args| {
                let n = args[0].try_int()?;
                if n == 0 {
                    return Ok(Value::Int(0));
                }
                Ok(Value::Int(ctx.call("count", &[Value::Int(n - 1)])?.try_int()? + 1))
            }),
        )
        .unwrap();

    let err = model.call(count, &[Value::Int(100)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeepReference);
    assert!(model.cached_args(count).unwrap().is_empty());

    assert_eq!(model.call(count, &[Value::Int(40)]).unwrap(), Value::Int(40));
    // Deep chains can be built up from cached intermediate results.
    assert_eq!(model.call(count, &[Value::Int(80)]).unwrap(), Value::Int(80));
}

#[test]
fn test_formula_error_carries_trace() {
    let mut model = Model::new("m");
    let space = model.new_space(None, "S").unwrap();
    let top = model
        .new_cells(space, "top", Formula::new(["x"], |ctx, args| ctx.call("mid", args)))
        .unwrap();
    model
        .new_cells(space, "mid", Formula::new(["x"], |ctx, args| ctx.call("bad", args)))
        .unwrap();
    model
        .new_cells(
            space,
            "bad",
            Formula::new(["x"], |_, args| {
                Err(ModelError::raised(format!("cannot handle {}", args[0])))
            }),
        )
        .unwrap();

    let err = model.call(top, &[Value::Int(7)]).unwrap_err();
    let ModelError::FormulaExecution { cause, trace } = &err else {
        panic!("expected a formula error, got {err:?}");
    };
    assert_eq!(**cause, ModelError::raised("cannot handle 7"));
    assert_eq!(trace, &vec!["S.top(7)", "S.mid(7)", "S.bad(7)"]);
    assert_eq!(err.root_cause().kind(), ErrorKind::Raised);

    let rendered = err.to_string();
    assert!(rendered.contains("0: S.top(7)"));
    assert!(rendered.contains("2: S.bad(7)"));
}

#[test]
fn test_unknown_name_is_wrapped_with_trace() {
    let mut model = Model::new("m");
    let space = model.new_space(None, "S").unwrap();
    let a = model.new_cells(space, "a", reads("nowhere")).unwrap();

    let err = model.call(a, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormulaExecution);
    assert_eq!(err.root_cause().kind(), ErrorKind::NameNotFound);
}
