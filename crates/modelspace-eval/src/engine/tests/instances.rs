//! Parameterized spaces and instance lifetime.
use modelspace_common::{ErrorKind, SpaceId, Value};
use pretty_assertions::assert_eq;

use crate::engine::{EvalConfig, Model, RefMode};
use crate::formula::{Formula, Param};
use crate::test_utils::{Calls, int};

fn times(name: &'static str, factor: i64) -> Formula {
    Formula::new(Vec::<&str>::new(), move |ctx, _| Ok(Value::Int(int(&ctx.get(name)?) * factor)))
}

/// `P(x)` with `P.double = x * 2`.
fn parameterized() -> (Model, SpaceId) {
    let mut model = Model::new("m");
    let p = model.new_space(None, "P").unwrap();
    model.set_parameters(p, ["x"], None).unwrap();
    model.new_cells(p, "double", times("x", 2)).unwrap();
    (model, p)
}

#[test]
fn test_instance_binds_parameters() {
    let (mut model, p) = parameterized();
    let item = model.call_space(p, &[Value::Int(3)]).unwrap();
    assert!(item.is_anchored());

    let double = model.cells(item.id(), "double").unwrap();
    assert_eq!(model.call(double, &[]).unwrap(), Value::Int(6));
    assert_eq!(model.argvalues(item.id()).unwrap(), Some(vec![Value::Int(3)]));
    assert_eq!(model.qualified_name(item.id()).unwrap(), "P[3]");
    assert!(model.is_dynamic(item.id()).unwrap());
    assert_eq!(model.parameters(p).unwrap(), Some(vec!["x".to_string()]));
}

#[test]
fn test_same_arguments_give_same_instance() {
    let (mut model, p) = parameterized();
    let first = model.call_space(p, &[Value::Int(3)]).unwrap();
    let again = model.call_space_kw(p, &[], &[("x", Value::Int(3))]).unwrap();
    let other = model.call_space(p, &[Value::Int(4)]).unwrap();

    assert_eq!(first.id(), again.id());
    assert_ne!(first.id(), other.id());
    assert_eq!(
        model.instances(p).unwrap(),
        vec![vec![Value::Int(3)], vec![Value::Int(4)]]
    );
}

#[test]
fn test_binder_canonicalizes_arguments() {
    let mut model = Model::new("m");
    let p = model.new_space(None, "P").unwrap();
    let binder = Formula::new(["x"], |_, args| Ok(Value::Int(int(&args[0]).abs())));
    model.set_parameters(p, ["x"], Some(binder)).unwrap();

    let neg = model.call_space(p, &[Value::Int(-3)]).unwrap();
    let pos = model.call_space(p, &[Value::Int(3)]).unwrap();
    assert_eq!(neg.id(), pos.id());
    assert_eq!(model.argvalues(neg.id()).unwrap(), Some(vec![Value::Int(3)]));
}

#[test]
fn test_binder_with_wrong_arity_is_rejected() {
    let mut model = Model::new("m");
    let p = model.new_space(None, "P").unwrap();
    let binder = Formula::new(["x", "y"], |_, _| Ok(Value::Tuple(vec![Value::Int(1)])));
    model.set_parameters(p, ["x", "y"], Some(binder)).unwrap();

    let err = model.call_space(p, &[Value::Int(1), Value::Int(2)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert!(model.instances(p).unwrap().is_empty());
}

#[test]
fn test_parameter_defaults() {
    let mut model = Model::new("m");
    let p = model.new_space(None, "P").unwrap();
    model
        .set_parameters(p, [Param::new("x"), Param::with_default("y", 100)], None)
        .unwrap();
    model
        .new_cells(
            p,
            "sum",
            Formula::new(Vec::<&str>::new(), |ctx, _| {
                Ok(Value::Int(int(&ctx.get("x")?) + int(&ctx.get("y")?)))
            }),
        )
        .unwrap();

    let item = model.call_space(p, &[Value::Int(1)]).unwrap();
    let sum = model.cells(item.id(), "sum").unwrap();
    assert_eq!(model.call(sum, &[]).unwrap(), Value::Int(101));
}

#[test]
fn test_non_parameterized_space_cannot_be_called() {
    let mut model = Model::new("m");
    let s = model.new_space(None, "S").unwrap();
    assert_eq!(
        model.call_space(s, &[Value::Int(1)]).unwrap_err().kind(),
        ErrorKind::InvalidArguments
    );
}

#[test]
fn test_instances_are_read_only() {
    let (mut model, p) = parameterized();
    let item = model.call_space(p, &[Value::Int(1)]).unwrap();
    let err = model.new_cells(item.id(), "extra", Formula::constant(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnlySpace);
    let err = model.set_parameters(item.id(), ["z"], None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnlySpace);
}

#[test]
fn test_children_of_instances_see_parameters() {
    let (mut model, p) = parameterized();
    let child = model.new_space(Some(p), "Child").unwrap();
    model.new_cells(child, "tripled", times("x", 3)).unwrap();

    let item = model.call_space(p, &[Value::Int(5)]).unwrap();
    assert!(model.space_names(item.id()).unwrap().is_empty());

    let dynamic = model.child(item.id(), "Child").unwrap();
    assert_eq!(model.space_names(item.id()).unwrap(), vec!["Child"]);
    assert_eq!(model.qualified_name(dynamic).unwrap(), "P[5].Child");
    let tripled = model.cells(dynamic, "tripled").unwrap();
    assert_eq!(model.call(tripled, &[]).unwrap(), Value::Int(15));
}

#[test]
fn test_nested_parameterized_spaces() {
    let (mut model, p) = parameterized();
    let q = model.new_space(Some(p), "Q").unwrap();
    model.set_parameters(q, ["y"], None).unwrap();
    model
        .new_cells(
            q,
            "sum",
            Formula::new(Vec::<&str>::new(), |ctx, _| {
                Ok(Value::Int(int(&ctx.get("x")?) + int(&ctx.get("y")?)))
            }),
        )
        .unwrap();

    let outer = model.call_space(p, &[Value::Int(10)]).unwrap();
    let q_in_outer = model.child(outer.id(), "Q").unwrap();
    let inner = model.call_space(q_in_outer, &[Value::Int(2)]).unwrap();
    assert_eq!(model.qualified_name(inner.id()).unwrap(), "P[10].Q[2]");

    let sum = model.cells(inner.id(), "sum").unwrap();
    assert_eq!(model.call(sum, &[]).unwrap(), Value::Int(12));
}

#[test]
fn test_unheld_instances_are_reclaimed() {
    let (mut model, p) = parameterized();
    let held = model.call_space(p, &[Value::Int(1)]).unwrap();
    let dropped = model.call_space(p, &[Value::Int(2)]).unwrap();
    let dropped_id = dropped.id();
    drop(dropped);

    assert_eq!(model.reclaim_instances(), 1);
    assert_eq!(model.instances(p).unwrap(), vec![vec![Value::Int(1)]]);
    assert!(!model.contains_space(dropped_id));
    assert!(model.contains_space(held.id()));

    drop(held);
    assert_eq!(model.reclaim_instances(), 1);
    assert!(model.instances(p).unwrap().is_empty());
}

#[test]
fn test_inner_handle_keeps_outer_instance() {
    let (mut model, p) = parameterized();
    let q = model.new_space(Some(p), "Q").unwrap();
    model.set_parameters(q, ["y"], None).unwrap();

    let outer = model.call_space(p, &[Value::Int(1)]).unwrap();
    let q_in_outer = model.child(outer.id(), "Q").unwrap();
    let inner = model.call_space(q_in_outer, &[Value::Int(2)]).unwrap();
    drop(outer);

    assert_eq!(model.reclaim_instances(), 0);
    drop(inner);
    assert_eq!(model.reclaim_instances(), 2);
    assert!(model.instances(p).unwrap().is_empty());
}

#[test]
fn test_instances_read_by_formulas_survive_reclamation() {
    let (mut model, p) = parameterized();
    let calls = Calls::new();
    let host = model.new_space(None, "Host").unwrap();
    let handle = model.handle(p).unwrap();
    model.new_ref(host, "P", handle, RefMode::Absolute).unwrap();
    let total = model
        .new_cells(
            host,
            "total",
            calls.formula(["n"], |ctx, args| {
                let item = ctx.call("P", args)?;
                ctx.get_in(item.try_space()?, "double")
            }),
        )
        .unwrap();

    assert_eq!(model.call(total, &[Value::Int(4)]).unwrap(), Value::Int(8));
    // The formula dropped its handle, but its cached result depends on
    // the instance.
    assert_eq!(model.reclaim_instances(), 0);
    assert_eq!(model.instances(p).unwrap().len(), 1);

    model.clear_cells(total).unwrap();
    assert_eq!(model.reclaim_instances(), 1);
}

#[test]
fn test_definition_change_drops_instances() {
    let (mut model, p) = parameterized();
    let host = model.new_space(None, "Host").unwrap();
    let handle = model.handle(p).unwrap();
    model.new_ref(host, "P", handle, RefMode::Absolute).unwrap();
    let total = model
        .new_cells(
            host,
            "total",
            Formula::new(["n"], |ctx, args| {
                let item = ctx.call("P", args)?;
                ctx.get_in(item.try_space()?, "double")
            }),
        )
        .unwrap();
    assert_eq!(model.call(total, &[Value::Int(4)]).unwrap(), Value::Int(8));

    let double = model.cells(p, "double").unwrap();
    model.set_formula(double, times("x", 10)).unwrap();
    assert!(model.instances(p).unwrap().is_empty());
    assert!(!model.is_cached(total, &[Value::Int(4)]).unwrap());
    assert_eq!(model.call(total, &[Value::Int(4)]).unwrap(), Value::Int(40));
}

#[test]
fn test_explicit_clear_evicts_held_instances() {
    let (mut model, p) = parameterized();
    let held = model.call_space(p, &[Value::Int(7)]).unwrap();

    assert!(model.clear_instance(p, &[Value::Int(7)]).unwrap());
    assert!(!model.clear_instance(p, &[Value::Int(7)]).unwrap());
    assert_eq!(model.qualified_name(held.id()).unwrap_err().kind(), ErrorKind::DeletedObject);

    let _one = model.call_space(p, &[Value::Int(1)]).unwrap();
    let _two = model.call_space(p, &[Value::Int(2)]).unwrap();
    assert_eq!(model.clear_instances(p).unwrap(), 2);
}

#[test]
fn test_reclaim_runs_before_top_level_calls() {
    let (mut model, p) = parameterized();
    drop(model.call_space(p, &[Value::Int(1)]).unwrap());
    assert_eq!(model.instances(p).unwrap().len(), 1);

    drop(model.call_space(p, &[Value::Int(2)]).unwrap());
    assert_eq!(model.instances(p).unwrap(), vec![vec![Value::Int(2)]]);

    let mut keep = Model::with_config(
        "keep",
        EvalConfig {
            reclaim_on_call: false,
            ..EvalConfig::default()
        },
    );
    let q = keep.new_space(None, "Q").unwrap();
    keep.set_parameters(q, ["x"], None).unwrap();
    drop(keep.call_space(q, &[Value::Int(1)]).unwrap());
    drop(keep.call_space(q, &[Value::Int(2)]).unwrap());
    assert_eq!(keep.instances(q).unwrap().len(), 2);
}

#[test]
fn test_parameters_are_inherited() {
    let (mut model, p) = parameterized();
    let sub = model.new_space(None, "Sub").unwrap();
    model.add_base(sub, p).unwrap();
    assert_eq!(model.parameters(sub).unwrap(), Some(vec!["x".to_string()]));

    let item = model.call_space(sub, &[Value::Int(4)]).unwrap();
    let double = model.cells(item.id(), "double").unwrap();
    assert_eq!(model.call(double, &[]).unwrap(), Value::Int(8));

    model.set_parameters(sub, ["x", "y"], None).unwrap();
    model.set_parameters(p, ["z"], None).unwrap();
    assert_eq!(
        model.parameters(sub).unwrap(),
        Some(vec!["x".to_string(), "y".to_string()])
    );
}

#[test]
fn test_argument_order_gives_independent_instances() {
    let mut model = Model::new("m");
    let calls = Calls::new();
    let p = model.new_space(None, "P").unwrap();
    model.set_parameters(p, ["x", "y"], None).unwrap();
    model
        .new_cells(
            p,
            "diff",
            calls.formula(Vec::<&str>::new(), |ctx, _| {
                Ok(Value::Int(int(&ctx.get("x")?) - int(&ctx.get("y")?)))
            }),
        )
        .unwrap();

    let one_two = model.call_space(p, &[Value::Int(1), Value::Int(2)]).unwrap();
    let two_one = model.call_space(p, &[Value::Int(2), Value::Int(1)]).unwrap();
    assert_ne!(one_two.id(), two_one.id());

    let a = model.cells(one_two.id(), "diff").unwrap();
    let b = model.cells(two_one.id(), "diff").unwrap();
    assert_ne!(a, b);
    assert_eq!(model.call(a, &[]).unwrap(), Value::Int(-1));
    assert_eq!(model.call(b, &[]).unwrap(), Value::Int(1));
    assert_eq!(calls.get(), 2);

    assert!(model.clear_instance(p, &[Value::Int(1), Value::Int(2)]).unwrap());
    assert!(!model.contains_space(one_two.id()));
    assert!(model.is_cached(b, &[]).unwrap());
    assert_eq!(model.call(b, &[]).unwrap(), Value::Int(1));
    assert_eq!(calls.get(), 2);
    assert_eq!(
        model.instances(p).unwrap(),
        vec![vec![Value::Int(2), Value::Int(1)]]
    );
}

#[test]
fn test_binder_reads_belong_to_the_calling_formula() {
    let mut model = Model::new("m");
    let p = model.new_space(None, "P").unwrap();
    let offset = model.new_ref(p, "offset", 10, RefMode::Auto).unwrap();
    let binder = Formula::new(["x"], |ctx, args| {
        Ok(Value::Int(int(&args[0]) + int(&ctx.get("offset")?)))
    });
    model.set_parameters(p, ["x"], Some(binder)).unwrap();

    let host = model.new_space(None, "Host").unwrap();
    let handle = model.handle(p).unwrap();
    model.new_ref(host, "P", handle, RefMode::Absolute).unwrap();
    let shifted = model
        .new_cells(
            host,
            "shifted",
            Formula::new(["n"], |ctx, args| {
                let item = ctx.call("P", args)?;
                ctx.get_in(item.try_space()?, "x")
            }),
        )
        .unwrap();

    assert_eq!(model.call(shifted, &[Value::Int(1)]).unwrap(), Value::Int(11));
    model.set_ref(offset, 100).unwrap();
    assert!(!model.is_cached(shifted, &[Value::Int(1)]).unwrap());
    assert_eq!(model.call(shifted, &[Value::Int(1)]).unwrap(), Value::Int(101));
}
