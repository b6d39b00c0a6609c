//! Derivation of members from base spaces.
use modelspace_common::{ErrorKind, SpaceId, Value};
use pretty_assertions::assert_eq;

use crate::engine::{Model, RefMode};
use crate::formula::Formula;
use crate::test_utils::int;

fn reads(name: &'static str, plus: i64) -> Formula {
    Formula::new(Vec::<&str>::new(), move |ctx, _| Ok(Value::Int(int(&ctx.get(name)?) + plus)))
}

/// `Base.a = b + 1`, `Base.b = 10`; `Sub` inherits from `Base`.
fn base_and_sub() -> (Model, SpaceId, SpaceId) {
    let mut model = Model::new("m");
    let base = model.new_space(None, "Base").unwrap();
    let sub = model.new_space(None, "Sub").unwrap();
    model.new_cells(base, "a", reads("b", 1)).unwrap();
    model.new_cells(base, "b", Formula::constant(10)).unwrap();
    model.add_base(sub, base).unwrap();
    (model, base, sub)
}

#[test]
fn test_sub_space_mirrors_base_cells() {
    let (mut model, _, sub) = base_and_sub();

    assert_eq!(model.cell_names(sub).unwrap(), vec!["a", "b"]);
    let a = model.cells(sub, "a").unwrap();
    assert!(model.is_derived(a).unwrap());
    assert_eq!(model.call(a, &[]).unwrap(), Value::Int(11));
}

#[test]
fn test_override_is_seen_by_inherited_formulas() {
    let (mut model, base, sub) = base_and_sub();
    let b = model.new_cells(sub, "b", Formula::constant(100)).unwrap();
    assert!(!model.is_derived(b).unwrap());

    let sub_a = model.cells(sub, "a").unwrap();
    let base_a = model.cells(base, "a").unwrap();
    assert_eq!(model.call(sub_a, &[]).unwrap(), Value::Int(101));
    assert_eq!(model.call(base_a, &[]).unwrap(), Value::Int(11));

    // Reverting drops the override and mirrors the base again.
    model.revert_cells(b).unwrap();
    assert!(model.is_derived(b).unwrap());
    assert_eq!(model.call(sub_a, &[]).unwrap(), Value::Int(11));
}

#[test]
fn test_base_changes_propagate() {
    let (mut model, base, sub) = base_and_sub();
    let sub_a = model.cells(sub, "a").unwrap();
    assert_eq!(model.call(sub_a, &[]).unwrap(), Value::Int(11));

    let base_b = model.cells(base, "b").unwrap();
    let summary = model.set_formula(base_b, Formula::constant(20)).unwrap();
    assert_eq!(summary.updated, 1);
    assert!(!model.is_cached(sub_a, &[]).unwrap());
    assert_eq!(model.call(sub_a, &[]).unwrap(), Value::Int(21));

    model.new_cells(base, "c", Formula::constant(0)).unwrap();
    assert!(model.cells(sub, "c").is_ok());

    let base_c = model.cells(base, "c").unwrap();
    model.del_cells(base_c).unwrap();
    assert_eq!(model.cells(sub, "c").unwrap_err().kind(), ErrorKind::NameNotFound);
}

#[test]
fn test_derived_members_cannot_be_deleted() {
    let (mut model, _, sub) = base_and_sub();
    let a = model.cells(sub, "a").unwrap();
    assert_eq!(model.del_cells(a).unwrap_err().kind(), ErrorKind::DerivedMember);
}

#[test]
fn test_deleting_override_rederives() {
    let (mut model, _, sub) = base_and_sub();
    let b = model.new_cells(sub, "b", Formula::constant(100)).unwrap();
    model.del_cells(b).unwrap();

    let b = model.cells(sub, "b").unwrap();
    assert!(model.is_derived(b).unwrap());
    assert_eq!(model.call(b, &[]).unwrap(), Value::Int(10));
}

#[test]
fn test_first_base_wins() {
    let mut model = Model::new("m");
    let first = model.new_space(None, "First").unwrap();
    let second = model.new_space(None, "Second").unwrap();
    let sub = model.new_space(None, "Sub").unwrap();
    model.new_cells(first, "x", Formula::constant(1)).unwrap();
    model.new_cells(second, "x", Formula::constant(2)).unwrap();
    model.new_cells(second, "y", Formula::constant(3)).unwrap();

    model.add_base(sub, first).unwrap();
    model.add_base(sub, second).unwrap();
    assert_eq!(model.bases(sub).unwrap(), vec![first, second]);
    let x = model.cells(sub, "x").unwrap();
    assert_eq!(model.call(x, &[]).unwrap(), Value::Int(1));
    assert!(model.cells(sub, "y").is_ok());

    model.remove_base(sub, first).unwrap();
    assert_eq!(model.call(x, &[]).unwrap(), Value::Int(2));
    assert_eq!(
        model.remove_base(sub, first).unwrap_err().kind(),
        ErrorKind::InvalidArguments
    );
}

#[test]
fn test_kind_conflict_rolls_back() {
    let mut model = Model::new("m");
    let cells_base = model.new_space(None, "CellsBase").unwrap();
    let space_base = model.new_space(None, "SpaceBase").unwrap();
    let sub = model.new_space(None, "Sub").unwrap();
    model.new_cells(cells_base, "x", Formula::constant(1)).unwrap();
    model.new_space(Some(space_base), "x").unwrap();

    model.add_base(sub, cells_base).unwrap();
    let err = model.add_base(sub, space_base).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InheritanceConflict);

    assert_eq!(model.bases(sub).unwrap(), vec![cells_base]);
    assert!(model.space_names(sub).unwrap().is_empty());
    let x = model.cells(sub, "x").unwrap();
    assert_eq!(model.call(x, &[]).unwrap(), Value::Int(1));
}

#[test]
fn test_inheritance_cycles_are_rejected() {
    let (mut model, base, sub) = base_and_sub();
    assert_eq!(model.add_base(base, sub).unwrap_err().kind(), ErrorKind::CyclicInheritance);
    assert_eq!(model.add_base(sub, sub).unwrap_err().kind(), ErrorKind::CyclicInheritance);

    let child = model.new_space(Some(base), "Child").unwrap();
    assert_eq!(model.add_base(base, child).unwrap_err().kind(), ErrorKind::CyclicInheritance);
    assert_eq!(model.add_base(child, base).unwrap_err().kind(), ErrorKind::CyclicInheritance);
    assert!(model.bases(base).unwrap().is_empty());
}

#[test]
fn test_child_spaces_are_derived() {
    let (mut model, base, sub) = base_and_sub();
    let base_child = model.new_space(Some(base), "Child").unwrap();
    model.new_cells(base_child, "c", Formula::constant(5)).unwrap();

    let sub_child = model.child(sub, "Child").unwrap();
    assert!(model.is_derived_space(sub_child).unwrap());
    assert_eq!(model.qualified_name(sub_child).unwrap(), "Sub.Child");
    let c = model.cells(sub_child, "c").unwrap();
    assert_eq!(model.call(c, &[]).unwrap(), Value::Int(5));

    // Members added to the base child reach the derived one.
    model.new_cells(base_child, "d", Formula::constant(6)).unwrap();
    assert!(model.cells(sub_child, "d").is_ok());

    // Defining the child in the sub space keeps its identity but makes it
    // authored, still inheriting from the base child.
    assert_eq!(model.new_space(Some(sub), "Child").unwrap(), sub_child);
    assert!(!model.is_derived_space(sub_child).unwrap());
    assert!(model.cells(sub_child, "d").is_ok());

    // Deleting the base child takes the derived content of the sub child.
    model.del_space(base_child).unwrap();
    assert!(model.contains_space(sub_child));
    assert!(model.cell_names(sub_child).unwrap().is_empty());
}

#[test]
fn test_derived_child_is_removed_with_base_child() {
    let (mut model, base, sub) = base_and_sub();
    let base_child = model.new_space(Some(base), "Child").unwrap();
    let sub_child = model.child(sub, "Child").unwrap();

    model.del_space(base_child).unwrap();
    assert!(!model.contains_space(sub_child));
    assert_eq!(model.child(sub, "Child").unwrap_err().kind(), ErrorKind::NameNotFound);
}

#[test]
fn test_multi_level_inheritance() {
    let (mut model, base, sub) = base_and_sub();
    let leaf = model.new_space(None, "Leaf").unwrap();
    model.add_base(leaf, sub).unwrap();
    model.new_cells(sub, "b", Formula::constant(50)).unwrap();

    let leaf_a = model.cells(leaf, "a").unwrap();
    assert_eq!(model.call(leaf_a, &[]).unwrap(), Value::Int(51));

    let base_b = model.cells(base, "b").unwrap();
    model.set_formula(base_b, Formula::constant(0)).unwrap();
    assert_eq!(model.call(leaf_a, &[]).unwrap(), Value::Int(51));
}

#[test]
fn test_relative_reference_follows_derived_space() {
    let mut model = Model::new("m");
    let base = model.new_space(None, "Base").unwrap();
    let data = model.new_space(Some(base), "Data").unwrap();
    model.new_cells(data, "v", Formula::constant(1)).unwrap();
    let handle = model.handle(data).unwrap();
    model.new_ref(base, "rel", handle.clone(), RefMode::Auto).unwrap();
    model.new_ref(base, "abs", handle, RefMode::Absolute).unwrap();
    for (name, target) in [("via_rel", "rel"), ("via_abs", "abs")] {
        model
            .new_cells(
                base,
                name,
                Formula::new(Vec::<&str>::new(), move |ctx, _| {
                    let space = ctx.get(target)?;
                    ctx.get_in(space.try_space()?, "v")
                }),
            )
            .unwrap();
    }

    let sub = model.new_space(None, "Sub").unwrap();
    model.add_base(sub, base).unwrap();
    let sub_data = model.child(sub, "Data").unwrap();
    model.new_cells(sub_data, "v", Formula::constant(2)).unwrap();

    let via_rel = model.cells(sub, "via_rel").unwrap();
    let via_abs = model.cells(sub, "via_abs").unwrap();
    assert_eq!(model.call(via_rel, &[]).unwrap(), Value::Int(2));
    assert_eq!(model.call(via_abs, &[]).unwrap(), Value::Int(1));

    let base_rel = model.cells(base, "via_rel").unwrap();
    assert_eq!(model.call(base_rel, &[]).unwrap(), Value::Int(1));
}

#[test]
fn test_summary_counts_derived_members() {
    let mut model = Model::new("m");
    let base = model.new_space(None, "Base").unwrap();
    model.new_cells(base, "a", Formula::constant(1)).unwrap();
    model.new_cells(base, "b", Formula::constant(2)).unwrap();
    model.new_ref(base, "r", 3, RefMode::Auto).unwrap();
    let sub = model.new_space(None, "Sub").unwrap();

    let summary = model.add_base(sub, base).unwrap();
    assert_eq!(summary.created, 3);
    assert_eq!(summary.removed, 0);
    assert!(model.add_base(sub, base).unwrap().is_noop());

    let summary = model.remove_base(sub, base).unwrap();
    assert_eq!(summary.removed, 3);
    assert!(model.cell_names(sub).unwrap().is_empty());
}

#[test]
fn test_conflicting_member_is_taken_back() {
    let mut model = Model::new("m");
    let b1 = model.new_space(None, "B1").unwrap();
    let b2 = model.new_space(None, "B2").unwrap();
    let sub = model.new_space(None, "Sub").unwrap();
    model.new_cells(b1, "x", Formula::constant(1)).unwrap();
    model.new_space(Some(b1), "Child").unwrap();
    model.add_base(sub, b1).unwrap();
    model.add_base(sub, b2).unwrap();

    let err = model.new_space(Some(b2), "x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InheritanceConflict);
    let err = model.new_cells(b2, "Child", Formula::constant(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InheritanceConflict);
    let err = model.new_ref(b2, "Child", 3, RefMode::Auto).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InheritanceConflict);

    assert!(model.space_names(b2).unwrap().is_empty());
    assert!(model.cell_names(b2).unwrap().is_empty());
    assert!(model.ref_names(b2).unwrap().is_empty());
    assert_eq!(model.space_names(sub).unwrap(), vec!["Child"]);

    // Later edits of the bases go through as usual.
    model.new_cells(b1, "y", Formula::constant(5)).unwrap();
    assert_eq!(model.cell_names(sub).unwrap(), vec!["x", "y"]);
    let y = model.cells(sub, "y").unwrap();
    assert_eq!(model.call(y, &[]).unwrap(), Value::Int(5));
    model.new_cells(b2, "z", Formula::constant(6)).unwrap();
    assert_eq!(model.cell_names(sub).unwrap(), vec!["x", "y", "z"]);
}
