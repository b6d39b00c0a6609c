use crate::{Formula, Model, ModelError, Value};

/// Build a one-space model whose `total(q)` reads the reference `price`,
/// then evaluate `total(qty)`.
///
/// This helper is intended for documentation examples to avoid repetitive setup.
///
/// # Example
///
/// ```rust
/// # use modelspace::doc_examples::priced_total;
/// let (model, value) = priced_total(4, 3)?;
/// assert_eq!(value, modelspace::Value::Int(12));
/// // total(4) read price
/// assert_eq!(model.edge_count(), 1);
/// # Ok::<(), modelspace::ModelError>(())
/// ```
pub fn priced_total(price: i64, qty: i64) -> Result<(Model, Value), ModelError> {
    let mut model = Model::new("doc");
    let space = model.new_space(None, "Shop")?;
    model.new_ref(space, "price", price, crate::RefMode::Auto)?;
    let total = model.new_cells(
        space,
        "total",
        Formula::new(["q"], |ctx, args| {
            let price = ctx.get("price")?.try_int()?;
            Ok(Value::Int(price * args[0].try_int()?))
        }),
    )?;
    let value = model.call(total, &[Value::Int(qty)])?;
    Ok((model, value))
}
