use std::any::Any;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::{ModelError, SpaceRef};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An arbitrary host value bound by a reference.
///
/// Opaque values compare by identity and can never be used as call
/// arguments: there is no value form to normalize them into.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<opaque@{:p}>", Arc::as_ptr(&self.0))
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A value produced by a formula, bound by a reference, or passed as an
/// argument.
///
/// `Empty` is the absence sentinel: a formula returning it is subject to the
/// none policy of its cells.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub enum Value {
    Empty,
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
    Tuple(Vec<Value>),
    /// Sequence without key semantics; normalized to `Tuple` when used as an
    /// argument.
    List(Vec<Value>),
    #[cfg_attr(feature = "serde", serde(skip))]
    Space(SpaceRef),
    #[cfg_attr(feature = "serde", serde(skip))]
    Opaque(Opaque),
}

/// Bit pattern used for float equality and hashing: `-0.0` folds into `0.0`
/// and every NaN into one canonical NaN.
fn canonical_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Empty, Empty) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Number(a), Number(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Text(a), Text(b)) => a == b,
            (Tuple(a), Tuple(b)) | (List(a), List(b)) => a == b,
            (Space(a), Space(b)) => a == b,
            (Opaque(a), Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Empty => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Number(n) => canonical_bits(*n).hash(state),
            Value::Text(s) => s.hash(state),
            Value::Tuple(items) | Value::List(items) => items.hash(state),
            Value::Space(space) => space.hash(state),
            Value::Opaque(o) => (Arc::as_ptr(&o.0) as *const () as usize).hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n:?}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::List(items) => {
                write!(f, "[")?;
                write_items(f, items)?;
                write!(f, "]")
            }
            Value::Space(space) => write!(f, "<space {:?}>", space.id()),
            Value::Opaque(o) => write!(f, "{o:?}"),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_space(&self) -> Option<&SpaceRef> {
        match self {
            Value::Space(space) => Some(space),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) | Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Integer view for formula bodies; raises a formula failure otherwise.
    pub fn try_int(&self) -> Result<i64, ModelError> {
        self.as_int()
            .ok_or_else(|| ModelError::raised(format!("expected an integer, got {self}")))
    }

    /// Numeric view for formula bodies; raises a formula failure otherwise.
    pub fn try_number(&self) -> Result<f64, ModelError> {
        self.as_number()
            .ok_or_else(|| ModelError::raised(format!("expected a number, got {self}")))
    }

    pub fn try_space(&self) -> Result<&SpaceRef, ModelError> {
        self.as_space()
            .ok_or_else(|| ModelError::raised(format!("expected a space, got {self}")))
    }

    /// True when the value (recursively) has a hashable key form.
    pub fn is_hashable(&self) -> bool {
        match self {
            Value::Opaque(_) => false,
            Value::Tuple(items) | Value::List(items) => items.iter().all(Value::is_hashable),
            _ => true,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<SpaceRef> for Value {
    fn from(v: SpaceRef) -> Self {
        Value::Space(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Tuple(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Empty, Into::into)
    }
}
