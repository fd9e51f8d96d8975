//! Dynamic operand values and the ordered-value capability
//!
//! Query operands are stored as `Value` and cast to the field's concrete
//! type when evaluated. A failed cast is a comparator error, never a panic.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{ValueError, ValueResult};

/// A dynamically typed operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Ordered-value capability shared by every comparable field type.
///
/// One generic comparator is parameterized over this trait instead of
/// one comparator per primitive type.
pub trait ScalarValue: Clone + PartialOrd + fmt::Debug + Send + Sync + 'static {
    /// Name used in type mismatch errors
    const TYPE_NAME: &'static str;

    /// Cast a dynamic operand to this type
    fn from_value(value: &Value) -> ValueResult<Self>;

    /// Widen to a dynamic value
    fn to_value(&self) -> Value;

    /// Total order used by B-tree keys and sort keys. Values equal under
    /// `==` must compare `Equal`.
    fn key_cmp(&self, other: &Self) -> Ordering;

    /// True for values that fail every ordered comparison (NaN)
    fn is_unordered(&self) -> bool {
        false
    }

    /// Substring containment. `None` when the type has no such notion.
    fn contains(&self, _needle: &Self) -> Option<bool> {
        None
    }

    /// Text view for pattern matching. `None` for non-text types.
    fn as_text(&self) -> Option<&str> {
        None
    }
}

fn mismatch<T: ScalarValue>(value: &Value) -> ValueError {
    ValueError::TypeMismatch {
        expected: T::TYPE_NAME,
        found: value.type_name(),
    }
}

impl ScalarValue for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::Int(v) => Ok(*v),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn key_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

macro_rules! narrow_int_scalar {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl ScalarValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_value(value: &Value) -> ValueResult<Self> {
                    match value {
                        Value::Int(v) => <$ty>::try_from(*v).map_err(|_| ValueError::OutOfRange {
                            expected: $name,
                            value: *v,
                        }),
                        other => Err(mismatch::<Self>(other)),
                    }
                }

                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }

                fn key_cmp(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )*
    };
}

narrow_int_scalar!(i32 => "i32", u32 => "u32");

impl ScalarValue for u64 {
    const TYPE_NAME: &'static str = "u64";

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::Int(v) => u64::try_from(*v).map_err(|_| ValueError::OutOfRange {
                expected: Self::TYPE_NAME,
                value: *v,
            }),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn to_value(&self) -> Value {
        // Values above i64::MAX saturate; they cannot be expressed as operands anyway.
        Value::Int(i64::try_from(*self).unwrap_or(i64::MAX))
    }

    fn key_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl ScalarValue for f64 {
    const TYPE_NAME: &'static str = "float";

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            // Integer literals against float fields are the one accepted widening.
            Value::Int(v) => Ok(*v as f64),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn key_cmp(&self, other: &Self) -> Ordering {
        ordered_bits(*self).cmp(&ordered_bits(*other))
    }

    fn is_unordered(&self) -> bool {
        self.is_nan()
    }
}

/// Maps a float to bits whose unsigned order is the numeric order.
///
/// `-0.0` folds into `0.0` and every NaN into one key above `+inf`.
fn ordered_bits(v: f64) -> u64 {
    let v = if v == 0.0 {
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    };
    let bits = v.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits ^ (1 << 63)
    }
}

impl ScalarValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn key_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl ScalarValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::Str(v) => Ok(v.clone()),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }

    fn key_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn contains(&self, needle: &Self) -> Option<bool> {
        Some(self.as_str().contains(needle.as_str()))
    }

    fn as_text(&self) -> Option<&str> {
        Some(self)
    }
}
