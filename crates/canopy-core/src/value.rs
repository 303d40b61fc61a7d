use std::cmp::Ordering;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque handle to a game entity stored on a blackboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityId(pub u64);

/// A value storable in a blackboard field.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f32),
    Str(String),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Entity(EntityId),
}

/// The kind tag of a [`Value`]. Field definitions fix a kind; writes of a
/// different kind are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    Vec2,
    Vec3,
    Entity,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Vec2(_) => ValueKind::Vec2,
            Value::Vec3(_) => ValueKind::Vec3,
            Value::Entity(_) => ValueKind::Entity,
        }
    }

    /// Ordering between two values of the same orderable kind.
    ///
    /// Ints, floats and strings order; every cross-kind pair and every
    /// non-orderable kind returns `None`.
    fn ordering(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Comparison applied by blackboard-driven conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CompareOp {
    /// Passes while the field holds an explicitly written value.
    IsSet,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Evaluates the comparison against a field's effective value.
    ///
    /// `is_set` is the field's written-flag; `value` is the written value or
    /// the declared default when unset. Comparisons that do not apply to the
    /// kinds at hand fail closed.
    pub fn test(self, is_set: bool, value: &Value, operand: &Value) -> bool {
        match self {
            CompareOp::IsSet => is_set,
            CompareOp::Eq => value == operand,
            CompareOp::Ne => value != operand,
            CompareOp::Lt => matches!(value.ordering(operand), Some(Ordering::Less)),
            CompareOp::Le => matches!(
                value.ordering(operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompareOp::Gt => matches!(value.ordering(operand), Some(Ordering::Greater)),
            CompareOp::Ge => matches!(
                value.ordering(operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

/// Conversion out of a [`Value`] used by typed blackboard reads.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for [f32; 2] {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vec2(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for [f32; 3] {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vec3(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for EntityId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Entity(e) => Some(*e),
            _ => None,
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<[f32; 2]> for Value {
    fn from(v: [f32; 2]) -> Self {
        Value::Vec2(v)
    }
}

impl From<[f32; 3]> for Value {
    fn from(v: [f32; 3]) -> Self {
        Value::Vec3(v)
    }
}

impl From<EntityId> for Value {
    fn from(v: EntityId) -> Self {
        Value::Entity(v)
    }
}
