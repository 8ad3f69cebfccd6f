//! Engineering values and the comparisons evaluated against them.

use serde::{Deserialize, Serialize};

use crate::Warnings;

/// A single uncalibrated or calibrated engineering value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::From)]
pub enum Value {
    Signed(i64),
    Unsigned(u64),
    Double(f64),
    Text(String),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl Value {
    /// Numeric view of this value. Text is parsed, so an enumeration label
    /// that happens to be numeric still compares numerically.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Signed(v) => Some(*v as f64),
            Value::Unsigned(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Integer view, for repeat counts and enumeration raw values.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Signed(v) => Some(*v),
            Value::Unsigned(v) => i64::try_from(*v).ok(),
            Value::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Double(_) => None,
            Value::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Equality as used by restrictions and conditions: text compares as
    /// text when both sides are text, otherwise numerically.
    #[must_use]
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Signed(v) => write!(f, "{v}"),
            Value::Unsigned(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Looks up the current value of a named item.
///
/// The structural resolver implements this over its lazily-growing entry
/// list so that conditions and context calibrators are evaluated against
/// the in-progress decode, never the whole defined set.
pub trait ValueLookup {
    /// Current value of `item`, or `None` if it has not been resolved or
    /// is not present.
    fn lookup(&self, item: &str, calibrated: bool) -> Option<Value>;
}

/// Lookup over nothing, for using an item codec standalone.
pub struct NoLookup;

impl ValueLookup for NoLookup {
    fn lookup(&self, _item: &str, _calibrated: bool) -> Option<Value> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

/// One comparison against a named item, the building block of entry
/// inclusion conditions, restriction sets, and context-calibrator guards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Name of the item whose current value is compared.
    pub item: String,
    pub op: CompareOp,
    pub value: Value,
    /// Compare against the calibrated value rather than the uncalibrated.
    pub use_calibrated: bool,
}

impl Comparison {
    pub fn new(item: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Comparison {
            item: item.into(),
            op,
            value: value.into(),
            use_calibrated: true,
        }
    }

    /// Evaluate against `lookup`, or `None` when the referenced item has no
    /// current value.
    #[must_use]
    pub fn evaluate(&self, lookup: &dyn ValueLookup) -> Option<bool> {
        let current = lookup.lookup(&self.item, self.use_calibrated)?;
        Some(match self.op {
            CompareOp::Eq => current.matches(&self.value),
            CompareOp::Ne => !current.matches(&self.value),
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                let (a, b) = (current.as_f64()?, self.value.as_f64()?);
                match self.op {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    _ => a >= b,
                }
            }
        })
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.item, self.op, self.value)
    }
}

/// Evaluate a conjunction of comparisons. Unresolvable comparisons count
/// as false.
#[must_use]
pub fn all_hold(comparisons: &[Comparison], lookup: &dyn ValueLookup) -> bool {
    comparisons
        .iter()
        .all(|c| c.evaluate(lookup).unwrap_or(false))
}

/// Declared valid range for an item, checked after calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
    /// Bounds apply to the calibrated value rather than the uncalibrated.
    pub calibrated: bool,
}

impl ValidRange {
    /// Inclusive `[min, max]` on the calibrated value.
    #[must_use]
    pub fn inclusive(min: f64, max: f64) -> Self {
        ValidRange {
            min: Some(min),
            max: Some(max),
            min_inclusive: true,
            max_inclusive: true,
            calibrated: true,
        }
    }

    #[must_use]
    pub fn contains(&self, v: f64) -> bool {
        if let Some(min) = self.min {
            let ok = if self.min_inclusive { v >= min } else { v > min };
            if !ok {
                return false;
            }
        }
        if let Some(max) = self.max {
            let ok = if self.max_inclusive { v <= max } else { v < max };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Append an out-of-range warning for `item` when `value` violates the
    /// bounds. Non-numeric values are not range checked.
    pub fn check(&self, item: &str, value: &Value, warnings: &mut Warnings) {
        if let Some(v) = value.as_f64() {
            if !self.contains(v) {
                warnings.push(format!("{item} value {v} outside valid range"));
            }
        }
    }
}
