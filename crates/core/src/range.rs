//! Reference-range flags for numeric results.

use serde::Serialize;

use profiles::Validation;

use crate::value::FieldValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeFlag {
    Normal,
    Low,
    High,
    CriticalLow,
    CriticalHigh,
}

impl RangeFlag {
    pub fn is_critical(self) -> bool {
        matches!(self, RangeFlag::CriticalLow | RangeFlag::CriticalHigh)
    }
}

/// Classify `value` against `validation`.
///
/// Panic bounds are checked before `min`/`max`. Non-numeric values are not flagged.
pub fn flag(validation: &Validation, value: &FieldValue) -> Option<RangeFlag> {
    let n = value.as_number()?;

    let flag = if validation.panic_low.is_some_and(|limit| n < limit) {
        RangeFlag::CriticalLow
    } else if validation.panic_high.is_some_and(|limit| n > limit) {
        RangeFlag::CriticalHigh
    } else if validation.min.is_some_and(|limit| n < limit) {
        RangeFlag::Low
    } else if validation.max.is_some_and(|limit| n > limit) {
        RangeFlag::High
    } else {
        RangeFlag::Normal
    };

    Some(flag)
}
