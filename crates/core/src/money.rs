//! Integer minor-unit money helpers.
//!
//! Ledger records carry decimal amounts as `f64`; the engine converts them to
//! signed cents once, at the mapping boundary, and never does float math on
//! money afterwards.

/// Signed amount in minor currency units (positive = inflow).
pub type Cents = i64;

/// Convert a major-unit decimal amount into integer cents (`round(amount * 100)`).
///
/// Non-finite inputs map to zero.
pub fn to_cents(amount: f64) -> Cents {
    if !amount.is_finite() {
        return 0;
    }
    (amount * 100.0).round() as Cents
}

/// Integer mean, rounded half away from zero. `None` for an empty slice.
pub fn mean_cents(values: &[Cents]) -> Option<Cents> {
    if values.is_empty() {
        return None;
    }
    let sum: i128 = values.iter().map(|v| *v as i128).sum();
    let len = values.len() as i128;
    let half = len / 2;
    let rounded = if sum >= 0 {
        (sum + half) / len
    } else {
        (sum - half) / len
    };
    Some(rounded as Cents)
}
