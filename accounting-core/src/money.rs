//! Decimal money helpers shared by the engines.
//!
//! All monetary arithmetic runs on [`rust_decimal::Decimal`]; comparisons
//! against zero always go through an explicit tolerance, never exact
//! equality.

use rust_decimal::Decimal;

/// Tolerance under which a remaining balance counts as fully settled
/// (0.005 — half a cent).
pub fn settle_tolerance() -> Decimal {
    Decimal::new(5, 3)
}

/// Tolerance for statement-level balance checks and closing previews
/// (0.01 — one cent).
pub fn balance_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// True when a remaining amount is within the settle tolerance of zero.
pub fn is_settled(remaining: Decimal) -> bool {
    remaining.abs() < settle_tolerance()
}

/// True when a difference is within the one-cent balance tolerance.
pub fn is_balanced(difference: Decimal) -> bool {
    difference.abs() < balance_tolerance()
}

/// Round to two decimal places, away from zero on the half cent.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_tolerance_is_half_a_cent() {
        assert!(is_settled(Decimal::new(4, 3))); // 0.004
        assert!(is_settled(Decimal::new(-4, 3)));
        assert!(!is_settled(Decimal::new(5, 3))); // 0.005 is not settled
        assert!(!is_settled(Decimal::new(1, 0)));
    }

    #[test]
    fn balance_tolerance_is_one_cent() {
        assert!(is_balanced(Decimal::new(9, 3))); // 0.009
        assert!(!is_balanced(Decimal::new(1, 2))); // 0.01
        assert!(!is_balanced(Decimal::new(-10, 0)));
    }

    #[test]
    fn round_money_keeps_two_places() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2)); // 12.345 -> 12.35
        assert_eq!(round_money(Decimal::new(100, 2)), Decimal::new(100, 2));
    }
}
