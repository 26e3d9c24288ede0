use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Signed fixed-point amount held as minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Money(i64);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn to_cents(self) -> i64 {
        self.0
    }

    /// Rounds to two decimal places. Returns `None` when the value does not
    /// fit into 64-bit minor units.
    pub fn from_decimal(decimal: Decimal) -> Option<Self> {
        decimal
            .round_dp(2)
            .checked_mul(Decimal::ONE_HUNDRED)?
            .to_i64()
            .map(Money)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn zero() -> Self {
        Money(0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.to_decimal())
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn from_decimal_rounds_to_cents() {
        let m = Money::from_decimal(Decimal::from_str("12.345").unwrap()).unwrap();
        assert_eq!(m.to_cents(), 1234);
        let m = Money::from_decimal(Decimal::from_str("-0.01").unwrap()).unwrap();
        assert_eq!(m.to_cents(), -1);
    }

    #[test]
    fn from_decimal_rejects_out_of_range() {
        assert!(Money::from_decimal(Decimal::MAX).is_none());
        assert!(Money::from_decimal(Decimal::from_str("100000000000000000").unwrap()).is_none());
        let m = Money::from_decimal(Decimal::from_str("92233720368547758.07").unwrap()).unwrap();
        assert_eq!(m.to_cents(), i64::MAX);
    }

    #[test]
    fn display_keeps_sign_and_two_places() {
        assert_eq!(Money::from_cents(-4999).to_string(), "-49.99");
        assert_eq!(Money::from_cents(100).to_string(), "1.00");
    }

    #[test]
    fn arithmetic() {
        let a = Money::from_cents(500);
        let b = Money::from_cents(200);
        assert_eq!((a - b).to_cents(), 300);
        assert_eq!((a + b).to_cents(), 700);
        assert_eq!((-a).to_cents(), -500);
        assert!((-a).is_negative());
    }
}
