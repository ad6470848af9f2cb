//! Decimal money amounts.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A money amount backed by exact decimal arithmetic.
///
/// Totals are computed without intermediate rounding; banker's rounding to
/// two decimal places happens only at display time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Wraps a raw decimal amount.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Creates an amount from minor units (cents): `from_minor(999)` is 9.99.
    pub fn from_minor(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Creates an amount from whole major units: `from_major(5)` is 5.00.
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Returns the underlying decimal amount.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Multiplies the unit amount by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * Decimal::from(quantity))
    }

    /// Rounds to two decimal places with banker's rounding.
    ///
    /// Display/settlement boundary only; totals are computed unrounded.
    pub fn rounded(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven),
        )
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.rounded().0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_minor_units() {
        let m = Money::from_minor(999);
        assert_eq!(m.to_string(), "9.99");
        assert!(m.is_positive());
    }

    #[test]
    fn from_major_units() {
        assert_eq!(Money::from_major(5).to_string(), "5.00");
    }

    #[test]
    fn arithmetic() {
        let a = Money::from_minor(999);
        let b = Money::from_minor(500);
        assert_eq!(a + b, Money::from_minor(1499));
        assert_eq!(a - b, Money::from_minor(499));
        assert_eq!(a.multiply(2), Money::from_minor(1998));
    }

    #[test]
    fn sum_over_iterator() {
        let total: Money = [Money::from_minor(1998), Money::from_minor(500)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_minor(2498));
    }

    #[test]
    fn zero_and_negative() {
        assert!(Money::zero().is_zero());
        assert!((Money::zero() - Money::from_minor(1)).is_negative());
    }

    #[test]
    fn bankers_rounding_at_display() {
        // 2.125 rounds to the even neighbour 2.12, 2.135 to 2.14.
        let m = Money::new(Decimal::new(2125, 3));
        assert_eq!(m.to_string(), "2.12");
        let m = Money::new(Decimal::new(2135, 3));
        assert_eq!(m.to_string(), "2.14");
    }

    #[test]
    fn no_intermediate_rounding() {
        // Three thirds of a cent survive summation exactly.
        let third = Money::new(Decimal::new(3333, 4));
        let total: Money = std::iter::repeat_n(third, 3).sum();
        assert_eq!(total.amount(), Decimal::new(9999, 4));
    }

    #[test]
    fn serialization_roundtrip() {
        let m = Money::from_minor(2498);
        let json = serde_json::to_string(&m).unwrap();
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
