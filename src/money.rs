//! Integer-cent money value type
//!
//! Every amount handled by the ledger is a whole number of euro cents. There
//! is no floating point anywhere in this crate and no currency other than EUR
//! is accepted: amounts tagged with a different currency are rejected when
//! they enter the system.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

use crate::types::{LedgerError, LedgerResult};

/// The only currency the ledger books.
pub const CURRENCY: &str = "EUR";

/// A signed amount of euro cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Largest magnitude a single amount may have: 100 000 000 000.00 EUR.
    ///
    /// Bounding each amount keeps sums over event logs and statements far
    /// from `i64` overflow.
    pub const MAX: Money = Money(10_000_000_000_000);

    /// Create an amount from euro cents
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Create an amount from cents tagged with an ISO 4217 code, rejecting anything but EUR
    pub fn new(cents: i64, currency: &str) -> LedgerResult<Self> {
        ensure_eur(currency)?;
        Ok(Self(cents))
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Whether the magnitude is within [`Money::MAX`]
    pub fn is_within_limit(&self) -> bool {
        self.0.unsigned_abs() <= Money::MAX.0.unsigned_abs()
    }

    /// Sum amounts, failing instead of overflowing
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> LedgerResult<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |total, amount| total.checked_add(amount))
            .ok_or_else(|| LedgerError::Validation("amount sum overflows".to_string()))
    }

    /// Parse an unsigned decimal of the exact shape `^\d+\.\d{2}$` into cents.
    ///
    /// Anything else (missing or extra decimals, signs, grouping characters,
    /// comma separators, whitespace) is rejected; nothing is rounded. Amounts
    /// above [`Money::MAX`] are rejected too.
    pub fn parse_decimal(input: &str) -> LedgerResult<Self> {
        let malformed = || {
            LedgerError::Validation(format!("amount '{input}' does not match ^\\d+\\.\\d{{2}}$"))
        };

        let (units, fraction) = input.split_once('.').ok_or_else(malformed)?;
        if units.is_empty()
            || fraction.len() != 2
            || !units.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }

        let units: i64 = units.parse().map_err(|_| malformed())?;
        let fraction: i64 = fraction.parse().map_err(|_| malformed())?;
        let amount = units
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .map(Money)
            .ok_or_else(malformed)?;
        if !amount.is_within_limit() {
            return Err(LedgerError::Validation(format!(
                "amount '{input}' exceeds the maximum of {}",
                Money::MAX
            )));
        }
        Ok(amount)
    }
}

/// Reject any currency code other than EUR
pub fn ensure_eur(currency: &str) -> LedgerResult<()> {
    if currency == CURRENCY {
        Ok(())
    } else {
        Err(LedgerError::CurrencyMismatch {
            expected: CURRENCY.to_string(),
            found: currency.to_string(),
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02} {}", sign, abs / 100, abs % 100, CURRENCY)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_exact_shape() {
        assert_eq!(Money::parse_decimal("12.34").unwrap().cents(), 1234);
        assert_eq!(Money::parse_decimal("0.05").unwrap().cents(), 5);
        assert_eq!(Money::parse_decimal("1000000.00").unwrap().cents(), 100_000_000);
    }

    #[test]
    fn test_parse_decimal_rejects_other_shapes() {
        for input in ["12.3", "12.345", "12", ".50", "12,34", "-1.00", "+1.00", " 1.00", "1 000.00", "1.0a"] {
            assert!(Money::parse_decimal(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_parse_decimal_rejects_amounts_above_limit() {
        assert_eq!(Money::parse_decimal("100000000000.00").unwrap(), Money::MAX);
        assert!(Money::parse_decimal("100000000000.01").is_err());
        assert!(Money::parse_decimal("50000000000000000.00").is_err());
        assert!(Money::parse_decimal("99999999999999999999.99").is_err());
    }

    #[test]
    fn test_checked_sum_reports_overflow() {
        let huge = Money::from_cents(i64::MAX);
        assert!(Money::checked_sum([huge, Money::from_cents(1)]).is_err());
        assert_eq!(
            Money::checked_sum([Money::MAX, -Money::MAX, Money::from_cents(5)]).unwrap(),
            Money::from_cents(5)
        );
    }

    #[test]
    fn test_non_eur_rejected() {
        assert!(Money::new(100, "EUR").is_ok());
        match Money::new(100, "USD") {
            Err(LedgerError::CurrencyMismatch { found, .. }) => assert_eq!(found, "USD"),
            other => panic!("expected currency mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_display_and_arithmetic() {
        let owed = Money::from_cents(-2500);
        let paid = Money::from_cents(2500);
        assert_eq!(owed.to_string(), "-25.00 EUR");
        assert!((owed + paid).is_zero());
        assert_eq!([owed, paid, paid].iter().sum::<Money>(), paid);
    }
}
