use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------       Money         ---------------------------------------------------------
/// A monetary amount in minor units (cents). All ledger arithmetic happens on this type; floating point never touches
/// a balance. The currency itself travels separately, since wallets are keyed on (owner, currency).
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(pub String);

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.abs();
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

/// Providers express amounts as decimal strings ("1050.75") or bare integers ("1050"). Parsing is done with string
/// arithmetic; at most two decimal places are accepted.
impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MoneyConversionError("empty amount".to_string()));
        }
        let mut parts = s.splitn(2, '.');
        let whole = parts.next().unwrap_or_default();
        let whole_units = whole
            .parse::<i64>()
            .map_err(|e| MoneyConversionError(format!("Invalid amount: {s}. {e}")))?;
        let cents = match parts.next() {
            None => 0,
            Some("") => 0,
            Some(frac) if frac.len() > 2 => {
                return Err(MoneyConversionError(format!(
                    "Amount {s} has more than two decimal places"
                )))
            },
            Some(frac) => {
                let scale = if frac.len() == 1 { 10 } else { 1 };
                let frac = frac
                    .parse::<u64>()
                    .map_err(|e| MoneyConversionError(format!("Invalid amount: {s}. {e}")))?;
                frac as i64 * scale
            },
        };
        if whole_units < 0 || whole.starts_with('-') {
            return Err(MoneyConversionError(format!("Amount {s} is negative")));
        }
        Ok(Self(whole_units * 100 + cents))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("10000".parse::<Money>().unwrap(), Money::from_major(10_000));
        assert_eq!("1050.75".parse::<Money>().unwrap(), Money::from_cents(105_075));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from_cents(50));
        assert_eq!("12.".parse::<Money>().unwrap(), Money::from_major(12));
    }

    #[test]
    fn rejects_junk() {
        assert!("".parse::<Money>().is_err());
        assert!("12.345".parse::<Money>().is_err());
        assert!("-5".parse::<Money>().is_err());
        assert!("ten".parse::<Money>().is_err());
        assert!("10.x5".parse::<Money>().is_err());
    }

    #[test]
    fn displays_with_two_places() {
        assert_eq!(Money::from_cents(105_075).to_string(), "1050.75");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = Money::from_cents(1_000_000);
        let b = Money::from_cents(1);
        assert_eq!((a + b).value(), 1_000_001);
        assert_eq!((a - b).value(), 999_999);
        assert_eq!((-b).value(), -1);
        let mut c = a;
        c -= b;
        assert_eq!(c.value(), 999_999);
    }
}
