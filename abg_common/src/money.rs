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

//--------------------------------------       Money        ---------------------------------------------------------
/// A monetary amount in the platform's single payable currency, held as an integer number of cents.
///
/// All derived amounts in the billing engine (line prices, discounts, balances) are computed in cents, so the
/// "round to 2 decimals" rule of the pricing model is exact by construction.
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
pub struct MoneyParseError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Builds an amount from whole currency units, e.g. `Money::whole(15)` is $15.00.
    pub fn whole(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns `pct` percent of this amount, rounded half-up to the nearest cent.
    pub fn percent(&self, pct: i64) -> Self {
        let raw = i128::from(self.0) * i128::from(pct);
        let rounded = (raw + 50) / 100;
        #[allow(clippy::cast_possible_truncation)]
        Self(rounded as i64)
    }

    pub fn max(self, other: Self) -> Self {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    /// Parses decimal amounts as sent by payment gateways: "123.45", "123.4" or "123".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (units, frac) = match digits.split_once('.') {
            Some((units, frac)) => (units, frac),
            None => (digits, ""),
        };
        if units.is_empty() && frac.is_empty() {
            return Err(MoneyParseError(s.to_string()));
        }
        if frac.len() > 2 {
            return Err(MoneyParseError(format!("{s} has sub-cent precision")));
        }
        let units: i64 = if units.is_empty() {
            0
        } else {
            units.parse().map_err(|_| MoneyParseError(s.to_string()))?
        };
        let cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| MoneyParseError(s.to_string()))? * 10,
            _ => frac.parse().map_err(|_| MoneyParseError(s.to_string()))?,
        };
        Ok(Self(sign * (units * 100 + cents)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_gateway_amounts() {
        assert_eq!("123.45".parse::<Money>().unwrap(), Money::from_cents(12345));
        assert_eq!("123.4".parse::<Money>().unwrap(), Money::from_cents(12340));
        assert_eq!("123".parse::<Money>().unwrap(), Money::whole(123));
        assert_eq!("0.05".parse::<Money>().unwrap(), Money::from_cents(5));
        assert_eq!("-2.50".parse::<Money>().unwrap(), Money::from_cents(-250));
        assert!("12.345".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Money::whole(330).percent(20), Money::whole(66));
        // 12.34 * 15% = 1.851 -> 1.85
        assert_eq!(Money::from_cents(1234).percent(15), Money::from_cents(185));
        // 0.10 * 25% = 0.025 -> 0.03
        assert_eq!(Money::from_cents(10).percent(25), Money::from_cents(3));
        assert_eq!(Money::whole(100).percent(0), Money::default());
    }

    #[test]
    fn displays_as_currency() {
        assert_eq!(Money::from_cents(12345).to_string(), "$123.45");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-$2.50");
    }
}
