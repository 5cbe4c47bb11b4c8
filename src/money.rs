//! Fixed-precision decimal money type.
//!
//! All ledger amounts and balances are [`Money`], a thin, hashable wrapper
//! around [`rust_decimal::Decimal`]. Equality, ordering and hashing all go
//! through a normalized (trailing-zero-stripped) form so that `1.50` and
//! `1.5` compare and hash identically, matching the canonicalization the
//! content hash (see [`crate::event`]) requires. Floating point never enters
//! the picture.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A signed, fixed-precision monetary amount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value).normalize()
    }

    /// Canonical form used for equality, hashing and the content hash:
    /// strips trailing zeroes (`rust_decimal::Decimal::normalize`), so `1.50`
    /// and `1.5` are the same `Money`.
    pub fn normalize(self) -> Self {
        Money(self.0.normalize())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Canonical string form used as the hash-input representation: the
    /// normalized decimal's `Display`, which never emits trailing zeroes or
    /// scientific notation.
    pub fn canonical_string(&self) -> String {
        self.normalize().0.to_string()
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.normalize().0 == other.normalize().0
    }
}
impl Eq for Money {}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Money {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalize().0.hash(state);
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Self::Output {
        Money::new(-self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money::new(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::new(Decimal::from(value))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

impl std::str::FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Money::new(Decimal::from_str_exact(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn normalizes_trailing_zeros_for_equality() {
        let a = Money::from_str("1.50").unwrap();
        let b = Money::from_str("1.5").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical_string(), "1.5");
    }

    #[test]
    fn normalized_forms_hash_identically() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Money::from_str("2.00").unwrap());
        assert!(set.contains(&Money::from_str("2").unwrap()));
    }

    #[test]
    fn sign_helpers() {
        let debit = Money::from_str("50").unwrap();
        let credit = Money::from_str("-30").unwrap();
        assert!(debit.is_positive());
        assert!(!debit.is_negative());
        assert!(credit.is_negative());
        assert!(Money::ZERO.is_zero());
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = Money::from_str("0.1").unwrap();
        let b = Money::from_str("0.2").unwrap();
        assert_eq!(a + b, Money::from_str("0.3").unwrap());
    }
}
