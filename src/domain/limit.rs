use super::customer::CustomerId;
use super::money::Money;
use crate::error::LedgerError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type BucketId = u64;

/// Number of monthly installments a financing is repaid over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tenor(u32);

impl Tenor {
    pub fn new(months: u32) -> Result<Self, LedgerError> {
        if months == 0 {
            return Err(LedgerError::ValidationError(
                "tenor must be at least one month".to_string(),
            ));
        }
        Ok(Self(months))
    }

    pub const fn months(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Tenor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Share of monthly salary a customer may borrow at each offered tenor.
pub const TENOR_FACTORS: [(u32, Decimal); 4] = [
    (1, dec!(0.4)),
    (2, dec!(0.6)),
    (3, dec!(0.75)),
    (6, dec!(1.0)),
];

/// Remaining borrowing capacity of one customer at one tenor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitBucket {
    pub id: BucketId,
    pub customer_id: CustomerId,
    pub tenor: Tenor,
    pub amount: Money,
}

impl LimitBucket {
    /// Debits `required` from the bucket, refusing to go below zero.
    pub fn reserve(&mut self, required: Money) -> Result<(), LedgerError> {
        if self.amount < required {
            return Err(LedgerError::InsufficientLimit {
                required,
                available: self.amount,
            });
        }
        self.amount -= required;
        Ok(())
    }
}

/// A bucket that has been computed but not yet given an id by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenorLimit {
    pub tenor: Tenor,
    pub amount: Money,
}

/// Applies [`TENOR_FACTORS`] to `salary`, flooring each product.
pub fn compute_limits(salary: Money) -> Result<Vec<TenorLimit>, LedgerError> {
    if salary.is_negative() {
        return Err(LedgerError::ValidationError(
            "salary must not be negative".to_string(),
        ));
    }
    let salary = Decimal::from(salary.units());
    TENOR_FACTORS
        .iter()
        .map(|&(months, factor)| {
            let amount = (salary * factor).floor().to_i64().ok_or_else(|| {
                LedgerError::ValidationError(format!("limit for tenor {months} overflows"))
            })?;
            Ok(TenorLimit {
                tenor: Tenor(months),
                amount: Money::new(amount),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount_for(limits: &[TenorLimit], months: u32) -> Money {
        limits
            .iter()
            .find(|l| l.tenor.months() == months)
            .map(|l| l.amount)
            .unwrap()
    }

    #[test]
    fn test_compute_limits_applies_factor_table() {
        let limits = compute_limits(Money::new(10_000)).unwrap();
        assert_eq!(limits.len(), 4);
        assert_eq!(amount_for(&limits, 1), Money::new(4_000));
        assert_eq!(amount_for(&limits, 2), Money::new(6_000));
        assert_eq!(amount_for(&limits, 3), Money::new(7_500));
        assert_eq!(amount_for(&limits, 6), Money::new(10_000));
    }

    #[test]
    fn test_compute_limits_floors_fractions() {
        let limits = compute_limits(Money::new(1_334)).unwrap();
        // 1334 * 0.75 = 1000.5
        assert_eq!(amount_for(&limits, 3), Money::new(1_000));
        // 1334 * 0.4 = 533.6
        assert_eq!(amount_for(&limits, 1), Money::new(533));
    }

    #[test]
    fn test_compute_limits_zero_salary() {
        let limits = compute_limits(Money::ZERO).unwrap();
        assert!(limits.iter().all(|l| l.amount == Money::ZERO));
    }

    #[test]
    fn test_compute_limits_rejects_negative_salary() {
        assert!(matches!(
            compute_limits(Money::new(-5)),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_reserve_keeps_amount_non_negative() {
        let mut bucket = LimitBucket {
            id: 1,
            customer_id: 1,
            tenor: Tenor::new(3).unwrap(),
            amount: Money::new(1000),
        };
        bucket.reserve(Money::new(800)).unwrap();
        assert_eq!(bucket.amount, Money::new(200));

        let err = bucket.reserve(Money::new(300)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientLimit { .. }));
        assert_eq!(bucket.amount, Money::new(200));
    }

    #[test]
    fn test_tenor_rejects_zero() {
        assert!(Tenor::new(0).is_err());
        assert_eq!(Tenor::new(6).unwrap().months(), 6);
    }
}
