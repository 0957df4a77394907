use super::limit::Tenor;
use super::money::Money;
use super::transaction::TransactionId;
use crate::error::LedgerError;
use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type InstallmentId = u64;

/// One scheduled monthly repayment of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentLog {
    pub id: InstallmentId,
    pub transaction_id: TransactionId,
    /// 1-indexed position in the schedule.
    pub month: u32,
    pub amount: Money,
    /// Calendar date in the reference time zone.
    pub due_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
}

impl InstallmentLog {
    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }
}

/// A schedule row before the store has assigned it an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledInstallment {
    pub month: u32,
    pub amount: Money,
    pub due_date: NaiveDate,
}

impl ScheduledInstallment {
    pub fn into_log(self, id: InstallmentId, transaction_id: TransactionId) -> InstallmentLog {
        InstallmentLog {
            id,
            transaction_id,
            month: self.month,
            amount: self.amount,
            due_date: self.due_date,
            paid_at: None,
        }
    }
}

/// A caller's claim that `month` was paid with `amount` at `paid_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub month: u32,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}

/// Splits `total` into `tenor` monthly installments.
///
/// Every month gets `total / tenor`; the remainder lands on the final month so
/// the schedule always sums to `total`. Month `i` falls due on the first day
/// of the `i`-th calendar month after `now`, as seen from `offset`.
pub fn build_schedule(
    total: Money,
    tenor: Tenor,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<ScheduledInstallment>, LedgerError> {
    if total.is_negative() {
        return Err(LedgerError::ValidationError(
            "installment total must not be negative".to_string(),
        ));
    }
    let months = tenor.months();
    let per_month = total.units() / i64::from(months);
    let remainder = total.units() % i64::from(months);

    let local = now.with_timezone(&offset);
    let this_month = NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
        .ok_or_else(|| LedgerError::ValidationError("invalid reference date".to_string()))?;

    (1..=months)
        .map(|month| {
            let due_date = this_month
                .checked_add_months(Months::new(month))
                .ok_or_else(|| {
                    LedgerError::ValidationError(format!("due date for month {month} overflows"))
                })?;
            let amount = if month == months {
                per_month + remainder
            } else {
                per_month
            };
            Ok(ScheduledInstallment {
                month,
                amount: Money::new(amount),
                due_date,
            })
        })
        .collect()
}

/// Checks a payment batch against the current schedule and returns its total.
///
/// Only the months named in the batch are considered: their outstanding sum
/// must equal the sum the caller claims to have paid. A batch naming a month
/// twice, a month outside the schedule, or a month already paid is rejected
/// outright.
pub fn validate_payments(
    logs: &[InstallmentLog],
    updates: &[PaymentUpdate],
) -> Result<Money, LedgerError> {
    if updates.is_empty() {
        return Err(LedgerError::ValidationError(
            "payment batch is empty".to_string(),
        ));
    }
    if updates.iter().any(|u| u.amount.is_negative()) {
        return Err(LedgerError::ValidationError(
            "payment amount must not be negative".to_string(),
        ));
    }

    let requested: HashSet<u32> = updates.iter().map(|u| u.month).collect();
    let unpaid_total: Money = logs
        .iter()
        .filter(|log| !log.is_paid() && requested.contains(&log.month))
        .map(|log| log.amount)
        .sum();
    let input_total = updates
        .iter()
        .try_fold(Money::ZERO, |acc, u| acc.checked_add(u.amount))
        .ok_or_else(|| LedgerError::ValidationError("payment batch total overflows".to_string()))?;

    let all_outstanding = requested.len() == updates.len()
        && requested.iter().all(|month| {
            logs.iter()
                .any(|log| log.month == *month && !log.is_paid())
        });

    if !all_outstanding || input_total != unpaid_total {
        return Err(LedgerError::InstallmentMismatch {
            expected: unpaid_total,
            actual: input_total,
        });
    }
    Ok(input_total)
}
