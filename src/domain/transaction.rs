use super::customer::CustomerId;
use super::limit::{BucketId, Tenor};
use super::money::Money;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TransactionId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Active,
    PaidOff,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::PaidOff => "paid_off",
        }
    }
}

/// The money side of a financing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Financing {
    pub otr: Money,
    pub admin_fee: Money,
    pub installment_total: Money,
}

impl Financing {
    pub fn new(otr: i64, admin_fee: i64, installment_total: i64) -> Result<Self, LedgerError> {
        Ok(Self {
            otr: Money::non_negative(otr, "otr")?,
            admin_fee: Money::non_negative(admin_fee, "admin fee")?,
            installment_total: Money::non_negative(installment_total, "installment total")?,
        })
    }

    /// Capacity that must be reserved from the limit bucket.
    pub fn required(&self) -> Result<Money, LedgerError> {
        self.otr
            .checked_add(self.admin_fee)
            .and_then(|sum| sum.checked_add(self.installment_total))
            .ok_or_else(|| LedgerError::ValidationError("financing total overflows".to_string()))
    }
}

/// A transaction as handed to the store, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub customer_id: CustomerId,
    pub limit_bucket_id: BucketId,
    pub tenor: Tenor,
    pub financing: Financing,
    pub asset_name: String,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            customer_id: self.customer_id,
            limit_bucket_id: self.limit_bucket_id,
            contract_no: contract_number(self.customer_id, id),
            tenor: self.tenor,
            otr: self.financing.otr,
            admin_fee: self.financing.admin_fee,
            installment_total: self.financing.installment_total,
            asset_name: self.asset_name,
            status: TransactionStatus::Active,
            created_at: self.created_at,
        }
    }
}

/// Contract numbers are unique because transaction ids are.
pub fn contract_number(customer_id: CustomerId, id: TransactionId) -> String {
    format!("KTR-{customer_id:06}-{id:08}")
}

/// A financing drawn against one limit bucket.
///
/// Immutable once created apart from `status`, which only ever moves from
/// `Active` to `PaidOff`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    pub limit_bucket_id: BucketId,
    pub contract_no: String,
    pub tenor: Tenor,
    pub otr: Money,
    pub admin_fee: Money,
    pub installment_total: Money,
    pub asset_name: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_paid_off(&self) -> bool {
        self.status == TransactionStatus::PaidOff
    }

    /// Moves the transaction to its terminal state. Returns `false` when it
    /// was already there.
    pub fn mark_paid_off(&mut self) -> bool {
        if self.is_paid_off() {
            return false;
        }
        self.status = TransactionStatus::PaidOff;
        true
    }
}
