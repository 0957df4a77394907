use super::customer::{Customer, CustomerId};
use super::installment::{InstallmentLog, ScheduledInstallment};
use super::limit::{LimitBucket, Tenor, TenorLimit};
use super::transaction::{NewTransaction, Transaction, TransactionId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Persistence for limit buckets, transactions and installment logs.
///
/// Plain queries only ever observe committed state. Every read-check-write
/// sequence goes through a [`UnitOfWork`] obtained from [`LedgerStore::begin`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin<'a>(&'a self) -> Result<UnitOfWorkBox<'a>>;

    async fn buckets_by_customer(&self, customer_id: CustomerId) -> Result<Vec<LimitBucket>>;
    async fn all_buckets(&self) -> Result<Vec<LimitBucket>>;

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;
    async fn transactions_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Transaction>>;
    async fn all_transactions(&self) -> Result<Vec<Transaction>>;

    /// Installment logs of one transaction, ordered by month.
    async fn installments(&self, transaction_id: TransactionId) -> Result<Vec<InstallmentLog>>;
    /// Installment logs of several transactions in one round trip.
    async fn installments_for(&self, transaction_ids: &[TransactionId])
    -> Result<Vec<InstallmentLog>>;
    /// Unpaid installments falling due on `date`.
    async fn due_installments(&self, date: NaiveDate) -> Result<Vec<InstallmentLog>>;
}

/// An all-or-nothing sequence of reads and writes.
///
/// `lock_*` calls take an exclusive lock on the row that is held until the
/// unit commits or is dropped. Writes are staged and become visible to other
/// readers only at [`UnitOfWork::commit`]; dropping the unit discards them.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn lock_bucket(
        &mut self,
        customer_id: CustomerId,
        tenor: Tenor,
    ) -> Result<Option<LimitBucket>>;
    /// Deletes every bucket of the customer and inserts `limits` in their place.
    ///
    /// Takes the customer's lock first, so replacements for one customer
    /// are serialized, then the lock of every bucket it deletes.
    async fn replace_buckets(
        &mut self,
        customer_id: CustomerId,
        limits: Vec<TenorLimit>,
    ) -> Result<Vec<LimitBucket>>;
    /// Writes back a bucket previously returned by `lock_bucket`.
    async fn save_bucket(&mut self, bucket: LimitBucket) -> Result<()>;

    async fn lock_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>>;
    async fn insert_transaction(&mut self, transaction: NewTransaction) -> Result<Transaction>;
    /// Writes back a transaction previously returned by `lock_transaction`.
    async fn save_transaction(&mut self, transaction: Transaction) -> Result<()>;

    async fn installments(&mut self, transaction_id: TransactionId) -> Result<Vec<InstallmentLog>>;
    async fn insert_installments(
        &mut self,
        transaction_id: TransactionId,
        schedule: Vec<ScheduledInstallment>,
    ) -> Result<Vec<InstallmentLog>>;
    async fn mark_installment_paid(
        &mut self,
        transaction_id: TransactionId,
        month: u32,
        paid_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait CustomerLookup: Send + Sync {
    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>>;
    /// Batch lookup; unknown ids are skipped.
    async fn customers(&self, ids: &[CustomerId]) -> Result<Vec<Customer>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type UnitOfWorkBox<'a> = Box<dyn UnitOfWork + 'a>;
pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type CustomerLookupRef = Arc<dyn CustomerLookup>;
pub type ClockRef = Arc<dyn Clock>;
