use crate::domain::customer::{Customer, CustomerId};
use crate::domain::installment::{InstallmentLog, ScheduledInstallment};
use crate::domain::limit::{BucketId, LimitBucket, Tenor, TenorLimit};
use crate::domain::ports::{CustomerLookup, LedgerStore, UnitOfWork, UnitOfWorkBox};
use crate::domain::transaction::{NewTransaction, Transaction, TransactionId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
struct Tables {
    buckets: BTreeMap<BucketId, LimitBucket>,
    transactions: BTreeMap<TransactionId, Transaction>,
    installments: BTreeMap<(TransactionId, u32), InstallmentLog>,
}

impl Tables {
    fn installments_of(&self, transaction_id: TransactionId) -> impl Iterator<Item = &InstallmentLog> {
        self.installments
            .range((transaction_id, 0)..=(transaction_id, u32::MAX))
            .map(|(_, log)| log)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Customer(CustomerId),
    Bucket(BucketId),
    Transaction(TransactionId),
}

/// One async mutex per row, created on first use and dropped again once
/// nobody holds or waits on it.
#[derive(Default)]
struct RowLocks {
    rows: std::sync::Mutex<HashMap<RowKey, Arc<Mutex<()>>>>,
}

impl RowLocks {
    async fn acquire(&self, key: RowKey) -> OwnedMutexGuard<()> {
        let row = {
            let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(rows.entry(key).or_default())
        };
        row.lock_owned().await
    }

    /// Releases `guard` and forgets the row if no other unit references it.
    ///
    /// Waiters clone the row's `Arc` under the map lock, so a count of one
    /// seen under that same lock means the map holds the only reference.
    fn release(&self, key: RowKey, guard: OwnedMutexGuard<()>) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        drop(guard);
        if rows.get(&key).is_some_and(|row| Arc::strong_count(row) == 1) {
            rows.remove(&key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Default)]
struct Sequences {
    bucket: AtomicU64,
    transaction: AtomicU64,
    installment: AtomicU64,
}

fn next_id(sequence: &AtomicU64) -> u64 {
    sequence.fetch_add(1, Ordering::Relaxed) + 1
}

/// A thread-safe in-memory ledger store.
///
/// Committed rows live behind a `tokio::sync::RwLock`. Row locks are separate
/// per-row mutexes, so a unit of work waiting on one bucket never blocks work
/// on another. Staged writes are applied under a single write guard at commit,
/// which is what keeps a bucket replacement from being observed half done.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<RowLocks>,
    sequences: Arc<Sequences>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin<'a>(&'a self) -> Result<UnitOfWorkBox<'a>> {
        Ok(Box::new(InMemoryUnitOfWork {
            store: self.clone(),
            held: HashMap::new(),
            staged: Staged::default(),
        }))
    }

    async fn buckets_by_customer(&self, customer_id: CustomerId) -> Result<Vec<LimitBucket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .buckets
            .values()
            .filter(|b| b.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn all_buckets(&self) -> Result<Vec<LimitBucket>> {
        let tables = self.tables.read().await;
        Ok(tables.buckets.values().cloned().collect())
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(&id).cloned())
    }

    async fn transactions_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .values()
            .filter(|tx| tx.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.values().cloned().collect())
    }

    async fn installments(&self, transaction_id: TransactionId) -> Result<Vec<InstallmentLog>> {
        let tables = self.tables.read().await;
        Ok(tables.installments_of(transaction_id).cloned().collect())
    }

    async fn installments_for(
        &self,
        transaction_ids: &[TransactionId],
    ) -> Result<Vec<InstallmentLog>> {
        let tables = self.tables.read().await;
        Ok(transaction_ids
            .iter()
            .flat_map(|id| tables.installments_of(*id).cloned())
            .collect())
    }

    async fn due_installments(&self, date: NaiveDate) -> Result<Vec<InstallmentLog>> {
        let tables = self.tables.read().await;
        Ok(tables
            .installments
            .values()
            .filter(|log| log.due_date == date && !log.is_paid())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct Staged {
    deleted_buckets: BTreeSet<BucketId>,
    buckets: BTreeMap<BucketId, LimitBucket>,
    transactions: BTreeMap<TransactionId, Transaction>,
    installments: BTreeMap<(TransactionId, u32), InstallmentLog>,
}

/// Unit of work over [`InMemoryLedgerStore`].
///
/// Reads see committed rows overlaid with this unit's own staged writes.
pub struct InMemoryUnitOfWork {
    store: InMemoryLedgerStore,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged: Staged,
}

impl InMemoryUnitOfWork {
    /// Returns `true` if the lock was newly acquired.
    async fn lock(&mut self, key: RowKey) -> bool {
        if self.held.contains_key(&key) {
            return false;
        }
        let guard = self.store.locks.acquire(key).await;
        self.held.insert(key, guard);
        true
    }

    fn unlock(&mut self, key: RowKey) {
        if let Some(guard) = self.held.remove(&key) {
            self.store.locks.release(key, guard);
        }
    }

    fn require_lock(&self, key: RowKey) -> Result<()> {
        if self.held.contains_key(&key) {
            Ok(())
        } else {
            Err(LedgerError::persistence(format!(
                "write to {key:?} without holding its lock"
            )))
        }
    }

    async fn current_bucket(&self, id: BucketId) -> Option<LimitBucket> {
        if self.staged.deleted_buckets.contains(&id) {
            return None;
        }
        if let Some(bucket) = self.staged.buckets.get(&id) {
            return Some(bucket.clone());
        }
        self.store.tables.read().await.buckets.get(&id).cloned()
    }

    async fn visible_buckets(&self, customer_id: CustomerId) -> Vec<LimitBucket> {
        let tables = self.store.tables.read().await;
        let mut buckets: BTreeMap<BucketId, LimitBucket> = tables
            .buckets
            .values()
            .filter(|b| b.customer_id == customer_id && !self.staged.deleted_buckets.contains(&b.id))
            .map(|b| (b.id, b.clone()))
            .collect();
        buckets.extend(
            self.staged
                .buckets
                .values()
                .filter(|b| b.customer_id == customer_id)
                .map(|b| (b.id, b.clone())),
        );
        buckets.into_values().collect()
    }

    async fn current_transaction(&self, id: TransactionId) -> Option<Transaction> {
        if let Some(tx) = self.staged.transactions.get(&id) {
            return Some(tx.clone());
        }
        self.store.tables.read().await.transactions.get(&id).cloned()
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_bucket(
        &mut self,
        customer_id: CustomerId,
        tenor: Tenor,
    ) -> Result<Option<LimitBucket>> {
        loop {
            let Some(id) = self
                .visible_buckets(customer_id)
                .await
                .into_iter()
                .find(|b| b.tenor == tenor)
                .map(|b| b.id)
            else {
                return Ok(None);
            };

            let newly_locked = self.lock(RowKey::Bucket(id)).await;
            // The row may have been replaced while we waited for its lock.
            match self.current_bucket(id).await {
                Some(bucket) if bucket.customer_id == customer_id && bucket.tenor == tenor => {
                    return Ok(Some(bucket));
                }
                _ if newly_locked => self.unlock(RowKey::Bucket(id)),
                _ => return Ok(None),
            }
        }
    }

    async fn replace_buckets(
        &mut self,
        customer_id: CustomerId,
        limits: Vec<TenorLimit>,
    ) -> Result<Vec<LimitBucket>> {
        self.lock(RowKey::Customer(customer_id)).await;

        let existing: Vec<BucketId> = self
            .visible_buckets(customer_id)
            .await
            .into_iter()
            .map(|b| b.id)
            .collect();
        for id in &existing {
            self.lock(RowKey::Bucket(*id)).await;
        }
        for id in existing {
            self.staged.buckets.remove(&id);
            self.staged.deleted_buckets.insert(id);
        }

        let buckets: Vec<LimitBucket> = limits
            .into_iter()
            .map(|limit| LimitBucket {
                id: next_id(&self.store.sequences.bucket),
                customer_id,
                tenor: limit.tenor,
                amount: limit.amount,
            })
            .collect();
        for bucket in &buckets {
            self.staged.buckets.insert(bucket.id, bucket.clone());
        }
        Ok(buckets)
    }

    async fn save_bucket(&mut self, bucket: LimitBucket) -> Result<()> {
        self.require_lock(RowKey::Bucket(bucket.id))?;
        if self.staged.deleted_buckets.contains(&bucket.id) {
            return Err(LedgerError::persistence(format!(
                "bucket {} was deleted in this unit of work",
                bucket.id
            )));
        }
        self.staged.buckets.insert(bucket.id, bucket);
        Ok(())
    }

    async fn lock_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>> {
        self.lock(RowKey::Transaction(id)).await;
        Ok(self.current_transaction(id).await)
    }

    async fn insert_transaction(&mut self, transaction: NewTransaction) -> Result<Transaction> {
        let id = next_id(&self.store.sequences.transaction);
        let transaction = transaction.into_transaction(id);
        self.lock(RowKey::Transaction(id)).await;
        self.staged.transactions.insert(id, transaction.clone());
        Ok(transaction)
    }

    async fn save_transaction(&mut self, transaction: Transaction) -> Result<()> {
        self.require_lock(RowKey::Transaction(transaction.id))?;
        self.staged.transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn installments(&mut self, transaction_id: TransactionId) -> Result<Vec<InstallmentLog>> {
        let tables = self.store.tables.read().await;
        let mut logs: BTreeMap<u32, InstallmentLog> = tables
            .installments_of(transaction_id)
            .map(|log| (log.month, log.clone()))
            .collect();
        drop(tables);
        logs.extend(
            self.staged
                .installments
                .range((transaction_id, 0)..=(transaction_id, u32::MAX))
                .map(|((_, month), log)| (*month, log.clone())),
        );
        Ok(logs.into_values().collect())
    }

    async fn insert_installments(
        &mut self,
        transaction_id: TransactionId,
        schedule: Vec<ScheduledInstallment>,
    ) -> Result<Vec<InstallmentLog>> {
        let logs: Vec<InstallmentLog> = schedule
            .into_iter()
            .map(|row| row.into_log(next_id(&self.store.sequences.installment), transaction_id))
            .collect();
        for log in &logs {
            self.staged
                .installments
                .insert((transaction_id, log.month), log.clone());
        }
        Ok(logs)
    }

    async fn mark_installment_paid(
        &mut self,
        transaction_id: TransactionId,
        month: u32,
        paid_at: DateTime<Utc>,
    ) -> Result<()> {
        let key = (transaction_id, month);
        let current = match self.staged.installments.get(&key) {
            Some(log) => Some(log.clone()),
            None => self.store.tables.read().await.installments.get(&key).cloned(),
        };
        let Some(mut log) = current else {
            return Err(LedgerError::persistence(format!(
                "installment {month} of transaction {transaction_id} not found"
            )));
        };
        if log.paid_at.is_none() {
            log.paid_at = Some(paid_at);
            self.staged.installments.insert(key, log);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let staged = std::mem::take(&mut this.staged);

        let mut tables = this.store.tables.write().await;
        for id in &staged.deleted_buckets {
            tables.buckets.remove(id);
        }
        tables.buckets.extend(staged.buckets);
        tables.transactions.extend(staged.transactions);
        tables.installments.extend(staged.installments);
        drop(tables);

        // Row locks are released when `this` drops.
        Ok(())
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        let keys: Vec<RowKey> = self.held.keys().copied().collect();
        for key in keys {
            self.unlock(key);
        }
    }
}

/// A thread-safe in-memory stand-in for the customer subsystem.
#[derive(Default, Clone)]
pub struct InMemoryCustomerDirectory {
    customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the customer or replaces the existing record with the same id.
    pub async fn upsert(&self, customer: Customer) {
        let mut customers = self.customers.write().await;
        customers.insert(customer.id, customer);
    }
}

#[async_trait]
impl CustomerLookup for InMemoryCustomerDirectory {
    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.get(&id).cloned())
    }

    async fn customers(&self, ids: &[CustomerId]) -> Result<Vec<Customer>> {
        let customers = self.customers.read().await;
        Ok(ids.iter().filter_map(|id| customers.get(id).cloned()).collect())
    }
}
