use crate::config::RocksDbConfig;
use crate::domain::customer::CustomerId;
use crate::domain::installment::{InstallmentLog, ScheduledInstallment};
use crate::domain::limit::{LimitBucket, Tenor, TenorLimit};
use crate::domain::ports::{LedgerStore, UnitOfWork, UnitOfWorkBox};
use crate::domain::transaction::{NewTransaction, Transaction, TransactionId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, TransactionDB,
    TransactionDBOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Column Family for limit buckets, keyed by customer id then tenor.
pub const CF_BUCKETS: &str = "limit_buckets";
/// Column Family for transactions, keyed by id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for installment logs, keyed by transaction id then month.
pub const CF_INSTALLMENTS: &str = "installments";
/// Column Family for id sequences and customer lock rows.
pub const CF_META: &str = "meta";

/// Ids reserved per write to the sequence row.
const ID_BLOCK: u64 = 1000;

type RawItem = std::result::Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>;

fn cf<'db>(db: &'db TransactionDB, name: &str) -> Result<&'db ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| LedgerError::persistence(format!("column family '{name}' not found")))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn pair_key(high: u64, low: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&high.to_be_bytes());
    key.extend_from_slice(&low.to_be_bytes());
    key
}

fn bucket_key(customer_id: CustomerId, tenor: Tenor) -> Vec<u8> {
    pair_key(customer_id, tenor.months())
}

fn installment_key(transaction_id: TransactionId, month: u32) -> Vec<u8> {
    pair_key(transaction_id, month)
}

/// Decodes every row whose key starts with `prefix`. Keys must be iterated in order from `prefix`.
fn collect_prefixed<T, I>(rows: I, prefix: &[u8]) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    I: Iterator<Item = RawItem>,
{
    let mut out = Vec::new();
    for row in rows {
        let (key, value) = row?;
        if !key.starts_with(prefix) {
            break;
        }
        out.push(decode(&value)?);
    }
    Ok(out)
}

/// A block-allocated id counter persisted in [`CF_META`].
///
/// Only the upper bound of the reserved block is written, so ids handed out
/// before a crash are never reused. Unused ids of a block are skipped after restart.
struct Sequence {
    key: &'static str,
    /// `(next id, exclusive end of the reserved block)`
    state: Mutex<(u64, u64)>,
}

impl Sequence {
    fn load(db: &TransactionDB, key: &'static str) -> Result<Self> {
        let reserved = match db.get_cf(cf(db, CF_META)?, key)? {
            Some(bytes) => u64::from_be_bytes(bytes.as_slice().try_into().map_err(|_| {
                LedgerError::persistence(format!("corrupt sequence row '{key}'"))
            })?),
            None => 0,
        };
        Ok(Self {
            key,
            state: Mutex::new((reserved + 1, reserved + 1)),
        })
    }

    fn next(&self, db: &TransactionDB) -> Result<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (next, end) = *state;
        let end = if next >= end {
            let reserved = end - 1 + ID_BLOCK;
            db.put_cf(cf(db, CF_META)?, self.key, reserved.to_be_bytes())?;
            reserved + 1
        } else {
            end
        };
        *state = (next + 1, end);
        Ok(next)
    }
}

struct IdSequences {
    bucket: Sequence,
    transaction: Sequence,
    installment: Sequence,
}

/// A persistent [`LedgerStore`] backed by a RocksDB `TransactionDB`.
///
/// Row locks are RocksDB pessimistic locks taken with `get_for_update`, so
/// they also hold across processes sharing the database. A lock that cannot
/// be acquired within the configured timeout fails with
/// [`LedgerError::LockTimeout`]; lock waits block the calling worker thread.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDbLedgerStore {
    db: Arc<TransactionDB>,
    ids: Arc<IdSequences>,
}

impl RocksDbLedgerStore {
    /// Opens or creates a database at `path` with every column family the ledger needs.
    pub fn open<P: AsRef<Path>>(path: P, config: RocksDbConfig) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(config.lock_timeout_ms);

        let descriptors = [CF_BUCKETS, CF_TRANSACTIONS, CF_INSTALLMENTS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = TransactionDB::open_cf_descriptors(&opts, &txn_opts, path, descriptors)?;

        let ids = IdSequences {
            bucket: Sequence::load(&db, "seq:bucket")?,
            transaction: Sequence::load(&db, "seq:transaction")?,
            installment: Sequence::load(&db, "seq:installment")?,
        };
        Ok(Self {
            db: Arc::new(db),
            ids: Arc::new(ids),
        })
    }

    fn scan<T: DeserializeOwned>(&self, name: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let db = self.db.as_ref();
        let mode = IteratorMode::From(prefix, Direction::Forward);
        collect_prefixed(db.iterator_cf(cf(db, name)?, mode), prefix)
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedgerStore {
    async fn begin<'a>(&'a self) -> Result<UnitOfWorkBox<'a>> {
        let db = self.db.as_ref();
        Ok(Box::new(RocksDbUnitOfWork {
            db,
            ids: self.ids.as_ref(),
            txn: db.transaction(),
            held: HashSet::new(),
        }))
    }

    async fn buckets_by_customer(&self, customer_id: CustomerId) -> Result<Vec<LimitBucket>> {
        self.scan(CF_BUCKETS, &customer_id.to_be_bytes())
    }

    async fn all_buckets(&self) -> Result<Vec<LimitBucket>> {
        self.scan(CF_BUCKETS, &[])
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let db = self.db.as_ref();
        db.get_cf(cf(db, CF_TRANSACTIONS)?, id.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn transactions_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self.scan(CF_TRANSACTIONS, &[])?;
        transactions.retain(|tx| tx.customer_id == customer_id);
        Ok(transactions)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        self.scan(CF_TRANSACTIONS, &[])
    }

    async fn installments(&self, transaction_id: TransactionId) -> Result<Vec<InstallmentLog>> {
        self.scan(CF_INSTALLMENTS, &transaction_id.to_be_bytes())
    }

    async fn installments_for(
        &self,
        transaction_ids: &[TransactionId],
    ) -> Result<Vec<InstallmentLog>> {
        let mut logs = Vec::new();
        for id in transaction_ids {
            logs.extend(self.scan::<InstallmentLog>(CF_INSTALLMENTS, &id.to_be_bytes())?);
        }
        Ok(logs)
    }

    async fn due_installments(&self, date: NaiveDate) -> Result<Vec<InstallmentLog>> {
        let mut logs: Vec<InstallmentLog> = self.scan(CF_INSTALLMENTS, &[])?;
        logs.retain(|log| log.due_date == date && !log.is_paid());
        Ok(logs)
    }
}

/// Unit of work over one RocksDB pessimistic transaction.
///
/// Dropping it without commit rolls the transaction back and releases its locks.
pub struct RocksDbUnitOfWork<'a> {
    db: &'a TransactionDB,
    ids: &'a IdSequences,
    txn: rocksdb::Transaction<'a, TransactionDB>,
    held: HashSet<(&'static str, Vec<u8>)>,
}

impl RocksDbUnitOfWork<'_> {
    fn lock_key(&mut self, name: &'static str, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let row = self.txn.get_for_update_cf(cf(self.db, name)?, &key, true)?;
        self.held.insert((name, key));
        Ok(row)
    }

    fn lock_row<T: DeserializeOwned>(&mut self, name: &'static str, key: Vec<u8>) -> Result<Option<T>> {
        self.lock_key(name, key)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn require_lock(&self, name: &'static str, key: &[u8]) -> Result<()> {
        if self.held.contains(&(name, key.to_vec())) {
            Ok(())
        } else {
            Err(LedgerError::persistence(format!(
                "write to {name} row {key:?} without holding its lock"
            )))
        }
    }

    fn put<T: Serialize>(&mut self, name: &'static str, key: Vec<u8>, value: &T) -> Result<()> {
        self.txn.put_cf(cf(self.db, name)?, &key, encode(value)?)?;
        self.held.insert((name, key));
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, name: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let mode = IteratorMode::From(prefix, Direction::Forward);
        collect_prefixed(self.txn.iterator_cf(cf(self.db, name)?, mode), prefix)
    }
}

#[async_trait]
impl UnitOfWork for RocksDbUnitOfWork<'_> {
    async fn lock_bucket(
        &mut self,
        customer_id: CustomerId,
        tenor: Tenor,
    ) -> Result<Option<LimitBucket>> {
        self.lock_row(CF_BUCKETS, bucket_key(customer_id, tenor))
    }

    async fn replace_buckets(
        &mut self,
        customer_id: CustomerId,
        limits: Vec<TenorLimit>,
    ) -> Result<Vec<LimitBucket>> {
        self.lock_key(CF_META, format!("customer:{customer_id}").into_bytes())?;

        let existing: Vec<LimitBucket> = self.scan(CF_BUCKETS, &customer_id.to_be_bytes())?;
        for bucket in existing {
            let key = bucket_key(customer_id, bucket.tenor);
            self.lock_key(CF_BUCKETS, key.clone())?;
            self.txn.delete_cf(cf(self.db, CF_BUCKETS)?, &key)?;
        }

        let mut buckets = Vec::with_capacity(limits.len());
        for limit in limits {
            let bucket = LimitBucket {
                id: self.ids.bucket.next(self.db)?,
                customer_id,
                tenor: limit.tenor,
                amount: limit.amount,
            };
            self.put(CF_BUCKETS, bucket_key(customer_id, bucket.tenor), &bucket)?;
            buckets.push(bucket);
        }
        Ok(buckets)
    }

    async fn save_bucket(&mut self, bucket: LimitBucket) -> Result<()> {
        let key = bucket_key(bucket.customer_id, bucket.tenor);
        self.require_lock(CF_BUCKETS, &key)?;
        let current: Option<LimitBucket> = self
            .txn
            .get_cf(cf(self.db, CF_BUCKETS)?, &key)?
            .map(|bytes| decode(&bytes))
            .transpose()?;
        if current.is_none_or(|row| row.id != bucket.id) {
            return Err(LedgerError::persistence(format!(
                "bucket {} was replaced in this unit of work",
                bucket.id
            )));
        }
        self.put(CF_BUCKETS, key, &bucket)
    }

    async fn lock_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>> {
        self.lock_row(CF_TRANSACTIONS, id.to_be_bytes().to_vec())
    }

    async fn insert_transaction(&mut self, transaction: NewTransaction) -> Result<Transaction> {
        let id = self.ids.transaction.next(self.db)?;
        let transaction = transaction.into_transaction(id);
        self.put(CF_TRANSACTIONS, id.to_be_bytes().to_vec(), &transaction)?;
        Ok(transaction)
    }

    async fn save_transaction(&mut self, transaction: Transaction) -> Result<()> {
        let key = transaction.id.to_be_bytes().to_vec();
        self.require_lock(CF_TRANSACTIONS, &key)?;
        self.put(CF_TRANSACTIONS, key, &transaction)
    }

    async fn installments(&mut self, transaction_id: TransactionId) -> Result<Vec<InstallmentLog>> {
        self.scan(CF_INSTALLMENTS, &transaction_id.to_be_bytes())
    }

    async fn insert_installments(
        &mut self,
        transaction_id: TransactionId,
        schedule: Vec<ScheduledInstallment>,
    ) -> Result<Vec<InstallmentLog>> {
        let mut logs = Vec::with_capacity(schedule.len());
        for row in schedule {
            let log = row.into_log(self.ids.installment.next(self.db)?, transaction_id);
            self.put(CF_INSTALLMENTS, installment_key(transaction_id, log.month), &log)?;
            logs.push(log);
        }
        Ok(logs)
    }

    async fn mark_installment_paid(
        &mut self,
        transaction_id: TransactionId,
        month: u32,
        paid_at: DateTime<Utc>,
    ) -> Result<()> {
        let key = installment_key(transaction_id, month);
        let Some(mut log) = self.lock_row::<InstallmentLog>(CF_INSTALLMENTS, key.clone())? else {
            return Err(LedgerError::persistence(format!(
                "installment {month} of transaction {transaction_id} not found"
            )));
        };
        if log.paid_at.is_none() {
            log.paid_at = Some(paid_at);
            self.put(CF_INSTALLMENTS, key, &log)?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }
}
