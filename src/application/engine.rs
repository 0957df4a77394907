use super::installment_reconciler::InstallmentReconciler;
use super::installment_scheduler::InstallmentScheduler;
use super::limit_ledger::LimitLedger;
use super::transaction_engine::{OpenRequest, TransactionEngine};
use crate::config::EngineConfig;
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::installment::{InstallmentLog, PaymentUpdate};
use crate::domain::limit::{LimitBucket, Tenor};
use crate::domain::money::Money;
use crate::domain::ports::{ClockRef, CustomerLookupRef, LedgerStoreRef};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::Result;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use tracing::error;

/// A freshly opened transaction together with its repayment plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedFinancing {
    pub transaction: Transaction,
    pub installments: Vec<InstallmentLog>,
}

/// A transaction joined with the records a back-office screen shows next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionView {
    pub transaction: Transaction,
    pub customer: Option<Customer>,
    /// The customer's current bucket at the transaction's tenor.
    pub bucket: Option<LimitBucket>,
    pub installments: Vec<InstallmentLog>,
}

impl TransactionView {
    pub fn paid_months(&self) -> usize {
        self.installments.iter().filter(|log| log.is_paid()).count()
    }

    pub fn outstanding(&self) -> Money {
        self.installments
            .iter()
            .filter(|log| !log.is_paid())
            .map(|log| log.amount)
            .sum()
    }
}

/// The entry point for the excluded HTTP layer.
///
/// `LendingEngine` wires the limit ledger, transaction engine, scheduler and
/// reconciler to one store, customer lookup and clock. It is cheap to clone
/// and every clone shares the same store, so request handlers can each hold
/// their own copy.
#[derive(Clone)]
pub struct LendingEngine {
    store: LedgerStoreRef,
    customers: CustomerLookupRef,
    limits: LimitLedger,
    transactions: TransactionEngine,
    scheduler: InstallmentScheduler,
    reconciler: InstallmentReconciler,
}

impl LendingEngine {
    /// Creates a new `LendingEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - Persistence for buckets, transactions and installments.
    /// * `customers` - Read access to the customer subsystem.
    /// * `clock` - Source of `now` for creation times and due dates.
    /// * `config` - Engine settings such as the due-date time zone.
    pub fn new(
        store: LedgerStoreRef,
        customers: CustomerLookupRef,
        clock: ClockRef,
        config: EngineConfig,
    ) -> Self {
        let transactions = TransactionEngine::new(store.clone(), clock.clone());
        Self {
            limits: LimitLedger::new(store.clone(), customers.clone()),
            scheduler: InstallmentScheduler::new(store.clone(), clock, config.reference_offset),
            reconciler: InstallmentReconciler::new(store.clone(), transactions.clone()),
            transactions,
            customers,
            store,
        }
    }

    pub async fn recompute_limit(
        &self,
        customer_id: CustomerId,
        salary: Money,
    ) -> Result<Vec<LimitBucket>> {
        self.limits.recompute(customer_id, salary).await
    }

    /// Refreshes borrowing power after the customer's salary changed.
    pub async fn recompute_for_customer(&self, customer_id: CustomerId) -> Result<Vec<LimitBucket>> {
        self.limits.recompute_for_customer(customer_id).await
    }

    pub async fn open_transaction(&self, request: OpenRequest) -> Result<Transaction> {
        self.transactions.open(request).await
    }

    pub async fn generate_schedule(
        &self,
        transaction_id: TransactionId,
        total: Money,
        tenor: Tenor,
    ) -> Result<Vec<InstallmentLog>> {
        self.scheduler.generate(transaction_id, total, tenor).await
    }

    /// Opens the transaction and immediately materializes its schedule.
    ///
    /// The two steps commit separately. If scheduling fails the transaction
    /// stays open and the error is returned; retry with
    /// [`LendingEngine::generate_schedule`], never by reopening.
    pub async fn open_financing(&self, request: OpenRequest) -> Result<OpenedFinancing> {
        let transaction = self.transactions.open(request).await?;
        let installments = self
            .scheduler
            .generate(transaction.id, transaction.installment_total, transaction.tenor)
            .await
            .inspect_err(|e| {
                error!(
                    transaction_id = transaction.id,
                    error = %e,
                    "transaction opened but schedule generation failed"
                );
            })?;
        Ok(OpenedFinancing {
            transaction,
            installments,
        })
    }

    pub async fn apply_payments(
        &self,
        transaction_id: TransactionId,
        updates: Vec<PaymentUpdate>,
    ) -> Result<Vec<InstallmentLog>> {
        self.reconciler.apply_payments(transaction_id, updates).await
    }

    pub async fn pay_off(&self, transaction_id: TransactionId) -> Result<Transaction> {
        self.transactions.pay_off(transaction_id).await
    }

    pub async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        self.transactions.get(transaction_id).await
    }

    pub async fn get_buckets_by_customer(&self, customer_id: CustomerId) -> Result<Vec<LimitBucket>> {
        self.limits.buckets(customer_id).await
    }

    pub async fn all_buckets(&self) -> Result<Vec<LimitBucket>> {
        self.store.all_buckets().await
    }

    /// Unpaid installments due on `date` in the reference time zone.
    pub async fn list_due_installments(&self, date: NaiveDate) -> Result<Vec<InstallmentLog>> {
        self.store.due_installments(date).await
    }

    pub async fn customer_transactions(&self, customer_id: CustomerId) -> Result<Vec<TransactionView>> {
        let transactions = self.store.transactions_by_customer(customer_id).await?;
        self.views(transactions).await
    }

    /// Every transaction with its customer, bucket and schedule.
    pub async fn transaction_report(&self) -> Result<Vec<TransactionView>> {
        let transactions = self.store.all_transactions().await?;
        self.views(transactions).await
    }

    async fn views(&self, transactions: Vec<Transaction>) -> Result<Vec<TransactionView>> {
        let customer_ids: Vec<CustomerId> = transactions
            .iter()
            .map(|tx| tx.customer_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let transaction_ids: Vec<TransactionId> = transactions.iter().map(|tx| tx.id).collect();

        let customers = self.customers.customers(&customer_ids).await?;
        let buckets = match customer_ids.as_slice() {
            [single] => self.store.buckets_by_customer(*single).await?,
            _ => self.store.all_buckets().await?,
        };
        let installments = self.store.installments_for(&transaction_ids).await?;

        Ok(build_views(transactions, customers, buckets, installments))
    }
}

/// Joins transactions with their related rows through keyed lookups built once.
fn build_views(
    transactions: Vec<Transaction>,
    customers: Vec<Customer>,
    buckets: Vec<LimitBucket>,
    installments: Vec<InstallmentLog>,
) -> Vec<TransactionView> {
    let customers: HashMap<CustomerId, Customer> =
        customers.into_iter().map(|c| (c.id, c)).collect();
    let buckets: HashMap<(CustomerId, Tenor), LimitBucket> = buckets
        .into_iter()
        .map(|b| ((b.customer_id, b.tenor), b))
        .collect();
    let mut schedules: HashMap<TransactionId, Vec<InstallmentLog>> = HashMap::new();
    for log in installments {
        schedules.entry(log.transaction_id).or_default().push(log);
    }

    transactions
        .into_iter()
        .map(|transaction| {
            let mut installments = schedules.remove(&transaction.id).unwrap_or_default();
            installments.sort_by_key(|log| log.month);
            TransactionView {
                customer: customers.get(&transaction.customer_id).cloned(),
                bucket: buckets
                    .get(&(transaction.customer_id, transaction.tenor))
                    .cloned(),
                installments,
                transaction,
            }
        })
        .collect()
}
