use crate::domain::customer::CustomerId;
use crate::domain::limit::Tenor;
use crate::domain::ports::{ClockRef, LedgerStoreRef};
use crate::domain::transaction::{Financing, NewTransaction, Transaction, TransactionId};
use crate::error::{LedgerError, Result};
use tracing::{debug, info};

/// A request to finance `asset_name` against the customer's bucket at `tenor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub customer_id: CustomerId,
    pub tenor: Tenor,
    pub financing: Financing,
    pub asset_name: String,
}

/// Admits financing transactions and drives them to `PaidOff`.
#[derive(Clone)]
pub struct TransactionEngine {
    store: LedgerStoreRef,
    clock: ClockRef,
}

impl TransactionEngine {
    pub fn new(store: LedgerStoreRef, clock: ClockRef) -> Self {
        Self { store, clock }
    }

    /// Opens a transaction and debits its cost from the matching bucket.
    ///
    /// The bucket row stays locked from the sufficiency check until commit, so
    /// concurrent opens on the same bucket are admitted one at a time against
    /// the balance the previous one left behind. Any failure leaves the bucket
    /// untouched.
    ///
    /// Not idempotent: retrying after an ambiguous failure can debit twice.
    pub async fn open(&self, request: OpenRequest) -> Result<Transaction> {
        let OpenRequest {
            customer_id,
            tenor,
            financing,
            asset_name,
        } = request;
        let required = financing.required()?;

        let mut uow = self.store.begin().await?;
        let Some(mut bucket) = uow.lock_bucket(customer_id, tenor).await? else {
            info!(customer_id, %tenor, "financing rejected: no limit bucket");
            return Err(LedgerError::LimitNotFound { customer_id, tenor });
        };

        if let Err(rejection) = bucket.reserve(required) {
            info!(
                customer_id,
                %tenor,
                %required,
                available = %bucket.amount,
                "financing rejected: insufficient limit"
            );
            return Err(rejection);
        }

        let transaction = uow
            .insert_transaction(NewTransaction {
                customer_id,
                limit_bucket_id: bucket.id,
                tenor,
                financing,
                asset_name,
                created_at: self.clock.now(),
            })
            .await?;
        let remaining = bucket.amount;
        uow.save_bucket(bucket).await?;
        uow.commit().await?;

        info!(
            transaction_id = transaction.id,
            customer_id,
            %tenor,
            %required,
            %remaining,
            "transaction opened"
        );
        Ok(transaction)
    }

    /// Marks the transaction paid off once every installment is paid.
    ///
    /// Calling it on a transaction that is already paid off returns it
    /// unchanged. A transaction without any installment rows is never
    /// considered fully paid.
    pub async fn pay_off(&self, transaction_id: TransactionId) -> Result<Transaction> {
        let mut uow = self.store.begin().await?;
        let Some(mut transaction) = uow.lock_transaction(transaction_id).await? else {
            return Err(LedgerError::TransactionNotFound(transaction_id));
        };
        if transaction.is_paid_off() {
            debug!(transaction_id, "transaction already paid off");
            return Ok(transaction);
        }

        let installments = uow.installments(transaction_id).await?;
        if installments.is_empty() || installments.iter().any(|log| !log.is_paid()) {
            return Err(LedgerError::NotFullyPaid(transaction_id));
        }

        transaction.mark_paid_off();
        uow.save_transaction(transaction.clone()).await?;
        uow.commit().await?;

        info!(transaction_id, "transaction paid off");
        Ok(transaction)
    }

    pub async fn get(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        self.store.transaction(transaction_id).await
    }
}
