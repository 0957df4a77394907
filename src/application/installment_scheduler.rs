use crate::domain::installment::{InstallmentLog, build_schedule};
use crate::domain::limit::Tenor;
use crate::domain::money::Money;
use crate::domain::ports::{ClockRef, LedgerStoreRef};
use crate::domain::transaction::TransactionId;
use crate::error::{LedgerError, Result};
use chrono::FixedOffset;
use tracing::info;

/// Materializes the monthly repayment plan of a transaction.
#[derive(Clone)]
pub struct InstallmentScheduler {
    store: LedgerStoreRef,
    clock: ClockRef,
    reference_offset: FixedOffset,
}

impl InstallmentScheduler {
    pub fn new(store: LedgerStoreRef, clock: ClockRef, reference_offset: FixedOffset) -> Self {
        Self {
            store,
            clock,
            reference_offset,
        }
    }

    /// Inserts `tenor` installment rows summing exactly to `total`.
    ///
    /// `total` and `tenor` must match the transaction's own installment total
    /// and tenor, otherwise the call fails with [`LedgerError::ValidationError`].
    ///
    /// A transaction gets one schedule; a second call fails with
    /// [`LedgerError::ScheduleExists`] rather than duplicating rows.
    pub async fn generate(
        &self,
        transaction_id: TransactionId,
        total: Money,
        tenor: Tenor,
    ) -> Result<Vec<InstallmentLog>> {
        let schedule = build_schedule(total, tenor, self.clock.now(), self.reference_offset)?;

        let mut uow = self.store.begin().await?;
        let Some(transaction) = uow.lock_transaction(transaction_id).await? else {
            return Err(LedgerError::TransactionNotFound(transaction_id));
        };
        if transaction.installment_total != total || transaction.tenor != tenor {
            return Err(LedgerError::ValidationError(format!(
                "schedule of {total} over {tenor} months does not match transaction {transaction_id} ({} over {} months)",
                transaction.installment_total, transaction.tenor
            )));
        }
        if !uow.installments(transaction_id).await?.is_empty() {
            return Err(LedgerError::ScheduleExists(transaction_id));
        }
        let logs = uow.insert_installments(transaction_id, schedule).await?;
        uow.commit().await?;

        info!(
            transaction_id,
            %total,
            %tenor,
            first_due = ?logs.first().map(|log| log.due_date),
            "installment schedule generated"
        );
        Ok(logs)
    }
}
