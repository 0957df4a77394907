use super::transaction_engine::TransactionEngine;
use crate::domain::installment::{InstallmentLog, PaymentUpdate, validate_payments};
use crate::domain::ports::LedgerStoreRef;
use crate::domain::transaction::TransactionId;
use crate::error::{LedgerError, Result};
use tracing::{debug, info};

/// Applies customer payments to the installment ledger.
#[derive(Clone)]
pub struct InstallmentReconciler {
    store: LedgerStoreRef,
    transactions: TransactionEngine,
}

impl InstallmentReconciler {
    pub fn new(store: LedgerStoreRef, transactions: TransactionEngine) -> Self {
        Self {
            store,
            transactions,
        }
    }

    /// Marks the months in `updates` paid, all or nothing.
    ///
    /// The batch is accepted only if its total equals what is outstanding for
    /// exactly the months it names. Afterwards the transaction is paid off if
    /// nothing remains; outstanding months are not an error here.
    ///
    /// Returns the transaction's full schedule after the update.
    pub async fn apply_payments(
        &self,
        transaction_id: TransactionId,
        updates: Vec<PaymentUpdate>,
    ) -> Result<Vec<InstallmentLog>> {
        let mut uow = self.store.begin().await?;
        if uow.lock_transaction(transaction_id).await?.is_none() {
            return Err(LedgerError::TransactionNotFound(transaction_id));
        }

        let logs = uow.installments(transaction_id).await?;
        let paid = match validate_payments(&logs, &updates) {
            Ok(paid) => paid,
            Err(rejection) => {
                info!(transaction_id, error = %rejection, "payment batch rejected");
                return Err(rejection);
            }
        };

        for update in &updates {
            uow.mark_installment_paid(transaction_id, update.month, update.paid_at)
                .await?;
        }
        uow.commit().await?;
        info!(transaction_id, %paid, months = updates.len(), "payments applied");

        match self.transactions.pay_off(transaction_id).await {
            Ok(_) => {}
            Err(LedgerError::NotFullyPaid(_)) => {
                debug!(transaction_id, "installments still outstanding");
            }
            Err(e) => return Err(e),
        }

        self.store.installments(transaction_id).await
    }
}
