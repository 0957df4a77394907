use crate::domain::customer::CustomerId;
use crate::domain::limit::{LimitBucket, compute_limits};
use crate::domain::money::Money;
use crate::domain::ports::{CustomerLookupRef, LedgerStoreRef};
use crate::error::{LedgerError, Result};
use tracing::info;

/// Owns the per-tenor limit buckets of every customer.
///
/// A recompute always replaces the customer's whole bucket set inside one unit
/// of work; there is no merge with, or carry-over from, the previous set.
#[derive(Clone)]
pub struct LimitLedger {
    store: LedgerStoreRef,
    customers: CustomerLookupRef,
}

impl LimitLedger {
    pub fn new(store: LedgerStoreRef, customers: CustomerLookupRef) -> Self {
        Self { store, customers }
    }

    /// Derives fresh buckets from `salary` and swaps them in for `customer_id`.
    pub async fn recompute(&self, customer_id: CustomerId, salary: Money) -> Result<Vec<LimitBucket>> {
        let limits = compute_limits(salary)?;

        let mut uow = self.store.begin().await?;
        let buckets = uow.replace_buckets(customer_id, limits).await?;
        uow.commit().await?;

        info!(customer_id, %salary, buckets = buckets.len(), "limit buckets recomputed");
        Ok(buckets)
    }

    /// Recomputes from the salary currently on the customer record.
    pub async fn recompute_for_customer(&self, customer_id: CustomerId) -> Result<Vec<LimitBucket>> {
        let customer = self
            .customers
            .customer(customer_id)
            .await?
            .ok_or(LedgerError::CustomerNotFound(customer_id))?;
        self.recompute(customer.id, customer.salary).await
    }

    pub async fn buckets(&self, customer_id: CustomerId) -> Result<Vec<LimitBucket>> {
        self.store.buckets_by_customer(customer_id).await
    }
}
