use super::money::Money;
use serde::{Deserialize, Serialize};

pub type CustomerId = u64;

/// The slice of a customer record the ledger needs.
///
/// Customers are owned by the customer subsystem; the ledger only ever holds
/// them by id and reads them through [`CustomerLookup`](super::ports::CustomerLookup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub full_name: String,
    pub salary: Money,
}

impl Customer {
    pub fn new(id: CustomerId, full_name: impl Into<String>, salary: Money) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            salary,
        }
    }
}
