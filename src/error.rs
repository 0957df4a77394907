use crate::domain::customer::CustomerId;
use crate::domain::limit::Tenor;
use crate::domain::money::Money;
use crate::domain::transaction::TransactionId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("no limit bucket for customer {customer_id} at tenor {tenor}")]
    LimitNotFound { customer_id: CustomerId, tenor: Tenor },
    #[error("insufficient limit: need {required}, available {available}")]
    InsufficientLimit { required: Money, available: Money },
    #[error("installment total mismatch: expected {expected}, got {actual}")]
    InstallmentMismatch { expected: Money, actual: Money },
    #[error("transaction {0} still has unpaid installments")]
    NotFullyPaid(TransactionId),
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),
    #[error("transaction {0} already has an installment schedule")]
    ScheduleExists(TransactionId),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Persistence error: {0}")]
    PersistenceError(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Lock acquisition timed out: {0}")]
    LockTimeout(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LedgerError {
    /// Business rejections are expected outcomes of a well-formed request.
    /// Everything else means the unit of work did not complete.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::LimitNotFound { .. }
                | LedgerError::InsufficientLimit { .. }
                | LedgerError::InstallmentMismatch { .. }
                | LedgerError::NotFullyPaid(_)
                | LedgerError::TransactionNotFound(_)
                | LedgerError::CustomerNotFound(_)
                | LedgerError::ScheduleExists(_)
                | LedgerError::ValidationError(_)
        )
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        LedgerError::PersistenceError(Box::new(std::io::Error::other(message.into())))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            rocksdb::ErrorKind::TimedOut | rocksdb::ErrorKind::Busy => {
                LedgerError::LockTimeout(err.into_string())
            }
            _ => LedgerError::PersistenceError(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::PersistenceError(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_not_faults() {
        assert!(LedgerError::NotFullyPaid(1).is_rejection());
        assert!(
            LedgerError::InsufficientLimit {
                required: Money::new(300),
                available: Money::new(200),
            }
            .is_rejection()
        );
        assert!(!LedgerError::persistence("disk gone").is_rejection());
        assert!(!LedgerError::LockTimeout("bucket 1".into()).is_rejection());
    }

    #[test]
    fn test_error_messages() {
        let err = LedgerError::InstallmentMismatch {
            expected: Money::new(200),
            actual: Money::new(150),
        };
        assert_eq!(
            err.to_string(),
            "installment total mismatch: expected 200, got 150"
        );
    }
}
