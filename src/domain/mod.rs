//! Domain layer: ledger entities, the limit and installment policies, and the
//! ports the application layer is written against.

pub mod customer;
pub mod installment;
pub mod limit;
pub mod money;
pub mod ports;
pub mod transaction;
