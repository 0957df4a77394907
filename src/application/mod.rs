//! Application layer containing the ledger's business operations.
//!
//! Each component takes its store, customer lookup and clock as constructor
//! arguments. [`engine::LendingEngine`] wires them together and is the only
//! type callers outside this crate need.

pub mod engine;
pub mod installment_reconciler;
pub mod installment_scheduler;
pub mod limit_ledger;
pub mod transaction_engine;
