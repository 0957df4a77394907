//! Lending back-office core.
//!
//! Tracks per-tenor credit limits derived from salary, opens financing
//! transactions against them, schedules monthly installments and reconciles
//! payments. The [`application::engine::LendingEngine`] is the entry point;
//! storage and customer data are reached through the traits in
//! [`domain::ports`].

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod telemetry;
