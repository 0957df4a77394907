#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use lendledger::application::engine::LendingEngine;
use lendledger::application::transaction_engine::OpenRequest;
use lendledger::config::EngineConfig;
use lendledger::domain::customer::{Customer, CustomerId};
use lendledger::domain::limit::Tenor;
use lendledger::domain::money::Money;
use lendledger::domain::transaction::Financing;
use lendledger::infrastructure::clock::FixedClock;
use lendledger::infrastructure::in_memory::{InMemoryCustomerDirectory, InMemoryLedgerStore};
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub const HEADER: [&str; 11] = [
    "type",
    "customer",
    "name",
    "salary",
    "tenor",
    "otr",
    "admin_fee",
    "installment",
    "asset",
    "tx",
    "payments",
];

pub struct Harness {
    pub engine: LendingEngine,
    pub store: Arc<InMemoryLedgerStore>,
    pub directory: InMemoryCustomerDirectory,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub async fn onboard(&self, id: CustomerId, salary: i64) {
        self.directory
            .upsert(Customer::new(id, format!("customer {id}"), Money::new(salary)))
            .await;
        self.engine.recompute_for_customer(id).await.unwrap();
    }
}

/// Mid-January 2026, 10:00 in Jakarta.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryLedgerStore::new());
    let directory = InMemoryCustomerDirectory::new();
    let clock = Arc::new(FixedClock::new(start_time()));
    let engine = LendingEngine::new(
        store.clone(),
        Arc::new(directory.clone()),
        clock.clone(),
        EngineConfig::default(),
    );
    Harness {
        engine,
        store,
        directory,
        clock,
    }
}

pub fn open_request(
    customer_id: CustomerId,
    months: u32,
    otr: i64,
    admin_fee: i64,
    installment_total: i64,
) -> OpenRequest {
    OpenRequest {
        customer_id,
        tenor: Tenor::new(months).unwrap(),
        financing: Financing::new(otr, admin_fee, installment_total).unwrap(),
        asset_name: "Motorcycle".to_string(),
    }
}

/// Writes a command file; each row lists `type` then the remaining columns in header order.
pub fn write_commands(path: &Path, rows: &[[&str; 11]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(HEADER)?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn salary_row<'a>(customer: &'a str, salary: &'a str) -> [&'a str; 11] {
    ["salary", customer, "", salary, "", "", "", "", "", "", ""]
}

pub fn open_row<'a>(
    customer: &'a str,
    tenor: &'a str,
    otr: &'a str,
    admin_fee: &'a str,
    installment: &'a str,
) -> [&'a str; 11] {
    [
        "open", customer, "", "", tenor, otr, admin_fee, installment, "Motorcycle", "", "",
    ]
}

pub fn pay_row<'a>(tx: &'a str, payments: &'a str) -> [&'a str; 11] {
    ["pay", "", "", "", "", "", "", "", "", tx, payments]
}
