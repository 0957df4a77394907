use super::csv::command_reader::{LedgerCommand, LedgerRequest};
use crate::application::engine::LendingEngine;
use crate::domain::installment::PaymentUpdate;
use crate::domain::ports::ClockRef;
use crate::error::Result;
use crate::infrastructure::in_memory::InMemoryCustomerDirectory;
use tracing::{error, warn};

/// Outcome counts of one batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub applied: usize,
    /// Commands refused by a business rule.
    pub rejected: usize,
    /// Unreadable rows and infrastructure failures.
    pub failed: usize,
}

/// Feeds CSV commands through a [`LendingEngine`].
///
/// Salary rows are written to the customer directory before limits are
/// recomputed, standing in for the customer subsystem that owns those
/// records. A failed command never stops the batch.
pub struct BatchRunner {
    engine: LendingEngine,
    directory: InMemoryCustomerDirectory,
    clock: ClockRef,
}

impl BatchRunner {
    pub fn new(engine: LendingEngine, directory: InMemoryCustomerDirectory, clock: ClockRef) -> Self {
        Self {
            engine,
            directory,
            clock,
        }
    }

    pub fn engine(&self) -> &LendingEngine {
        &self.engine
    }

    pub async fn run<I>(&self, commands: I) -> BatchSummary
    where
        I: IntoIterator<Item = Result<LedgerCommand>>,
    {
        let mut summary = BatchSummary::default();
        for (index, command) in commands.into_iter().enumerate() {
            let line = index + 2;
            let outcome = match command {
                Ok(command) => self.execute(command).await,
                Err(e) => {
                    error!(line, error = %e, "unreadable command");
                    summary.failed += 1;
                    continue;
                }
            };
            match outcome {
                Ok(()) => summary.applied += 1,
                Err(e) if e.is_rejection() => {
                    warn!(line, error = %e, "command rejected");
                    summary.rejected += 1;
                }
                Err(e) => {
                    error!(line, error = %e, "command failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    pub async fn execute(&self, command: LedgerCommand) -> Result<()> {
        match command.into_request()? {
            LedgerRequest::Salary(customer) => {
                let id = customer.id;
                self.directory.upsert(customer).await;
                self.engine.recompute_for_customer(id).await?;
            }
            LedgerRequest::Open(request) => {
                self.engine.open_financing(request).await?;
            }
            LedgerRequest::Pay {
                transaction_id,
                payments,
            } => {
                let paid_at = self.clock.now();
                let updates = payments
                    .into_iter()
                    .map(|(month, amount)| PaymentUpdate {
                        month,
                        amount,
                        paid_at,
                    })
                    .collect();
                self.engine.apply_payments(transaction_id, updates).await?;
            }
            LedgerRequest::PayOff { transaction_id } => {
                self.engine.pay_off(transaction_id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::money::Money;
    use crate::domain::transaction::TransactionStatus;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use crate::interfaces::csv::command_reader::CommandReader;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn runner() -> BatchRunner {
        let store = Arc::new(InMemoryLedgerStore::new());
        let directory = InMemoryCustomerDirectory::new();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap(),
        ));
        let engine = LendingEngine::new(
            store,
            Arc::new(directory.clone()),
            clock.clone(),
            EngineConfig::default(),
        );
        BatchRunner::new(engine, directory, clock)
    }

    fn commands(rows: &str) -> Vec<Result<LedgerCommand>> {
        let data = format!(
            "type,customer,name,salary,tenor,otr,admin_fee,installment,asset,tx,payments\n{rows}"
        );
        CommandReader::new(data.as_bytes()).commands().collect()
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let runner = runner();
        let summary = runner
            .run(commands(
                "salary, 1, Budi, 1334, , , , , , ,\n\
                 open, 1, , , 3, 400, 100, 300, Motorcycle, ,\n\
                 pay, , , , , , , , , 1, 1=100;2=100\n\
                 pay, , , , , , , , , 1, 3=100\n",
            ))
            .await;

        assert_eq!(
            summary,
            BatchSummary {
                applied: 4,
                rejected: 0,
                failed: 0
            }
        );
        let tx = runner.engine().get_transaction(1).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::PaidOff);
        let buckets = runner.engine().get_buckets_by_customer(1).await.unwrap();
        let tenor3 = buckets.iter().find(|b| b.tenor.months() == 3).unwrap();
        assert_eq!(tenor3.amount, Money::new(200));
    }

    #[tokio::test]
    async fn test_rejections_and_failures_are_counted() {
        let runner = runner();
        let summary = runner
            .run(commands(
                "salary, 1, Budi, 1334, , , , , , ,\n\
                 open, 1, , , 1, 400, 100, 300, Motorcycle, ,\n\
                 payoff, , , , , , , , , 9,\n\
                 withdraw, 1, , , , , , , , ,\n",
            ))
            .await;

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_open_for_unknown_customer_is_rejected() {
        let runner = runner();
        let summary = runner
            .run(commands("open, 5, , , 3, 10, 0, 10, Phone, ,\n"))
            .await;
        assert_eq!(summary.rejected, 1);
    }
}
