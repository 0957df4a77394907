use crate::application::transaction_engine::OpenRequest;
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::limit::Tenor;
use crate::domain::money::Money;
use crate::domain::transaction::{Financing, TransactionId};
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Onboard a customer or change their salary; recomputes limits.
    Salary,
    /// Open a financing transaction and generate its schedule.
    Open,
    /// Apply a payment batch.
    Pay,
    /// Explicitly attempt to pay off a transaction.
    Payoff,
}

/// One row of a ledger command file.
///
/// Which columns are required depends on `type`; the rest are left empty.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct LedgerCommand {
    pub r#type: CommandType,
    #[serde(default)]
    pub customer: Option<CustomerId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub salary: Option<i64>,
    #[serde(default)]
    pub tenor: Option<u32>,
    #[serde(default)]
    pub otr: Option<i64>,
    #[serde(default)]
    pub admin_fee: Option<i64>,
    #[serde(default)]
    pub installment: Option<i64>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub tx: Option<TransactionId>,
    /// `month=amount` pairs separated by `;`, e.g. `1=100;2=100`.
    #[serde(default)]
    pub payments: Option<String>,
}

/// A command with every field it needs present and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerRequest {
    Salary(Customer),
    Open(OpenRequest),
    Pay {
        transaction_id: TransactionId,
        payments: Vec<(u32, Money)>,
    },
    PayOff {
        transaction_id: TransactionId,
    },
}

fn required<T>(value: Option<T>, field: &str, command: &str) -> Result<T> {
    value.ok_or_else(|| LedgerError::ValidationError(format!("{command} requires {field}")))
}

impl LedgerCommand {
    pub fn into_request(self) -> Result<LedgerRequest> {
        match self.r#type {
            CommandType::Salary => {
                let id = required(self.customer, "customer", "salary")?;
                let salary = Money::non_negative(required(self.salary, "salary", "salary")?, "salary")?;
                let name = self
                    .name
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| format!("customer {id}"));
                Ok(LedgerRequest::Salary(Customer::new(id, name, salary)))
            }
            CommandType::Open => Ok(LedgerRequest::Open(OpenRequest {
                customer_id: required(self.customer, "customer", "open")?,
                tenor: Tenor::new(required(self.tenor, "tenor", "open")?)?,
                financing: Financing::new(
                    required(self.otr, "otr", "open")?,
                    self.admin_fee.unwrap_or(0),
                    required(self.installment, "installment", "open")?,
                )?,
                asset_name: self.asset.unwrap_or_default(),
            })),
            CommandType::Pay => Ok(LedgerRequest::Pay {
                transaction_id: required(self.tx, "tx", "pay")?,
                payments: parse_payments(&required(self.payments, "payments", "pay")?)?,
            }),
            CommandType::Payoff => Ok(LedgerRequest::PayOff {
                transaction_id: required(self.tx, "tx", "payoff")?,
            }),
        }
    }
}

/// Parses `1=100;2=100` into `[(1, 100), (2, 100)]`.
pub fn parse_payments(raw: &str) -> Result<Vec<(u32, Money)>> {
    raw.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let invalid = || LedgerError::ValidationError(format!("invalid payment entry '{part}'"));
            let (month, amount) = part.split_once('=').ok_or_else(invalid)?;
            let month: u32 = month.trim().parse().map_err(|_| invalid())?;
            let amount: i64 = amount.trim().parse().map_err(|_| invalid())?;
            Ok((month, Money::non_negative(amount, "payment amount")?))
        })
        .collect()
}

/// Reads ledger commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<LedgerCommand>`.
/// It handles whitespace trimming and short trailing records automatically.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<LedgerCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "type,customer,name,salary,tenor,otr,admin_fee,installment,asset,tx,payments";

    fn read(rows: &str) -> Vec<Result<LedgerCommand>> {
        let data = format!("{HEADER}\n{rows}");
        CommandReader::new(data.as_bytes()).commands().collect()
    }

    #[test]
    fn test_reader_valid_stream() {
        let results = read(
            "salary, 1, Budi, 1334, , , , , , ,\n\
             open, 1, , , 3, 400, 100, 300, Motorcycle, ,\n\
             pay, , , , , , , , , 1, 1=100;2=100\n",
        );
        assert_eq!(results.len(), 3);

        let salary = results[0].as_ref().unwrap();
        assert_eq!(salary.r#type, CommandType::Salary);
        assert_eq!(salary.salary, Some(1334));
        assert_eq!(salary.otr, None);

        let pay = results[2].as_ref().unwrap();
        assert_eq!(pay.tx, Some(1));
        assert_eq!(pay.payments.as_deref(), Some("1=100;2=100"));
    }

    #[test]
    fn test_reader_malformed_line() {
        let results = read("refund, 1, , , , , , , , ,\nopen, abc, , , 3, 1, 1, 1, , ,\n");
        assert!(results[0].is_err());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_open_into_request() {
        let command = read("open, 1, , , 3, 400, 100, 300, Motorcycle, ,\n")
            .remove(0)
            .unwrap();
        match command.into_request().unwrap() {
            LedgerRequest::Open(request) => {
                assert_eq!(request.customer_id, 1);
                assert_eq!(request.tenor.months(), 3);
                assert_eq!(request.financing.required().unwrap(), Money::new(800));
                assert_eq!(request.asset_name, "Motorcycle");
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let command = read("open, 1, , , , 400, 100, 300, , ,\n").remove(0).unwrap();
        assert!(matches!(
            command.into_request(),
            Err(LedgerError::ValidationError(msg)) if msg == "open requires tenor"
        ));
    }

    #[test]
    fn test_salary_defaults_name() {
        let command = read("salary, 4, , 2000, , , , , , ,\n").remove(0).unwrap();
        assert_eq!(
            command.into_request().unwrap(),
            LedgerRequest::Salary(Customer::new(4, "customer 4", Money::new(2000)))
        );
    }

    #[test]
    fn test_parse_payments() {
        assert_eq!(
            parse_payments("1=100; 2=150").unwrap(),
            vec![(1, Money::new(100)), (2, Money::new(150))]
        );
        assert!(parse_payments("1-100").is_err());
        assert!(parse_payments("x=1").is_err());
        assert!(parse_payments("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_payments_rejects_negative_amount() {
        assert!(matches!(
            parse_payments("1=100;2=-5"),
            Err(LedgerError::ValidationError(_))
        ));
    }
}
