use crate::application::engine::TransactionView;
use crate::domain::customer::CustomerId;
use crate::domain::installment::InstallmentLog;
use crate::domain::limit::{LimitBucket, Tenor};
use crate::domain::money::Money;
use crate::domain::transaction::TransactionId;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BucketRow {
    customer: CustomerId,
    tenor: Tenor,
    amount: Money,
}

#[derive(Serialize)]
struct TransactionRow<'a> {
    id: TransactionId,
    contract_no: &'a str,
    customer: CustomerId,
    customer_name: &'a str,
    tenor: Tenor,
    otr: Money,
    admin_fee: Money,
    installment: Money,
    asset: &'a str,
    status: &'static str,
    paid_months: usize,
    outstanding: Money,
}

#[derive(Serialize)]
struct DueRow {
    transaction: TransactionId,
    month: u32,
    amount: Money,
    due_date: NaiveDate,
}

/// Writes ledger reports as CSV sections separated by a blank line.
pub struct ReportWriter<W: Write> {
    inner: W,
    sections: usize,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, sections: 0 }
    }

    /// Writes one row per bucket, ordered by customer then tenor.
    pub fn write_buckets(&mut self, mut buckets: Vec<LimitBucket>) -> Result<()> {
        buckets.sort_by_key(|b| (b.customer_id, b.tenor));
        self.section(buckets.into_iter().map(|b| BucketRow {
            customer: b.customer_id,
            tenor: b.tenor,
            amount: b.amount,
        }))
    }

    pub fn write_transactions(&mut self, views: &[TransactionView]) -> Result<()> {
        self.section(views.iter().map(|view| {
            let tx = &view.transaction;
            TransactionRow {
                id: tx.id,
                contract_no: &tx.contract_no,
                customer: tx.customer_id,
                customer_name: view.customer.as_ref().map_or("", |c| c.full_name.as_str()),
                tenor: tx.tenor,
                otr: tx.otr,
                admin_fee: tx.admin_fee,
                installment: tx.installment_total,
                asset: &tx.asset_name,
                status: tx.status.as_str(),
                paid_months: view.paid_months(),
                outstanding: view.outstanding(),
            }
        }))
    }

    pub fn write_due(&mut self, installments: &[InstallmentLog]) -> Result<()> {
        self.section(installments.iter().map(|log| DueRow {
            transaction: log.transaction_id,
            month: log.month,
            amount: log.amount,
            due_date: log.due_date,
        }))
    }

    fn section<T: Serialize>(&mut self, rows: impl IntoIterator<Item = T>) -> Result<()> {
        if self.sections > 0 {
            writeln!(self.inner)?;
        }
        self.sections += 1;

        // Headers come from the first serialized row, so an empty section is empty.
        let mut wtr = csv::Writer::from_writer(&mut self.inner);
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::Customer;
    use crate::domain::transaction::{Transaction, TransactionStatus};
    use chrono::{TimeZone, Utc};

    fn bucket(customer_id: CustomerId, months: u32, amount: i64) -> LimitBucket {
        LimitBucket {
            id: u64::from(months),
            customer_id,
            tenor: Tenor::new(months).unwrap(),
            amount: Money::new(amount),
        }
    }

    fn log(month: u32, paid: bool) -> InstallmentLog {
        InstallmentLog {
            id: u64::from(month),
            transaction_id: 1,
            month,
            amount: Money::new(100),
            due_date: NaiveDate::from_ymd_opt(2026, 1 + month, 1).unwrap(),
            paid_at: paid.then(|| Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
        }
    }

    fn output(writer: ReportWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_buckets_are_sorted() {
        let mut writer = ReportWriter::new(Vec::new());
        writer
            .write_buckets(vec![bucket(2, 1, 4000), bucket(1, 6, 1334), bucket(1, 1, 533)])
            .unwrap();

        assert_eq!(
            output(writer),
            "customer,tenor,amount\n1,1,533\n1,6,1334\n2,1,4000\n"
        );
    }

    #[test]
    fn test_transaction_row() {
        let view = TransactionView {
            transaction: Transaction {
                id: 1,
                customer_id: 1,
                limit_bucket_id: 3,
                contract_no: "KTR-000001-00000001".to_string(),
                tenor: Tenor::new(3).unwrap(),
                otr: Money::new(400),
                admin_fee: Money::new(100),
                installment_total: Money::new(300),
                asset_name: "Motorcycle".to_string(),
                status: TransactionStatus::Active,
                created_at: Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap(),
            },
            customer: Some(Customer::new(1, "Budi", Money::new(1334))),
            bucket: Some(bucket(1, 3, 200)),
            installments: vec![log(1, true), log(2, false), log(3, false)],
        };

        let mut writer = ReportWriter::new(Vec::new());
        writer.write_transactions(&[view]).unwrap();

        let out = output(writer);
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("id,contract_no,customer,customer_name,tenor,otr,admin_fee,installment,asset,status,paid_months,outstanding")
        );
        assert_eq!(
            lines.next(),
            Some("1,KTR-000001-00000001,1,Budi,3,400,100,300,Motorcycle,active,1,200")
        );
    }

    #[test]
    fn test_sections_are_separated() {
        let mut writer = ReportWriter::new(Vec::new());
        writer.write_buckets(vec![bucket(1, 1, 533)]).unwrap();
        writer.write_due(&[log(1, false)]).unwrap();

        assert_eq!(
            output(writer),
            "customer,tenor,amount\n1,1,533\n\ntransaction,month,amount,due_date\n1,1,100,2026-02-01\n"
        );
    }
}
