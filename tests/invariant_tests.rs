mod common;

use chrono::{FixedOffset, TimeZone, Utc};
use common::{harness, open_request};
use lendledger::domain::installment::{PaymentUpdate, build_schedule};
use lendledger::domain::limit::Tenor;
use lendledger::domain::money::Money;
use lendledger::domain::ports::Clock;
use lendledger::error::LedgerError;
use rand::Rng;

#[test]
fn test_schedule_sum_matches_total_for_random_inputs() {
    let mut rng = rand::thread_rng();
    let offset = FixedOffset::east_opt(7 * 3600).unwrap();

    for _ in 0..500 {
        let total = Money::new(rng.gen_range(0..10_000_000));
        let tenor = Tenor::new(rng.gen_range(1..=36)).unwrap();
        let now = Utc
            .timestamp_opt(rng.gen_range(1_600_000_000..1_900_000_000), 0)
            .unwrap();

        let schedule = build_schedule(total, tenor, now, offset).unwrap();

        assert_eq!(schedule.len(), tenor.months() as usize);
        assert_eq!(schedule.iter().map(|row| row.amount).sum::<Money>(), total);
        let base = total.units() / i64::from(tenor.months());
        assert!(schedule[..schedule.len() - 1]
            .iter()
            .all(|row| row.amount.units() == base));
        assert!(schedule.windows(2).all(|w| w[0].due_date < w[1].due_date));
    }
}

#[tokio::test]
async fn test_persisted_schedules_sum_to_installment_total() {
    let h = harness();
    h.onboard(1, 100_000_000).await;

    let mut rng = rand::thread_rng();
    for months in [1, 2, 3, 6] {
        let installment_total = rng.gen_range(1..1_000_000);
        let opened = h
            .engine
            .open_financing(open_request(1, months, 0, 0, installment_total))
            .await
            .unwrap();

        let logs = h
            .engine
            .transaction_report()
            .await
            .unwrap()
            .into_iter()
            .find(|view| view.transaction.id == opened.transaction.id)
            .unwrap()
            .installments;
        assert_eq!(
            logs.iter().map(|log| log.amount).sum::<Money>(),
            opened.transaction.installment_total
        );
    }
}

#[tokio::test]
async fn test_mismatched_batch_changes_nothing() {
    let h = harness();
    h.onboard(1, 1334).await;
    let tx_id = h
        .engine
        .open_financing(open_request(1, 3, 400, 100, 301))
        .await
        .unwrap()
        .transaction
        .id;
    let paid_at = h.clock.now();
    let pay = |month: u32, amount: i64| PaymentUpdate {
        month,
        amount: Money::new(amount),
        paid_at,
    };

    // Months are 100, 100, 101.
    for batch in [
        vec![pay(1, 100), pay(3, 100)],
        vec![pay(1, 101)],
        vec![pay(1, 100), pay(1, 100)],
        vec![pay(4, 0)],
        vec![pay(1, 100), pay(2, 100), pay(3, 100)],
    ] {
        let err = h.engine.apply_payments(tx_id, batch).await.unwrap_err();
        assert!(matches!(err, LedgerError::InstallmentMismatch { .. }), "{err}");
    }

    let view = h.engine.customer_transactions(1).await.unwrap().remove(0);
    assert_eq!(view.paid_months(), 0);
    assert_eq!(view.outstanding(), Money::new(301));

    h.engine
        .apply_payments(tx_id, vec![pay(3, 101), pay(1, 100)])
        .await
        .unwrap();
    let view = h.engine.customer_transactions(1).await.unwrap().remove(0);
    assert_eq!(view.paid_months(), 2);
    assert_eq!(view.outstanding(), Money::new(100));
}

#[tokio::test]
async fn test_empty_or_negative_batches_are_invalid() {
    let h = harness();
    h.onboard(1, 1334).await;
    let tx_id = h
        .engine
        .open_financing(open_request(1, 1, 100, 0, 100))
        .await
        .unwrap()
        .transaction
        .id;

    assert!(matches!(
        h.engine.apply_payments(tx_id, vec![]).await,
        Err(LedgerError::ValidationError(_))
    ));
    assert!(matches!(
        h.engine
            .apply_payments(
                tx_id,
                vec![PaymentUpdate {
                    month: 1,
                    amount: Money::new(-100),
                    paid_at: h.clock.now(),
                }]
            )
            .await,
        Err(LedgerError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_overflowing_batch_changes_nothing() {
    let h = harness();
    h.onboard(1, 1334).await;
    let tx_id = h
        .engine
        .open_financing(open_request(1, 3, 400, 100, 300))
        .await
        .unwrap()
        .transaction
        .id;
    let paid_at = h.clock.now();
    let pay = |month: u32, amount: i64| PaymentUpdate {
        month,
        amount: Money::new(amount),
        paid_at,
    };

    for batch in [
        vec![pay(1, i64::MAX), pay(2, 1)],
        vec![pay(1, i64::MAX), pay(2, i64::MAX), pay(3, 302)],
    ] {
        assert!(matches!(
            h.engine.apply_payments(tx_id, batch).await,
            Err(LedgerError::ValidationError(_))
        ));
    }

    let view = h.engine.customer_transactions(1).await.unwrap().remove(0);
    assert_eq!(view.paid_months(), 0);
    assert_eq!(view.outstanding(), Money::new(300));
}
