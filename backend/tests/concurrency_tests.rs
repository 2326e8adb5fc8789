//! Concurrent consumption tests
//!
//! Writers on one material must be serialized: concurrent consumes never
//! allocate the same stock twice, and an over-committed material fails the
//! losers with InsufficientStock rather than going negative.

mod common;

use std::time::Duration;

use common::{at, dec, ledger, ledger_with_timeout, receipt, sale};
use material_ledger_backend::store::LedgerStore;
use material_ledger_backend::AppError;
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumes_exactly_drain_stock() {
    let l = ledger();
    let m = l.material("Cement").await;
    l.ledger.receive(m, receipt("30", "10", at(2024, 1, 1))).await.unwrap();
    l.ledger.receive(m, receipt("30", "12", at(2024, 1, 2))).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let service = l.ledger.clone();
            tokio::spawn(async move { service.consume(m, sale("3")).await })
        })
        .collect();

    let mut allocated = Decimal::ZERO;
    let mut realized = Decimal::ZERO;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        allocated += result.cost_details.iter().map(|d| d.quantity).sum::<Decimal>();
        realized += result.realized_cost;
    }

    assert_eq!(allocated, dec("60"));
    assert_eq!(realized, dec("660"));

    let status = l.ledger.stock_status(m).await.unwrap();
    assert!(status.on_hand_quantity.is_zero());
    assert!(l.ledger.reconcile(m).await.unwrap().balanced);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overcommit_rejects_the_excess() {
    let l = ledger();
    let m = l.material("Sand").await;
    l.ledger.receive(m, receipt("10", "2", at(2024, 1, 1))).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = l.ledger.clone();
            tokio::spawn(async move { service.consume(m, sale("4")).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientStock { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(succeeded, 2);
    assert_eq!(insufficient, 6);

    let batches = l.ledger.available_batches(m).await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].remaining_quantity, dec("2"));
    assert!(l.ledger.reconcile(m).await.unwrap().balanced);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_receives_and_consumes_interleave_consistently() {
    let l = ledger();
    let m = l.material("Gravel").await;
    l.ledger.receive(m, receipt("50", "5", at(2024, 1, 1))).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10u32 {
        let service = l.ledger.clone();
        handles.push(tokio::spawn(async move {
            service
                .receive(m, receipt("5", "6", at(2024, 2, 1 + i)))
                .await
                .map(|_| ())
        }));
        let service = l.ledger.clone();
        handles.push(tokio::spawn(async move {
            service.consume(m, sale("5")).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let report = l.ledger.reconcile(m).await.unwrap();
    assert!(report.balanced);
    assert_eq!(report.batch_remaining, dec("50"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_held_lock_times_out_as_retryable_conflict() {
    let l = ledger_with_timeout(Duration::from_millis(50));
    let busy = l.material("Busy material").await;
    let idle = l.material("Idle material").await;
    l.ledger.receive(busy, receipt("10", "1", at(2024, 1, 1))).await.unwrap();
    l.ledger.receive(idle, receipt("10", "1", at(2024, 1, 1))).await.unwrap();

    let held = l.store.begin(busy).await.unwrap();

    let err = l.ledger.consume(busy, sale("1")).await.unwrap_err();
    assert!(matches!(err, AppError::ConflictRetryable(_)));
    assert!(err.is_retryable());

    // Other materials are not blocked by the held lock
    l.ledger.consume(idle, sale("1")).await.unwrap();

    drop(held);
    let result = l.ledger.consume(busy, sale("1")).await.unwrap();
    assert_eq!(result.quantity, dec("1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_materials_are_consumed_in_parallel() {
    let l = ledger();
    let mut materials = Vec::new();
    for i in 0..4 {
        let m = l.material(&format!("Material {}", i)).await;
        l.ledger.receive(m, receipt("20", "3", at(2024, 1, 1))).await.unwrap();
        materials.push(m);
    }

    let mut handles = Vec::new();
    for &m in &materials {
        for _ in 0..5 {
            let service = l.ledger.clone();
            handles.push(tokio::spawn(async move { service.consume(m, sale("4")).await }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for m in materials {
        let status = l.ledger.stock_status(m).await.unwrap();
        assert!(status.on_hand_quantity.is_zero());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_sale_line_is_consumed_once_across_concurrent_materials() {
    let l = ledger();
    let cement = l.material("Cement").await;
    let lime = l.material("Lime").await;
    l.ledger.receive(cement, receipt("10", "10", at(2024, 1, 1))).await.unwrap();
    l.ledger.receive(lime, receipt("10", "4", at(2024, 1, 1))).await.unwrap();

    for _ in 0..10 {
        let sale_line_id = Uuid::new_v4();
        let handles: Vec<_> = [cement, lime]
            .into_iter()
            .map(|m| {
                let service = l.ledger.clone();
                let mut input = sale("0.5");
                input.sale_line_id = sale_line_id;
                tokio::spawn(async move { service.consume(m, input).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(AppError::Validation { field, .. }) => assert_eq!(field, "sale_line_id"),
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(succeeded, 1);
    }

    let cement_left = l.ledger.stock_status(cement).await.unwrap().on_hand_quantity;
    let lime_left = l.ledger.stock_status(lime).await.unwrap().on_hand_quantity;
    assert_eq!(cement_left + lime_left, dec("15"));
    assert!(l.ledger.reconcile(cement).await.unwrap().balanced);
    assert!(l.ledger.reconcile(lime).await.unwrap().balanced);
}
