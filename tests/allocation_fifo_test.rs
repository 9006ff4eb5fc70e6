mod common;

use assert_matches::assert_matches;
use material_ledger::entities::stock_batch::QualityDisposition;
use material_ledger::entities::stock_transaction::StockTransactionType;
use material_ledger::services::allocation::AllocationContext;
use material_ledger::services::stock_batches::NewBatch;
use material_ledger::ServiceError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::TestApp;

#[tokio::test]
async fn reserve_takes_oldest_batch_first() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("STL-304").await;
    let vendor = app.seed_vendor("Acme Metals").await;

    // Received later but dated earlier: creation time decides, not id.
    let newer = app
        .receive_batch(vendor.id, variant.id, "LOT-2", dec!(10), dec!(4))
        .await;
    let older = app
        .receive_batch(vendor.id, variant.id, "LOT-1", dec!(10), dec!(4))
        .await;
    app.backdate_batch(newer.id, 1).await;
    app.backdate_batch(older.id, 2).await;

    let takes = app
        .allocation
        .reserve_fifo(variant.id, dec!(15), AllocationContext::for_work_order(7))
        .await
        .expect("reserve");

    assert_eq!(takes.len(), 2);
    assert_eq!(takes[0].batch_id, older.id);
    assert_eq!(takes[0].quantity, dec!(10));
    assert_eq!(takes[1].batch_id, newer.id);
    assert_eq!(takes[1].quantity, dec!(5));

    let listed: Vec<i64> = app
        .batches
        .list_batches(variant.id)
        .await
        .expect("list")
        .iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(listed, vec![older.id, newer.id]);

    let older = app.batch(older.id).await;
    let newer = app.batch(newer.id).await;
    assert_eq!(older.available_quantity, Decimal::ZERO);
    assert_eq!(older.reserved_quantity, dec!(10));
    assert_eq!(newer.available_quantity, dec!(5));
    assert_eq!(newer.reserved_quantity, dec!(5));
}

#[tokio::test]
async fn shortage_rolls_back_every_batch() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("AL-6061").await;
    let vendor = app.seed_vendor("Acme Metals").await;
    let first = app
        .receive_batch(vendor.id, variant.id, "A1", dec!(5), dec!(2))
        .await;
    let second = app
        .receive_batch(vendor.id, variant.id, "A2", dec!(3), dec!(2))
        .await;

    let err = app
        .allocation
        .reserve_fifo(variant.id, dec!(10), AllocationContext::default())
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock { variant_id, requested, available, shortfall }
            if variant_id == variant.id
                && requested == dec!(10)
                && available == dec!(8)
                && shortfall == dec!(2)
    );

    for batch_id in [first.id, second.id] {
        let detail = app.batches.get_batch_detail(batch_id).await.expect("detail");
        assert_eq!(detail.batch.reserved_quantity, Decimal::ZERO);
        assert_eq!(detail.batch.available_quantity, detail.batch.received_quantity);
        assert_eq!(detail.transactions.len(), 1, "only the receipt remains");
    }
}

#[tokio::test]
async fn pending_and_rejected_batches_are_not_allocatable() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("CU-110").await;

    for (number, disposition) in [
        ("Q-PENDING", QualityDisposition::PendingQc),
        ("Q-REJECTED", QualityDisposition::Rejected),
    ] {
        let batch = app
            .batches
            .create_batch(NewBatch {
                material_variant_id: variant.id,
                batch_number: number.to_string(),
                grn_line_id: None,
                vendor_id: None,
                received_quantity: dec!(50),
                unit_price: dec!(1),
                disposition,
            })
            .await
            .expect("create batch");
        assert_eq!(batch.available_quantity, Decimal::ZERO);
        assert_eq!(batch.held_quantity(), dec!(50));
    }

    let err = app
        .allocation
        .reserve_fifo(variant.id, dec!(1), AllocationContext::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { available, .. } if available == Decimal::ZERO);
}

#[tokio::test]
async fn non_positive_quantities_are_invalid_arguments() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("BR-360").await;

    for quantity in [Decimal::ZERO, dec!(-3)] {
        let err = app
            .allocation
            .reserve_fifo(variant.id, quantity, AllocationContext::default())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidArgument(_));
    }
}

#[tokio::test]
async fn release_and_consume_cannot_exceed_reserved() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("TI-GR5").await;
    let vendor = app.seed_vendor("Acme Metals").await;
    app.receive_batch(vendor.id, variant.id, "T1", dec!(20), dec!(30))
        .await;
    app.allocation
        .reserve_fifo(variant.id, dec!(6), AllocationContext::default())
        .await
        .expect("reserve");

    let err = app
        .allocation
        .release(variant.id, dec!(7), AllocationContext::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OverRelease { reserved, .. } if reserved == dec!(6));

    let err = app
        .allocation
        .consume(variant.id, dec!(9), AllocationContext::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OverConsume { reserved, requested, .. }
        if reserved == dec!(6) && requested == dec!(9));

    let summary = app.batches.variant_summary(variant.id).await.expect("summary");
    assert_eq!(summary.reserved, dec!(6));
    assert_eq!(summary.available, dec!(14));
}

#[tokio::test]
async fn ledger_replay_reproduces_counters() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("NI-200").await;
    let vendor = app.seed_vendor("Acme Metals").await;
    let batch = app
        .receive_batch(vendor.id, variant.id, "N1", dec!(40), dec!(12))
        .await;
    let ctx = AllocationContext::for_work_order(11).with_note("press line");

    app.allocation
        .reserve_fifo(variant.id, dec!(25), ctx.clone())
        .await
        .expect("reserve");
    app.allocation
        .release(variant.id, dec!(5), ctx.clone())
        .await
        .expect("release");
    app.allocation
        .consume(variant.id, dec!(12), ctx)
        .await
        .expect("consume");

    let stored = app.batch(batch.id).await;
    assert_eq!(stored.available_quantity, dec!(20));
    assert_eq!(stored.reserved_quantity, dec!(8));
    assert_eq!(stored.consumed_quantity, dec!(12));

    let replayed = app.batches.replay_ledger(batch.id).await.expect("replay");
    assert_eq!(replayed.received, dec!(40));
    assert_eq!(replayed.available, stored.available_quantity);
    assert_eq!(replayed.reserved, stored.reserved_quantity);
    assert_eq!(replayed.consumed, stored.consumed_quantity);

    let detail = app.batches.get_batch_detail(batch.id).await.expect("detail");
    let types: Vec<StockTransactionType> = detail
        .transactions
        .iter()
        .map(|txn| txn.transaction_type)
        .collect();
    assert_eq!(
        types,
        vec![
            StockTransactionType::Receipt,
            StockTransactionType::Reserve,
            StockTransactionType::Release,
            StockTransactionType::Consume,
        ]
    );
    assert!(detail.transactions[1..]
        .iter()
        .all(|txn| txn.work_order_id == Some(11)));

    let audit = app.batches.audit_batch(batch.id).await.expect("audit batch");
    assert!(!audit.has_drift());
    assert!(audit.is_clean());

    let report = app.batches.audit_all().await.expect("audit");
    assert_eq!(report.batches_checked, 1);
    assert!(report.is_clean());
}

#[tokio::test]
async fn duplicate_batch_numbers_are_case_insensitive() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("ZN-01").await;
    let new_batch = |number: &str| NewBatch {
        material_variant_id: variant.id,
        batch_number: number.to_string(),
        grn_line_id: None,
        vendor_id: None,
        received_quantity: dec!(1),
        unit_price: dec!(1),
        disposition: QualityDisposition::Approved,
    };

    app.batches
        .create_batch(new_batch("lot-9"))
        .await
        .expect("first batch");
    let err = app
        .batches
        .create_batch(new_batch(" LOT-9 "))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DuplicateBatch { .. });
    assert_eq!(app.batch_count().await, 1);
}

#[tokio::test]
async fn large_quantities_keep_four_decimal_places() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("BULK-ORE").await;

    let batch = app
        .batches
        .create_batch(NewBatch {
            material_variant_id: variant.id,
            batch_number: "ORE-1".to_string(),
            grn_line_id: None,
            vendor_id: None,
            received_quantity: dec!(1234567890.1234),
            unit_price: dec!(0.0001),
            disposition: QualityDisposition::Approved,
        })
        .await
        .expect("create batch");

    let stored = app.batch(batch.id).await;
    assert_eq!(stored.received_quantity, dec!(1234567890.1234));
    assert_eq!(stored.available_quantity, dec!(1234567890.1234));
    assert_eq!(stored.unit_price, dec!(0.0001));
}
