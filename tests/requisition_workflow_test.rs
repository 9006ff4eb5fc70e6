mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use material_ledger::entities::requisition::RequisitionStatus;
use material_ledger::entities::requisition_batch_allocation;
use material_ledger::services::allocation::AllocationContext;
use material_ledger::services::requisitions::{CreateRequisition, NewRequisitionLine};
use material_ledger::ServiceError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use common::TestApp;

fn line(material_variant_id: i64, required_quantity: Decimal) -> NewRequisitionLine {
    NewRequisitionLine {
        material_variant_id,
        required_quantity,
    }
}

#[tokio::test]
async fn requisition_without_lines_is_rejected() {
    let app = TestApp::new().await;
    let err = app
        .requisitions
        .create_requisition(CreateRequisition {
            work_order_id: 1,
            lines: Vec::new(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyRequisition);
}

#[tokio::test]
async fn approving_twice_returns_the_same_state() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("PVC-01").await;
    let created = app
        .requisitions
        .create_requisition(CreateRequisition {
            work_order_id: 3,
            lines: vec![line(variant.id, dec!(4))],
        })
        .await
        .expect("create");
    assert_eq!(created.status, RequisitionStatus::Pending);

    let first = app
        .requisitions
        .approve(created.id, Some("stores".to_string()))
        .await
        .expect("approve");
    let second = app
        .requisitions
        .approve(created.id, Some("someone else".to_string()))
        .await
        .expect("approve again");

    assert_eq!(first.status, RequisitionStatus::Approved);
    assert_eq!(second.status, RequisitionStatus::Approved);
    assert_eq!(first.version, second.version);
    assert_eq!(second.approved_by.as_deref(), Some("stores"));
}

#[tokio::test]
async fn pending_requisition_cannot_be_allocated() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("PVC-02").await;
    let created = app
        .requisitions
        .create_requisition(CreateRequisition {
            work_order_id: 3,
            lines: vec![line(variant.id, dec!(4))],
        })
        .await
        .expect("create");

    let err = app.requisitions.allocate_fifo(created.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotApproved { requisition_id, .. } if requisition_id == created.id);
}

#[tokio::test]
async fn allocation_requests_only_the_outstanding_remainder() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("HDPE-5").await;
    let vendor = app.seed_vendor("Polymers Ltd").await;
    let early = app
        .receive_batch(vendor.id, variant.id, "E1", dec!(5), dec!(1))
        .await;

    let requisition = app
        .requisitions
        .create_requisition(CreateRequisition {
            work_order_id: 21,
            lines: vec![line(variant.id, dec!(20))],
        })
        .await
        .expect("create");
    app.requisitions
        .approve(requisition.id, None)
        .await
        .expect("approve");

    // A prior partial allocation of 5 against the early batch.
    app.allocation
        .reserve_fifo(variant.id, dec!(5), AllocationContext::for_work_order(21))
        .await
        .expect("reserve");
    let detail = app.requisitions.get_detail(requisition.id).await.expect("detail");
    let line_id = detail.lines[0].line.id;
    let now = Utc::now();
    requisition_batch_allocation::ActiveModel {
        requisition_line_id: Set(line_id),
        batch_id: Set(early.id),
        reserved_quantity: Set(dec!(5)),
        consumed_quantity: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
        is_deleted: Set(false),
        version: Set(1),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("prior allocation");

    let late = app
        .receive_batch(vendor.id, variant.id, "L1", dec!(30), dec!(1))
        .await;
    let outcome = app
        .requisitions
        .allocate_fifo(requisition.id)
        .await
        .expect("allocate");

    assert_eq!(outcome.len(), 1);
    assert_eq!(outcome[0].requested, dec!(15));
    assert_eq!(outcome[0].takes.len(), 1);
    assert_eq!(outcome[0].takes[0].batch_id, late.id);
    assert_eq!(app.batch(late.id).await.reserved_quantity, dec!(15));

    let detail = app.requisitions.get_detail(requisition.id).await.expect("detail");
    let line = &detail.lines[0];
    assert_eq!(line.allocated_quantity, dec!(20));
    assert_eq!(line.outstanding_quantity, Decimal::ZERO);
    let mut numbers: Vec<&str> = line
        .allocations
        .iter()
        .map(|a| a.batch_number.as_str())
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec!["E1", "L1"]);

    // Fully allocated lines are skipped on the next call.
    let again = app
        .requisitions
        .allocate_fifo(requisition.id)
        .await
        .expect("allocate again");
    assert!(again.is_empty());
}

#[tokio::test]
async fn one_short_line_fails_the_whole_requisition() {
    let app = TestApp::new().await;
    let category = app.seed_category("Fasteners").await;
    let bolts = app.seed_variant(category.id, "A2", "BOLT-M8").await;
    let nuts = app.seed_variant(category.id, "A2", "NUT-M8").await;
    let vendor = app.seed_vendor("Fixings Co").await;
    let bolt_batch = app
        .receive_batch(vendor.id, bolts.id, "BL1", dec!(100), dec!(0.2))
        .await;
    app.receive_batch(vendor.id, nuts.id, "NL1", dec!(10), dec!(0.1))
        .await;

    let requisition = app
        .requisitions
        .create_requisition(CreateRequisition {
            work_order_id: 9,
            lines: vec![line(bolts.id, dec!(40)), line(nuts.id, dec!(40))],
        })
        .await
        .expect("create");
    app.requisitions
        .approve(requisition.id, None)
        .await
        .expect("approve");

    let err = app.requisitions.allocate_fifo(requisition.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { variant_id, shortfall, .. }
        if variant_id == nuts.id && shortfall == dec!(30));

    // The bolts line reserved first in the same unit of work; nothing stuck.
    assert_eq!(app.batch(bolt_batch.id).await.reserved_quantity, Decimal::ZERO);
    let allocations = requisition_batch_allocation::Entity::find()
        .all(&*app.db)
        .await
        .expect("allocations");
    assert!(allocations.is_empty());
}

#[tokio::test]
async fn detail_lists_lines_in_order() {
    let app = TestApp::new().await;
    let category = app.seed_category("Chemicals").await;
    let resin = app.seed_variant(category.id, "Industrial", "RESIN-A").await;
    let hardener = app.seed_variant(category.id, "Industrial", "HARD-B").await;

    let requisition = app
        .requisitions
        .create_requisition(CreateRequisition {
            work_order_id: 5,
            lines: vec![line(resin.id, dec!(2)), line(hardener.id, dec!(1))],
        })
        .await
        .expect("create");

    let detail = app.requisitions.get_detail(requisition.id).await.expect("detail");
    assert_eq!(detail.lines.len(), 2);
    assert_eq!(detail.lines[0].line.line_no, 1);
    assert_eq!(detail.lines[0].line.material_variant_id, resin.id);
    assert_eq!(detail.lines[1].line.line_no, 2);
    assert_eq!(detail.lines[1].outstanding_quantity, dec!(1));
}

#[tokio::test]
async fn unknown_variant_fails_creation() {
    let app = TestApp::new().await;
    let err = app
        .requisitions
        .create_requisition(CreateRequisition {
            work_order_id: 5,
            lines: vec![line(999, dec!(2))],
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn consuming_for_a_requisition_books_its_allocations() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("HDPE-P").await;
    let vendor = app.seed_vendor("Polymers Ltd").await;
    let first = app
        .receive_batch(vendor.id, variant.id, "H-1", dec!(4), dec!(2))
        .await;
    app.backdate_batch(first.id, 1).await;
    app.receive_batch(vendor.id, variant.id, "H-2", dec!(10), dec!(2))
        .await;

    let created = app
        .requisitions
        .create_requisition(CreateRequisition {
            work_order_id: 21,
            lines: vec![line(variant.id, dec!(9))],
        })
        .await
        .expect("create");
    app.requisitions
        .approve(created.id, None)
        .await
        .expect("approve");
    app.requisitions
        .allocate_fifo(created.id)
        .await
        .expect("allocate");

    let ctx = AllocationContext {
        work_order_id: Some(21),
        requisition_id: Some(created.id),
        note: None,
    };
    app.allocation
        .consume(variant.id, dec!(6), ctx)
        .await
        .expect("consume");
    // Unattributed consumption leaves the requisition's rows alone.
    app.allocation
        .consume(variant.id, dec!(1), AllocationContext::default())
        .await
        .expect("consume without requisition");

    let detail = app.requisitions.get_detail(created.id).await.expect("detail");
    let consumed: Vec<(String, Decimal, Decimal)> = detail.lines[0]
        .allocations
        .iter()
        .map(|a| (a.batch_number.clone(), a.reserved_quantity, a.consumed_quantity))
        .collect();
    assert_eq!(
        consumed,
        vec![
            ("H-1".to_string(), dec!(4), dec!(4)),
            ("H-2".to_string(), dec!(5), dec!(2)),
        ]
    );
}
