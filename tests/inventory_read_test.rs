mod common;

use assert_matches::assert_matches;
use material_ledger::services::allocation::AllocationContext;
use material_ledger::services::procurement::{CreateGrn, CreateVendorPo, GrnLineInput, VendorPoLineInput};
use material_ledger::ServiceError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{receipt_date, TestApp};

#[tokio::test]
async fn tree_groups_by_category_grade_and_variant() {
    let app = TestApp::new().await;
    let metals = app.seed_category("Metals").await;
    let plastics = app.seed_category("Plastics").await;
    let ss_304 = app.seed_variant(metals.id, "304", "SS-304-SH").await;
    let ss_316 = app.seed_variant(metals.id, "316", "SS-316-SH").await;
    let abs = app.seed_variant(plastics.id, "Virgin", "ABS-NAT").await;
    let vendor = app.seed_vendor("Acme Metals").await;

    let second = app
        .receive_batch(vendor.id, ss_304.id, "B-2", dec!(4), dec!(10))
        .await;
    let first = app
        .receive_batch(vendor.id, ss_304.id, "B-1", dec!(6), dec!(10))
        .await;
    app.backdate_batch(first.id, 3).await;
    app.receive_batch(vendor.id, ss_316.id, "C-1", dec!(2), dec!(15))
        .await;

    let tree = app.inventory.inventory_tree().await.expect("tree");
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[0].name, "Metals");
    assert_eq!(tree[1].name, "Plastics");

    let grades: Vec<&str> = tree[0].grades.iter().map(|g| g.grade.as_str()).collect();
    assert_eq!(grades, vec!["304", "316"]);

    let sheet = &tree[0].grades[0].variants[0];
    assert_eq!(sheet.material_variant_id, ss_304.id);
    assert_eq!(sheet.totals.received, dec!(10));
    let batch_ids: Vec<i64> = sheet.batches.iter().map(|b| b.batch_id).collect();
    assert_eq!(batch_ids, vec![first.id, second.id]);

    let plastics_variants = &tree[1].grades[0].variants;
    assert_eq!(plastics_variants[0].material_variant_id, abs.id);
    assert!(plastics_variants[0].batches.is_empty());
}

#[tokio::test]
async fn variant_summary_totals_every_batch() {
    let app = TestApp::new().await;
    let variant = app.seed_single_variant("LDPE-F").await;
    let vendor = app.seed_vendor("Polymers Ltd").await;
    app.receive_batch(vendor.id, variant.id, "F-1", dec!(12), dec!(2))
        .await;
    app.receive_batch(vendor.id, variant.id, "F-2", dec!(8), dec!(2))
        .await;
    app.allocation
        .reserve_fifo(variant.id, dec!(15), AllocationContext::default())
        .await
        .expect("reserve");
    app.allocation
        .consume(variant.id, dec!(5), AllocationContext::default())
        .await
        .expect("consume");

    let summary = app.inventory.variant_summary(variant.id).await.expect("summary");
    assert_eq!(summary.sku, "LDPE-F");
    assert_eq!(summary.batch_count, 2);
    assert_eq!(summary.received, dec!(20));
    assert_eq!(summary.available, dec!(5));
    assert_eq!(summary.reserved, dec!(10));
    assert_eq!(summary.consumed, dec!(5));
    assert_eq!(summary.held, Decimal::ZERO);

    let err = app.inventory.variant_summary(4040).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn summary_reports_outstanding_quantity_on_open_orders() {
    let app = TestApp::new().await;
    let category = app.seed_category("Metals").await;
    let plate = app.seed_variant(category.id, "S275", "PLATE-10").await;
    let beam = app.seed_variant(category.id, "S355", "BEAM-200").await;
    let vendor = app.seed_vendor("Steel Mill").await;

    let po = app
        .procurement
        .create_vendor_po(CreateVendorPo {
            vendor_id: vendor.id,
            order_date: receipt_date(),
            notes: None,
            lines: vec![
                VendorPoLineInput {
                    material_variant_id: plate.id,
                    quantity: dec!(100),
                    unit_price: dec!(50),
                },
                VendorPoLineInput {
                    material_variant_id: beam.id,
                    quantity: dec!(20),
                    unit_price: dec!(300),
                },
            ],
        })
        .await
        .expect("create PO");

    // Plate partly received, beam over-received.
    app.procurement
        .create_grn(CreateGrn {
            vendor_po_id: po.order.id,
            invoice_number: "SM-1".to_string(),
            receipt_date: receipt_date(),
            lines: vec![
                GrnLineInput {
                    vendor_po_line_id: Some(po.lines[0].id),
                    material_variant_id: plate.id,
                    batch_number: "P-1".to_string(),
                    received_quantity: dec!(30),
                    unit_price: dec!(50),
                },
                GrnLineInput {
                    vendor_po_line_id: Some(po.lines[1].id),
                    material_variant_id: beam.id,
                    batch_number: "BM-1".to_string(),
                    received_quantity: dec!(25),
                    unit_price: dec!(300),
                },
            ],
        })
        .await
        .expect("create GRN");

    // A direct receipt produces a completed PO and never counts as incoming.
    app.receive_batch(vendor.id, plate.id, "P-DIRECT", dec!(7), dec!(49))
        .await;

    let summary = app.inventory.inventory_summary().await.expect("summary");
    assert_eq!(summary.variant_count, 2);
    assert_eq!(summary.batch_count, 1);
    assert_eq!(summary.received, dec!(7));
    assert_eq!(summary.available, dec!(7));
    assert_eq!(summary.incoming_ordered, dec!(70));
}
