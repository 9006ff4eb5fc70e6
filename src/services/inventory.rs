//! Inventory read API: per-variant totals, batch detail, the category tree used
//! for browsing, and the aggregate summary with incoming PO quantity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;

use crate::entities::goods_receipt_note::{self, GrnStatus};
use crate::entities::stock_batch::{self, QualityDisposition};
use crate::entities::vendor_purchase_order::{self, VendorPoStatus};
use crate::entities::{grn_line, material_category, material_variant, vendor_purchase_order_line};
use crate::errors::ServiceError;
use crate::services::stock_batches::{
    load_batch_detail, summarize_variant, BatchDetail, CounterSnapshot, VariantStockSummary,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNode {
    pub batch_id: i64,
    pub batch_number: String,
    pub disposition: QualityDisposition,
    pub unit_price: Decimal,
    pub received: Decimal,
    pub available: Decimal,
    pub reserved: Decimal,
    pub consumed: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<&stock_batch::Model> for BatchNode {
    fn from(batch: &stock_batch::Model) -> Self {
        Self {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            disposition: batch.disposition,
            unit_price: batch.unit_price,
            received: batch.received_quantity,
            available: batch.available_quantity,
            reserved: batch.reserved_quantity,
            consumed: batch.consumed_quantity,
            created_at: batch.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantNode {
    pub material_variant_id: i64,
    pub sku: String,
    pub name: String,
    pub unit_of_measure: String,
    pub totals: CounterSnapshot,
    pub batches: Vec<BatchNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeNode {
    pub grade: String,
    pub variants: Vec<VariantNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    pub category_id: i64,
    pub name: String,
    pub grades: Vec<GradeNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub variant_count: usize,
    pub batch_count: usize,
    pub received: Decimal,
    pub available: Decimal,
    pub reserved: Decimal,
    pub consumed: Decimal,
    pub held: Decimal,
    /// Ordered on open POs but not yet received, clamped at zero per variant.
    pub incoming_ordered: Decimal,
}

fn add(into: &mut CounterSnapshot, batch: &stock_batch::Model) {
    into.received += batch.received_quantity;
    into.available += batch.available_quantity;
    into.reserved += batch.reserved_quantity;
    into.consumed += batch.consumed_quantity;
}

/// Sum over variants of `ordered - received`, where over-receipt on one
/// variant never offsets the outstanding quantity of another.
pub fn incoming_quantity(
    ordered: &HashMap<i64, Decimal>,
    received: &HashMap<i64, Decimal>,
) -> Decimal {
    ordered
        .iter()
        .map(|(variant_id, ordered_quantity)| {
            let received_quantity = received.get(variant_id).copied().unwrap_or(Decimal::ZERO);
            (*ordered_quantity - received_quantity).max(Decimal::ZERO)
        })
        .sum()
}

async fn open_po_quantities<C: ConnectionTrait>(
    conn: &C,
) -> Result<(HashMap<i64, Decimal>, HashMap<i64, Decimal>), ServiceError> {
    let open_po_ids: Vec<i64> = vendor_purchase_order::Entity::find()
        .filter(
            vendor_purchase_order::Column::Status
                .is_in([VendorPoStatus::Ordered, VendorPoStatus::Sent]),
        )
        .filter(vendor_purchase_order::Column::IsDeleted.eq(false))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|order| order.id)
        .collect();

    let mut ordered: HashMap<i64, Decimal> = HashMap::new();
    let mut received: HashMap<i64, Decimal> = HashMap::new();
    if open_po_ids.is_empty() {
        return Ok((ordered, received));
    }

    let po_lines = vendor_purchase_order_line::Entity::find()
        .filter(vendor_purchase_order_line::Column::VendorPoId.is_in(open_po_ids.clone()))
        .filter(vendor_purchase_order_line::Column::IsDeleted.eq(false))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    for line in po_lines {
        *ordered.entry(line.material_variant_id).or_default() += line.ordered_quantity;
    }

    let submitted_grn_ids: Vec<i64> = goods_receipt_note::Entity::find()
        .filter(goods_receipt_note::Column::VendorPoId.is_in(open_po_ids))
        .filter(goods_receipt_note::Column::Status.eq(GrnStatus::Submitted))
        .filter(goods_receipt_note::Column::IsDeleted.eq(false))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|grn| grn.id)
        .collect();
    if !submitted_grn_ids.is_empty() {
        let receipts = grn_line::Entity::find()
            .filter(grn_line::Column::GrnId.is_in(submitted_grn_ids))
            .filter(grn_line::Column::IsDeleted.eq(false))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        for line in receipts {
            *received.entry(line.material_variant_id).or_default() += line.received_quantity;
        }
    }

    Ok((ordered, received))
}

#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn variant_summary(&self, variant_id: i64) -> Result<VariantStockSummary, ServiceError> {
        summarize_variant(&*self.db, variant_id).await
    }

    #[instrument(skip(self))]
    pub async fn batch_detail(&self, batch_id: i64) -> Result<BatchDetail, ServiceError> {
        load_batch_detail(&*self.db, batch_id).await
    }

    /// Category -> grade -> variant -> batch. Categories sort by name, grades
    /// alphabetically, variants by SKU and batches oldest first.
    #[instrument(skip(self))]
    pub async fn inventory_tree(&self) -> Result<Vec<CategoryNode>, ServiceError> {
        let db = &*self.db;
        let categories = material_category::Entity::find()
            .filter(material_category::Column::IsDeleted.eq(false))
            .order_by_asc(material_category::Column::Name)
            .order_by_asc(material_category::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        let variants = material_variant::Entity::find()
            .filter(material_variant::Column::IsDeleted.eq(false))
            .order_by_asc(material_variant::Column::Sku)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        let batches = stock_batch::Entity::find()
            .filter(stock_batch::Column::IsDeleted.eq(false))
            .order_by_asc(stock_batch::Column::CreatedAt)
            .order_by_asc(stock_batch::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut batches_by_variant: HashMap<i64, Vec<&stock_batch::Model>> = HashMap::new();
        for batch in &batches {
            batches_by_variant
                .entry(batch.material_variant_id)
                .or_default()
                .push(batch);
        }

        let mut variants_by_category: HashMap<i64, BTreeMap<String, Vec<VariantNode>>> =
            HashMap::new();
        for variant in variants {
            let own = batches_by_variant.remove(&variant.id).unwrap_or_default();
            let mut totals = CounterSnapshot::default();
            for batch in &own {
                add(&mut totals, batch);
            }
            variants_by_category
                .entry(variant.category_id)
                .or_default()
                .entry(variant.grade.clone())
                .or_default()
                .push(VariantNode {
                    material_variant_id: variant.id,
                    sku: variant.sku,
                    name: variant.name,
                    unit_of_measure: variant.unit_of_measure,
                    totals,
                    batches: own.into_iter().map(BatchNode::from).collect(),
                });
        }

        Ok(categories
            .into_iter()
            .map(|category| {
                let grades = variants_by_category
                    .remove(&category.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(grade, variants)| GradeNode { grade, variants })
                    .collect();
                CategoryNode {
                    category_id: category.id,
                    name: category.name,
                    grades,
                }
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn inventory_summary(&self) -> Result<InventorySummary, ServiceError> {
        let db = &*self.db;
        let variant_count = material_variant::Entity::find()
            .filter(material_variant::Column::IsDeleted.eq(false))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .len();
        let batches = stock_batch::Entity::find()
            .filter(stock_batch::Column::IsDeleted.eq(false))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut totals = CounterSnapshot::default();
        for batch in &batches {
            add(&mut totals, batch);
        }
        let (ordered, received) = open_po_quantities(db).await?;

        Ok(InventorySummary {
            variant_count,
            batch_count: batches.len(),
            received: totals.received,
            available: totals.available,
            reserved: totals.reserved,
            consumed: totals.consumed,
            held: totals.held(),
            incoming_ordered: incoming_quantity(&ordered, &received),
        })
    }
}
