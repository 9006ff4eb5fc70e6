//! Procurement orchestrator: vendor POs, invoices and goods receipts, and the
//! batch creation they drive.
//!
//! Two intake paths end in stock batches:
//! * direct receipt, which synthesizes a completed PO and a submitted GRN in
//!   one go and books Approved batches;
//! * the PO flow: send PO (creates the vendor invoice) -> accept invoice
//!   (creates a draft GRN with generated batch numbers) -> edit draft ->
//!   submit draft (creates Approved batches).
//!
//! Every public operation is its own unit of work.

use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use validator::Validate;

use crate::db::{expect_single_row, UnitOfWork};
use crate::entities::goods_receipt_note::{self, GrnStatus};
use crate::entities::stock_batch::{self, QualityDisposition};
use crate::entities::vendor_invoice::{self, InvoiceStatus};
use crate::entities::vendor_invoice_decision::{self, InvoiceDecision};
use crate::entities::vendor_purchase_order::{self, VendorPoStatus};
use crate::entities::{grn_line, vendor, vendor_purchase_order_line};
use crate::errors::ServiceError;
use crate::services::catalog;
use crate::services::stock_batches::{create_batch_in, normalize_batch_key, NewBatch};

/// Prefixes for generated document numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcurementSettings {
    pub po_number_prefix: String,
    pub direct_receipt_po_prefix: String,
    pub grn_number_prefix: String,
    pub invoice_number_prefix: String,
}

impl Default for ProcurementSettings {
    fn default() -> Self {
        Self {
            po_number_prefix: "VPO".to_string(),
            direct_receipt_po_prefix: "DR".to_string(),
            grn_number_prefix: "GRN".to_string(),
            invoice_number_prefix: "INV".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewVendor {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 50))]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPoLineInput {
    pub material_variant_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateVendorPo {
    pub vendor_id: i64,
    pub order_date: NaiveDate,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "a vendor PO needs at least one line"))]
    pub lines: Vec<VendorPoLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrnLineInput {
    pub vendor_po_line_id: Option<i64>,
    pub material_variant_id: i64,
    pub batch_number: String,
    pub received_quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateGrn {
    pub vendor_po_id: i64,
    #[validate(length(min = 1, max = 64))]
    pub invoice_number: String,
    pub receipt_date: NaiveDate,
    #[validate(length(min = 1, message = "a GRN needs at least one line"))]
    pub lines: Vec<GrnLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectReceiptLine {
    pub material_variant_id: i64,
    pub batch_number: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DirectReceipt {
    pub vendor_id: i64,
    pub receipt_date: NaiveDate,
    #[validate(length(min = 1, max = 64))]
    pub invoice_number: String,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "a direct receipt needs at least one line"))]
    pub lines: Vec<DirectReceiptLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendVendorPo {
    /// Vendor's own invoice number; generated from the PO number when absent.
    pub invoice_number: Option<String>,
    pub invoice_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptInvoice {
    pub decided_by: Option<String>,
    pub receipt_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeclineInvoice {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
    pub decided_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrnDraftLineUpdate {
    pub batch_number: Option<String>,
    pub received_quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPoDetail {
    pub order: vendor_purchase_order::Model,
    pub lines: Vec<vendor_purchase_order_line::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrnDetail {
    pub grn: goods_receipt_note::Model,
    pub lines: Vec<grn_line::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectReceiptOutcome {
    pub purchase_order: VendorPoDetail,
    pub grn: GrnDetail,
    pub batches: Vec<stock_batch::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedGrn {
    pub grn: GrnDetail,
    pub batches: Vec<stock_batch::Model>,
}

pub fn document_number(prefix: &str, sequence: u64) -> String {
    format!("{}-{:06}", prefix, sequence)
}

/// Quantity-weighted mean of `(quantity, unit_price)` pairs, rounded to four
/// decimal places.
pub fn weighted_average_price(lines: &[(Decimal, Decimal)]) -> Decimal {
    let total_quantity: Decimal = lines.iter().map(|(quantity, _)| *quantity).sum();
    if total_quantity.is_zero() {
        return Decimal::ZERO;
    }
    let total_value: Decimal = lines.iter().map(|(quantity, price)| quantity * price).sum();
    (total_value / total_quantity).round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

pub fn format_batch_number(sku: &str, sequence: u64) -> String {
    format!("{}-B{}", sku, sequence)
}

/// Next free `{SKU}-B{n}` sequence given the batch numbers already in use.
/// Numbers that do not follow the pattern, or whose suffix does not fit a
/// `u64`, are ignored.
pub fn next_batch_sequence<'a>(
    sku: &str,
    existing: impl IntoIterator<Item = &'a str>,
) -> Result<u64, ServiceError> {
    let prefix = format!("{}-B", sku.trim().to_uppercase());
    existing
        .into_iter()
        .filter_map(|number| {
            let upper = number.trim().to_uppercase();
            let suffix = upper.strip_prefix(&prefix)?;
            if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            suffix.parse::<u64>().ok()
        })
        .max()
        .map_or(Ok(1), |highest| following_sequence(sku, highest))
}

fn following_sequence(sku: &str, sequence: u64) -> Result<u64, ServiceError> {
    sequence.checked_add(1).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Batch numbers for {} have reached {}-B{}; no further sequence is available",
            sku, sku, sequence
        ))
    })
}

fn require_text(value: &str, what: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be blank",
            what
        )));
    }
    Ok(trimmed.to_string())
}

fn check_quantity_and_price(
    quantity: Decimal,
    unit_price: Decimal,
    context: &str,
) -> Result<(), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Quantity for {} must be positive",
            context
        )));
    }
    if unit_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Unit price for {} must not be negative",
            context
        )));
    }
    Ok(())
}

/// Rejects two lines naming the same batch of the same variant.
fn reject_repeated_batches<'a>(
    lines: impl IntoIterator<Item = (i64, &'a str)>,
) -> Result<(), ServiceError> {
    let mut seen = HashSet::new();
    for (variant_id, batch_number) in lines {
        if !seen.insert((variant_id, normalize_batch_key(batch_number))) {
            return Err(ServiceError::DuplicateBatch {
                variant_id,
                batch_number: batch_number.trim().to_string(),
            });
        }
    }
    Ok(())
}

async fn find_vendor<C: ConnectionTrait>(
    conn: &C,
    vendor_id: i64,
) -> Result<vendor::Model, ServiceError> {
    vendor::Entity::find_by_id(vendor_id)
        .filter(vendor::Column::IsDeleted.eq(false))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Vendor {} not found", vendor_id)))
}

async fn find_vendor_po<C: ConnectionTrait>(
    conn: &C,
    vendor_po_id: i64,
) -> Result<vendor_purchase_order::Model, ServiceError> {
    vendor_purchase_order::Entity::find_by_id(vendor_po_id)
        .filter(vendor_purchase_order::Column::IsDeleted.eq(false))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Vendor PO {} not found", vendor_po_id)))
}

async fn vendor_po_lines<C: ConnectionTrait>(
    conn: &C,
    vendor_po_id: i64,
) -> Result<Vec<vendor_purchase_order_line::Model>, ServiceError> {
    vendor_purchase_order_line::Entity::find()
        .filter(vendor_purchase_order_line::Column::VendorPoId.eq(vendor_po_id))
        .filter(vendor_purchase_order_line::Column::IsDeleted.eq(false))
        .order_by_asc(vendor_purchase_order_line::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn find_invoice<C: ConnectionTrait>(
    conn: &C,
    invoice_id: i64,
) -> Result<vendor_invoice::Model, ServiceError> {
    vendor_invoice::Entity::find_by_id(invoice_id)
        .filter(vendor_invoice::Column::IsDeleted.eq(false))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Vendor invoice {} not found", invoice_id)))
}

async fn find_grn<C: ConnectionTrait>(
    conn: &C,
    grn_id: i64,
) -> Result<goods_receipt_note::Model, ServiceError> {
    goods_receipt_note::Entity::find_by_id(grn_id)
        .filter(goods_receipt_note::Column::IsDeleted.eq(false))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("GRN {} not found", grn_id)))
}

async fn find_grn_line<C: ConnectionTrait>(
    conn: &C,
    grn_line_id: i64,
) -> Result<grn_line::Model, ServiceError> {
    grn_line::Entity::find_by_id(grn_line_id)
        .filter(grn_line::Column::IsDeleted.eq(false))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("GRN line {} not found", grn_line_id)))
}

async fn grn_lines_of<C: ConnectionTrait>(
    conn: &C,
    grn_id: i64,
) -> Result<Vec<grn_line::Model>, ServiceError> {
    grn_line::Entity::find()
        .filter(grn_line::Column::GrnId.eq(grn_id))
        .filter(grn_line::Column::IsDeleted.eq(false))
        .order_by_asc(grn_line::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn load_grn_detail<C: ConnectionTrait>(
    conn: &C,
    grn_id: i64,
) -> Result<GrnDetail, ServiceError> {
    let grn = find_grn(conn, grn_id).await?;
    let lines = grn_lines_of(conn, grn_id).await?;
    Ok(GrnDetail { grn, lines })
}

async fn batches_for_grn_lines<C: ConnectionTrait>(
    conn: &C,
    line_ids: Vec<i64>,
) -> Result<Vec<stock_batch::Model>, ServiceError> {
    if line_ids.is_empty() {
        return Ok(Vec::new());
    }
    stock_batch::Entity::find()
        .filter(stock_batch::Column::GrnLineId.is_in(line_ids))
        .order_by_asc(stock_batch::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// A GRN invoice number may be used once per vendor.
async fn ensure_grn_invoice_unused(
    txn: &DatabaseTransaction,
    vendor_id: i64,
    invoice_number: &str,
) -> Result<(), ServiceError> {
    let taken = goods_receipt_note::Entity::find()
        .filter(goods_receipt_note::Column::VendorId.eq(vendor_id))
        .filter(goods_receipt_note::Column::InvoiceNumber.eq(invoice_number))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;
    if taken.is_some() {
        return Err(ServiceError::DuplicateInvoiceNumber {
            vendor_id,
            invoice_number: invoice_number.to_string(),
        });
    }
    Ok(())
}

async fn set_po_status(
    txn: &DatabaseTransaction,
    order: &vendor_purchase_order::Model,
    status: VendorPoStatus,
) -> Result<(), ServiceError> {
    let result = vendor_purchase_order::Entity::update_many()
        .col_expr(vendor_purchase_order::Column::Status, Expr::value(status))
        .col_expr(
            vendor_purchase_order::Column::Version,
            Expr::value(order.version + 1),
        )
        .col_expr(vendor_purchase_order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(vendor_purchase_order::Column::Id.eq(order.id))
        .filter(vendor_purchase_order::Column::Version.eq(order.version))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;
    expect_single_row(result.rows_affected, "vendor_purchase_order", order.id)
}

async fn set_invoice_status(
    txn: &DatabaseTransaction,
    invoice: &vendor_invoice::Model,
    status: InvoiceStatus,
) -> Result<(), ServiceError> {
    let result = vendor_invoice::Entity::update_many()
        .col_expr(vendor_invoice::Column::Status, Expr::value(status))
        .col_expr(vendor_invoice::Column::Version, Expr::value(invoice.version + 1))
        .col_expr(vendor_invoice::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(vendor_invoice::Column::Id.eq(invoice.id))
        .filter(vendor_invoice::Column::Version.eq(invoice.version))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;
    expect_single_row(result.rows_affected, "vendor_invoice", invoice.id)
}

async fn set_grn_status(
    txn: &DatabaseTransaction,
    grn: &goods_receipt_note::Model,
    status: GrnStatus,
) -> Result<(), ServiceError> {
    let result = goods_receipt_note::Entity::update_many()
        .col_expr(goods_receipt_note::Column::Status, Expr::value(status))
        .col_expr(goods_receipt_note::Column::Version, Expr::value(grn.version + 1))
        .col_expr(goods_receipt_note::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(goods_receipt_note::Column::Id.eq(grn.id))
        .filter(goods_receipt_note::Column::Version.eq(grn.version))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;
    expect_single_row(result.rows_affected, "goods_receipt_note", grn.id)
}

async fn set_line_quality(
    txn: &DatabaseTransaction,
    line: &grn_line::Model,
    quality: QualityDisposition,
) -> Result<(), ServiceError> {
    let result = grn_line::Entity::update_many()
        .col_expr(grn_line::Column::QualityStatus, Expr::value(quality))
        .col_expr(grn_line::Column::Version, Expr::value(line.version + 1))
        .col_expr(grn_line::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(grn_line::Column::Id.eq(line.id))
        .filter(grn_line::Column::Version.eq(line.version))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;
    expect_single_row(result.rows_affected, "grn_line", line.id)
}

async fn record_decision(
    txn: &DatabaseTransaction,
    invoice_id: i64,
    decision: InvoiceDecision,
    reason: Option<String>,
    decided_by: Option<String>,
) -> Result<vendor_invoice_decision::Model, ServiceError> {
    let now = Utc::now();
    vendor_invoice_decision::ActiveModel {
        vendor_invoice_id: Set(invoice_id),
        decision: Set(decision),
        reason: Set(reason),
        decided_by: Set(decided_by),
        decided_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
        is_deleted: Set(false),
        version: Set(1),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(ServiceError::db_error)
}

#[derive(Clone)]
pub struct ProcurementService {
    db: Arc<DatabaseConnection>,
    settings: ProcurementSettings,
}

impl ProcurementService {
    pub fn new(db: Arc<DatabaseConnection>, settings: ProcurementSettings) -> Self {
        Self { db, settings }
    }

    async fn next_po_number(
        &self,
        txn: &DatabaseTransaction,
        direct_receipt: bool,
    ) -> Result<String, ServiceError> {
        let issued = vendor_purchase_order::Entity::find()
            .filter(vendor_purchase_order::Column::IsDirectReceipt.eq(direct_receipt))
            .count(txn)
            .await
            .map_err(ServiceError::db_error)?;
        let prefix = if direct_receipt {
            &self.settings.direct_receipt_po_prefix
        } else {
            &self.settings.po_number_prefix
        };
        Ok(document_number(prefix, issued + 1))
    }

    async fn next_grn_number(&self, txn: &DatabaseTransaction) -> Result<String, ServiceError> {
        let issued = goods_receipt_note::Entity::find()
            .count(txn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(document_number(&self.settings.grn_number_prefix, issued + 1))
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_po(
        &self,
        txn: &DatabaseTransaction,
        vendor_id: i64,
        order_date: NaiveDate,
        status: VendorPoStatus,
        direct_receipt: bool,
        notes: Option<String>,
        lines: &[VendorPoLineInput],
    ) -> Result<VendorPoDetail, ServiceError> {
        let po_number = self.next_po_number(txn, direct_receipt).await?;
        let now = Utc::now();
        let order = vendor_purchase_order::ActiveModel {
            po_number: Set(po_number.clone()),
            vendor_id: Set(vendor_id),
            status: Set(status),
            order_date: Set(order_date),
            is_direct_receipt: Set(direct_receipt),
            notes: Set(notes),
            created_at: Set(now),
            updated_at: Set(now),
            is_deleted: Set(false),
            version: Set(1),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| {
            ServiceError::on_unique_violation(e, || {
                ServiceError::Conflict(format!("PO number {} already issued", po_number))
            })
        })?;

        let mut inserted = Vec::with_capacity(lines.len());
        for line in lines {
            let model = vendor_purchase_order_line::ActiveModel {
                vendor_po_id: Set(order.id),
                material_variant_id: Set(line.material_variant_id),
                ordered_quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                created_at: Set(now),
                updated_at: Set(now),
                is_deleted: Set(false),
                version: Set(1),
                ..Default::default()
            }
            .insert(txn)
            .await
            .map_err(ServiceError::db_error)?;
            inserted.push(model);
        }

        Ok(VendorPoDetail {
            order,
            lines: inserted,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_grn(
        &self,
        txn: &DatabaseTransaction,
        vendor_po_id: i64,
        vendor_id: i64,
        vendor_invoice_id: Option<i64>,
        invoice_number: &str,
        receipt_date: NaiveDate,
        status: GrnStatus,
        lines: Vec<(GrnLineInput, QualityDisposition)>,
    ) -> Result<GrnDetail, ServiceError> {
        let grn_number = self.next_grn_number(txn).await?;
        let now = Utc::now();
        let grn = goods_receipt_note::ActiveModel {
            grn_number: Set(grn_number.clone()),
            vendor_po_id: Set(vendor_po_id),
            vendor_id: Set(vendor_id),
            vendor_invoice_id: Set(vendor_invoice_id),
            invoice_number: Set(invoice_number.to_string()),
            receipt_date: Set(receipt_date),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
            is_deleted: Set(false),
            version: Set(1),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| {
            ServiceError::on_unique_violation(e, || ServiceError::DuplicateInvoiceNumber {
                vendor_id,
                invoice_number: invoice_number.to_string(),
            })
        })?;

        let mut inserted = Vec::with_capacity(lines.len());
        for (line, quality) in lines {
            let model = grn_line::ActiveModel {
                grn_id: Set(grn.id),
                vendor_po_line_id: Set(line.vendor_po_line_id),
                material_variant_id: Set(line.material_variant_id),
                batch_number: Set(line.batch_number.trim().to_string()),
                received_quantity: Set(line.received_quantity),
                unit_price: Set(line.unit_price),
                quality_status: Set(quality),
                created_at: Set(now),
                updated_at: Set(now),
                is_deleted: Set(false),
                version: Set(1),
                ..Default::default()
            }
            .insert(txn)
            .await
            .map_err(ServiceError::db_error)?;
            inserted.push(model);
        }

        debug!(grn_id = grn.id, grn_number = %grn_number, "GRN recorded");
        Ok(GrnDetail {
            grn,
            lines: inserted,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn create_vendor(&self, request: NewVendor) -> Result<vendor::Model, ServiceError> {
        request.validate()?;
        let name = require_text(&request.name, "Vendor name")?;
        let now = Utc::now();
        let created = vendor::ActiveModel {
            name: Set(name),
            code: Set(request.code.map(|c| c.trim().to_string())),
            created_at: Set(now),
            updated_at: Set(now),
            is_deleted: Set(false),
            version: Set(1),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;
        info!(vendor_id = created.id, "Vendor created");
        Ok(created)
    }

    #[instrument(skip(self, request), fields(vendor_id = request.vendor_id))]
    pub async fn create_vendor_po(
        &self,
        request: CreateVendorPo,
    ) -> Result<VendorPoDetail, ServiceError> {
        request.validate()?;
        for line in &request.lines {
            check_quantity_and_price(
                line.quantity,
                line.unit_price,
                &format!("material variant {}", line.material_variant_id),
            )?;
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let result = async {
            let txn = uow.txn();
            find_vendor(txn, request.vendor_id).await?;
            catalog::require_variants(txn, request.lines.iter().map(|l| l.material_variant_id))
                .await?;
            self.insert_po(
                txn,
                request.vendor_id,
                request.order_date,
                VendorPoStatus::Ordered,
                false,
                request.notes.clone(),
                &request.lines,
            )
            .await
        }
        .await;
        let detail = uow.finish(result).await?;
        info!(
            vendor_po_id = detail.order.id,
            po_number = %detail.order.po_number,
            "Vendor PO created"
        );
        Ok(detail)
    }

    /// Records a submitted GRN against an existing PO. Lines await a quality
    /// decision; batches are created by [`Self::process_grn_line_and_create_batch`].
    #[instrument(skip(self, request), fields(vendor_po_id = request.vendor_po_id))]
    pub async fn create_grn(&self, request: CreateGrn) -> Result<GrnDetail, ServiceError> {
        request.validate()?;
        let invoice_number = require_text(&request.invoice_number, "Invoice number")?;
        for line in &request.lines {
            let batch_number = require_text(&line.batch_number, "Batch number")?;
            check_quantity_and_price(
                line.received_quantity,
                line.unit_price,
                &format!("batch {}", batch_number),
            )?;
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let result = async {
            let txn = uow.txn();
            let order = find_vendor_po(txn, request.vendor_po_id).await?;
            catalog::require_variants(txn, request.lines.iter().map(|l| l.material_variant_id))
                .await?;

            let po_lines = vendor_po_lines(txn, order.id).await?;
            for line in &request.lines {
                if let Some(po_line_id) = line.vendor_po_line_id {
                    if !po_lines.iter().any(|l| l.id == po_line_id) {
                        return Err(ServiceError::ValidationError(format!(
                            "PO line {} does not belong to vendor PO {}",
                            po_line_id, order.id
                        )));
                    }
                }
            }

            ensure_grn_invoice_unused(txn, order.vendor_id, &invoice_number).await?;
            let lines = request
                .lines
                .iter()
                .cloned()
                .map(|line| (line, QualityDisposition::PendingQc))
                .collect();
            self.insert_grn(
                txn,
                order.id,
                order.vendor_id,
                None,
                &invoice_number,
                request.receipt_date,
                GrnStatus::Submitted,
                lines,
            )
            .await
        }
        .await;
        uow.finish(result).await
    }

    /// Applies a quality decision to a GRN line and creates its batch. A line
    /// that already has a batch returns that batch unchanged.
    #[instrument(skip(self))]
    pub async fn process_grn_line_and_create_batch(
        &self,
        grn_line_id: i64,
        vendor_id: i64,
        disposition: QualityDisposition,
    ) -> Result<stock_batch::Model, ServiceError> {
        if disposition == QualityDisposition::PendingQc {
            return Err(ServiceError::InvalidArgument(
                "A quality decision (Approved or Rejected) is required".to_string(),
            ));
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let result = async {
            let txn = uow.txn();
            let line = find_grn_line(txn, grn_line_id).await?;

            let existing = stock_batch::Entity::find()
                .filter(stock_batch::Column::GrnLineId.eq(grn_line_id))
                .one(txn)
                .await
                .map_err(ServiceError::db_error)?;
            if let Some(batch) = existing {
                debug!(grn_line_id, batch_id = batch.id, "GRN line already processed");
                return Ok(batch);
            }

            let grn = find_grn(txn, line.grn_id).await?;
            if grn.status != GrnStatus::Submitted {
                return Err(ServiceError::InvalidOperation(format!(
                    "GRN {} is {}; submit it before processing lines",
                    grn.grn_number, grn.status
                )));
            }
            if grn.vendor_id != vendor_id {
                return Err(ServiceError::ValidationError(format!(
                    "GRN {} belongs to vendor {}, not {}",
                    grn.grn_number, grn.vendor_id, vendor_id
                )));
            }

            let batch = create_batch_in(
                txn,
                NewBatch {
                    material_variant_id: line.material_variant_id,
                    batch_number: line.batch_number.clone(),
                    grn_line_id: Some(line.id),
                    vendor_id: Some(vendor_id),
                    received_quantity: line.received_quantity,
                    unit_price: line.unit_price,
                    disposition,
                },
            )
            .await?;
            set_line_quality(txn, &line, disposition).await?;
            Ok(batch)
        }
        .await;
        uow.finish(result).await
    }

    /// Books goods that arrived without a prior PO: synthesizes a completed PO
    /// (one line per variant at the quantity-weighted average price) and a
    /// submitted GRN, and creates one Approved batch per input line.
    #[instrument(skip(self, request), fields(vendor_id = request.vendor_id, invoice_number = %request.invoice_number))]
    pub async fn receive_direct_grn(
        &self,
        request: DirectReceipt,
    ) -> Result<DirectReceiptOutcome, ServiceError> {
        request.validate()?;
        let invoice_number = require_text(&request.invoice_number, "Invoice number")?;
        for line in &request.lines {
            let batch_number = require_text(&line.batch_number, "Batch number")?;
            check_quantity_and_price(
                line.quantity,
                line.unit_price,
                &format!("batch {}", batch_number),
            )?;
        }
        reject_repeated_batches(
            request
                .lines
                .iter()
                .map(|line| (line.material_variant_id, line.batch_number.as_str())),
        )?;

        let uow = UnitOfWork::begin(&self.db).await?;
        let result = self
            .receive_direct_in(uow.txn(), &request, &invoice_number)
            .await;
        let outcome = uow.finish(result).await?;
        info!(
            vendor_po_id = outcome.purchase_order.order.id,
            grn_id = outcome.grn.grn.id,
            batches = outcome.batches.len(),
            "Direct receipt booked"
        );
        Ok(outcome)
    }

    async fn receive_direct_in(
        &self,
        txn: &DatabaseTransaction,
        request: &DirectReceipt,
        invoice_number: &str,
    ) -> Result<DirectReceiptOutcome, ServiceError> {
        find_vendor(txn, request.vendor_id).await?;
        catalog::require_variants(txn, request.lines.iter().map(|l| l.material_variant_id)).await?;

        for line in &request.lines {
            let collision = stock_batch::Entity::find()
                .filter(stock_batch::Column::MaterialVariantId.eq(line.material_variant_id))
                .filter(
                    stock_batch::Column::BatchKey.eq(normalize_batch_key(&line.batch_number)),
                )
                .one(txn)
                .await
                .map_err(ServiceError::db_error)?;
            if collision.is_some() {
                return Err(ServiceError::DuplicateBatch {
                    variant_id: line.material_variant_id,
                    batch_number: line.batch_number.trim().to_string(),
                });
            }
        }
        ensure_grn_invoice_unused(txn, request.vendor_id, invoice_number).await?;

        let mut per_variant: BTreeMap<i64, Vec<(Decimal, Decimal)>> = BTreeMap::new();
        for line in &request.lines {
            per_variant
                .entry(line.material_variant_id)
                .or_default()
                .push((line.quantity, line.unit_price));
        }
        let po_lines: Vec<VendorPoLineInput> = per_variant
            .iter()
            .map(|(variant_id, parts)| VendorPoLineInput {
                material_variant_id: *variant_id,
                quantity: parts.iter().map(|(quantity, _)| *quantity).sum(),
                unit_price: weighted_average_price(parts),
            })
            .collect();

        let purchase_order = self
            .insert_po(
                txn,
                request.vendor_id,
                request.receipt_date,
                VendorPoStatus::Completed,
                true,
                request.notes.clone(),
                &po_lines,
            )
            .await?;
        let po_line_by_variant: HashMap<i64, i64> = purchase_order
            .lines
            .iter()
            .map(|line| (line.material_variant_id, line.id))
            .collect();

        let grn_lines = request
            .lines
            .iter()
            .map(|line| {
                (
                    GrnLineInput {
                        vendor_po_line_id: po_line_by_variant.get(&line.material_variant_id).copied(),
                        material_variant_id: line.material_variant_id,
                        batch_number: line.batch_number.clone(),
                        received_quantity: line.quantity,
                        unit_price: line.unit_price,
                    },
                    QualityDisposition::Approved,
                )
            })
            .collect();
        let grn = self
            .insert_grn(
                txn,
                purchase_order.order.id,
                request.vendor_id,
                None,
                invoice_number,
                request.receipt_date,
                GrnStatus::Submitted,
                grn_lines,
            )
            .await?;

        let mut batches = Vec::with_capacity(grn.lines.len());
        for line in &grn.lines {
            let batch = create_batch_in(
                txn,
                NewBatch {
                    material_variant_id: line.material_variant_id,
                    batch_number: line.batch_number.clone(),
                    grn_line_id: Some(line.id),
                    vendor_id: Some(request.vendor_id),
                    received_quantity: line.received_quantity,
                    unit_price: line.unit_price,
                    disposition: QualityDisposition::Approved,
                },
            )
            .await?;
            batches.push(batch);
        }

        Ok(DirectReceiptOutcome {
            purchase_order,
            grn,
            batches,
        })
    }

    /// Sends a PO to its vendor and records the vendor's invoice for it.
    /// A PO that already has an invoice returns that invoice.
    #[instrument(skip(self, request))]
    pub async fn send_vendor_po_and_create_invoice(
        &self,
        vendor_po_id: i64,
        request: SendVendorPo,
    ) -> Result<vendor_invoice::Model, ServiceError> {
        let provided = match request.invoice_number.as_deref() {
            Some(number) => Some(require_text(number, "Invoice number")?),
            None => None,
        };

        let uow = UnitOfWork::begin(&self.db).await?;
        let result = async {
            let txn = uow.txn();
            let order = find_vendor_po(txn, vendor_po_id).await?;

            let existing = vendor_invoice::Entity::find()
                .filter(vendor_invoice::Column::VendorPoId.eq(order.id))
                .filter(vendor_invoice::Column::IsDeleted.eq(false))
                .one(txn)
                .await
                .map_err(ServiceError::db_error)?;
            if let Some(invoice) = existing {
                debug!(vendor_po_id, invoice_id = invoice.id, "PO already sent");
                return Ok(invoice);
            }

            if !order.status.is_open() {
                return Err(ServiceError::InvalidOperation(format!(
                    "Vendor PO {} is {} and cannot be sent",
                    order.po_number, order.status
                )));
            }

            let invoice_number = provided.clone().unwrap_or_else(|| {
                format!("{}-{}", self.settings.invoice_number_prefix, order.po_number)
            });
            let taken = vendor_invoice::Entity::find()
                .filter(vendor_invoice::Column::VendorId.eq(order.vendor_id))
                .filter(vendor_invoice::Column::InvoiceNumber.eq(invoice_number.as_str()))
                .one(txn)
                .await
                .map_err(ServiceError::db_error)?;
            if taken.is_some() {
                return Err(ServiceError::DuplicateInvoiceNumber {
                    vendor_id: order.vendor_id,
                    invoice_number,
                });
            }

            let total_amount: Decimal = vendor_po_lines(txn, order.id)
                .await?
                .iter()
                .map(|line| line.ordered_quantity * line.unit_price)
                .sum();

            if order.status == VendorPoStatus::Ordered {
                set_po_status(txn, &order, VendorPoStatus::Sent).await?;
            }

            let now = Utc::now();
            vendor_invoice::ActiveModel {
                vendor_id: Set(order.vendor_id),
                vendor_po_id: Set(order.id),
                invoice_number: Set(invoice_number.clone()),
                invoice_date: Set(request.invoice_date),
                status: Set(InvoiceStatus::Pending),
                total_amount: Set(total_amount),
                created_at: Set(now),
                updated_at: Set(now),
                is_deleted: Set(false),
                version: Set(1),
                ..Default::default()
            }
            .insert(txn)
            .await
            .map_err(|e| {
                ServiceError::on_unique_violation(e, || ServiceError::DuplicateInvoiceNumber {
                    vendor_id: order.vendor_id,
                    invoice_number: invoice_number.clone(),
                })
            })
        }
        .await;
        let invoice = uow.finish(result).await?;
        info!(
            vendor_po_id,
            invoice_id = invoice.id,
            invoice_number = %invoice.invoice_number,
            "Vendor PO sent"
        );
        Ok(invoice)
    }

    /// Accepts a vendor invoice and drafts the GRN for its PO, one line per PO
    /// line with a generated `{SKU}-B{n}` batch number. Calling again returns
    /// the same draft.
    #[instrument(skip(self, request))]
    pub async fn accept_vendor_invoice_and_create_grn_draft(
        &self,
        invoice_id: i64,
        request: AcceptInvoice,
    ) -> Result<GrnDetail, ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let result = self.accept_invoice_in(uow.txn(), invoice_id, request).await;
        let detail = uow.finish(result).await?;
        info!(
            invoice_id,
            grn_id = detail.grn.id,
            lines = detail.lines.len(),
            "GRN draft ready"
        );
        Ok(detail)
    }

    async fn accept_invoice_in(
        &self,
        txn: &DatabaseTransaction,
        invoice_id: i64,
        request: AcceptInvoice,
    ) -> Result<GrnDetail, ServiceError> {
        let invoice = find_invoice(txn, invoice_id).await?;
        if invoice.status == InvoiceStatus::Declined {
            return Err(ServiceError::InvalidOperation(format!(
                "Vendor invoice {} was declined",
                invoice.invoice_number
            )));
        }

        let existing = goods_receipt_note::Entity::find()
            .filter(goods_receipt_note::Column::VendorInvoiceId.eq(invoice.id))
            .filter(goods_receipt_note::Column::IsDeleted.eq(false))
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?;
        if let Some(grn) = existing {
            debug!(invoice_id, grn_id = grn.id, "Invoice already accepted");
            return load_grn_detail(txn, grn.id).await;
        }

        if invoice.status == InvoiceStatus::Pending {
            set_invoice_status(txn, &invoice, InvoiceStatus::Accepted).await?;
            record_decision(
                txn,
                invoice.id,
                InvoiceDecision::Accepted,
                None,
                request.decided_by.clone(),
            )
            .await?;
        }

        ensure_grn_invoice_unused(txn, invoice.vendor_id, &invoice.invoice_number).await?;

        let po_lines = vendor_po_lines(txn, invoice.vendor_po_id).await?;
        if po_lines.is_empty() {
            return Err(ServiceError::InvalidOperation(format!(
                "Vendor PO {} has no lines to receive",
                invoice.vendor_po_id
            )));
        }
        let variants =
            catalog::require_variants(txn, po_lines.iter().map(|l| l.material_variant_id)).await?;
        let sku_by_variant: HashMap<i64, String> =
            variants.into_iter().map(|v| (v.id, v.sku)).collect();

        let mut next_sequence: HashMap<i64, u64> = HashMap::new();
        let mut lines = Vec::with_capacity(po_lines.len());
        for po_line in &po_lines {
            let variant_id = po_line.material_variant_id;
            let sku = sku_by_variant.get(&variant_id).cloned().unwrap_or_default();
            let sequence = match next_sequence.get(&variant_id) {
                Some(sequence) => *sequence,
                None => self.first_free_sequence(txn, variant_id, &sku).await?,
            };
            next_sequence.insert(variant_id, following_sequence(&sku, sequence)?);

            lines.push((
                GrnLineInput {
                    vendor_po_line_id: Some(po_line.id),
                    material_variant_id: variant_id,
                    batch_number: format_batch_number(&sku, sequence),
                    received_quantity: po_line.ordered_quantity,
                    unit_price: po_line.unit_price,
                },
                QualityDisposition::PendingQc,
            ));
        }

        self.insert_grn(
            txn,
            invoice.vendor_po_id,
            invoice.vendor_id,
            Some(invoice.id),
            &invoice.invoice_number,
            request.receipt_date,
            GrnStatus::Draft,
            lines,
        )
        .await
    }

    /// Scans batch numbers already used by batches and GRN lines of a variant.
    async fn first_free_sequence(
        &self,
        txn: &DatabaseTransaction,
        variant_id: i64,
        sku: &str,
    ) -> Result<u64, ServiceError> {
        let mut used: Vec<String> = stock_batch::Entity::find()
            .filter(stock_batch::Column::MaterialVariantId.eq(variant_id))
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|batch| batch.batch_number)
            .collect();
        used.extend(
            grn_line::Entity::find()
                .filter(grn_line::Column::MaterialVariantId.eq(variant_id))
                .all(txn)
                .await
                .map_err(ServiceError::db_error)?
                .into_iter()
                .map(|line| line.batch_number),
        );
        next_batch_sequence(sku, used.iter().map(String::as_str))
    }

    /// Declines a pending vendor invoice with a reason. Declining twice is a
    /// no-op; an accepted invoice cannot be declined.
    #[instrument(skip(self, request))]
    pub async fn decline_vendor_invoice(
        &self,
        invoice_id: i64,
        request: DeclineInvoice,
    ) -> Result<vendor_invoice::Model, ServiceError> {
        request.validate()?;
        let reason = require_text(&request.reason, "Decline reason")?;

        let uow = UnitOfWork::begin(&self.db).await?;
        let result = async {
            let txn = uow.txn();
            let invoice = find_invoice(txn, invoice_id).await?;
            match invoice.status {
                InvoiceStatus::Declined => return Ok(invoice),
                InvoiceStatus::Accepted => {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Vendor invoice {} was already accepted",
                        invoice.invoice_number
                    )))
                }
                InvoiceStatus::Pending => {}
            }

            set_invoice_status(txn, &invoice, InvoiceStatus::Declined).await?;
            record_decision(
                txn,
                invoice.id,
                InvoiceDecision::Declined,
                Some(reason.clone()),
                request.decided_by.clone(),
            )
            .await?;
            find_invoice(txn, invoice_id).await
        }
        .await;
        let invoice = uow.finish(result).await?;
        info!(invoice_id, "Vendor invoice declined");
        Ok(invoice)
    }

    /// QC decision history of an invoice, oldest first.
    pub async fn list_invoice_decisions(
        &self,
        invoice_id: i64,
    ) -> Result<Vec<vendor_invoice_decision::Model>, ServiceError> {
        let db = &*self.db;
        find_invoice(db, invoice_id).await?;
        vendor_invoice_decision::Entity::find()
            .filter(vendor_invoice_decision::Column::VendorInvoiceId.eq(invoice_id))
            .order_by_asc(vendor_invoice_decision::Column::DecidedAt)
            .order_by_asc(vendor_invoice_decision::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Operator edit of a draft GRN line before submission.
    #[instrument(skip(self, update))]
    pub async fn update_grn_draft_line(
        &self,
        grn_line_id: i64,
        update: GrnDraftLineUpdate,
    ) -> Result<grn_line::Model, ServiceError> {
        if update.batch_number.is_none()
            && update.received_quantity.is_none()
            && update.unit_price.is_none()
        {
            return Err(ServiceError::ValidationError(
                "Nothing to update on GRN line".to_string(),
            ));
        }
        let batch_number = match update.batch_number.as_deref() {
            Some(number) => Some(require_text(number, "Batch number")?),
            None => None,
        };
        if let Some(quantity) = update.received_quantity {
            if quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Received quantity must be positive".to_string(),
                ));
            }
        }
        if let Some(price) = update.unit_price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Unit price must not be negative".to_string(),
                ));
            }
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let result = async {
            let txn = uow.txn();
            let line = find_grn_line(txn, grn_line_id).await?;
            let grn = find_grn(txn, line.grn_id).await?;
            if grn.status != GrnStatus::Draft {
                return Err(ServiceError::InvalidOperation(format!(
                    "GRN {} is {}; only draft lines can be edited",
                    grn.grn_number, grn.status
                )));
            }

            let result = grn_line::Entity::update_many()
                .col_expr(
                    grn_line::Column::BatchNumber,
                    Expr::value(batch_number.clone().unwrap_or_else(|| line.batch_number.clone())),
                )
                .col_expr(
                    grn_line::Column::ReceivedQuantity,
                    Expr::value(update.received_quantity.unwrap_or(line.received_quantity)),
                )
                .col_expr(
                    grn_line::Column::UnitPrice,
                    Expr::value(update.unit_price.unwrap_or(line.unit_price)),
                )
                .col_expr(grn_line::Column::Version, Expr::value(line.version + 1))
                .col_expr(grn_line::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(grn_line::Column::Id.eq(line.id))
                .filter(grn_line::Column::Version.eq(line.version))
                .exec(txn)
                .await
                .map_err(ServiceError::db_error)?;
            expect_single_row(result.rows_affected, "grn_line", line.id)?;
            find_grn_line(txn, grn_line_id).await
        }
        .await;
        uow.finish(result).await
    }

    /// Submits a draft GRN: every line becomes an Approved batch, the GRN is
    /// marked Submitted and its PO Received. Submitting again returns the
    /// batches created the first time.
    #[instrument(skip(self))]
    pub async fn submit_grn_draft(&self, grn_id: i64) -> Result<SubmittedGrn, ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let result = self.submit_draft_in(uow.txn(), grn_id).await;
        let submitted = uow.finish(result).await?;
        info!(
            grn_id,
            batches = submitted.batches.len(),
            "GRN draft submitted"
        );
        Ok(submitted)
    }

    async fn submit_draft_in(
        &self,
        txn: &DatabaseTransaction,
        grn_id: i64,
    ) -> Result<SubmittedGrn, ServiceError> {
        let grn = find_grn(txn, grn_id).await?;
        let lines = grn_lines_of(txn, grn_id).await?;

        if grn.status == GrnStatus::Submitted {
            let batches = batches_for_grn_lines(txn, lines.iter().map(|l| l.id).collect()).await?;
            return Ok(SubmittedGrn {
                grn: GrnDetail { grn, lines },
                batches,
            });
        }

        if lines.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "GRN {} has no lines to submit",
                grn.grn_number
            )));
        }
        reject_repeated_batches(
            lines
                .iter()
                .map(|line| (line.material_variant_id, line.batch_number.as_str())),
        )?;

        let mut batches = Vec::with_capacity(lines.len());
        for line in &lines {
            let batch = create_batch_in(
                txn,
                NewBatch {
                    material_variant_id: line.material_variant_id,
                    batch_number: line.batch_number.clone(),
                    grn_line_id: Some(line.id),
                    vendor_id: Some(grn.vendor_id),
                    received_quantity: line.received_quantity,
                    unit_price: line.unit_price,
                    disposition: QualityDisposition::Approved,
                },
            )
            .await?;
            set_line_quality(txn, line, QualityDisposition::Approved).await?;
            batches.push(batch);
        }

        set_grn_status(txn, &grn, GrnStatus::Submitted).await?;
        let order = find_vendor_po(txn, grn.vendor_po_id).await?;
        if order.status.is_open() {
            set_po_status(txn, &order, VendorPoStatus::Received).await?;
        }

        let grn = load_grn_detail(txn, grn_id).await?;
        Ok(SubmittedGrn { grn, batches })
    }

    pub async fn get_grn(&self, grn_id: i64) -> Result<GrnDetail, ServiceError> {
        load_grn_detail(&*self.db, grn_id).await
    }

    pub async fn get_vendor_po(&self, vendor_po_id: i64) -> Result<VendorPoDetail, ServiceError> {
        let order = find_vendor_po(&*self.db, vendor_po_id).await?;
        let lines = vendor_po_lines(&*self.db, vendor_po_id).await?;
        Ok(VendorPoDetail { order, lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn document_numbers_are_zero_padded() {
        assert_eq!(document_number("GRN", 7), "GRN-000007");
        assert_eq!(document_number("DR", 1234567), "DR-1234567");
    }

    #[test]
    fn weighted_average_rounds_to_four_places() {
        assert_eq!(
            weighted_average_price(&[(dec!(10), dec!(2)), (dec!(30), dec!(4))]),
            dec!(3.5)
        );
        assert_eq!(
            weighted_average_price(&[(dec!(1), dec!(1)), (dec!(2), dec!(2))]),
            dec!(1.6667)
        );
        assert_eq!(weighted_average_price(&[]), Decimal::ZERO);
    }

    #[test]
    fn batch_sequence_continues_after_highest_suffix() {
        let used = ["STL-316-B1", "stl-316-b7", "STL-316-B3", "STL-316-LOT9", "OTHER-B40"];
        assert_eq!(next_batch_sequence("STL-316", used).unwrap(), 8);
        assert_eq!(next_batch_sequence("STL-316", []).unwrap(), 1);
        assert_eq!(format_batch_number("STL-316", 8), "STL-316-B8");
    }

    #[test]
    fn batch_sequence_ignores_non_numeric_suffixes() {
        let used = ["AL-B", "AL-B2X", "AL-B002"];
        assert_eq!(next_batch_sequence("AL", used).unwrap(), 3);
    }

    #[test]
    fn batch_sequence_past_u32_keeps_counting() {
        assert_eq!(
            next_batch_sequence("SKU", ["SKU-B4294967295"]).unwrap(),
            4_294_967_296
        );
        assert_eq!(format_batch_number("SKU", 4_294_967_296), "SKU-B4294967296");
    }

    #[test]
    fn exhausted_batch_sequence_is_a_validation_error() {
        let highest = u64::MAX.to_string();
        let used = format!("SKU-B{}", highest);
        let err = next_batch_sequence("SKU", [used.as_str()]).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));

        // Too long for a u64: not one of ours, so it does not count.
        let oversized = format!("SKU-B{}0", highest);
        assert_eq!(next_batch_sequence("SKU", [oversized.as_str()]).unwrap(), 1);
    }

    #[test]
    fn repeated_batches_in_one_request_are_rejected() {
        let err = reject_repeated_batches([(1, "lot-a"), (2, "LOT-A"), (1, " LOT-A ")]).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::DuplicateBatch { variant_id: 1, ref batch_number } if batch_number == "LOT-A"
        ));
        assert!(reject_repeated_batches([(1, "lot-a"), (2, "lot-a")]).is_ok());
    }
}
