//! Stock batch registry: batch creation, read models and ledger replay.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::db::UnitOfWork;
use crate::entities::stock_batch::{self, QualityDisposition};
use crate::entities::stock_transaction::{self, StockTransactionType};
use crate::errors::ServiceError;
use crate::services::allocation::AllocationContext;
use crate::services::catalog;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub material_variant_id: i64,
    pub batch_number: String,
    pub grn_line_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub received_quantity: Decimal,
    pub unit_price: Decimal,
    pub disposition: QualityDisposition,
}

/// Case-insensitive uniqueness key for batch numbers.
pub fn normalize_batch_key(batch_number: &str) -> String {
    batch_number.trim().to_uppercase()
}

/// The four batch counters, as stored or as rebuilt from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub received: Decimal,
    pub available: Decimal,
    pub reserved: Decimal,
    pub consumed: Decimal,
}

impl CounterSnapshot {
    pub fn of(batch: &stock_batch::Model) -> Self {
        Self {
            received: batch.received_quantity,
            available: batch.available_quantity,
            reserved: batch.reserved_quantity,
            consumed: batch.consumed_quantity,
        }
    }

    pub fn held(&self) -> Decimal {
        self.received - (self.available + self.reserved + self.consumed)
    }

    /// Approved batches hold nothing back; any other disposition holds back
    /// exactly what was received. No counter may go negative.
    pub fn conserves(&self, disposition: QualityDisposition) -> bool {
        let non_negative = [self.received, self.available, self.reserved, self.consumed]
            .iter()
            .all(|value| *value >= Decimal::ZERO);
        let expected_held = match disposition {
            QualityDisposition::Approved => Decimal::ZERO,
            QualityDisposition::PendingQc | QualityDisposition::Rejected => self.received,
        };
        non_negative && self.held() == expected_held
    }
}

/// Rebuilds the counters of a batch from its transactions.
pub fn replay(
    disposition: QualityDisposition,
    transactions: &[stock_transaction::Model],
) -> CounterSnapshot {
    transactions
        .iter()
        .fold(CounterSnapshot::default(), |mut counters, txn| {
            let quantity = txn.quantity;
            match txn.transaction_type {
                StockTransactionType::Receipt => {
                    counters.received += quantity;
                    if disposition == QualityDisposition::Approved {
                        counters.available += quantity;
                    }
                }
                StockTransactionType::Reserve => {
                    counters.available -= quantity;
                    counters.reserved += quantity;
                }
                StockTransactionType::Release => {
                    counters.reserved -= quantity;
                    counters.available += quantity;
                }
                StockTransactionType::Consume => {
                    counters.reserved -= quantity;
                    counters.consumed += quantity;
                }
            }
            counters
        })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDetail {
    pub batch: stock_batch::Model,
    pub held_quantity: Decimal,
    pub transactions: Vec<stock_transaction::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantStockSummary {
    pub material_variant_id: i64,
    pub sku: String,
    pub name: String,
    pub unit_of_measure: String,
    pub batch_count: usize,
    pub received: Decimal,
    pub available: Decimal,
    pub reserved: Decimal,
    pub consumed: Decimal,
    pub held: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAudit {
    pub batch_id: i64,
    pub batch_number: String,
    pub material_variant_id: i64,
    pub disposition: QualityDisposition,
    pub stored: CounterSnapshot,
    pub replayed: CounterSnapshot,
}

impl BatchAudit {
    pub fn has_drift(&self) -> bool {
        self.stored != self.replayed
    }

    pub fn is_clean(&self) -> bool {
        !self.has_drift() && self.stored.conserves(self.disposition)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerAuditReport {
    pub batches_checked: usize,
    pub findings: Vec<BatchAudit>,
}

impl LedgerAuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Appends one immutable ledger row.
pub(crate) async fn record_transaction(
    txn: &DatabaseTransaction,
    batch_id: i64,
    transaction_type: StockTransactionType,
    quantity: Decimal,
    ctx: &AllocationContext,
) -> Result<stock_transaction::Model, ServiceError> {
    let now = Utc::now();
    stock_transaction::ActiveModel {
        batch_id: Set(batch_id),
        transaction_type: Set(transaction_type),
        quantity: Set(quantity),
        work_order_id: Set(ctx.work_order_id),
        requisition_id: Set(ctx.requisition_id),
        note: Set(ctx.note.clone()),
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

/// Creates a batch and its Receipt transaction inside the caller's
/// transaction. Only approved batches start with available stock.
#[instrument(skip(txn, new), fields(variant_id = new.material_variant_id, batch_number = %new.batch_number))]
pub async fn create_batch_in(
    txn: &DatabaseTransaction,
    new: NewBatch,
) -> Result<stock_batch::Model, ServiceError> {
    let batch_number = new.batch_number.trim().to_string();
    if batch_number.is_empty() {
        return Err(ServiceError::ValidationError(
            "Batch number must not be blank".to_string(),
        ));
    }
    if new.received_quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Received quantity for batch {} must be positive",
            batch_number
        )));
    }
    if new.unit_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Unit price for batch {} must not be negative",
            batch_number
        )));
    }

    catalog::require_variant(txn, new.material_variant_id).await?;

    let batch_key = normalize_batch_key(&batch_number);
    let duplicate = || ServiceError::DuplicateBatch {
        variant_id: new.material_variant_id,
        batch_number: batch_number.clone(),
    };

    let existing = stock_batch::Entity::find()
        .filter(stock_batch::Column::MaterialVariantId.eq(new.material_variant_id))
        .filter(stock_batch::Column::BatchKey.eq(batch_key.as_str()))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;
    if existing.is_some() {
        return Err(duplicate());
    }

    let available = if new.disposition == QualityDisposition::Approved {
        new.received_quantity
    } else {
        Decimal::ZERO
    };
    let now = Utc::now();

    let batch = stock_batch::ActiveModel {
        material_variant_id: Set(new.material_variant_id),
        batch_number: Set(batch_number.clone()),
        batch_key: Set(batch_key),
        grn_line_id: Set(new.grn_line_id),
        vendor_id: Set(new.vendor_id),
        unit_price: Set(new.unit_price),
        disposition: Set(new.disposition),
        received_quantity: Set(new.received_quantity),
        available_quantity: Set(available),
        reserved_quantity: Set(Decimal::ZERO),
        consumed_quantity: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
        is_deleted: Set(false),
        version: Set(1),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(|e| ServiceError::on_unique_violation(e, duplicate))?;

    let ctx = AllocationContext {
        note: new.grn_line_id.map(|line| format!("GRN line {}", line)),
        ..Default::default()
    };
    record_transaction(
        txn,
        batch.id,
        StockTransactionType::Receipt,
        batch.received_quantity,
        &ctx,
    )
    .await?;

    info!(
        batch_id = batch.id,
        disposition = %batch.disposition,
        received = %batch.received_quantity,
        "Stock batch created"
    );
    Ok(batch)
}

pub(crate) async fn find_batch<C: ConnectionTrait>(
    conn: &C,
    batch_id: i64,
) -> Result<stock_batch::Model, ServiceError> {
    stock_batch::Entity::find_by_id(batch_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Stock batch {} not found", batch_id)))
}

pub(crate) async fn batch_transactions<C: ConnectionTrait>(
    conn: &C,
    batch_id: i64,
) -> Result<Vec<stock_transaction::Model>, ServiceError> {
    stock_transaction::Entity::find()
        .filter(stock_transaction::Column::BatchId.eq(batch_id))
        .order_by_asc(stock_transaction::Column::CreatedAt)
        .order_by_asc(stock_transaction::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub(crate) async fn load_batch_detail<C: ConnectionTrait>(
    conn: &C,
    batch_id: i64,
) -> Result<BatchDetail, ServiceError> {
    let batch = find_batch(conn, batch_id).await?;
    let transactions = batch_transactions(conn, batch_id).await?;
    Ok(BatchDetail {
        held_quantity: batch.held_quantity(),
        batch,
        transactions,
    })
}

/// Batches of a variant in allocation order.
pub(crate) async fn batches_for_variant<C: ConnectionTrait>(
    conn: &C,
    variant_id: i64,
) -> Result<Vec<stock_batch::Model>, ServiceError> {
    stock_batch::Entity::find()
        .filter(stock_batch::Column::MaterialVariantId.eq(variant_id))
        .filter(stock_batch::Column::IsDeleted.eq(false))
        .order_by_asc(stock_batch::Column::CreatedAt)
        .order_by_asc(stock_batch::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub(crate) async fn summarize_variant<C: ConnectionTrait>(
    conn: &C,
    variant_id: i64,
) -> Result<VariantStockSummary, ServiceError> {
    let variant = catalog::require_variant(conn, variant_id).await?;
    let batches = batches_for_variant(conn, variant_id).await?;

    let totals = batches
        .iter()
        .map(CounterSnapshot::of)
        .fold(CounterSnapshot::default(), |acc, c| CounterSnapshot {
            received: acc.received + c.received,
            available: acc.available + c.available,
            reserved: acc.reserved + c.reserved,
            consumed: acc.consumed + c.consumed,
        });

    Ok(VariantStockSummary {
        material_variant_id: variant.id,
        sku: variant.sku,
        name: variant.name,
        unit_of_measure: variant.unit_of_measure,
        batch_count: batches.len(),
        received: totals.received,
        available: totals.available,
        reserved: totals.reserved,
        consumed: totals.consumed,
        held: totals.held(),
    })
}

fn audit(batch: &stock_batch::Model, transactions: &[stock_transaction::Model]) -> BatchAudit {
    BatchAudit {
        batch_id: batch.id,
        batch_number: batch.batch_number.clone(),
        material_variant_id: batch.material_variant_id,
        disposition: batch.disposition,
        stored: CounterSnapshot::of(batch),
        replayed: replay(batch.disposition, transactions),
    }
}

#[derive(Clone)]
pub struct StockBatchRegistry {
    db: Arc<DatabaseConnection>,
}

impl StockBatchRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_batch(&self, new: NewBatch) -> Result<stock_batch::Model, ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let result = create_batch_in(uow.txn(), new).await;
        uow.finish(result).await
    }

    #[instrument(skip(self))]
    pub async fn get_batch_detail(&self, batch_id: i64) -> Result<BatchDetail, ServiceError> {
        load_batch_detail(&*self.db, batch_id).await
    }

    #[instrument(skip(self))]
    pub async fn variant_summary(&self, variant_id: i64) -> Result<VariantStockSummary, ServiceError> {
        summarize_variant(&*self.db, variant_id).await
    }

    /// Batches of a variant, oldest first.
    pub async fn list_batches(&self, variant_id: i64) -> Result<Vec<stock_batch::Model>, ServiceError> {
        catalog::require_variant(&*self.db, variant_id).await?;
        batches_for_variant(&*self.db, variant_id).await
    }

    /// Counters of a batch as rebuilt from its transactions.
    #[instrument(skip(self))]
    pub async fn replay_ledger(&self, batch_id: i64) -> Result<CounterSnapshot, ServiceError> {
        let batch = find_batch(&*self.db, batch_id).await?;
        let transactions = batch_transactions(&*self.db, batch_id).await?;
        Ok(replay(batch.disposition, &transactions))
    }

    #[instrument(skip(self))]
    pub async fn audit_batch(&self, batch_id: i64) -> Result<BatchAudit, ServiceError> {
        let batch = find_batch(&*self.db, batch_id).await?;
        let transactions = batch_transactions(&*self.db, batch_id).await?;
        Ok(audit(&batch, &transactions))
    }

    /// Replays every batch and reports the ones whose stored counters drift
    /// from their ledger or break conservation.
    #[instrument(skip(self))]
    pub async fn audit_all(&self) -> Result<LedgerAuditReport, ServiceError> {
        let batches = stock_batch::Entity::find()
            .order_by_asc(stock_batch::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let transactions = stock_transaction::Entity::find()
            .order_by_asc(stock_transaction::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut report = LedgerAuditReport {
            batches_checked: batches.len(),
            findings: Vec::new(),
        };
        for batch in &batches {
            let own: Vec<stock_transaction::Model> = transactions
                .iter()
                .filter(|txn| txn.batch_id == batch.id)
                .cloned()
                .collect();
            let finding = audit(batch, &own);
            if !finding.is_clean() {
                warn!(
                    batch_id = batch.id,
                    batch_number = %batch.batch_number,
                    "Ledger drift detected"
                );
                report.findings.push(finding);
            }
        }

        info!(
            batches_checked = report.batches_checked,
            findings = report.findings.len(),
            "Ledger audit finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn txn(transaction_type: StockTransactionType, quantity: Decimal) -> stock_transaction::Model {
        let now = Utc::now();
        stock_transaction::Model {
            id: 0,
            batch_id: 1,
            transaction_type,
            quantity,
            work_order_id: None,
            requisition_id: None,
            note: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            version: 1,
        }
    }

    #[test]
    fn batch_keys_ignore_case_and_padding() {
        assert_eq!(normalize_batch_key(" lot-7a "), "LOT-7A");
        assert_eq!(normalize_batch_key("LOT-7A"), normalize_batch_key("Lot-7a"));
    }

    #[test]
    fn replay_rebuilds_approved_counters() {
        let ledger = vec![
            txn(StockTransactionType::Receipt, dec!(10)),
            txn(StockTransactionType::Reserve, dec!(6)),
            txn(StockTransactionType::Release, dec!(2)),
            txn(StockTransactionType::Consume, dec!(3)),
        ];
        let counters = replay(QualityDisposition::Approved, &ledger);
        assert_eq!(
            counters,
            CounterSnapshot {
                received: dec!(10),
                available: dec!(6),
                reserved: dec!(1),
                consumed: dec!(3),
            }
        );
        assert!(counters.conserves(QualityDisposition::Approved));
    }

    #[test]
    fn pending_batches_hold_their_receipt() {
        let counters = replay(
            QualityDisposition::PendingQc,
            &[txn(StockTransactionType::Receipt, dec!(4))],
        );
        assert_eq!(counters.available, Decimal::ZERO);
        assert_eq!(counters.held(), dec!(4));
        assert!(counters.conserves(QualityDisposition::PendingQc));
        assert!(!counters.conserves(QualityDisposition::Approved));
    }

    #[test]
    fn negative_counters_break_conservation() {
        let counters = CounterSnapshot {
            received: dec!(5),
            available: dec!(-1),
            reserved: dec!(6),
            consumed: Decimal::ZERO,
        };
        assert!(!counters.conserves(QualityDisposition::Approved));
    }
}
