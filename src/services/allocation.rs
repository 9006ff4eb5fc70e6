//! FIFO allocation engine.
//!
//! Reserve, release and consume walk every batch of a material variant oldest
//! first (creation time, then batch id) and move quantity between the batch
//! counters. Each call is all-or-nothing: the full quantity is planned against
//! the loaded batches before the first row is written, and any failure rolls
//! back the surrounding unit of work.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::db::{expect_single_row, UnitOfWork};
use crate::entities::stock_batch::{self, QualityDisposition};
use crate::entities::stock_transaction::StockTransactionType;
use crate::errors::ServiceError;
use crate::services::catalog;
use crate::services::requisitions::record_consumption_in;
use crate::services::stock_batches::record_transaction;

/// References stamped on every transaction a movement appends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationContext {
    pub work_order_id: Option<i64>,
    pub requisition_id: Option<i64>,
    pub note: Option<String>,
}

impl AllocationContext {
    pub fn for_work_order(work_order_id: i64) -> Self {
        Self {
            work_order_id: Some(work_order_id),
            ..Default::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Quantity moved out of one batch by a single call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTake {
    pub batch_id: i64,
    pub batch_number: String,
    pub quantity: Decimal,
}

/// Input to [`plan_fifo`]: how much a batch can give for the movement at hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSlot {
    pub batch_id: i64,
    pub created_at: DateTime<Utc>,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTake {
    pub batch_id: i64,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub available: Decimal,
    pub shortfall: Decimal,
}

/// Splits `requested` across `slots` oldest first.
///
/// Slots with no quantity are skipped. Returns the shortfall instead of a
/// partial plan when the slots cannot cover the request.
pub fn plan_fifo(slots: &[BatchSlot], requested: Decimal) -> Result<Vec<PlannedTake>, Shortfall> {
    let mut ordered: Vec<&BatchSlot> = slots
        .iter()
        .filter(|slot| slot.quantity > Decimal::ZERO)
        .collect();
    ordered.sort_by_key(|slot| (slot.created_at, slot.batch_id));

    let available: Decimal = ordered.iter().map(|slot| slot.quantity).sum();
    if available < requested {
        return Err(Shortfall {
            available,
            shortfall: requested - available,
        });
    }

    let mut remaining = requested;
    let mut plan = Vec::new();
    for slot in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = slot.quantity.min(remaining);
        plan.push(PlannedTake {
            batch_id: slot.batch_id,
            quantity: take,
        });
        remaining -= take;
    }

    Ok(plan)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
enum Movement {
    Reserve,
    Release,
    Consume,
}

impl Movement {
    /// Counter the movement draws from.
    fn source(self, batch: &stock_batch::Model) -> Decimal {
        match self {
            Movement::Reserve => batch.available_quantity,
            Movement::Release | Movement::Consume => batch.reserved_quantity,
        }
    }

    fn transaction_type(self) -> StockTransactionType {
        match self {
            Movement::Reserve => StockTransactionType::Reserve,
            Movement::Release => StockTransactionType::Release,
            Movement::Consume => StockTransactionType::Consume,
        }
    }

    /// New (available, reserved, consumed) after moving `quantity`.
    fn apply(self, batch: &stock_batch::Model, quantity: Decimal) -> (Decimal, Decimal, Decimal) {
        let (available, reserved, consumed) = (
            batch.available_quantity,
            batch.reserved_quantity,
            batch.consumed_quantity,
        );
        match self {
            Movement::Reserve => (available - quantity, reserved + quantity, consumed),
            Movement::Release => (available + quantity, reserved - quantity, consumed),
            Movement::Consume => (available, reserved - quantity, consumed + quantity),
        }
    }

    fn shortage(self, variant_id: i64, requested: Decimal, short: Shortfall) -> ServiceError {
        match self {
            Movement::Reserve => ServiceError::InsufficientStock {
                variant_id,
                requested,
                available: short.available,
                shortfall: short.shortfall,
            },
            Movement::Release => ServiceError::OverRelease {
                variant_id,
                requested,
                reserved: short.available,
            },
            Movement::Consume => ServiceError::OverConsume {
                variant_id,
                requested,
                reserved: short.available,
            },
        }
    }
}

/// Reserves `quantity` of a variant inside the caller's transaction.
pub async fn reserve_fifo_in(
    txn: &DatabaseTransaction,
    variant_id: i64,
    quantity: Decimal,
    ctx: &AllocationContext,
) -> Result<Vec<BatchTake>, ServiceError> {
    move_fifo(txn, Movement::Reserve, variant_id, quantity, ctx).await
}

/// Returns reserved quantity to available inside the caller's transaction.
pub async fn release_fifo_in(
    txn: &DatabaseTransaction,
    variant_id: i64,
    quantity: Decimal,
    ctx: &AllocationContext,
) -> Result<Vec<BatchTake>, ServiceError> {
    move_fifo(txn, Movement::Release, variant_id, quantity, ctx).await
}

/// Moves reserved quantity to consumed inside the caller's transaction. With a
/// requisition in `ctx`, the consumed quantity is also booked on that
/// requisition's batch allocations.
pub async fn consume_fifo_in(
    txn: &DatabaseTransaction,
    variant_id: i64,
    quantity: Decimal,
    ctx: &AllocationContext,
) -> Result<Vec<BatchTake>, ServiceError> {
    let takes = move_fifo(txn, Movement::Consume, variant_id, quantity, ctx).await?;
    if let Some(requisition_id) = ctx.requisition_id {
        record_consumption_in(txn, requisition_id, &takes).await?;
    }
    Ok(takes)
}

#[instrument(skip(txn, ctx))]
async fn move_fifo(
    txn: &DatabaseTransaction,
    movement: Movement,
    variant_id: i64,
    quantity: Decimal,
    ctx: &AllocationContext,
) -> Result<Vec<BatchTake>, ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::InvalidArgument(format!(
            "{} quantity must be positive, got {}",
            movement, quantity
        )));
    }

    catalog::require_variant(txn, variant_id).await?;

    let mut query = stock_batch::Entity::find()
        .filter(stock_batch::Column::MaterialVariantId.eq(variant_id))
        .filter(stock_batch::Column::IsDeleted.eq(false));
    if movement == Movement::Reserve {
        query = query.filter(stock_batch::Column::Disposition.eq(QualityDisposition::Approved));
    }
    let batches = query
        .order_by_asc(stock_batch::Column::CreatedAt)
        .order_by_asc(stock_batch::Column::Id)
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let slots: Vec<BatchSlot> = batches
        .iter()
        .map(|batch| BatchSlot {
            batch_id: batch.id,
            created_at: batch.created_at,
            quantity: movement.source(batch),
        })
        .collect();

    let plan = plan_fifo(&slots, quantity).map_err(|short| {
        debug!(
            variant_id,
            available = %short.available,
            shortfall = %short.shortfall,
            "FIFO plan cannot cover request"
        );
        movement.shortage(variant_id, quantity, short)
    })?;

    let takes = apply_plan(txn, movement, &batches, plan, ctx).await?;

    info!(
        variant_id,
        quantity = %quantity,
        batches_touched = takes.len(),
        "{} applied",
        movement
    );
    Ok(takes)
}

/// Writes a plan against the batch rows it was computed from. A row whose
/// version moved since it was loaded fails the whole movement.
async fn apply_plan(
    txn: &DatabaseTransaction,
    movement: Movement,
    batches: &[stock_batch::Model],
    plan: Vec<PlannedTake>,
    ctx: &AllocationContext,
) -> Result<Vec<BatchTake>, ServiceError> {
    let by_id: HashMap<i64, &stock_batch::Model> =
        batches.iter().map(|batch| (batch.id, batch)).collect();
    let now = Utc::now();
    let mut takes = Vec::with_capacity(plan.len());

    for step in plan {
        let batch = by_id.get(&step.batch_id).copied().ok_or_else(|| {
            ServiceError::InternalError(format!("Planned batch {} was not loaded", step.batch_id))
        })?;
        let (available, reserved, consumed) = movement.apply(batch, step.quantity);

        let result = stock_batch::Entity::update_many()
            .col_expr(stock_batch::Column::AvailableQuantity, Expr::value(available))
            .col_expr(stock_batch::Column::ReservedQuantity, Expr::value(reserved))
            .col_expr(stock_batch::Column::ConsumedQuantity, Expr::value(consumed))
            .col_expr(stock_batch::Column::Version, Expr::value(batch.version + 1))
            .col_expr(stock_batch::Column::UpdatedAt, Expr::value(now))
            .filter(stock_batch::Column::Id.eq(batch.id))
            .filter(stock_batch::Column::Version.eq(batch.version))
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;
        expect_single_row(result.rows_affected, "stock_batch", batch.id)?;

        record_transaction(
            txn,
            batch.id,
            movement.transaction_type(),
            step.quantity,
            ctx,
        )
        .await?;

        takes.push(BatchTake {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            quantity: step.quantity,
        });
    }
    Ok(takes)
}

/// Standalone entry points; each call owns its own unit of work.
#[derive(Clone)]
pub struct AllocationEngine {
    db: Arc<DatabaseConnection>,
}

impl AllocationEngine {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, ctx))]
    pub async fn reserve_fifo(
        &self,
        variant_id: i64,
        quantity: Decimal,
        ctx: AllocationContext,
    ) -> Result<Vec<BatchTake>, ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let result = reserve_fifo_in(uow.txn(), variant_id, quantity, &ctx).await;
        uow.finish(result).await
    }

    #[instrument(skip(self, ctx))]
    pub async fn release(
        &self,
        variant_id: i64,
        quantity: Decimal,
        ctx: AllocationContext,
    ) -> Result<Vec<BatchTake>, ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let result = release_fifo_in(uow.txn(), variant_id, quantity, &ctx).await;
        uow.finish(result).await
    }

    #[instrument(skip(self, ctx))]
    pub async fn consume(
        &self,
        variant_id: i64,
        quantity: Decimal,
        ctx: AllocationContext,
    ) -> Result<Vec<BatchTake>, ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let result = consume_fifo_in(uow.txn(), variant_id, quantity, &ctx).await;
        uow.finish(result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::config::AppConfig;
    use crate::db::{establish_connection_from_app_config, run_migrations};
    use crate::entities::{material_category, material_variant};
    use crate::services::stock_batches::{create_batch_in, NewBatch};
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, Set};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn slot(batch_id: i64, minutes: i64, quantity: Decimal) -> BatchSlot {
        BatchSlot {
            batch_id,
            created_at: at(minutes),
            quantity,
        }
    }

    #[test]
    fn takes_oldest_batch_first() {
        let slots = [slot(2, 10, dec!(20)), slot(1, 0, dec!(10))];
        let plan = plan_fifo(&slots, dec!(15)).unwrap();
        assert_eq!(
            plan,
            vec![
                PlannedTake {
                    batch_id: 1,
                    quantity: dec!(10)
                },
                PlannedTake {
                    batch_id: 2,
                    quantity: dec!(5)
                },
            ]
        );
    }

    #[test]
    fn creation_time_ties_break_on_batch_id() {
        let slots = [slot(9, 0, dec!(4)), slot(3, 0, dec!(4))];
        let plan = plan_fifo(&slots, dec!(5)).unwrap();
        assert_eq!(plan[0].batch_id, 3);
        assert_eq!(plan[1].batch_id, 9);
        assert_eq!(plan[1].quantity, dec!(1));
    }

    #[test]
    fn empty_slots_are_skipped() {
        let slots = [slot(1, 0, dec!(0)), slot(2, 5, dec!(3))];
        let plan = plan_fifo(&slots, dec!(3)).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].batch_id, 2);
    }

    #[test]
    fn reports_shortfall_without_partial_plan() {
        let slots = [slot(1, 0, dec!(5)), slot(2, 1, dec!(3))];
        let short = plan_fifo(&slots, dec!(10)).unwrap_err();
        assert_eq!(short.available, dec!(8));
        assert_eq!(short.shortfall, dec!(2));
    }

    #[test]
    fn shortage_maps_to_movement_error() {
        let short = Shortfall {
            available: dec!(4),
            shortfall: dec!(1),
        };
        assert!(matches!(
            Movement::Release.shortage(7, dec!(5), short),
            ServiceError::OverRelease { reserved, .. } if reserved == dec!(4)
        ));
        assert!(matches!(
            Movement::Consume.shortage(7, dec!(5), short),
            ServiceError::OverConsume { .. }
        ));
    }

    proptest! {
        #[test]
        fn plan_conserves_quantity(
            quantities in proptest::collection::vec(0u32..50, 0..8),
            requested in 1u32..200,
        ) {
            let slots: Vec<BatchSlot> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| slot(i as i64 + 1, (quantities.len() - i) as i64, Decimal::from(*q)))
                .collect();
            let total: Decimal = slots.iter().map(|s| s.quantity).sum();
            let requested = Decimal::from(requested);

            match plan_fifo(&slots, requested) {
                Ok(plan) => {
                    let taken: Decimal = plan.iter().map(|t| t.quantity).sum();
                    prop_assert_eq!(taken, requested);
                    for take in &plan {
                        let source = slots.iter().find(|s| s.batch_id == take.batch_id).unwrap();
                        prop_assert!(take.quantity > Decimal::ZERO);
                        prop_assert!(take.quantity <= source.quantity);
                    }
                    // only the newest batch touched may be left with stock
                    for take in plan.iter().take(plan.len().saturating_sub(1)) {
                        let source = slots.iter().find(|s| s.batch_id == take.batch_id).unwrap();
                        prop_assert_eq!(take.quantity, source.quantity);
                    }
                }
                Err(short) => {
                    prop_assert!(total < requested);
                    prop_assert_eq!(short.available, total);
                    prop_assert_eq!(short.shortfall, requested - total);
                }
            }
        }
    }

    async fn ledger_with_one_batch() -> (DatabaseConnection, stock_batch::Model) {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        let db = establish_connection_from_app_config(&cfg)
            .await
            .expect("connect");
        run_migrations(&db).await.expect("migrations");

        let now = Utc::now();
        let category = material_category::ActiveModel {
            name: Set("Metals".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            is_deleted: Set(false),
            version: Set(1),
            ..Default::default()
        }
        .insert(&db)
        .await
        .expect("category");
        let variant = material_variant::ActiveModel {
            category_id: Set(category.id),
            grade: Set("304".to_string()),
            sku: Set("SS-304".to_string()),
            name: Set("304 sheet".to_string()),
            unit_of_measure: Set("kg".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            is_deleted: Set(false),
            version: Set(1),
            ..Default::default()
        }
        .insert(&db)
        .await
        .expect("variant");

        let uow = UnitOfWork::begin(&db).await.expect("begin");
        let created = create_batch_in(
            uow.txn(),
            NewBatch {
                material_variant_id: variant.id,
                batch_number: "S-1".to_string(),
                grn_line_id: None,
                vendor_id: None,
                received_quantity: dec!(10),
                unit_price: dec!(3),
                disposition: QualityDisposition::Approved,
            },
        )
        .await;
        let batch = uow.finish(created).await.expect("batch");
        (db, batch)
    }

    #[tokio::test]
    async fn stale_batch_version_fails_the_movement() {
        let (db, batch) = ledger_with_one_batch().await;

        let uow = UnitOfWork::begin(&db).await.expect("begin");
        let result = async {
            let loaded = stock_batch::Entity::find_by_id(batch.id)
                .one(uow.txn())
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| ServiceError::NotFound("batch".to_string()))?;

            // Another writer lands between the read and the write.
            stock_batch::Entity::update_many()
                .col_expr(stock_batch::Column::Version, Expr::value(loaded.version + 1))
                .filter(stock_batch::Column::Id.eq(loaded.id))
                .exec(uow.txn())
                .await
                .map_err(ServiceError::db_error)?;

            let plan = vec![PlannedTake {
                batch_id: loaded.id,
                quantity: dec!(4),
            }];
            apply_plan(
                uow.txn(),
                Movement::Reserve,
                &[loaded],
                plan,
                &AllocationContext::default(),
            )
            .await
        }
        .await;
        let err = uow.finish(result).await.unwrap_err();
        assert_matches!(err, ServiceError::ConcurrencyConflict { id, .. } if id == batch.id);

        let stored = stock_batch::Entity::find_by_id(batch.id)
            .one(&db)
            .await
            .expect("load")
            .expect("batch exists");
        assert_eq!(stored.version, batch.version);
        assert_eq!(stored.reserved_quantity, Decimal::ZERO);
        assert_eq!(stored.available_quantity, dec!(10));
    }

    #[tokio::test]
    async fn current_batch_version_applies_the_plan() {
        let (db, batch) = ledger_with_one_batch().await;

        let uow = UnitOfWork::begin(&db).await.expect("begin");
        let plan = vec![PlannedTake {
            batch_id: batch.id,
            quantity: dec!(4),
        }];
        let result = apply_plan(
            uow.txn(),
            Movement::Reserve,
            std::slice::from_ref(&batch),
            plan,
            &AllocationContext::default(),
        )
        .await;
        let takes = uow.finish(result).await.expect("apply");
        assert_eq!(takes.len(), 1);

        let stored = stock_batch::Entity::find_by_id(batch.id)
            .one(&db)
            .await
            .expect("load")
            .expect("batch exists");
        assert_eq!(stored.version, batch.version + 1);
        assert_eq!(stored.reserved_quantity, dec!(4));
    }
}
