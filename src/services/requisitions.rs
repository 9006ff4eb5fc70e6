//! Store requisition workflow: create, approve, FIFO allocation, detail.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::db::{expect_single_row, UnitOfWork};
use crate::entities::requisition::{self, RequisitionStatus};
use crate::entities::{requisition_batch_allocation, requisition_line, stock_batch};
use crate::errors::ServiceError;
use crate::services::allocation::{reserve_fifo_in, AllocationContext, BatchTake};
use crate::services::catalog;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequisitionLine {
    pub material_variant_id: i64,
    pub required_quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequisition {
    pub work_order_id: i64,
    pub lines: Vec<NewRequisitionLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationDetail {
    pub allocation_id: i64,
    pub batch_id: i64,
    pub batch_number: String,
    pub reserved_quantity: Decimal,
    pub consumed_quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequisitionLineDetail {
    pub line: requisition_line::Model,
    pub allocated_quantity: Decimal,
    pub outstanding_quantity: Decimal,
    pub allocations: Vec<AllocationDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequisitionDetail {
    pub requisition: requisition::Model,
    pub lines: Vec<RequisitionLineDetail>,
}

/// What one `allocate_fifo` call reserved for a line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineAllocation {
    pub requisition_line_id: i64,
    pub material_variant_id: i64,
    pub requested: Decimal,
    pub takes: Vec<BatchTake>,
}

async fn find_requisition<C: ConnectionTrait>(
    conn: &C,
    requisition_id: i64,
) -> Result<requisition::Model, ServiceError> {
    requisition::Entity::find_by_id(requisition_id)
        .filter(requisition::Column::IsDeleted.eq(false))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Requisition {} not found", requisition_id)))
}

async fn lines_of<C: ConnectionTrait>(
    conn: &C,
    requisition_id: i64,
) -> Result<Vec<requisition_line::Model>, ServiceError> {
    requisition_line::Entity::find()
        .filter(requisition_line::Column::RequisitionId.eq(requisition_id))
        .filter(requisition_line::Column::IsDeleted.eq(false))
        .order_by_asc(requisition_line::Column::LineNo)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn allocations_of<C: ConnectionTrait>(
    conn: &C,
    line_ids: Vec<i64>,
) -> Result<Vec<requisition_batch_allocation::Model>, ServiceError> {
    if line_ids.is_empty() {
        return Ok(Vec::new());
    }
    requisition_batch_allocation::Entity::find()
        .filter(requisition_batch_allocation::Column::RequisitionLineId.is_in(line_ids))
        .filter(requisition_batch_allocation::Column::IsDeleted.eq(false))
        .order_by_asc(requisition_batch_allocation::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Adds `quantity` to the (line, batch) allocation, creating it on first use.
async fn upsert_allocation(
    txn: &DatabaseTransaction,
    line_id: i64,
    batch_id: i64,
    quantity: Decimal,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let existing = requisition_batch_allocation::Entity::find()
        .filter(requisition_batch_allocation::Column::RequisitionLineId.eq(line_id))
        .filter(requisition_batch_allocation::Column::BatchId.eq(batch_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;

    match existing {
        Some(allocation) => {
            let result = requisition_batch_allocation::Entity::update_many()
                .col_expr(
                    requisition_batch_allocation::Column::ReservedQuantity,
                    Expr::value(allocation.reserved_quantity + quantity),
                )
                .col_expr(
                    requisition_batch_allocation::Column::Version,
                    Expr::value(allocation.version + 1),
                )
                .col_expr(
                    requisition_batch_allocation::Column::UpdatedAt,
                    Expr::value(now),
                )
                .filter(requisition_batch_allocation::Column::Id.eq(allocation.id))
                .filter(requisition_batch_allocation::Column::Version.eq(allocation.version))
                .exec(txn)
                .await
                .map_err(ServiceError::db_error)?;
            expect_single_row(
                result.rows_affected,
                "requisition_batch_allocation",
                allocation.id,
            )
        }
        None => {
            requisition_batch_allocation::ActiveModel {
                requisition_line_id: Set(line_id),
                batch_id: Set(batch_id),
                reserved_quantity: Set(quantity),
                consumed_quantity: Set(Decimal::ZERO),
                created_at: Set(now),
                updated_at: Set(now),
                is_deleted: Set(false),
                version: Set(1),
                ..Default::default()
            }
            .insert(txn)
            .await
            .map_err(|e| {
                ServiceError::on_unique_violation(e, || ServiceError::ConcurrencyConflict {
                    entity: "requisition_batch_allocation".to_string(),
                    id: line_id,
                })
            })?;
            Ok(())
        }
    }
}

/// Books consumed quantity against the requisition's (line, batch)
/// allocations for the batches a Consume drew from. Batches the requisition
/// never reserved are left alone; consumption always draws the oldest
/// reserved stock, which need not be this requisition's.
pub(crate) async fn record_consumption_in(
    txn: &DatabaseTransaction,
    requisition_id: i64,
    takes: &[BatchTake],
) -> Result<(), ServiceError> {
    let lines = lines_of(txn, requisition_id).await?;
    let allocations = allocations_of(txn, lines.iter().map(|l| l.id).collect()).await?;
    let now = Utc::now();

    for take in takes {
        let mut remaining = take.quantity;
        for allocation in allocations.iter().filter(|a| a.batch_id == take.batch_id) {
            let open = allocation.reserved_quantity - allocation.consumed_quantity;
            if remaining <= Decimal::ZERO || open <= Decimal::ZERO {
                continue;
            }
            let booked = open.min(remaining);
            let result = requisition_batch_allocation::Entity::update_many()
                .col_expr(
                    requisition_batch_allocation::Column::ConsumedQuantity,
                    Expr::value(allocation.consumed_quantity + booked),
                )
                .col_expr(
                    requisition_batch_allocation::Column::Version,
                    Expr::value(allocation.version + 1),
                )
                .col_expr(
                    requisition_batch_allocation::Column::UpdatedAt,
                    Expr::value(now),
                )
                .filter(requisition_batch_allocation::Column::Id.eq(allocation.id))
                .filter(requisition_batch_allocation::Column::Version.eq(allocation.version))
                .exec(txn)
                .await
                .map_err(ServiceError::db_error)?;
            expect_single_row(
                result.rows_affected,
                "requisition_batch_allocation",
                allocation.id,
            )?;
            remaining -= booked;
        }
        if remaining > Decimal::ZERO {
            debug!(
                requisition_id,
                batch_id = take.batch_id,
                unbooked = %remaining,
                "Consumed stock not allocated to this requisition"
            );
        }
    }
    Ok(())
}

async fn allocate_in(
    txn: &DatabaseTransaction,
    requisition_id: i64,
) -> Result<Vec<LineAllocation>, ServiceError> {
    let requisition = find_requisition(txn, requisition_id).await?;
    if requisition.status != RequisitionStatus::Approved {
        return Err(ServiceError::NotApproved {
            requisition_id,
            status: requisition.status.to_string(),
        });
    }

    let lines = lines_of(txn, requisition_id).await?;
    let allocations = allocations_of(txn, lines.iter().map(|l| l.id).collect()).await?;
    let mut reserved_by_line: HashMap<i64, Decimal> = HashMap::new();
    for allocation in &allocations {
        *reserved_by_line
            .entry(allocation.requisition_line_id)
            .or_default() += allocation.reserved_quantity;
    }

    let mut outcome = Vec::new();
    for line in lines {
        let already = reserved_by_line.get(&line.id).copied().unwrap_or_default();
        let to_allocate = line.required_quantity - already;
        if to_allocate <= Decimal::ZERO {
            debug!(line_id = line.id, "Line already fully allocated");
            continue;
        }

        let ctx = AllocationContext {
            work_order_id: Some(requisition.work_order_id),
            requisition_id: Some(requisition_id),
            note: Some(format!(
                "Requisition {} line {}",
                requisition_id, line.line_no
            )),
        };
        let takes = reserve_fifo_in(txn, line.material_variant_id, to_allocate, &ctx).await?;
        for take in &takes {
            upsert_allocation(txn, line.id, take.batch_id, take.quantity).await?;
        }

        outcome.push(LineAllocation {
            requisition_line_id: line.id,
            material_variant_id: line.material_variant_id,
            requested: to_allocate,
            takes,
        });
    }

    Ok(outcome)
}

#[derive(Clone)]
pub struct RequisitionService {
    db: Arc<DatabaseConnection>,
}

impl RequisitionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a Pending requisition with its lines numbered from 1.
    #[instrument(skip(self, request), fields(work_order_id = request.work_order_id))]
    pub async fn create_requisition(
        &self,
        request: CreateRequisition,
    ) -> Result<requisition::Model, ServiceError> {
        if request.lines.is_empty() {
            return Err(ServiceError::EmptyRequisition);
        }
        if let Some(bad) = request
            .lines
            .iter()
            .find(|line| line.required_quantity <= Decimal::ZERO)
        {
            return Err(ServiceError::ValidationError(format!(
                "Required quantity for material variant {} must be positive",
                bad.material_variant_id
            )));
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let result = Self::create_in(uow.txn(), request).await;
        let created = uow.finish(result).await?;
        info!(requisition_id = created.id, "Requisition created");
        Ok(created)
    }

    async fn create_in(
        txn: &DatabaseTransaction,
        request: CreateRequisition,
    ) -> Result<requisition::Model, ServiceError> {
        catalog::require_variants(txn, request.lines.iter().map(|l| l.material_variant_id))
            .await?;

        let now = Utc::now();
        let created = requisition::ActiveModel {
            work_order_id: Set(request.work_order_id),
            status: Set(RequisitionStatus::Pending),
            approved_by: Set(None),
            approved_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            is_deleted: Set(false),
            version: Set(1),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)?;

        for (index, line) in request.lines.into_iter().enumerate() {
            requisition_line::ActiveModel {
                requisition_id: Set(created.id),
                material_variant_id: Set(line.material_variant_id),
                required_quantity: Set(line.required_quantity),
                line_no: Set(index as i32 + 1),
                created_at: Set(now),
                updated_at: Set(now),
                is_deleted: Set(false),
                version: Set(1),
                ..Default::default()
            }
            .insert(txn)
            .await
            .map_err(ServiceError::db_error)?;
        }

        Ok(created)
    }

    /// Approves a Pending requisition. Any other state is returned unchanged.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        requisition_id: i64,
        approved_by: Option<String>,
    ) -> Result<requisition::Model, ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let result = Self::approve_in(uow.txn(), requisition_id, approved_by).await;
        uow.finish(result).await
    }

    async fn approve_in(
        txn: &DatabaseTransaction,
        requisition_id: i64,
        approved_by: Option<String>,
    ) -> Result<requisition::Model, ServiceError> {
        let current = find_requisition(txn, requisition_id).await?;
        if current.status != RequisitionStatus::Pending {
            debug!(requisition_id, status = %current.status, "Approve is a no-op");
            return Ok(current);
        }

        let now = Utc::now();
        let result = requisition::Entity::update_many()
            .col_expr(
                requisition::Column::Status,
                Expr::value(RequisitionStatus::Approved),
            )
            .col_expr(requisition::Column::ApprovedBy, Expr::value(approved_by))
            .col_expr(requisition::Column::ApprovedAt, Expr::value(Some(now)))
            .col_expr(requisition::Column::Version, Expr::value(current.version + 1))
            .col_expr(requisition::Column::UpdatedAt, Expr::value(now))
            .filter(requisition::Column::Id.eq(requisition_id))
            .filter(requisition::Column::Version.eq(current.version))
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;
        expect_single_row(result.rows_affected, "requisition", requisition_id)?;

        info!(requisition_id, "Requisition approved");
        find_requisition(txn, requisition_id).await
    }

    /// Reserves each line's outstanding quantity FIFO. Any shortage fails
    /// the whole call and keeps nothing.
    #[instrument(skip(self))]
    pub async fn allocate_fifo(
        &self,
        requisition_id: i64,
    ) -> Result<Vec<LineAllocation>, ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let result = allocate_in(uow.txn(), requisition_id).await;
        let outcome = uow.finish(result).await?;
        info!(
            requisition_id,
            lines_allocated = outcome.len(),
            "Requisition allocated"
        );
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn get_detail(&self, requisition_id: i64) -> Result<RequisitionDetail, ServiceError> {
        let db = &*self.db;
        let requisition = find_requisition(db, requisition_id).await?;
        let lines = lines_of(db, requisition_id).await?;
        let allocations = allocations_of(db, lines.iter().map(|l| l.id).collect()).await?;

        let batch_ids: Vec<i64> = allocations.iter().map(|a| a.batch_id).collect();
        let batch_numbers: HashMap<i64, String> = if batch_ids.is_empty() {
            HashMap::new()
        } else {
            stock_batch::Entity::find()
                .filter(stock_batch::Column::Id.is_in(batch_ids))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
                .into_iter()
                .map(|batch| (batch.id, batch.batch_number))
                .collect()
        };

        let lines = lines
            .into_iter()
            .map(|line| {
                let allocations: Vec<AllocationDetail> = allocations
                    .iter()
                    .filter(|a| a.requisition_line_id == line.id)
                    .map(|a| AllocationDetail {
                        allocation_id: a.id,
                        batch_id: a.batch_id,
                        batch_number: batch_numbers.get(&a.batch_id).cloned().unwrap_or_default(),
                        reserved_quantity: a.reserved_quantity,
                        consumed_quantity: a.consumed_quantity,
                    })
                    .collect();
                let allocated_quantity: Decimal =
                    allocations.iter().map(|a| a.reserved_quantity).sum();
                RequisitionLineDetail {
                    outstanding_quantity: (line.required_quantity - allocated_quantity)
                        .max(Decimal::ZERO),
                    allocated_quantity,
                    allocations,
                    line,
                }
            })
            .collect();

        Ok(RequisitionDetail { requisition, lines })
    }
}
