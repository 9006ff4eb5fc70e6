use sea_orm_migration::prelude::*;

use crate::m20250101_000001_create_catalog_tables::MaterialVariants;
use crate::m20250101_000003_create_stock_ledger_tables::StockBatches;
use crate::{audit_columns, id_column, quantity_column};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut requisitions = Table::create();
        requisitions
            .table(Requisitions::Table)
            .if_not_exists()
            .col(id_column(Requisitions::Id))
            .col(
                ColumnDef::new(Requisitions::WorkOrderId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(Requisitions::Status)
                    .string_len(20)
                    .not_null(),
            )
            .col(ColumnDef::new(Requisitions::ApprovedBy).string().null())
            .col(
                ColumnDef::new(Requisitions::ApprovedAt)
                    .timestamp_with_time_zone()
                    .null(),
            );
        audit_columns(&mut requisitions);
        manager.create_table(requisitions).await?;

        let mut lines = Table::create();
        lines
            .table(RequisitionLines::Table)
            .if_not_exists()
            .col(id_column(RequisitionLines::Id))
            .col(
                ColumnDef::new(RequisitionLines::RequisitionId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(RequisitionLines::MaterialVariantId)
                    .big_integer()
                    .not_null(),
            )
            .col(quantity_column(RequisitionLines::RequiredQuantity))
            .col(
                ColumnDef::new(RequisitionLines::LineNo)
                    .integer()
                    .not_null(),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_requisition_lines_requisition_id")
                    .from(RequisitionLines::Table, RequisitionLines::RequisitionId)
                    .to(Requisitions::Table, Requisitions::Id),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_requisition_lines_material_variant_id")
                    .from(RequisitionLines::Table, RequisitionLines::MaterialVariantId)
                    .to(MaterialVariants::Table, MaterialVariants::Id),
            );
        audit_columns(&mut lines);
        manager.create_table(lines).await?;

        let mut allocations = Table::create();
        allocations
            .table(RequisitionBatchAllocations::Table)
            .if_not_exists()
            .col(id_column(RequisitionBatchAllocations::Id))
            .col(
                ColumnDef::new(RequisitionBatchAllocations::RequisitionLineId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(RequisitionBatchAllocations::BatchId)
                    .big_integer()
                    .not_null(),
            )
            .col(quantity_column(RequisitionBatchAllocations::ReservedQuantity))
            .col(quantity_column(RequisitionBatchAllocations::ConsumedQuantity))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_requisition_batch_allocations_line_id")
                    .from(
                        RequisitionBatchAllocations::Table,
                        RequisitionBatchAllocations::RequisitionLineId,
                    )
                    .to(RequisitionLines::Table, RequisitionLines::Id),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_requisition_batch_allocations_batch_id")
                    .from(
                        RequisitionBatchAllocations::Table,
                        RequisitionBatchAllocations::BatchId,
                    )
                    .to(StockBatches::Table, StockBatches::Id),
            );
        audit_columns(&mut allocations);
        manager.create_table(allocations).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_requisition_batch_allocations_line_batch")
                    .table(RequisitionBatchAllocations::Table)
                    .col(RequisitionBatchAllocations::RequisitionLineId)
                    .col(RequisitionBatchAllocations::BatchId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(RequisitionBatchAllocations::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(RequisitionLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Requisitions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Requisitions {
    Table,
    Id,
    WorkOrderId,
    Status,
    ApprovedBy,
    ApprovedAt,
}

#[derive(DeriveIden)]
enum RequisitionLines {
    Table,
    Id,
    RequisitionId,
    MaterialVariantId,
    RequiredQuantity,
    LineNo,
}

#[derive(DeriveIden)]
enum RequisitionBatchAllocations {
    Table,
    Id,
    RequisitionLineId,
    BatchId,
    ReservedQuantity,
    ConsumedQuantity,
}
