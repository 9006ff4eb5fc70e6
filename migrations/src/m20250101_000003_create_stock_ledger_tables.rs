use sea_orm_migration::prelude::*;

use crate::m20250101_000001_create_catalog_tables::MaterialVariants;
use crate::m20250101_000002_create_procurement_tables::{GrnLines, Vendors};
use crate::{audit_columns, id_column, quantity_column, Audit};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut batches = Table::create();
        batches
            .table(StockBatches::Table)
            .if_not_exists()
            .col(id_column(StockBatches::Id))
            .col(
                ColumnDef::new(StockBatches::MaterialVariantId)
                    .big_integer()
                    .not_null(),
            )
            .col(ColumnDef::new(StockBatches::BatchNumber).string().not_null())
            .col(ColumnDef::new(StockBatches::BatchKey).string().not_null())
            .col(ColumnDef::new(StockBatches::GrnLineId).big_integer().null())
            .col(ColumnDef::new(StockBatches::VendorId).big_integer().null())
            .col(quantity_column(StockBatches::UnitPrice))
            .col(
                ColumnDef::new(StockBatches::Disposition)
                    .string_len(20)
                    .not_null(),
            )
            .col(quantity_column(StockBatches::ReceivedQuantity))
            .col(quantity_column(StockBatches::AvailableQuantity))
            .col(quantity_column(StockBatches::ReservedQuantity))
            .col(quantity_column(StockBatches::ConsumedQuantity))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_stock_batches_material_variant_id")
                    .from(StockBatches::Table, StockBatches::MaterialVariantId)
                    .to(MaterialVariants::Table, MaterialVariants::Id),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_stock_batches_grn_line_id")
                    .from(StockBatches::Table, StockBatches::GrnLineId)
                    .to(GrnLines::Table, GrnLines::Id),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_stock_batches_vendor_id")
                    .from(StockBatches::Table, StockBatches::VendorId)
                    .to(Vendors::Table, Vendors::Id),
            );
        audit_columns(&mut batches);
        manager.create_table(batches).await?;

        // batch_key holds the upper-cased batch number
        manager
            .create_index(
                Index::create()
                    .name("idx_stock_batches_variant_batch_key")
                    .table(StockBatches::Table)
                    .col(StockBatches::MaterialVariantId)
                    .col(StockBatches::BatchKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_batches_grn_line_id")
                    .table(StockBatches::Table)
                    .col(StockBatches::GrnLineId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_batches_fifo")
                    .table(StockBatches::Table)
                    .col(StockBatches::MaterialVariantId)
                    .col(Audit::CreatedAt)
                    .col(StockBatches::Id)
                    .to_owned(),
            )
            .await?;

        let mut transactions = Table::create();
        transactions
            .table(StockTransactions::Table)
            .if_not_exists()
            .col(id_column(StockTransactions::Id))
            .col(
                ColumnDef::new(StockTransactions::BatchId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(StockTransactions::TransactionType)
                    .string_len(20)
                    .not_null(),
            )
            .col(quantity_column(StockTransactions::Quantity))
            .col(
                ColumnDef::new(StockTransactions::WorkOrderId)
                    .big_integer()
                    .null(),
            )
            .col(
                ColumnDef::new(StockTransactions::RequisitionId)
                    .big_integer()
                    .null(),
            )
            .col(ColumnDef::new(StockTransactions::Note).text().null())
            .foreign_key(
                ForeignKey::create()
                    .name("fk_stock_transactions_batch_id")
                    .from(StockTransactions::Table, StockTransactions::BatchId)
                    .to(StockBatches::Table, StockBatches::Id),
            );
        audit_columns(&mut transactions);
        manager.create_table(transactions).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_transactions_batch_id")
                    .table(StockTransactions::Table)
                    .col(StockTransactions::BatchId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StockBatches::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum StockBatches {
    Table,
    Id,
    MaterialVariantId,
    BatchNumber,
    BatchKey,
    GrnLineId,
    VendorId,
    UnitPrice,
    Disposition,
    ReceivedQuantity,
    AvailableQuantity,
    ReservedQuantity,
    ConsumedQuantity,
}

#[derive(DeriveIden)]
enum StockTransactions {
    Table,
    Id,
    BatchId,
    TransactionType,
    Quantity,
    WorkOrderId,
    RequisitionId,
    Note,
}
