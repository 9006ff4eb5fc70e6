use sea_orm_migration::prelude::*;

use crate::m20250101_000002_create_procurement_tables::VendorInvoices;
use crate::{audit_columns, id_column};

/// Append-only history of accept/decline decisions taken on vendor invoices.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut decisions = Table::create();
        decisions
            .table(VendorInvoiceDecisions::Table)
            .if_not_exists()
            .col(id_column(VendorInvoiceDecisions::Id))
            .col(
                ColumnDef::new(VendorInvoiceDecisions::VendorInvoiceId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(VendorInvoiceDecisions::Decision)
                    .string_len(20)
                    .not_null(),
            )
            .col(ColumnDef::new(VendorInvoiceDecisions::Reason).text().null())
            .col(
                ColumnDef::new(VendorInvoiceDecisions::DecidedBy)
                    .string()
                    .null(),
            )
            .col(
                ColumnDef::new(VendorInvoiceDecisions::DecidedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_vendor_invoice_decisions_invoice_id")
                    .from(
                        VendorInvoiceDecisions::Table,
                        VendorInvoiceDecisions::VendorInvoiceId,
                    )
                    .to(VendorInvoices::Table, VendorInvoices::Id),
            );
        audit_columns(&mut decisions);
        manager.create_table(decisions).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vendor_invoice_decisions_invoice_id")
                    .table(VendorInvoiceDecisions::Table)
                    .col(VendorInvoiceDecisions::VendorInvoiceId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VendorInvoiceDecisions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum VendorInvoiceDecisions {
    Table,
    Id,
    VendorInvoiceId,
    Decision,
    Reason,
    DecidedBy,
    DecidedAt,
}
