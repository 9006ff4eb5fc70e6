pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_catalog_tables;
mod m20250101_000002_create_procurement_tables;
mod m20250101_000003_create_stock_ledger_tables;
mod m20250101_000004_create_requisition_tables;
mod m20250101_000005_create_invoice_decisions_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_catalog_tables::Migration),
            Box::new(m20250101_000002_create_procurement_tables::Migration),
            Box::new(m20250101_000003_create_stock_ledger_tables::Migration),
            Box::new(m20250101_000004_create_requisition_tables::Migration),
            Box::new(m20250101_000005_create_invoice_decisions_table::Migration),
        ]
    }
}

/// Bookkeeping columns carried by every table: timestamps, soft-delete flag
/// and the optimistic concurrency version.
#[derive(DeriveIden)]
pub(crate) enum Audit {
    CreatedAt,
    UpdatedAt,
    IsDeleted,
    Version,
}

pub(crate) fn audit_columns(table: &mut TableCreateStatement) -> &mut TableCreateStatement {
    table
        .col(
            ColumnDef::new(Audit::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(Audit::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(Audit::IsDeleted)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(Audit::Version)
                .integer()
                .not_null()
                .default(1),
        )
}

pub(crate) fn id_column<T: IntoIden>(name: T) -> ColumnDef {
    ColumnDef::new(name)
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

pub(crate) fn quantity_column<T: IntoIden>(name: T) -> ColumnDef {
    ColumnDef::new(name)
        .decimal_len(16, 4)
        .not_null()
        .default(0)
        .to_owned()
}
