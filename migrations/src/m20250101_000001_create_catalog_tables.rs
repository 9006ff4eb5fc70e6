use sea_orm_migration::prelude::*;

use crate::{audit_columns, id_column};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut categories = Table::create();
        categories
            .table(MaterialCategories::Table)
            .if_not_exists()
            .col(id_column(MaterialCategories::Id))
            .col(ColumnDef::new(MaterialCategories::Name).string().not_null());
        audit_columns(&mut categories);
        manager.create_table(categories).await?;

        let mut variants = Table::create();
        variants
            .table(MaterialVariants::Table)
            .if_not_exists()
            .col(id_column(MaterialVariants::Id))
            .col(
                ColumnDef::new(MaterialVariants::CategoryId)
                    .big_integer()
                    .not_null(),
            )
            .col(ColumnDef::new(MaterialVariants::Grade).string().not_null())
            .col(ColumnDef::new(MaterialVariants::Sku).string().not_null())
            .col(ColumnDef::new(MaterialVariants::Name).string().not_null())
            .col(
                ColumnDef::new(MaterialVariants::UnitOfMeasure)
                    .string()
                    .not_null(),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_material_variants_category_id")
                    .from(MaterialVariants::Table, MaterialVariants::CategoryId)
                    .to(MaterialCategories::Table, MaterialCategories::Id),
            );
        audit_columns(&mut variants);
        manager.create_table(variants).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_material_variants_sku")
                    .table(MaterialVariants::Table)
                    .col(MaterialVariants::Sku)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MaterialVariants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MaterialCategories::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum MaterialCategories {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
pub(crate) enum MaterialVariants {
    Table,
    Id,
    CategoryId,
    Grade,
    Sku,
    Name,
    UnitOfMeasure,
}
