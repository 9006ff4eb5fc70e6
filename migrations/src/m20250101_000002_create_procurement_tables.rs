use sea_orm_migration::prelude::*;

use crate::m20250101_000001_create_catalog_tables::MaterialVariants;
use crate::{audit_columns, id_column, quantity_column};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut vendors = Table::create();
        vendors
            .table(Vendors::Table)
            .if_not_exists()
            .col(id_column(Vendors::Id))
            .col(ColumnDef::new(Vendors::Name).string().not_null())
            .col(ColumnDef::new(Vendors::Code).string().null());
        audit_columns(&mut vendors);
        manager.create_table(vendors).await?;

        let mut orders = Table::create();
        orders
            .table(VendorPurchaseOrders::Table)
            .if_not_exists()
            .col(id_column(VendorPurchaseOrders::Id))
            .col(
                ColumnDef::new(VendorPurchaseOrders::PoNumber)
                    .string()
                    .not_null(),
            )
            .col(
                ColumnDef::new(VendorPurchaseOrders::VendorId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(VendorPurchaseOrders::Status)
                    .string_len(20)
                    .not_null(),
            )
            .col(
                ColumnDef::new(VendorPurchaseOrders::OrderDate)
                    .date()
                    .not_null(),
            )
            .col(
                ColumnDef::new(VendorPurchaseOrders::IsDirectReceipt)
                    .boolean()
                    .not_null()
                    .default(false),
            )
            .col(ColumnDef::new(VendorPurchaseOrders::Notes).text().null())
            .foreign_key(
                ForeignKey::create()
                    .name("fk_vendor_purchase_orders_vendor_id")
                    .from(VendorPurchaseOrders::Table, VendorPurchaseOrders::VendorId)
                    .to(Vendors::Table, Vendors::Id),
            );
        audit_columns(&mut orders);
        manager.create_table(orders).await?;

        let mut order_lines = Table::create();
        order_lines
            .table(VendorPurchaseOrderLines::Table)
            .if_not_exists()
            .col(id_column(VendorPurchaseOrderLines::Id))
            .col(
                ColumnDef::new(VendorPurchaseOrderLines::VendorPoId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(VendorPurchaseOrderLines::MaterialVariantId)
                    .big_integer()
                    .not_null(),
            )
            .col(quantity_column(VendorPurchaseOrderLines::OrderedQuantity))
            .col(quantity_column(VendorPurchaseOrderLines::UnitPrice))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_vendor_po_lines_vendor_po_id")
                    .from(
                        VendorPurchaseOrderLines::Table,
                        VendorPurchaseOrderLines::VendorPoId,
                    )
                    .to(VendorPurchaseOrders::Table, VendorPurchaseOrders::Id),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_vendor_po_lines_material_variant_id")
                    .from(
                        VendorPurchaseOrderLines::Table,
                        VendorPurchaseOrderLines::MaterialVariantId,
                    )
                    .to(MaterialVariants::Table, MaterialVariants::Id),
            );
        audit_columns(&mut order_lines);
        manager.create_table(order_lines).await?;

        let mut invoices = Table::create();
        invoices
            .table(VendorInvoices::Table)
            .if_not_exists()
            .col(id_column(VendorInvoices::Id))
            .col(
                ColumnDef::new(VendorInvoices::VendorId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(VendorInvoices::VendorPoId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(VendorInvoices::InvoiceNumber)
                    .string()
                    .not_null(),
            )
            .col(ColumnDef::new(VendorInvoices::InvoiceDate).date().not_null())
            .col(
                ColumnDef::new(VendorInvoices::Status)
                    .string_len(20)
                    .not_null(),
            )
            .col(quantity_column(VendorInvoices::TotalAmount))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_vendor_invoices_vendor_po_id")
                    .from(VendorInvoices::Table, VendorInvoices::VendorPoId)
                    .to(VendorPurchaseOrders::Table, VendorPurchaseOrders::Id),
            );
        audit_columns(&mut invoices);
        manager.create_table(invoices).await?;

        let mut receipts = Table::create();
        receipts
            .table(GoodsReceiptNotes::Table)
            .if_not_exists()
            .col(id_column(GoodsReceiptNotes::Id))
            .col(
                ColumnDef::new(GoodsReceiptNotes::GrnNumber)
                    .string()
                    .not_null(),
            )
            .col(
                ColumnDef::new(GoodsReceiptNotes::VendorPoId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(GoodsReceiptNotes::VendorId)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(GoodsReceiptNotes::VendorInvoiceId)
                    .big_integer()
                    .null(),
            )
            .col(
                ColumnDef::new(GoodsReceiptNotes::InvoiceNumber)
                    .string()
                    .not_null(),
            )
            .col(
                ColumnDef::new(GoodsReceiptNotes::ReceiptDate)
                    .date()
                    .not_null(),
            )
            .col(
                ColumnDef::new(GoodsReceiptNotes::Status)
                    .string_len(20)
                    .not_null(),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_goods_receipt_notes_vendor_po_id")
                    .from(GoodsReceiptNotes::Table, GoodsReceiptNotes::VendorPoId)
                    .to(VendorPurchaseOrders::Table, VendorPurchaseOrders::Id),
            );
        audit_columns(&mut receipts);
        manager.create_table(receipts).await?;

        let mut receipt_lines = Table::create();
        receipt_lines
            .table(GrnLines::Table)
            .if_not_exists()
            .col(id_column(GrnLines::Id))
            .col(ColumnDef::new(GrnLines::GrnId).big_integer().not_null())
            .col(ColumnDef::new(GrnLines::VendorPoLineId).big_integer().null())
            .col(
                ColumnDef::new(GrnLines::MaterialVariantId)
                    .big_integer()
                    .not_null(),
            )
            .col(ColumnDef::new(GrnLines::BatchNumber).string().not_null())
            .col(quantity_column(GrnLines::ReceivedQuantity))
            .col(quantity_column(GrnLines::UnitPrice))
            .col(
                ColumnDef::new(GrnLines::QualityStatus)
                    .string_len(20)
                    .not_null(),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_grn_lines_grn_id")
                    .from(GrnLines::Table, GrnLines::GrnId)
                    .to(GoodsReceiptNotes::Table, GoodsReceiptNotes::Id),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_grn_lines_material_variant_id")
                    .from(GrnLines::Table, GrnLines::MaterialVariantId)
                    .to(MaterialVariants::Table, MaterialVariants::Id),
            );
        audit_columns(&mut receipt_lines);
        manager.create_table(receipt_lines).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vendor_purchase_orders_po_number")
                    .table(VendorPurchaseOrders::Table)
                    .col(VendorPurchaseOrders::PoNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // One invoice number per vendor, for invoices and receipts alike
        manager
            .create_index(
                Index::create()
                    .name("idx_vendor_invoices_vendor_invoice_number")
                    .table(VendorInvoices::Table)
                    .col(VendorInvoices::VendorId)
                    .col(VendorInvoices::InvoiceNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_goods_receipt_notes_vendor_invoice_number")
                    .table(GoodsReceiptNotes::Table)
                    .col(GoodsReceiptNotes::VendorId)
                    .col(GoodsReceiptNotes::InvoiceNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_goods_receipt_notes_grn_number")
                    .table(GoodsReceiptNotes::Table)
                    .col(GoodsReceiptNotes::GrnNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_grn_lines_grn_id")
                    .table(GrnLines::Table)
                    .col(GrnLines::GrnId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GrnLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GoodsReceiptNotes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VendorInvoices::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VendorPurchaseOrderLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VendorPurchaseOrders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Vendors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Vendors {
    Table,
    Id,
    Name,
    Code,
}

#[derive(DeriveIden)]
pub(crate) enum VendorPurchaseOrders {
    Table,
    Id,
    PoNumber,
    VendorId,
    Status,
    OrderDate,
    IsDirectReceipt,
    Notes,
}

#[derive(DeriveIden)]
enum VendorPurchaseOrderLines {
    Table,
    Id,
    VendorPoId,
    MaterialVariantId,
    OrderedQuantity,
    UnitPrice,
}

#[derive(DeriveIden)]
pub(crate) enum VendorInvoices {
    Table,
    Id,
    VendorId,
    VendorPoId,
    InvoiceNumber,
    InvoiceDate,
    Status,
    TotalAmount,
}

#[derive(DeriveIden)]
enum GoodsReceiptNotes {
    Table,
    Id,
    GrnNumber,
    VendorPoId,
    VendorId,
    VendorInvoiceId,
    InvoiceNumber,
    ReceiptDate,
    Status,
}

#[derive(DeriveIden)]
pub(crate) enum GrnLines {
    Table,
    Id,
    GrnId,
    VendorPoLineId,
    MaterialVariantId,
    BatchNumber,
    ReceivedQuantity,
    UnitPrice,
    QualityStatus,
}
