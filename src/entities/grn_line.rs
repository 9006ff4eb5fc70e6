use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::stock_batch::QualityDisposition;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "grn_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub grn_id: i64,
    pub vendor_po_line_id: Option<i64>,
    pub material_variant_id: i64,
    pub batch_number: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub received_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_price: Decimal,
    pub quality_status: QualityDisposition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::goods_receipt_note::Entity",
        from = "Column::GrnId",
        to = "super::goods_receipt_note::Column::Id"
    )]
    GoodsReceiptNote,
    #[sea_orm(
        belongs_to = "super::material_variant::Entity",
        from = "Column::MaterialVariantId",
        to = "super::material_variant::Column::Id"
    )]
    MaterialVariant,
    #[sea_orm(has_one = "super::stock_batch::Entity")]
    StockBatch,
}

impl Related<super::goods_receipt_note::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoodsReceiptNote.def()
    }
}

impl Related<super::material_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MaterialVariant.def()
    }
}

impl Related<super::stock_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockBatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
