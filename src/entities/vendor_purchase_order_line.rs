use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendor_purchase_order_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub vendor_po_id: i64,
    pub material_variant_id: i64,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub ordered_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vendor_purchase_order::Entity",
        from = "Column::VendorPoId",
        to = "super::vendor_purchase_order::Column::Id"
    )]
    VendorPurchaseOrder,
    #[sea_orm(
        belongs_to = "super::material_variant::Entity",
        from = "Column::MaterialVariantId",
        to = "super::material_variant::Column::Id"
    )]
    MaterialVariant,
}

impl Related<super::vendor_purchase_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VendorPurchaseOrder.def()
    }
}

impl Related<super::material_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MaterialVariant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
