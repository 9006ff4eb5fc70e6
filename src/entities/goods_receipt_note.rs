use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "goods_receipt_notes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub grn_number: String,
    pub vendor_po_id: i64,
    pub vendor_id: i64,
    pub vendor_invoice_id: Option<i64>,
    pub invoice_number: String,
    pub receipt_date: NaiveDate,
    pub status: GrnStatus,
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
    #[sea_orm(has_many = "super::grn_line::Entity")]
    Lines,
}

impl Related<super::vendor_purchase_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VendorPurchaseOrder.def()
    }
}

impl Related<super::grn_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum GrnStatus {
    /// Generated from an accepted invoice; lines are still editable.
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "submitted")]
    Submitted,
}
