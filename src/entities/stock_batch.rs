use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One received lot of a material variant.
///
/// `received = available + reserved + consumed` for approved batches. Batches
/// still awaiting QC or rejected keep their received quantity out of every live
/// bucket; see [`Model::held_quantity`].
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_batches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub material_variant_id: i64,
    pub batch_number: String,
    /// Upper-cased `batch_number`; unique per variant.
    pub batch_key: String,
    #[sea_orm(unique)]
    pub grn_line_id: Option<i64>,
    pub vendor_id: Option<i64>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_price: Decimal,
    pub disposition: QualityDisposition,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub received_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub available_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub reserved_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub consumed_quantity: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub version: i32,
}

impl Model {
    /// Received quantity that sits in none of the live buckets.
    pub fn held_quantity(&self) -> Decimal {
        self.received_quantity
            - (self.available_quantity + self.reserved_quantity + self.consumed_quantity)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::material_variant::Entity",
        from = "Column::MaterialVariantId",
        to = "super::material_variant::Column::Id"
    )]
    MaterialVariant,
    #[sea_orm(
        belongs_to = "super::grn_line::Entity",
        from = "Column::GrnLineId",
        to = "super::grn_line::Column::Id"
    )]
    GrnLine,
    #[sea_orm(has_many = "super::stock_transaction::Entity")]
    Transactions,
}

impl Related<super::material_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MaterialVariant.def()
    }
}

impl Related<super::grn_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GrnLine.def()
    }
}

impl Related<super::stock_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Quality decision on received goods, shared by GRN lines and batches.
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
pub enum QualityDisposition {
    #[sea_orm(string_value = "pending_qc")]
    PendingQc,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}
