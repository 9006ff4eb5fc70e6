use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only record of an accept or decline taken on a vendor invoice.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendor_invoice_decisions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub vendor_invoice_id: i64,
    pub decision: InvoiceDecision,
    pub reason: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vendor_invoice::Entity",
        from = "Column::VendorInvoiceId",
        to = "super::vendor_invoice::Column::Id"
    )]
    VendorInvoice,
}

impl Related<super::vendor_invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VendorInvoice.def()
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
pub enum InvoiceDecision {
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "declined")]
    Declined,
}
