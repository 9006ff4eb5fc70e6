use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Quantity of one batch held for one requisition line. Unique per
/// (line, batch); repeated allocations accumulate into the same row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requisition_batch_allocations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub requisition_line_id: i64,
    pub batch_id: i64,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub reserved_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub consumed_quantity: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::requisition_line::Entity",
        from = "Column::RequisitionLineId",
        to = "super::requisition_line::Column::Id"
    )]
    RequisitionLine,
    #[sea_orm(
        belongs_to = "super::stock_batch::Entity",
        from = "Column::BatchId",
        to = "super::stock_batch::Column::Id"
    )]
    StockBatch,
}

impl Related<super::requisition_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequisitionLine.def()
    }
}

impl Related<super::stock_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockBatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
