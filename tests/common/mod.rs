#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use material_ledger::{
    config::AppConfig,
    db::{self, DbPool},
    entities::{material_category, material_variant, stock_batch, vendor},
    services::{
        allocation::AllocationEngine,
        inventory::InventoryService,
        procurement::{DirectReceipt, DirectReceiptLine, NewVendor, ProcurementService},
        requisitions::RequisitionService,
        stock_batches::StockBatchRegistry,
        ServiceFactory,
    },
};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

/// Ledger services over a fresh in-memory SQLite database.
///
/// The pool holds exactly one connection so every service sees the same
/// in-memory schema.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub batches: StockBatchRegistry,
    pub allocation: AllocationEngine,
    pub requisitions: RequisitionService,
    pub procurement: ProcurementService,
    pub inventory: InventoryService,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let factory = ServiceFactory::from_config(db.clone(), &cfg);
        Self {
            batches: factory.stock_batches(),
            allocation: factory.allocation(),
            requisitions: factory.requisitions(),
            procurement: factory.procurement(),
            inventory: factory.inventory(),
            db,
        }
    }

    pub async fn seed_category(&self, name: &str) -> material_category::Model {
        let now = Utc::now();
        material_category::ActiveModel {
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            is_deleted: Set(false),
            version: Set(1),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("insert category")
    }

    pub async fn seed_variant(
        &self,
        category_id: i64,
        grade: &str,
        sku: &str,
    ) -> material_variant::Model {
        let now = Utc::now();
        material_variant::ActiveModel {
            category_id: Set(category_id),
            grade: Set(grade.to_string()),
            sku: Set(sku.to_string()),
            name: Set(format!("{} {}", grade, sku)),
            unit_of_measure: Set("kg".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            is_deleted: Set(false),
            version: Set(1),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("insert variant")
    }

    /// A category with a single variant, for tests that only need one SKU.
    pub async fn seed_single_variant(&self, sku: &str) -> material_variant::Model {
        let category = self.seed_category("Raw Material").await;
        self.seed_variant(category.id, "Standard", sku).await
    }

    pub async fn seed_vendor(&self, name: &str) -> vendor::Model {
        self.procurement
            .create_vendor(NewVendor {
                name: name.to_string(),
                code: None,
            })
            .await
            .expect("create vendor")
    }

    /// Books one Approved batch through the direct-receipt path.
    pub async fn receive_batch(
        &self,
        vendor_id: i64,
        variant_id: i64,
        batch_number: &str,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> stock_batch::Model {
        let mut outcome = self
            .procurement
            .receive_direct_grn(DirectReceipt {
                vendor_id,
                receipt_date: receipt_date(),
                invoice_number: format!("INV-{}-{}", variant_id, batch_number),
                notes: None,
                lines: vec![DirectReceiptLine {
                    material_variant_id: variant_id,
                    batch_number: batch_number.to_string(),
                    quantity,
                    unit_price,
                }],
            })
            .await
            .expect("direct receipt");
        outcome.batches.remove(0)
    }

    /// Moves a batch's creation time `days` into the past so FIFO order can
    /// be arranged explicitly.
    pub async fn backdate_batch(&self, batch_id: i64, days: i64) {
        stock_batch::Entity::update_many()
            .col_expr(
                stock_batch::Column::CreatedAt,
                Expr::value(Utc::now() - Duration::days(days)),
            )
            .filter(stock_batch::Column::Id.eq(batch_id))
            .exec(&*self.db)
            .await
            .expect("backdate batch");
    }

    pub async fn batch(&self, batch_id: i64) -> stock_batch::Model {
        stock_batch::Entity::find_by_id(batch_id)
            .one(&*self.db)
            .await
            .expect("load batch")
            .expect("batch exists")
    }

    pub async fn batch_count(&self) -> usize {
        stock_batch::Entity::find()
            .all(&*self.db)
            .await
            .expect("load batches")
            .len()
    }
}

pub fn receipt_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date")
}
