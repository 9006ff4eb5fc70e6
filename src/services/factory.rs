use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        allocation::AllocationEngine, inventory::InventoryService,
        procurement::{ProcurementService, ProcurementSettings},
        requisitions::RequisitionService, stock_batches::StockBatchRegistry,
    },
};

/// Factory for creating ledger services that share one connection pool
#[derive(Clone)]
pub struct ServiceFactory {
    db_pool: Arc<DbPool>,
    settings: ProcurementSettings,
}

impl ServiceFactory {
    pub fn new(db_pool: Arc<DbPool>, settings: ProcurementSettings) -> Self {
        Self { db_pool, settings }
    }

    pub fn from_config(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        Self::new(db_pool, config.procurement_settings())
    }

    pub fn stock_batches(&self) -> StockBatchRegistry {
        StockBatchRegistry::new(self.db_pool.clone())
    }

    pub fn allocation(&self) -> AllocationEngine {
        AllocationEngine::new(self.db_pool.clone())
    }

    pub fn requisitions(&self) -> RequisitionService {
        RequisitionService::new(self.db_pool.clone())
    }

    pub fn procurement(&self) -> ProcurementService {
        ProcurementService::new(self.db_pool.clone(), self.settings.clone())
    }

    pub fn inventory(&self) -> InventoryService {
        InventoryService::new(self.db_pool.clone())
    }

    /// Gets a reference to the database pool
    pub fn db_pool(&self) -> &Arc<DbPool> {
        &self.db_pool
    }
}
