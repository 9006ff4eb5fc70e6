// Stock ledger core
pub mod allocation;
pub mod stock_batches;

// Demand and intake workflows
pub mod procurement;
pub mod requisitions;

// Read side
pub mod catalog;
pub mod inventory;

// Service factory for dependency injection
pub mod factory;

pub use factory::ServiceFactory;
