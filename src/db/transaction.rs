/*!
 * Unit of work
 *
 * An explicit transaction context handed down the call chain. The outermost
 * caller opens it and decides commit or rollback; inner operations only ever
 * see `&DatabaseTransaction`.
 */

use crate::errors::ServiceError;
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct UnitOfWork {
    txn: DatabaseTransaction,
    id: Uuid,
    started: Instant,
}

impl UnitOfWork {
    pub async fn begin(db: &DatabaseConnection) -> Result<Self, ServiceError> {
        let id = Uuid::new_v4();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        debug!(transaction_id = %id, "Starting database transaction");
        counter!("material_ledger_db.transaction.started", 1);
        Ok(Self {
            txn,
            id,
            started: Instant::now(),
        })
    }

    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Commits when `result` is `Ok`, rolls back otherwise, and hands the
    /// result back. A failed commit surfaces as a database error.
    ///
    /// Dropping an unfinished unit of work (for example when the owning future
    /// is cancelled) rolls back as well.
    pub async fn finish<T>(self, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        let Self { txn, id, started } = self;
        match result {
            Ok(value) => {
                txn.commit().await.map_err(|e| {
                    counter!("material_ledger_db.transaction.commit_failed", 1);
                    warn!(transaction_id = %id, error = %e, "Transaction commit failed");
                    ServiceError::db_error(e)
                })?;
                let elapsed = started.elapsed();
                histogram!("material_ledger_db.transaction.duration", elapsed);
                counter!("material_ledger_db.transaction.committed", 1);
                debug!(transaction_id = %id, "Transaction committed successfully in {:?}", elapsed);
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(transaction_id = %id, error = %rollback_err, "Explicit rollback failed");
                }
                let elapsed = started.elapsed();
                histogram!("material_ledger_db.transaction.duration", elapsed);
                counter!("material_ledger_db.transaction.rolled_back", 1);
                warn!(transaction_id = %id, error = %err, "Transaction rolled back after {:?}", elapsed);
                Err(err)
            }
        }
    }
}
