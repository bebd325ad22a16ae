use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, Statement,
    TransactionTrait, Value,
};
use tracing::warn;

use crate::config::AdvisoryLockStrategy;
use crate::error::Result;

/// A transaction that holds the tree's writer lock until it ends.
///
/// On PostgreSQL the lock is a transaction-scoped advisory lock, released
/// by commit or rollback. SQLite serializes writers on its own.
pub struct LockedTransaction {
    txn: DatabaseTransaction,
}

impl LockedTransaction {
    pub async fn acquire(
        strategy: &AdvisoryLockStrategy,
        db: &DatabaseConnection,
    ) -> Result<Self> {
        let txn = db.begin().await?;

        if txn.get_database_backend() == DbBackend::Postgres {
            match strategy.key() {
                Some(key) => {
                    if let Err(err) = acquire_lock(&txn, key.as_str()).await {
                        if let Err(rollback) = txn.rollback().await {
                            warn!(
                                error = %rollback,
                                "rollback after failed lock acquisition failed"
                            );
                        }
                        return Err(err);
                    }
                }
                None => warn!("advisory lock disabled; concurrent writers are not serialized"),
            }
        }

        Ok(Self { txn })
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<()> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.txn.rollback().await?;
        Ok(())
    }

    /// Commit on success, roll back on failure, and hand `result` back.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

async fn acquire_lock(txn: &DatabaseTransaction, key: &str) -> Result<()> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}
