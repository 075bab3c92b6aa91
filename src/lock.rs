use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, Statement, TransactionTrait, Value,
};

use crate::config::AdvisoryLockStrategy;
use crate::error::ClosureTableError;

/// Transaction wrapping a single logical tree mutation.
///
/// On PostgreSQL the transaction additionally holds an advisory lock keyed by
/// the configured namespace, serialising writers of the same tree table.
/// Other backends only get the transaction.
pub struct LockedTransaction {
    txn: DatabaseTransaction,
    key: Option<String>,
}

impl LockedTransaction {
    pub async fn acquire<C>(
        strategy: &AdvisoryLockStrategy,
        db: &C,
    ) -> Result<Self, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let key = match (strategy, db.get_database_backend()) {
            (AdvisoryLockStrategy::Namespaced(key), DbBackend::Postgres) => {
                Some(key.as_str().to_owned())
            }
            _ => None,
        };

        let txn = db.begin().await?;

        if let Some(ref key) = key {
            if let Err(err) = acquire_lock(&txn, key).await {
                let _ = txn.rollback().await;
                return Err(err);
            }
        }

        Ok(Self { txn, key })
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), ClosureTableError> {
        if let Some(ref key) = self.key {
            release_lock(&self.txn, key).await?;
        }
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), ClosureTableError> {
        if let Some(ref key) = self.key {
            let _ = release_lock(&self.txn, key).await;
        }
        self.txn.rollback().await?;
        Ok(())
    }

    /// Commit when `result` is `Ok`, roll back otherwise, and hand the
    /// result back to the caller.
    pub async fn finish<T>(
        self,
        result: Result<T, ClosureTableError>,
    ) -> Result<T, ClosureTableError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.rollback().await;
                Err(err)
            }
        }
    }
}

async fn acquire_lock(txn: &DatabaseTransaction, key: &str) -> Result<(), ClosureTableError> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_lock(hashtext($1), 0)",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}

async fn release_lock(txn: &DatabaseTransaction, key: &str) -> Result<(), ClosureTableError> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_unlock(hashtext($1), 0)",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}
