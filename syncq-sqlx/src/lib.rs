//! Postgres implementation of the `syncq` job store.
//!
//! The claim query relies on `FOR UPDATE SKIP LOCKED`, so several worker
//! processes can share one `sync_jobs` table without ever double-claiming a
//! row.
use sqlx::PgPool;
use syncq::store::StoreError;

mod store;
mod types;

/// A [`syncq::store::JobStore`] backed by a Postgres `sync_jobs` table.
#[derive(Clone, Debug)]
pub struct SyncqPgStore {
    pool: PgPool,
}

impl std::ops::Deref for SyncqPgStore {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl From<PgPool> for SyncqPgStore {
    fn from(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl From<&PgPool> for SyncqPgStore {
    fn from(value: &PgPool) -> Self {
        Self {
            pool: value.to_owned(),
        }
    }
}

impl SyncqPgStore {
    /// Creates a store from the pool, applying any pending migrations.
    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        let this = Self { pool };
        sqlx::migrate!()
            .run(&this.pool)
            .await
            .map_err(|err| StoreError::Database(err.to_string()))?;
        Ok(this)
    }
}

pub(crate) fn map_err(error: sqlx::Error) -> StoreError {
    StoreError::Database(error.to_string())
}
