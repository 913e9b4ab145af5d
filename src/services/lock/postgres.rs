use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::services::lock::{LockError, LockStore};

/// Postgres-backed lock table.
///
/// One row per lock name. A row can be taken over once `lock_until` has
/// passed, so a holder that died releases implicitly.
#[derive(Clone, Debug)]
pub struct PgLockStore {
    db: PgPool,
}

impl PgLockStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str) -> Result<Self, LockError> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self::new(db))
    }

    pub async fn ensure_schema(&self) -> Result<(), LockError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_lock (
                name       TEXT PRIMARY KEY,
                lock_until TIMESTAMPTZ NOT NULL,
                locked_at  TIMESTAMPTZ NOT NULL,
                locked_by  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        hold_for: Duration,
    ) -> Result<bool, LockError> {
        // Insert, or take over an expired row. A live row makes the upsert a no-op.
        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_lock (name, lock_until, locked_at, locked_by)
            VALUES ($1, now() + ($2::bigint * interval '1 millisecond'), now(), $3)
            ON CONFLICT (name) DO UPDATE
               SET lock_until = EXCLUDED.lock_until,
                   locked_at  = EXCLUDED.locked_at,
                   locked_by  = EXCLUDED.locked_by
             WHERE scheduler_lock.lock_until <= now()
            "#,
        )
        .bind(name)
        .bind(hold_for.as_millis() as i64)
        .bind(owner)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, name: &str, owner: &str) -> Result<(), LockError> {
        sqlx::query(
            r#"
            UPDATE scheduler_lock
               SET lock_until = now()
             WHERE name = $1
               AND locked_by = $2
               AND lock_until > now()
            "#,
        )
        .bind(name)
        .bind(owner)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
