// Tree lock: a named, TTL'd exclusive lock keyed by root workflow id
//
// Semantics match SET key NX EX: acquire is an atomic set-if-absent with
// expiry, release is an idempotent delete. A holder may re-acquire its own
// key, which renews the TTL (the scheduler does this between leaves).
// Expired keys are reclaimable by anyone; startup recovery clears the whole
// namespace.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

const LOCK_PREFIX: &str = "workflow_tree_lock";

#[derive(Clone)]
pub struct TreeLock {
    pool: PgPool,
    /// Unique per process instance; lets the holder renew and release its
    /// own keys without stealing live locks held elsewhere.
    holder: String,
}

impl TreeLock {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            holder: Uuid::now_v7().to_string(),
        }
    }

    fn key(root_id: i64) -> String {
        format!("{}:{}", LOCK_PREFIX, root_id)
    }

    /// Try to take the lock for a tree. Returns true iff acquired (or
    /// renewed by the same holder).
    pub async fn acquire(&self, root_id: i64, ttl: Duration) -> Result<bool> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));

        let result = sqlx::query(
            "INSERT INTO tree_locks (lock_key, holder, acquired_at, expires_at)
             VALUES ($1, $2, NOW(), $3)
             ON CONFLICT (lock_key) DO UPDATE
             SET holder = EXCLUDED.holder, acquired_at = NOW(), expires_at = EXCLUDED.expires_at
             WHERE tree_locks.expires_at < NOW() OR tree_locks.holder = EXCLUDED.holder",
        )
        .bind(Self::key(root_id))
        .bind(&self.holder)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Release the lock. Safe to call when not held (no-op).
    pub async fn release(&self, root_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tree_locks WHERE lock_key = $1 AND holder = $2")
            .bind(Self::key(root_id))
            .bind(&self.holder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Drop every lock key, including those left by prior processes.
    /// Called once at startup before the scheduler accepts work.
    pub async fn clear_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tree_locks WHERE lock_key LIKE $1")
            .bind(format!("{}:%", LOCK_PREFIX))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_namespace() {
        assert_eq!(TreeLock::key(42), "workflow_tree_lock:42");
    }
}
