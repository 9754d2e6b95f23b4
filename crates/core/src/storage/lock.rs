use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

// Advisory locks are scoped to the Postgres session. They keep two benchmark refreshes for the
// same sector from racing each other.
const LOCK_NAMESPACE: i64 = 0x4649_4E47_4500; // "FINGE"

/// FNV-1a over the normalized sector name. Must stay stable across builds and processes.
fn lock_key_for_sector(sector: &str) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in sector.trim().to_ascii_lowercase().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    LOCK_NAMESPACE ^ (hash as i64)
}

/// Session advisory lock for one sector, pinned to the pooled connection that took it.
///
/// Dropping the guard without [`SectorLock::release`] closes that connection instead of
/// returning it to the pool, which ends the session and frees the lock.
pub struct SectorLock {
    conn: Option<PoolConnection<Postgres>>,
    sector: String,
    key: i64,
}

impl SectorLock {
    pub fn sector(&self) -> &str {
        &self.sector
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked: Result<(bool,), sqlx::Error> =
            sqlx::query_as("SELECT pg_advisory_unlock($1)")
                .persistent(false)
                .bind(self.key)
                .fetch_one(&mut *conn)
                .await;

        match unlocked {
            Ok((true,)) => Ok(()),
            Ok((false,)) => {
                tracing::warn!(sector = %self.sector, key = self.key, "advisory lock was not held at release");
                Ok(())
            }
            Err(e) => {
                drop(conn.detach());
                Err(e).with_context(|| {
                    format!(
                        "failed to release advisory lock (sector={}, key={})",
                        self.sector, self.key
                    )
                })
            }
        }
    }
}

impl Drop for SectorLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

/// Returns `None` when another session already holds the lock for `sector`.
pub async fn try_acquire_sector_lock(
    pool: &PgPool,
    sector: &str,
) -> anyhow::Result<Option<SectorLock>> {
    let key = lock_key_for_sector(sector);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to check out a connection for the sector lock")?;

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (sector={sector}, key={key})"))?;

    if !acquired.0 {
        return Ok(None);
    }
    Ok(Some(SectorLock {
        conn: Some(conn),
        sector: sector.trim().to_string(),
        key,
    }))
}
