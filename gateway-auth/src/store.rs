use crate::entities::ApiKeyRecord;
use chrono::{DateTime, Utc};
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::{AnyPool, Row};

/// Durable `ApiKey`/`RoleTable` store. Uses `sqlx::AnyPool` for the same
/// database-agnostic reasons as the cache row store.
pub struct ApiKeyStore {
    pool: AnyPool,
}

impl ApiKeyStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(pool_size_for(database_url)).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                key TEXT NOT NULL UNIQUE,
                active INTEGER NOT NULL,
                role TEXT,
                quota_monthly INTEGER,
                quota_used INTEGER NOT NULL DEFAULT 0,
                quota_reset_at TEXT,
                created_at TEXT NOT NULL,
                disabled_at TEXT,
                label TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_key(&self, key: &str) -> Result<Option<ApiKeyRecord>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, key, active, role, quota_monthly, quota_used, quota_reset_at, created_at, disabled_at, label
             FROM api_keys WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_record(&r)))
    }

    /// Creates a new active key with no quota limit unless given one.
    /// Returns the generated key. Admin-only.
    pub async fn create(
        &self,
        key: &str,
        role: Option<&str>,
        quota_monthly: Option<i64>,
        label: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO api_keys (id, key, active, role, quota_monthly, quota_used, created_at, label)
             VALUES (?, ?, 1, ?, ?, 0, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(key)
        .bind(role)
        .bind(quota_monthly)
        .bind(Utc::now().to_rfc3339())
        .bind(label)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Soft-disables a key. Never deletes the row.
    pub async fn disable(&self, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE api_keys SET active = 0, disabled_at = ? WHERE key = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ApiKeyRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, key, active, role, quota_monthly, quota_used, quota_reset_at, created_at, disabled_at, label
             FROM api_keys ORDER BY created_at ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Atomically consumes one unit of quota: the `WHERE` clause re-checks
    /// the limit in the same statement, so concurrent requests for the
    /// same key serialize on the row rather than racing a read-then-write.
    /// Returns `true` if the increment happened (i.e. quota was
    /// available), `false` if the row is already at its limit.
    pub async fn consume_quota(&self, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE api_keys SET quota_used = quota_used + 1
             WHERE key = ? AND (quota_monthly IS NULL OR quota_used < quota_monthly)",
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// See the identical helper in `gateway_cache::store`: a pooled
/// `:memory:` sqlite connection is a fresh, empty database per
/// connection, so anything beyond one connection loses writes silently.
fn pool_size_for(database_url: &str) -> u32 {
    if database_url.contains(":memory:") {
        1
    } else {
        10
    }
}

fn row_to_record(row: &sqlx::any::AnyRow) -> ApiKeyRecord {
    let active_raw: i64 = row.try_get("active").unwrap_or(1);
    ApiKeyRecord {
        id: row.try_get("id").unwrap_or_default(),
        key: row.try_get("key").unwrap_or_default(),
        active: active_raw != 0,
        role: row.try_get("role").ok(),
        quota_monthly: row.try_get("quota_monthly").ok(),
        quota_used: row.try_get("quota_used").unwrap_or(0),
        quota_reset_at: row
            .try_get::<Option<String>, _>("quota_reset_at")
            .ok()
            .flatten()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        created_at: row
            .try_get::<String, _>("created_at")
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
        disabled_at: row
            .try_get::<Option<String>, _>("disabled_at")
            .ok()
            .flatten()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        label: row.try_get("label").ok(),
    }
}
