use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLayer {
    Kv,
    Row,
}

#[derive(Debug, Clone, Default)]
pub struct CacheReadResult {
    pub output: Option<String>,
    pub cached: bool,
    pub layer: Option<CacheLayer>,
}

#[derive(Serialize, Deserialize)]
struct KvEnvelope {
    output: String,
}

/// Durable row tier backed by a `completion_cache` table. Uses sqlx's
/// database-agnostic `Any` driver so the same code runs against sqlite
/// (tests, single-node deployments) or postgres.
pub struct RowStore {
    pool: AnyPool,
}

impl RowStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(pool_size_for(database_url)).connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Creates the `completion_cache` table if absent. Safe to call on
    /// every startup.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS completion_cache (
                id TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                prompt TEXT NOT NULL,
                prompt_hash TEXT NOT NULL,
                params_fp TEXT NOT NULL,
                output TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(model_id, prompt_hash, params_fp)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Row-tier lookup. Any error is treated as a miss, never a failure.
    pub async fn get(&self, model_id: &str, prompt_hash: &str, params_fp: &str) -> Option<String> {
        let result = sqlx::query_scalar::<_, String>(
            "SELECT output FROM completion_cache WHERE model_id = ? AND prompt_hash = ? AND params_fp = ?",
        )
        .bind(model_id)
        .bind(prompt_hash)
        .bind(params_fp)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "row cache read failed, treating as miss");
                None
            }
        }
    }

    /// Row-tier write. A unique-constraint collision (someone else won
    /// the race) is swallowed via `ON CONFLICT DO NOTHING`, which both
    /// sqlite and postgres support.
    pub async fn insert(
        &self,
        model_id: &str,
        prompt: &str,
        prompt_hash: &str,
        params_fp: &str,
        output: &str,
    ) {
        let result = sqlx::query(
            "INSERT INTO completion_cache (id, model_id, prompt, prompt_hash, params_fp, output, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(model_id, prompt_hash, params_fp) DO NOTHING",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(model_id)
        .bind(prompt)
        .bind(prompt_hash)
        .bind(params_fp)
        .bind(output)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "row cache write failed, degrading silently");
        }
    }
}

/// A pooled `:memory:` sqlite connection is a brand new, empty database
/// per connection, so anything beyond one connection silently loses
/// writes made on another. Real (file/postgres) URLs keep the normal pool
/// size.
fn pool_size_for(database_url: &str) -> u32 {
    if database_url.contains(":memory:") {
        1
    } else {
        10
    }
}

/// Fast KV tier. Every operation degrades to a no-op/miss on error;
/// `fred`'s client is cheap to clone and safe to share across tasks.
pub struct KvStore {
    client: fred::prelude::Client,
}

impl KvStore {
    pub async fn connect(redis_url: &str) -> Result<Self, fred::error::Error> {
        use fred::prelude::*;
        let config = Config::from_url(redis_url)?;
        let client = Builder::from_config(config).build()?;
        client.init().await?;
        Ok(Self { client })
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        use fred::prelude::KeysInterface;
        let raw: Option<String> = match self.client.get(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "kv get failed, treating as miss");
                return None;
            }
        };
        raw.and_then(|s| serde_json::from_str::<KvEnvelope>(&s).ok()).map(|e| e.output)
    }

    pub async fn put(&self, key: &str, output: &str, ttl_secs: u64) {
        use fred::prelude::{Expiration, KeysInterface, SetOptions};
        let envelope = KvEnvelope { output: output.to_string() };
        let serialized = match serde_json::to_string(&envelope) {
            Ok(s) => s,
            Err(_) => return,
        };
        let result: Result<(), _> = self
            .client
            .set(
                key,
                serialized,
                Some(Expiration::EX(ttl_secs as i64)),
                Some(SetOptions::default()),
                false,
            )
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "kv set failed, degrading silently");
        }
    }
}

/// The two-tier cache protocol: fast KV in front of a durable row store.
/// KV is optional (disabled or unreachable deployments still work,
/// durability coming only from the row tier).
pub struct CacheProtocol {
    row: RowStore,
    kv: Option<KvStore>,
    kv_ttl_secs: u64,
}

impl CacheProtocol {
    pub fn new(row: RowStore, kv: Option<KvStore>, kv_ttl_secs: u64) -> Self {
        Self { row, kv, kv_ttl_secs }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        self.row.migrate().await
    }

    pub fn kv_enabled(&self) -> bool {
        self.kv.is_some()
    }

    /// Tiered read: KV first, then row with KV backfill.
    pub async fn read(&self, key: &str, model_id: &str, prompt_hash: &str, params_fp: &str) -> CacheReadResult {
        if let Some(kv) = &self.kv {
            if let Some(output) = kv.get(key).await {
                return CacheReadResult { output: Some(output), cached: true, layer: Some(CacheLayer::Kv) };
            }
        }

        if let Some(output) = self.row.get(model_id, prompt_hash, params_fp).await {
            if let Some(kv) = &self.kv {
                kv.put(key, &output, self.kv_ttl_secs).await;
            }
            return CacheReadResult { output: Some(output), cached: true, layer: Some(CacheLayer::Row) };
        }

        CacheReadResult::default()
    }

    /// Write-through: row tier first (the durability barrier), then
    /// best-effort KV. Never called with an empty output.
    pub async fn write(&self, key: &str, model_id: &str, prompt: &str, prompt_hash: &str, params_fp: &str, output: &str) {
        if output.is_empty() {
            return;
        }
        self.row.insert(model_id, prompt, prompt_hash, params_fp, output).await;
        if let Some(kv) = &self.kv {
            kv.put(key, output, self.kv_ttl_secs).await;
        }
    }
}

/// Request body shape accepted for fingerprinting helpers elsewhere in
/// the coordinator; kept here since the cache protocol is the sole
/// consumer of the canonicalized form.
pub fn as_value<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or(Value::Null)
}
