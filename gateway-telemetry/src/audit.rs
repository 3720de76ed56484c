use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;

/// One append-only row per served request, cached hits included.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceLog {
    pub request_id: String,
    pub api_key_id: String,
    pub route: String,
    pub client_host: String,
    pub model_id: String,
    pub params: Value,
    pub prompt: String,
    pub output: String,
    pub latency_ms: u64,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// Persists `InferenceLog` rows. Append-only: no update/delete method is
/// exposed on purpose.
pub struct AuditSink {
    pool: AnyPool,
}

impl AuditSink {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(pool_size_for(database_url)).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS inference_log (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                request_id TEXT NOT NULL,
                api_key_id TEXT NOT NULL,
                route TEXT NOT NULL,
                client_host TEXT NOT NULL,
                model_id TEXT NOT NULL,
                params TEXT NOT NULL,
                prompt TEXT NOT NULL,
                output TEXT NOT NULL,
                latency_ms INTEGER NOT NULL,
                prompt_tokens INTEGER,
                completion_tokens INTEGER
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Appends one row. Never returns an error to the caller — a write
    /// failure is logged, not propagated, so it never blocks the response.
    /// Callers should invoke this off the response's critical path (e.g.
    /// `tokio::spawn`).
    pub async fn append(&self, log: &InferenceLog) {
        let result = sqlx::query(
            "INSERT INTO inference_log
                (id, created_at, request_id, api_key_id, route, client_host, model_id, params, prompt, output, latency_ms, prompt_tokens, completion_tokens)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(&log.request_id)
        .bind(&log.api_key_id)
        .bind(&log.route)
        .bind(&log.client_host)
        .bind(&log.model_id)
        .bind(log.params.to_string())
        .bind(&log.prompt)
        .bind(&log.output)
        .bind(log.latency_ms as i64)
        .bind(log.prompt_tokens.map(|v| v as i64))
        .bind(log.completion_tokens.map(|v| v as i64))
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, request_id = %log.request_id, "audit append failed");
        }
    }

    pub async fn usage_for(&self, api_key_id: &str) -> Result<UsageSummary, sqlx::Error> {
        let row = sqlx::query_as::<_, UsageRow>(
            "SELECT COUNT(*) as request_count, COALESCE(SUM(prompt_tokens), 0) as prompt_tokens,
                    COALESCE(SUM(completion_tokens), 0) as completion_tokens
             FROM inference_log WHERE api_key_id = ?",
        )
        .bind(api_key_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UsageSummary {
            request_count: row.request_count,
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
        })
    }

    pub async fn recent(&self, limit: i64, offset: i64) -> Result<Vec<InferenceLog>, sqlx::Error> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT request_id, api_key_id, route, client_host, model_id, params, prompt, output, latency_ms, prompt_tokens, completion_tokens
             FROM inference_log ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
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

#[derive(sqlx::FromRow)]
struct UsageRow {
    request_count: i64,
    prompt_tokens: i64,
    completion_tokens: i64,
}

#[derive(Debug, Serialize)]
pub struct UsageSummary {
    pub request_count: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

#[derive(sqlx::FromRow)]
struct LogRow {
    request_id: String,
    api_key_id: String,
    route: String,
    client_host: String,
    model_id: String,
    params: String,
    prompt: String,
    output: String,
    latency_ms: i64,
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
}

impl From<LogRow> for InferenceLog {
    fn from(row: LogRow) -> Self {
        InferenceLog {
            request_id: row.request_id,
            api_key_id: row.api_key_id,
            route: row.route,
            client_host: row.client_host,
            model_id: row.model_id,
            params: serde_json::from_str(&row.params).unwrap_or(Value::Null),
            prompt: row.prompt,
            output: row.output,
            latency_ms: row.latency_ms as u64,
            prompt_tokens: row.prompt_tokens.map(|v| v as u32),
            completion_tokens: row.completion_tokens.map(|v| v as u32),
        }
    }
}
