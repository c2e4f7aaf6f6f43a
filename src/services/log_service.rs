use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::ServiceError;
use crate::database::manager::DatabaseManager;
use crate::database::models::{NewRequestLog, RequestLog};

/// Filters for the request log listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub method: Option<String>,
    pub status: Option<i32>,
}

impl LogQuery {
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p >= 1).unwrap_or(1)
    }

    pub fn limit(&self, max: i64) -> i64 {
        self.limit.filter(|l| *l >= 1).unwrap_or(10).min(max.max(1))
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CountEntry {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total: i64,
    pub by_method: Vec<CountEntry>,
    pub by_endpoint: Vec<CountEntry>,
    pub by_status: Vec<CountEntry>,
}

pub struct LogService {
    main_pool: PgPool,
}

impl LogService {
    pub async fn new() -> Result<Self, ServiceError> {
        let main_pool = DatabaseManager::main_pool().await?;
        Ok(Self { main_pool })
    }

    pub async fn record(&self, entry: &NewRequestLog) -> Result<(), ServiceError> {
        sqlx::query("INSERT INTO request_logs (owner_id, endpoint, method, status, ip) VALUES ($1, $2, $3, $4, $5)")
            .bind(entry.owner_id)
            .bind(&entry.endpoint)
            .bind(&entry.method)
            .bind(i32::from(entry.status))
            .bind(&entry.ip)
            .execute(&self.main_pool)
            .await?;
        Ok(())
    }

    /// One page of the owner's log, newest first, plus the total match count
    pub async fn list(&self, owner_id: Uuid, query: &LogQuery, max_limit: i64) -> Result<(Vec<RequestLog>, i64), ServiceError> {
        let page = query.page();
        let limit = query.limit(max_limit);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM request_logs");
        push_conditions(&mut count, owner_id, query);
        let (total,): (i64,) = count.build_query_as::<(i64,)>().fetch_one(&self.main_pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM request_logs");
        push_conditions(&mut select, owner_id, query);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind((page - 1).saturating_mul(limit));
        let logs = select.build_query_as::<RequestLog>().fetch_all(&self.main_pool).await?;

        Ok((logs, total))
    }

    /// Counts per method, endpoint and status, largest first
    pub async fn stats(&self, owner_id: Uuid) -> Result<LogStats, ServiceError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM request_logs WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.main_pool)
            .await?;

        Ok(LogStats {
            total,
            by_method: self.group_count(owner_id, "method").await?,
            by_endpoint: self.group_count(owner_id, "endpoint").await?,
            by_status: self.group_count(owner_id, "status::text").await?,
        })
    }

    async fn group_count(&self, owner_id: Uuid, column: &'static str) -> Result<Vec<CountEntry>, ServiceError> {
        let sql = format!(
            "SELECT {col} AS key, COUNT(*) AS count FROM request_logs WHERE owner_id = $1 GROUP BY {col} ORDER BY count DESC, key LIMIT 50",
            col = column
        );
        Ok(sqlx::query_as::<_, CountEntry>(&sql)
            .bind(owner_id)
            .fetch_all(&self.main_pool)
            .await?)
    }
}

fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, owner_id: Uuid, query: &LogQuery) {
    builder.push(" WHERE owner_id = ").push_bind(owner_id);
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(" AND endpoint ILIKE ").push_bind(format!("%{}%", escape_like(search)));
    }
    if let Some(method) = query.method.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        builder.push(" AND method = ").push_bind(method.to_ascii_uppercase());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
}

fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
