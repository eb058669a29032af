//! Store executor boundary.
//!
//! The engine hands a compiled [`QueryPlan`] (or a [`PreloadQuery`]) across
//! this trait and gets rows back as JSON objects; everything store-specific —
//! SQL rendering, statement timeouts, row decoding — lives behind it. The
//! PostgreSQL implementation executes over sqlx and decodes rows with a
//! `row_to_json` wrapper so arbitrary projections come back without static
//! row types.

use async_trait::async_trait;
use sqlx::PgPool;

use super::error::QueryResult;
use super::plan::QueryPlan;
use super::registry::PivotLink;
use super::sql;

/// A batched preload fetch for one relation node.
#[derive(Debug, Clone, PartialEq)]
pub enum PreloadQuery {
    /// Single-table fetch, `key_column IN (keys)`. Covers belongs-to,
    /// has-one, and has-many.
    Keyed {
        table: String,
        /// Projected columns; empty means all.
        columns: Vec<String>,
        key_column: String,
        keys: Vec<serde_json::Value>,
    },
    /// Many-to-many fetch through the pivot; rows carry the parent key under
    /// [`sql::PARENT_KEY_ALIAS`].
    Pivot {
        pivot: PivotLink,
        table: String,
        columns: Vec<String>,
        keys: Vec<serde_json::Value>,
    },
}

/// Executes compiled plans against the underlying store.
#[async_trait]
pub trait StoreExecutor: Send + Sync {
    /// Fetch one page of rows for the plan.
    async fn fetch_page(&self, plan: &QueryPlan) -> QueryResult<Vec<serde_json::Value>>;

    /// Count rows matching the plan's predicate set.
    async fn count(&self, plan: &QueryPlan) -> QueryResult<i64>;

    /// Fetch related rows for one preload batch.
    async fn fetch_preload(&self, preload: &PreloadQuery) -> QueryResult<Vec<serde_json::Value>>;
}

/// Per-statement timeout applied to engine queries.
const STATEMENT_TIMEOUT: &str = "10s";

/// PostgreSQL store executor.
pub struct PgStoreExecutor {
    pool: PgPool,
}

impl PgStoreExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run a SELECT and decode each row to a JSON object.
    ///
    /// Runs inside a transaction so `SET LOCAL statement_timeout` applies to
    /// this statement only and resets on commit.
    async fn fetch_json(&self, select_sql: &str) -> QueryResult<Vec<serde_json::Value>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("SET LOCAL statement_timeout = '{STATEMENT_TIMEOUT}'"))
            .execute(&mut *tx)
            .await?;

        let rows: Vec<serde_json::Value> =
            sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({select_sql}) t"))
                .fetch_all(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(rows)
    }
}

#[async_trait]
impl StoreExecutor for PgStoreExecutor {
    async fn fetch_page(&self, plan: &QueryPlan) -> QueryResult<Vec<serde_json::Value>> {
        self.fetch_json(&sql::build_page_sql(plan)).await
    }

    async fn count(&self, plan: &QueryPlan) -> QueryResult<i64> {
        let count_sql = sql::build_count_sql(plan);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("SET LOCAL statement_timeout = '{STATEMENT_TIMEOUT}'"))
            .execute(&mut *tx)
            .await?;

        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(&mut *tx).await?;

        tx.commit().await?;
        Ok(total)
    }

    async fn fetch_preload(&self, preload: &PreloadQuery) -> QueryResult<Vec<serde_json::Value>> {
        let select_sql = match preload {
            PreloadQuery::Keyed {
                table,
                columns,
                key_column,
                keys,
            } => sql::build_keyed_preload_sql(table, columns, key_column, keys),
            PreloadQuery::Pivot {
                pivot,
                table,
                columns,
                keys,
            } => sql::build_pivot_preload_sql(pivot, table, columns, keys),
        };
        self.fetch_json(&select_sql).await
    }
}
