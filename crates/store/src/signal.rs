use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desk_core::signal::entity::SignalId;
use desk_core::signal::record::SignalRecord;
use desk_core::store::error::StoreError;
use desk_core::store::port::{InsertOutcome, SignalPatch, SignalStore, UpdateGuard};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, SqlitePool};
use std::fs;
use std::path::Path;
use tracing::debug;

/// 默认信号数据库文件名
const DEFAULT_SIGNAL_DB: &str = "signals.db";

const SELECT_COLUMNS: &str = "id, symbol, units, action, order_type, price, lifecycle, \
     broker_order_ref, execution_status, submit_attempts, resubmissions, submit_error, \
     submit_ambiguous, submit_terminal, submit_pending, filled_quantity, avg_fill_price, \
     created_at, updated_at";

/// 数据库行映射。除 `id` 外全部可空，以兼容旧版本写入的数据。
#[derive(sqlx::FromRow)]
struct SignalRow {
    id: String,
    symbol: Option<String>,
    units: Option<String>,
    action: Option<String>,
    order_type: Option<String>,
    price: Option<String>,
    lifecycle: Option<String>,
    broker_order_ref: Option<i64>,
    execution_status: Option<String>,
    submit_attempts: Option<i64>,
    resubmissions: Option<i64>,
    submit_error: Option<String>,
    submit_ambiguous: Option<bool>,
    submit_terminal: Option<bool>,
    submit_pending: Option<bool>,
    filled_quantity: Option<String>,
    avg_fill_price: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<SignalRow> for SignalRecord {
    fn from(r: SignalRow) -> Self {
        Self {
            id: r.id,
            symbol: r.symbol,
            units: r.units,
            action: r.action,
            order_type: r.order_type,
            price: r.price,
            lifecycle: r.lifecycle,
            broker_order_ref: r.broker_order_ref,
            execution_status: r.execution_status,
            submit_attempts: r.submit_attempts,
            resubmissions: r.resubmissions,
            submit_error: r.submit_error,
            submit_ambiguous: r.submit_ambiguous,
            submit_terminal: r.submit_terminal,
            submit_pending: r.submit_pending,
            filled_quantity: r.filled_quantity,
            avg_fill_price: r.avg_fill_price,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// SignalStore 的 SQLite 实现。
///
/// # Summary
/// 所有信号保存在单表 `signals` 中，`seq` 自增列记录插入顺序。
///
/// # Invariants
/// * `id` 列带唯一约束，`put_if_absent` 依赖 `ON CONFLICT DO NOTHING` 获得原子的查重插入。
/// * 条件更新在单条 `UPDATE ... WHERE` 语句中完成，谓词求值与写入不可分割。
pub struct SqliteSignalStore {
    pool: SqlitePool,
}

impl SqliteSignalStore {
    /// 在配置的数据根目录下打开 (或创建) `signals.db`。
    pub async fn new() -> Result<Self, StoreError> {
        let root = crate::config::get_root_dir();
        fs::create_dir_all(&root).map_err(|e| StoreError::InitError(e.to_string()))?;
        Self::open(&root.join(DEFAULT_SIGNAL_DB)).await
    }

    /// # Summary
    /// 打开指定路径的数据库文件并初始化表结构。
    ///
    /// # Logic
    /// 1. 开启 `create_if_missing`、WAL 与 busy timeout。
    /// 2. 执行 DDL 创建 `signals` 表。
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                symbol TEXT,
                units TEXT,
                action TEXT,
                order_type TEXT,
                price TEXT,
                lifecycle TEXT,
                broker_order_ref INTEGER,
                execution_status TEXT,
                submit_attempts INTEGER,
                resubmissions INTEGER,
                submit_error TEXT,
                submit_ambiguous INTEGER,
                submit_terminal INTEGER,
                submit_pending INTEGER,
                filled_quantity TEXT,
                avg_fill_price TEXT,
                created_at DATETIME,
                updated_at DATETIME
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;

        debug!("Signal store opened at {}", db_path.display());
        Ok(Self { pool })
    }
}

#[async_trait]
impl SignalStore for SqliteSignalStore {
    async fn get(&self, id: &SignalId) -> Result<Option<SignalRecord>, StoreError> {
        let sql = format!("SELECT {} FROM signals WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, SignalRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(row.map(SignalRecord::from))
    }

    async fn put_if_absent(&self, record: &SignalRecord) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO signals
            (id, symbol, units, action, order_type, price, lifecycle, broker_order_ref,
             execution_status, submit_attempts, resubmissions, submit_error, submit_ambiguous,
             submit_terminal, submit_pending, filled_quantity, avg_fill_price, created_at,
             updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.symbol)
        .bind(&record.units)
        .bind(&record.action)
        .bind(&record.order_type)
        .bind(&record.price)
        .bind(&record.lifecycle)
        .bind(record.broker_order_ref)
        .bind(&record.execution_status)
        .bind(record.submit_attempts)
        .bind(record.resubmissions)
        .bind(&record.submit_error)
        .bind(record.submit_ambiguous)
        .bind(record.submit_terminal)
        .bind(record.submit_pending)
        .bind(&record.filled_quantity)
        .bind(&record.avg_fill_price)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// # Logic
    /// 1. 只为补丁中出现的字段生成 `SET` 子句，`updated_at` 总是出现以保证语句非空。
    /// 2. `WHERE` 由 ID 与前置谓词拼接，与 `UpdateGuard::matches` 语义一致。
    /// 3. SQLite 的 `changes()` 统计满足 WHERE 的行，即命中数。
    async fn update_fields(
        &self,
        id: &SignalId,
        guard: &UpdateGuard,
        patch: &SignalPatch,
    ) -> Result<u64, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE signals SET ");
        {
            let mut set = qb.separated(", ");
            match patch.updated_at {
                Some(ts) => {
                    set.push("updated_at = ");
                    set.push_bind_unseparated(ts);
                }
                None => {
                    set.push("updated_at = updated_at");
                }
            }
            if let Some(units) = patch.units {
                set.push("units = ");
                set.push_bind_unseparated(units.to_string());
            }
            if let Some(lifecycle) = patch.lifecycle {
                set.push("lifecycle = ");
                set.push_bind_unseparated(lifecycle.as_str());
            }
            if let Some(perm_id) = patch.broker_order_ref {
                set.push("broker_order_ref = ");
                set.push_bind_unseparated(perm_id.0);
            }
            if let Some(status) = patch.execution_status {
                set.push("execution_status = ");
                set.push_bind_unseparated(status.as_str());
            }
            if let Some(submission) = &patch.submission {
                let failure = submission.last_failure.as_ref();
                set.push("submit_attempts = ");
                set.push_bind_unseparated(i64::from(submission.attempts));
                set.push("resubmissions = ");
                set.push_bind_unseparated(i64::from(submission.resubmissions));
                set.push("submit_error = ");
                set.push_bind_unseparated(failure.map(|f| f.cause.clone()));
                set.push("submit_ambiguous = ");
                set.push_bind_unseparated(failure.map(|f| f.may_have_reached_gateway));
                set.push("submit_terminal = ");
                set.push_bind_unseparated(submission.terminal);
                set.push("submit_pending = ");
                set.push_bind_unseparated(submission.pending);
            }
            if let Some(fill) = &patch.fill {
                set.push("filled_quantity = ");
                set.push_bind_unseparated(fill.filled_quantity.to_string());
                set.push("avg_fill_price = ");
                set.push_bind_unseparated(fill.avg_fill_price.map(|p| p.to_string()));
            }
        }

        qb.push(" WHERE id = ");
        qb.push_bind(id.as_str().to_string());
        match guard {
            UpdateGuard::Any => {}
            UpdateGuard::Lifecycle(state) => {
                qb.push(" AND COALESCE(lifecycle, 'PENDING') = ");
                qb.push_bind(state.as_str());
            }
            UpdateGuard::AcceptedUnsubmitted => {
                qb.push(" AND lifecycle = 'ACCEPTED' AND broker_order_ref IS NULL");
            }
            UpdateGuard::BrokerRef(perm_id) => {
                qb.push(" AND broker_order_ref = ");
                qb.push_bind(perm_id.0);
            }
        }

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn list_all(&self, limit: usize) -> Result<Vec<SignalRecord>, StoreError> {
        let sql = format!("SELECT {} FROM signals ORDER BY seq ASC LIMIT ?", SELECT_COLUMNS);
        let rows = sqlx::query_as::<_, SignalRow>(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(SignalRecord::from).collect())
    }
}
