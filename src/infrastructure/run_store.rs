//! 测试记录存储 - 基础设施层
//!
//! 以 id 为主键持久化 `TestRunResult`。运行开始时立即写入记录，之后原地更新，
//! 外部观察者随时能看到最后写入的状态。
//!
//! Schema:
//! - test_runs: 摘要列（用于列表查询）+ result_json（完整记录）

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::{AppError, AppResult, StoreError};
use crate::models::{GradeLevel, RunStatus, TestHistory, TestRunResult, TestRunSummary};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS test_runs (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    company_id TEXT NOT NULL,
    company_name TEXT NOT NULL,
    model_name TEXT NOT NULL,
    status TEXT NOT NULL,
    overall_score REAL NOT NULL,
    overall_grade TEXT NOT NULL,
    total_files INTEGER NOT NULL,
    fields_correct INTEGER NOT NULL,
    fields_partial INTEGER NOT NULL,
    fields_wrong INTEGER NOT NULL,
    fields_missing INTEGER NOT NULL,
    execution_time_seconds REAL NOT NULL,
    error TEXT,
    result_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_test_runs_timestamp ON test_runs(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_test_runs_company ON test_runs(company_id, timestamp DESC);
";

const SUMMARY_COLUMNS: &str = "id, timestamp, company_id, company_name, model_name, status, \
     overall_score, overall_grade, total_files, fields_correct, fields_partial, fields_wrong, \
     fields_missing, execution_time_seconds, error";

/// 测试记录存储
#[async_trait]
pub trait RunStore: Send + Sync {
    /// 新建记录，id 已存在时返回 `StoreError::Duplicate`
    async fn create(&self, result: &TestRunResult) -> AppResult<()>;

    /// 按 id 覆盖记录（不存在则新建），状态只能向前推进
    async fn upsert(&self, result: &TestRunResult) -> AppResult<()>;

    async fn get(&self, id: &str) -> AppResult<TestRunResult>;

    /// 按时间倒序列出摘要
    async fn list(&self, limit: usize, offset: usize) -> AppResult<Vec<TestRunSummary>>;

    async fn list_for_company(&self, company_id: &str, limit: usize, offset: usize) -> AppResult<Vec<TestRunSummary>>;

    async fn count(&self, company_id: Option<&str>) -> AppResult<usize>;

    /// 分页历史记录
    async fn history(&self, company_id: Option<&str>, limit: usize, offset: usize) -> AppResult<TestHistory> {
        let runs = match company_id {
            Some(company_id) => self.list_for_company(company_id, limit, offset).await?,
            None => self.list(limit, offset).await?,
        };
        let total_count = self.count(company_id).await?;
        Ok(TestHistory { runs, total_count })
    }
}

/// 基于 SQLite 的实现
///
/// 单个连接由互斥锁保护，所有写入串行化；阻塞调用放到 `spawn_blocking` 中执行
#[derive(Clone)]
pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// 打开（或创建）数据库文件
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Other(format!("无法创建数据库目录 {}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        info!("✓ 测试记录数据库已打开: {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// 内存数据库，用于测试
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            // 锁中毒时连接本身仍然可用
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await?
    }
}

fn write_record(conn: &Connection, result: &TestRunResult, json: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO test_runs (
            id, timestamp, company_id, company_name, model_name, status,
            overall_score, overall_grade, total_files, fields_correct, fields_partial,
            fields_wrong, fields_missing, execution_time_seconds, error, result_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        ON CONFLICT(id) DO UPDATE SET
            timestamp = excluded.timestamp,
            company_id = excluded.company_id,
            company_name = excluded.company_name,
            model_name = excluded.model_name,
            status = excluded.status,
            overall_score = excluded.overall_score,
            overall_grade = excluded.overall_grade,
            total_files = excluded.total_files,
            fields_correct = excluded.fields_correct,
            fields_partial = excluded.fields_partial,
            fields_wrong = excluded.fields_wrong,
            fields_missing = excluded.fields_missing,
            execution_time_seconds = excluded.execution_time_seconds,
            error = excluded.error,
            result_json = excluded.result_json",
        params![
            result.id,
            format_timestamp(&result.timestamp),
            result.company_id,
            result.company_name,
            result.model_name,
            result.status.as_str(),
            result.overall_score,
            result.overall_grade.as_str(),
            result.total_files as i64,
            result.fields_correct as i64,
            result.fields_partial as i64,
            result.fields_wrong as i64,
            result.fields_missing as i64,
            result.execution_time_seconds,
            result.error,
            json,
        ],
    )
}

/// 时间列统一存为 RFC 3339（微秒、UTC、`Z` 结尾），按字符串排序即按时间排序
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|ts| ts.with_timezone(&Utc))
}

fn read_status(conn: &Connection, id: &str) -> AppResult<Option<RunStatus>> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM test_runs WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    status
        .map(|s| s.parse::<RunStatus>().map_err(AppError::Other))
        .transpose()
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<TestRunSummary> {
    let status: String = row.get(5)?;
    let grade: String = row.get(7)?;
    let raw_timestamp: String = row.get(1)?;
    let timestamp = parse_timestamp(&raw_timestamp)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(TestRunSummary {
        id: row.get(0)?,
        timestamp,
        company_id: row.get(2)?,
        company_name: row.get(3)?,
        model_name: row.get(4)?,
        status: status.parse().unwrap_or(RunStatus::Error),
        overall_score: row.get(6)?,
        overall_grade: GradeLevel::from_str_opt(&grade).unwrap_or(GradeLevel::F),
        total_files: row.get::<_, i64>(8)? as usize,
        fields_correct: row.get::<_, i64>(9)? as usize,
        fields_partial: row.get::<_, i64>(10)? as usize,
        fields_wrong: row.get::<_, i64>(11)? as usize,
        fields_missing: row.get::<_, i64>(12)? as usize,
        execution_time_seconds: row.get(13)?,
        error: row.get(14)?,
    })
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn create(&self, result: &TestRunResult) -> AppResult<()> {
        let result = result.clone();
        let json = serde_json::to_string(&result).map_err(StoreError::Serialization)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if read_status(&tx, &result.id)?.is_some() {
                return Err(StoreError::Duplicate { id: result.id }.into());
            }
            write_record(&tx, &result, &json)?;
            tx.commit()?;
            debug!("新建测试记录 {} ({})", result.id, result.status);
            Ok(())
        })
        .await
    }

    async fn upsert(&self, result: &TestRunResult) -> AppResult<()> {
        let result = result.clone();
        let json = serde_json::to_string(&result).map_err(StoreError::Serialization)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if let Some(current) = read_status(&tx, &result.id)? {
                if !current.can_transition_to(result.status) {
                    return Err(StoreError::InvalidTransition {
                        id: result.id,
                        from: current.to_string(),
                        to: result.status.to_string(),
                    }
                    .into());
                }
            }
            write_record(&tx, &result, &json)?;
            tx.commit()?;
            debug!("更新测试记录 {} ({})", result.id, result.status);
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> AppResult<TestRunResult> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row("SELECT result_json FROM test_runs WHERE id = ?1", [&id], |row| row.get(0))
                .optional()?;
            let json = json.ok_or_else(|| AppError::run_not_found(&id))?;
            let result = serde_json::from_str(&json).map_err(StoreError::Serialization)?;
            Ok(result)
        })
        .await
    }

    async fn list(&self, limit: usize, offset: usize) -> AppResult<Vec<TestRunSummary>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM test_runs ORDER BY timestamp DESC, rowid DESC LIMIT ?1 OFFSET ?2",
                SUMMARY_COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit as i64, offset as i64], summary_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn list_for_company(&self, company_id: &str, limit: usize, offset: usize) -> AppResult<Vec<TestRunSummary>> {
        let company_id = company_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM test_runs WHERE company_id = ?1 \
                 ORDER BY timestamp DESC, rowid DESC LIMIT ?2 OFFSET ?3",
                SUMMARY_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![company_id, limit as i64, offset as i64],
                summary_from_row,
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn count(&self, company_id: Option<&str>) -> AppResult<usize> {
        let company_id = company_id.map(str::to_string);
        self.with_conn(move |conn| {
            let count: i64 = match company_id {
                Some(company_id) => conn.query_row(
                    "SELECT COUNT(*) FROM test_runs WHERE company_id = ?1",
                    [company_id],
                    |row| row.get(0),
                )?,
                None => conn.query_row("SELECT COUNT(*) FROM test_runs", [], |row| row.get(0))?,
            };
            Ok(count as usize)
        })
        .await
    }
}
