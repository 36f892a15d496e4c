// ==========================================
// 装配工位套件追踪系统 - 活动文档仓储
// ==========================================
// 职责: activity 文档 / kit_archive 归档 / resolution_log 解决日志
// 红线: Repository 不含业务逻辑，只做数据映射
// 约束: 所有查询使用参数化
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::{Activity, KitArchiveRecord, Lane, ResolutionLogEntry};
use crate::engine::store::ActivityStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

// ==========================================
// ActivityRepository - 活动文档仓储
// ==========================================
pub struct ActivityRepository {
    /// 连接池（WAL 模式下多个连接可并发读，写入由 SQLite 串行化）
    pool: Vec<Arc<Mutex<Connection>>>,
    next: AtomicUsize,
}

impl ActivityRepository {
    /// 按数据库路径创建仓储（独立连接）
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        Self::with_pool(db_path, 1)
    }

    /// 按数据库路径创建带连接池的仓储
    ///
    /// `size` 小于 1 时按 1 处理
    pub fn with_pool(db_path: &str, size: usize) -> RepositoryResult<Self> {
        let pool = (0..size.max(1))
            .map(|_| open_sqlite_connection(db_path).map(|conn| Arc::new(Mutex::new(conn))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            pool,
            next: AtomicUsize::new(0),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            pool: vec![conn],
            next: AtomicUsize::new(0),
        }
    }

    /// 连接池大小
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// 取一个连接：优先空闲连接，全部占用时按轮询等待
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        let size = self.pool.len();

        for offset in 0..size {
            match self.pool[(start + offset) % size].try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(e)) => {
                    return Err(RepositoryError::LockError(e.to_string()))
                }
            }
        }

        self.pool[start % size]
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 文档编解码
    // ==========================================

    fn encode_activity(activity: &Activity) -> RepositoryResult<String> {
        serde_json::to_string(activity).map_err(|e| RepositoryError::document("activity", e))
    }

    fn decode_activity(raw: &str) -> RepositoryResult<Activity> {
        serde_json::from_str(raw).map_err(|e| RepositoryError::document("activity", e))
    }

    fn decode_archive(raw: &str) -> RepositoryResult<KitArchiveRecord> {
        serde_json::from_str(raw).map_err(|e| RepositoryError::document("kit_archive", e))
    }

    /// 带乐观锁的文档更新（在给定连接/事务上执行）
    fn update_on(conn: &Connection, activity: &Activity) -> RepositoryResult<i64> {
        let expected = activity.revision;
        let mut next = activity.clone();
        next.revision = expected + 1;
        let doc = Self::encode_activity(&next)?;

        let rows_affected = conn.execute(
            r#"UPDATE activity
               SET status = ?1, doc_json = ?2, revision = revision + 1, updated_at = ?3
               WHERE activity_id = ?4 AND revision = ?5"#,
            params![
                next.status.to_db_str(),
                doc,
                next.updated_at.to_rfc3339(),
                next.activity_id,
                expected,
            ],
        )?;

        if rows_affected == 0 {
            let actual: Option<i64> = conn
                .query_row(
                    "SELECT revision FROM activity WHERE activity_id = ?1",
                    params![next.activity_id],
                    |row| row.get(0),
                )
                .optional()?;

            return match actual {
                Some(actual) => Err(RepositoryError::OptimisticLockFailure {
                    activity_id: next.activity_id.clone(),
                    expected,
                    actual,
                }),
                None => Err(RepositoryError::NotFound {
                    entity: "Activity".to_string(),
                    id: next.activity_id.clone(),
                }),
            };
        }

        Ok(next.revision)
    }

    /// 追加一条解决日志（在给定连接/事务上执行）
    fn insert_log_on(conn: &Connection, entry: &ResolutionLogEntry) -> RepositoryResult<()> {
        let detail_json = serde_json::to_string(&entry.detail)
            .map_err(|e| RepositoryError::document("resolution_log", e))?;

        conn.execute(
            r#"
            INSERT INTO resolution_log (
                log_id, activity_id, workstation_id, lane, kit_number,
                error_kind, reason, detail_json, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                entry.log_id,
                entry.activity_id,
                entry.workstation_id,
                entry.lane.as_str(),
                entry.kit_number,
                entry.error_kind.as_str(),
                entry.reason,
                detail_json,
                entry.resolved_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 列出全部活动（按创建时间倒序，用于巡检工具）
    pub fn list_all(&self) -> RepositoryResult<Vec<Activity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT doc_json FROM activity ORDER BY created_at DESC")?;
        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        docs.iter().map(|raw| Self::decode_activity(raw)).collect()
    }

    /// 列出全部正在运行的活动
    pub fn list_running(&self) -> RepositoryResult<Vec<Activity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT doc_json FROM activity WHERE status = 'RUNNING' ORDER BY workstation_id",
        )?;
        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        docs.iter().map(|raw| Self::decode_activity(raw)).collect()
    }

    /// 归档记录总数
    pub fn count_archives(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kit_archive", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl ActivityStore for ActivityRepository {
    fn insert_activity(&self, activity: &Activity) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let doc = Self::encode_activity(activity)?;

        conn.execute(
            r#"
            INSERT INTO activity (
                activity_id, workstation_id, status, order_reference,
                doc_json, revision, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                activity.activity_id,
                activity.workstation_id,
                activity.status.to_db_str(),
                activity.order_reference,
                doc,
                activity.revision,
                activity.created_at.to_rfc3339(),
                activity.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn find_activity(&self, activity_id: &str) -> RepositoryResult<Option<Activity>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc_json FROM activity WHERE activity_id = ?1",
                params![activity_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|doc| Self::decode_activity(&doc)).transpose()
    }

    fn find_running_by_workstation(
        &self,
        workstation_id: &str,
    ) -> RepositoryResult<Option<Activity>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc_json FROM activity WHERE workstation_id = ?1 AND status = 'RUNNING' LIMIT 1",
                params![workstation_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|doc| Self::decode_activity(&doc)).transpose()
    }

    fn update_activity(&self, activity: &Activity) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::update_on(&conn, activity)
    }

    fn commit_kit_completion(
        &self,
        archive: &KitArchiveRecord,
        activity: &Activity,
        logs: &[ResolutionLogEntry],
    ) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        for entry in logs {
            Self::insert_log_on(&tx, entry)?;
        }

        let record_json = serde_json::to_string(archive)
            .map_err(|e| RepositoryError::document("kit_archive", e))?;

        tx.execute(
            r#"
            INSERT INTO kit_archive (
                archive_id, activity_id, workstation_id, lane, kit_number,
                status, completed_at, record_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                archive.archive_id,
                archive.activity_id,
                archive.workstation_id,
                archive.lane.as_str(),
                archive.kit_number,
                archive.status.as_str(),
                archive.completed_at.to_rfc3339(),
                record_json,
            ],
        )?;

        let new_revision = Self::update_on(&tx, activity)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(new_revision)
    }

    fn commit_resolution(
        &self,
        activity: &Activity,
        logs: &[ResolutionLogEntry],
    ) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        for entry in logs {
            Self::insert_log_on(&tx, entry)?;
        }
        let new_revision = Self::update_on(&tx, activity)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(new_revision)
    }

    fn list_resolution_logs(
        &self,
        activity_id: &str,
        lane: Lane,
        kit_number: u32,
    ) -> RepositoryResult<Vec<ResolutionLogEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT log_id, activity_id, workstation_id, lane, kit_number,
                      error_kind, reason, detail_json, resolved_at
               FROM resolution_log
               WHERE activity_id = ?1 AND lane = ?2 AND kit_number = ?3
               ORDER BY resolved_at, rowid"#,
        )?;

        let rows = stmt
            .query_map(params![activity_id, lane.as_str(), kit_number], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (log_id, activity_id, workstation_id, lane, kit_number, kind, reason, detail, ts) in rows {
            let detail = serde_json::from_str(&detail)
                .map_err(|e| RepositoryError::document("resolution_log", e))?;
            let resolved_at = chrono::DateTime::parse_from_rfc3339(&ts)
                .map_err(|e| RepositoryError::FieldValueError {
                    field: "resolved_at".to_string(),
                    message: e.to_string(),
                })?
                .with_timezone(&chrono::Utc);

            entries.push(ResolutionLogEntry {
                log_id,
                activity_id,
                workstation_id,
                lane: Lane::from_db_str(&lane),
                kit_number,
                error_kind: crate::domain::ErrorKind::from_db_str(&kind),
                reason,
                detail,
                resolved_at,
            });
        }
        Ok(entries)
    }

    fn find_archive(
        &self,
        activity_id: &str,
        lane: Lane,
        kit_number: u32,
    ) -> RepositoryResult<Option<KitArchiveRecord>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                r#"SELECT record_json FROM kit_archive
                   WHERE activity_id = ?1 AND lane = ?2 AND kit_number = ?3"#,
                params![activity_id, lane.as_str(), kit_number],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|doc| Self::decode_archive(&doc)).transpose()
    }

    fn list_archives(&self, activity_id: &str) -> RepositoryResult<Vec<KitArchiveRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT record_json FROM kit_archive
               WHERE activity_id = ?1
               ORDER BY lane, kit_number"#,
        )?;
        let docs = stmt
            .query_map(params![activity_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        docs.iter().map(|raw| Self::decode_archive(raw)).collect()
    }
}
