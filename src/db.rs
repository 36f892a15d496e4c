// ==========================================
// 装配工位套件追踪系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 幂等建表（活动文档 / 套件归档 / 解决日志 / 套件模板 / 配置）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 切换到 WAL 日志模式，返回实际生效的模式
///
/// 说明：
/// - WAL 下读连接不阻塞写连接，多个仓储各持连接时不互相等待
/// - 内存库不支持 WAL，会返回 "memory"
pub fn enable_wal_mode(conn: &Connection) -> rusqlite::Result<String> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(mode.to_lowercase())
}

/// 打开 SQLite 连接并应用统一配置（WAL + 统一 PRAGMA）
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    let mode = enable_wal_mode(&conn)?;
    tracing::debug!("SQLite 连接已打开: path={}, journal_mode={}", db_path, mode);
    Ok(conn)
}

/// 幂等创建全部表与索引，并登记 schema_version
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS kit_template (
            template_id TEXT PRIMARY KEY,
            kit_name TEXT NOT NULL,
            kit_code TEXT NOT NULL,
            lines_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_kit_template_name_code
          ON kit_template(kit_name, kit_code);

        CREATE TABLE IF NOT EXISTS activity (
            activity_id TEXT PRIMARY KEY,
            workstation_id TEXT NOT NULL,
            status TEXT NOT NULL,
            order_reference TEXT NOT NULL,
            doc_json TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- 同一工位最多一个 RUNNING 活动
        CREATE UNIQUE INDEX IF NOT EXISTS uq_activity_running_workstation
          ON activity(workstation_id) WHERE status = 'RUNNING';

        CREATE TABLE IF NOT EXISTS kit_archive (
            archive_id TEXT PRIMARY KEY,
            activity_id TEXT NOT NULL REFERENCES activity(activity_id),
            workstation_id TEXT NOT NULL,
            lane TEXT NOT NULL,
            kit_number INTEGER NOT NULL,
            status TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            record_json TEXT NOT NULL,
            UNIQUE (activity_id, lane, kit_number)
        );

        CREATE TABLE IF NOT EXISTS resolution_log (
            log_id TEXT PRIMARY KEY,
            activity_id TEXT NOT NULL REFERENCES activity(activity_id),
            workstation_id TEXT NOT NULL,
            lane TEXT NOT NULL,
            kit_number INTEGER NOT NULL,
            error_kind TEXT NOT NULL,
            reason TEXT NOT NULL,
            detail_json TEXT NOT NULL,
            resolved_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_resolution_log_kit
          ON resolution_log(activity_id, lane, kit_number);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_file_connections_use_wal() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let writer = open_sqlite_connection(path).unwrap();
        ensure_schema(&writer).unwrap();
        let mode: String = writer
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        // 写事务未提交时，另一连接仍可读取
        let reader = open_sqlite_connection(path).unwrap();
        writer
            .execute_batch(
                "BEGIN IMMEDIATE;
                 INSERT INTO config_kv (scope_id, key, value) VALUES ('global', 'k', 'v');",
            )
            .unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM config_kv", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        writer.execute_batch("COMMIT;").unwrap();
    }

    #[test]
    fn test_schema_version_absent_on_empty_db() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
