// ==========================================
// 装配工位套件追踪系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        tracing::info!("配置已更新: {} = {}", key, value);
        Ok(())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 解析数值配置；格式错误时回退默认值并告警
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: std::str::FromStr + Copy + std::fmt::Display,
    {
        match self.get_global_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(value) => Ok(value),
                Err(_) => {
                    tracing::warn!("配置值格式错误，使用默认值: {}='{}', default={}", key, raw, default);
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    // ===== 图片上传 =====

    /// 图片上传超时
    pub fn get_blob_upload_timeout(&self) -> Result<Duration, Box<dyn Error>> {
        let ms = self.get_parsed_or_default(
            config_keys::BLOB_UPLOAD_TIMEOUT_MS,
            defaults::BLOB_UPLOAD_TIMEOUT_MS,
        )?;
        Ok(Duration::from_millis(ms))
    }

    /// 图片上传目录
    pub fn get_upload_dir(&self) -> Result<String, Box<dyn Error>> {
        self.get_config_or_default(config_keys::UPLOAD_DIR, defaults::UPLOAD_DIR)
    }

    // ===== 实时通知 =====

    /// 每个工位频道的缓冲容量
    pub fn get_notify_channel_capacity(&self) -> Result<usize, Box<dyn Error>> {
        let capacity = self.get_parsed_or_default(
            config_keys::NOTIFY_CHANNEL_CAPACITY,
            defaults::NOTIFY_CHANNEL_CAPACITY,
        )?;
        Ok(capacity.max(1))
    }

    /// 前端连接的通知服务地址（仅透传）
    pub fn get_socket_server_url(&self) -> Result<String, Box<dyn Error>> {
        self.get_config_or_default(config_keys::SOCKET_SERVER_URL, defaults::SOCKET_SERVER_URL)
    }

    // ===== 作业与存储 =====

    /// 单个作业允许的最大套件数（至少为 1）
    pub fn get_max_total_kits(&self) -> Result<u32, Box<dyn Error>> {
        let max = self.get_parsed_or_default(config_keys::MAX_TOTAL_KITS, defaults::MAX_TOTAL_KITS)?;
        Ok(max.max(1))
    }

    /// 活动仓储连接池大小（至少为 1）
    pub fn get_activity_pool_size(&self) -> Result<usize, Box<dyn Error>> {
        let size = self.get_parsed_or_default(
            config_keys::ACTIVITY_POOL_SIZE,
            defaults::ACTIVITY_POOL_SIZE,
        )?;
        Ok(size.max(1))
    }

    // ===== 快照 =====

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    ///
    /// # 注意
    /// - 此方法会覆盖现有的global配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, ?3)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value, now],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 图片上传
    pub const BLOB_UPLOAD_TIMEOUT_MS: &str = "blob_upload_timeout_ms";
    pub const UPLOAD_DIR: &str = "upload_dir";

    // 实时通知
    pub const NOTIFY_CHANNEL_CAPACITY: &str = "notify_channel_capacity";
    pub const SOCKET_SERVER_URL: &str = "socket_server_url";

    // 作业与存储
    pub const MAX_TOTAL_KITS: &str = "max_total_kits";
    pub const ACTIVITY_POOL_SIZE: &str = "activity_pool_size";
}

/// 默认值
pub mod defaults {
    pub const BLOB_UPLOAD_TIMEOUT_MS: u64 = 5000;
    pub const UPLOAD_DIR: &str = "captures";
    pub const NOTIFY_CHANNEL_CAPACITY: usize = 256;
    pub const SOCKET_SERVER_URL: &str = "http://127.0.0.1:5000";
    pub const MAX_TOTAL_KITS: u32 = crate::engine::DEFAULT_MAX_TOTAL_KITS;
    pub const ACTIVITY_POOL_SIZE: usize = 4;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn manager() -> (NamedTempFile, ConfigManager) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();
        let conn = open_sqlite_connection(&db_path).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let manager = ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap();
        (temp_file, manager)
    }

    #[test]
    fn test_defaults_when_unset() {
        let (_tmp, config) = manager();
        assert_eq!(config.get_blob_upload_timeout().unwrap(), Duration::from_millis(5000));
        assert_eq!(config.get_notify_channel_capacity().unwrap(), 256);
        assert_eq!(config.get_upload_dir().unwrap(), "captures");
        assert_eq!(config.get_max_total_kits().unwrap(), 10_000);
        assert_eq!(config.get_activity_pool_size().unwrap(), 4);
    }

    #[test]
    fn test_max_total_kits_bounds() {
        let (_tmp, config) = manager();
        config.set_config_value(config_keys::MAX_TOTAL_KITS, "500").unwrap();
        assert_eq!(config.get_max_total_kits().unwrap(), 500);

        config.set_config_value(config_keys::MAX_TOTAL_KITS, "0").unwrap();
        assert_eq!(config.get_max_total_kits().unwrap(), 1);

        // 超出 u32 范围按格式错误处理
        config.set_config_value(config_keys::MAX_TOTAL_KITS, "99999999999").unwrap();
        assert_eq!(config.get_max_total_kits().unwrap(), 10_000);
    }

    #[test]
    fn test_set_and_malformed_values() {
        let (_tmp, config) = manager();
        config.set_config_value(config_keys::BLOB_UPLOAD_TIMEOUT_MS, "750").unwrap();
        assert_eq!(config.get_blob_upload_timeout().unwrap(), Duration::from_millis(750));

        config.set_config_value(config_keys::NOTIFY_CHANNEL_CAPACITY, "很多").unwrap();
        assert_eq!(config.get_notify_channel_capacity().unwrap(), 256);
    }

    #[test]
    fn test_snapshot_restore() {
        let (_tmp, config) = manager();
        config.set_config_value(config_keys::UPLOAD_DIR, "/data/captures").unwrap();
        let snapshot = config.get_config_snapshot().unwrap();

        config.set_config_value(config_keys::UPLOAD_DIR, "other").unwrap();
        let restored = config.restore_config_from_snapshot(&snapshot).unwrap();

        assert_eq!(restored, 1);
        assert_eq!(config.get_upload_dir().unwrap(), "/data/captures");
    }
}
