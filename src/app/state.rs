// ==========================================
// 装配工位套件追踪系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 组装: 数据库 -> 仓储 -> 通知中心/图片存储 -> 控制器 -> API
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::api::StationApi;
use crate::blob_store::{BlobStore, LocalBlobStore};
use crate::config::config_manager::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{
    ActivityStore, KitCatalog, OptionalEventPublisher, StationController, StationEventPublisher,
};
use crate::realtime::RealtimeHub;
use crate::repository::{ActivityRepository, KitTemplateRepository};

/// 上传目录环境变量
pub const UPLOAD_DIR_ENV: &str = "KITTING_STATION_UPLOAD_DIR";
/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "KITTING_STATION_DB_PATH";

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 工位API
    pub station_api: Arc<StationApi>,

    /// 工位控制器
    pub controller: Arc<StationController>,

    /// 活动仓储（巡检/报表）
    pub activity_repo: Arc<ActivityRepository>,

    /// 套件模板仓储
    pub kit_template_repo: Arc<KitTemplateRepository>,

    /// 实时通知中心
    pub realtime_hub: Arc<RealtimeHub>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并确保表结构
    /// 2. 读取配置，初始化仓储（各自独立连接）
    /// 3. 创建通知中心、图片存储、控制器与API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 建表连接同时作为配置连接，其余仓储各自持有连接（WAL）
        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库表结构初始化失败: {}", e))?;
        let config_manager = Arc::new(
            ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 读取配置
        // ==========================================
        let capacity = config_manager
            .get_notify_channel_capacity()
            .map_err(|e| format!("读取通知配置失败: {}", e))?;
        let upload_timeout = config_manager
            .get_blob_upload_timeout()
            .map_err(|e| format!("读取上传配置失败: {}", e))?;
        let upload_dir = resolve_upload_dir(
            &config_manager
                .get_upload_dir()
                .map_err(|e| format!("读取上传目录失败: {}", e))?,
        );
        let max_total_kits = config_manager
            .get_max_total_kits()
            .map_err(|e| format!("读取套件上限失败: {}", e))?;
        let pool_size = config_manager
            .get_activity_pool_size()
            .map_err(|e| format!("读取连接池配置失败: {}", e))?;
        tracing::info!(
            "通知频道容量={}, 上传超时={}ms, 上传目录={}, 套件上限={}, 连接池={}",
            capacity,
            upload_timeout.as_millis(),
            upload_dir.display(),
            max_total_kits,
            pool_size
        );

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let activity_repo = Arc::new(
            ActivityRepository::with_pool(&db_path, pool_size)
                .map_err(|e| format!("无法创建ActivityRepository: {}", e))?,
        );
        let kit_template_repo = Arc::new(
            KitTemplateRepository::new(&db_path)
                .map_err(|e| format!("无法创建KitTemplateRepository: {}", e))?,
        );

        // ==========================================
        // 初始化通知 / 图片存储 / 控制器
        // ==========================================
        let realtime_hub = Arc::new(RealtimeHub::new(capacity));
        let publisher = OptionalEventPublisher::with_publisher(
            realtime_hub.clone() as Arc<dyn StationEventPublisher>
        );
        let blob_store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(upload_dir));

        let controller = Arc::new(
            StationController::new(
                activity_repo.clone() as Arc<dyn ActivityStore>,
                kit_template_repo.clone() as Arc<dyn KitCatalog>,
                publisher,
            )
            .with_max_total_kits(max_total_kits),
        );
        let station_api = Arc::new(StationApi::new(controller.clone(), blob_store, upload_timeout));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            station_api,
            controller,
            activity_repo,
            kit_template_repo,
            realtime_hub,
            config_manager,
        })
    }
}

/// 上传目录: 环境变量优先，其次配置值
fn resolve_upload_dir(configured: &str) -> PathBuf {
    if let Ok(dir) = std::env::var(UPLOAD_DIR_ENV) {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from(configured)
}

/// 获取默认数据库路径
///
/// 顺序: 环境变量 -> 用户数据目录 -> 当前目录
pub fn get_default_db_path() -> String {
    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./kitting_station.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        let dir = data_dir.join("kitting-station-dev");

        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("kitting-station");

        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("kitting_station.db");
        }
    }

    path.to_string_lossy().to_string()
}
