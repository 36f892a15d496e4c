// ==========================================
// 装配工位套件追踪系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 双相机装配工位的套件计数/校验/归档状态机
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 工位状态机
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/表结构）
pub mod db;

// 日志系统
pub mod logging;

// 实时通知（按工位频道广播）
pub mod realtime;

// 抓拍图片存储
pub mod blob_store;

// API 层 - 调用方门面
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ActivityStatus, ArchiveStatus, ErrorKind, Lane, SlotStatus};

// 领域实体
pub use domain::{
    Activity, BomSlot, DetectionEvent, KitArchiveRecord, KitTemplate, ResolutionLogEntry,
};

// 引擎
pub use engine::{
    DetectionOutcome, ResolveOutcome, StationController, StationError, ValidationOutcome,
};

// API
pub use api::{ApiError, StationApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "装配工位套件追踪系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
