// ==========================================
// 装配工位套件追踪系统 - 引擎层错误类型
// ==========================================
// 职责: 业务规则违反（无运行作业/通道锁定/模板不匹配/工位占用）
// 说明: 错件与校验失败属于预期的业务结果，不在此列
// ==========================================

use crate::domain::Lane;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 工位引擎错误
#[derive(Error, Debug)]
pub enum StationError {
    // ==========================================
    // 业务规则违反
    // ==========================================
    #[error("工位 {workstation_id} 没有正在运行的作业")]
    NoActiveJob { workstation_id: String },

    #[error("通道 {lane} 已锁定: 存在 {unresolved} 条未解决错误")]
    LaneLocked { lane: Lane, unresolved: usize },

    #[error("通道 {lane} 已完成全部套件 (kit_index={kit_index}, total={total_kits})")]
    LaneAlreadyComplete {
        lane: Lane,
        kit_index: u32,
        total_kits: u32,
    },

    #[error("工位 {workstation_id} 正被其他作业占用")]
    WorkstationBusy { workstation_id: String },

    #[error("识别码与套件名称 '{kit_name}' 不匹配")]
    KitCodeMismatch { kit_name: String },

    #[error("套件名称与识别码 '{kit_code}' 不匹配")]
    KitNameMismatch { kit_code: String },

    #[error("套件名称 '{kit_name}' 与识别码 '{kit_code}' 均不存在")]
    KitTemplateNotFound { kit_name: String, kit_code: String },

    #[error("通道 {lane} 没有待解决的错误")]
    NothingToResolve { lane: Lane },

    // ==========================================
    // 调用方输入错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("活动不存在: {0}")]
    ActivityNotFound(String),

    #[error("套件归档不存在: activity_id={activity_id}, lane={lane}, kit_number={kit_number}")]
    ArchiveNotFound {
        activity_id: String,
        lane: Lane,
        kit_number: u32,
    },

    // ==========================================
    // 持久化/并发
    // ==========================================
    #[error("工位锁获取失败: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result 类型别名
pub type StationResult<T> = Result<T, StationError>;
