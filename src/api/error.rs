// ==========================================
// 装配工位套件追踪系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换引擎/仓储错误为用户友好的错误消息
// 约定: 每个错误带稳定的机器可读 code，供界面渲染
// ==========================================

use crate::engine::error::StationError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 工位业务规则错误
    // ==========================================
    #[error("工位没有正在运行的作业: {0}")]
    NoActiveJob(String),

    #[error("通道 {lane} 已锁定，需先解决 {unresolved} 条错误")]
    LaneLocked { lane: String, unresolved: usize },

    #[error("通道已完成全部套件: {0}")]
    LaneAlreadyComplete(String),

    #[error("工位 {0} 正被其他作业占用")]
    WorkstationBusy(String),

    #[error("套件模板不匹配: {0}")]
    KitTemplateMismatch(String),

    #[error("没有待解决的错误: {0}")]
    NothingToResolve(String),

    // ==========================================
    // 输入/查询错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NoActiveJob(_) => "no_active_job",
            ApiError::LaneLocked { .. } => "locked",
            ApiError::LaneAlreadyComplete(_) => "lane_complete",
            ApiError::WorkstationBusy(_) => "workstation_busy",
            ApiError::KitTemplateMismatch(_) => "kit_mismatch",
            ApiError::NothingToResolve(_) => "nothing_to_resolve",
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::NotFound(_) => "not_found",
            ApiError::OptimisticLockFailure(_) => "conflict",
            ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_)
            | ApiError::DatabaseTransactionError(_) => "database_error",
            ApiError::InternalError(_) | ApiError::Other(_) => "internal_error",
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                activity_id,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "活动{}已被其他请求修改（期望revision={}，实际revision={}）",
                activity_id, expected, actual
            )),

            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::DocumentSerialization { entity, message } => {
                ApiError::InternalError(format!("{} 文档损坏: {}", entity, message))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InternalError(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
        }
    }
}

// ==========================================
// 从 StationError 转换
// ==========================================
impl From<StationError> for ApiError {
    fn from(err: StationError) -> Self {
        match err {
            StationError::NoActiveJob { workstation_id } => ApiError::NoActiveJob(workstation_id),
            StationError::LaneLocked { lane, unresolved } => ApiError::LaneLocked {
                lane: lane.as_str().to_string(),
                unresolved,
            },
            e @ StationError::LaneAlreadyComplete { .. } => {
                ApiError::LaneAlreadyComplete(e.to_string())
            }
            StationError::WorkstationBusy { workstation_id } => {
                ApiError::WorkstationBusy(workstation_id)
            }
            e @ (StationError::KitCodeMismatch { .. }
            | StationError::KitNameMismatch { .. }
            | StationError::KitTemplateNotFound { .. }) => {
                ApiError::KitTemplateMismatch(e.to_string())
            }
            StationError::NothingToResolve { lane } => {
                ApiError::NothingToResolve(format!("通道 {}", lane))
            }
            StationError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            StationError::ActivityNotFound(id) => ApiError::NotFound(format!("活动(id={})不存在", id)),
            e @ StationError::ArchiveNotFound { .. } => ApiError::NotFound(e.to_string()),
            StationError::LockPoisoned(msg) => ApiError::InternalError(msg),
            StationError::Repository(err) => err.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Lane;

    #[test]
    fn test_station_error_conversion() {
        let api_err: ApiError = StationError::LaneLocked {
            lane: Lane::B,
            unresolved: 2,
        }
        .into();
        assert_eq!(api_err.code(), "locked");
        assert!(api_err.to_string().contains("B"));

        let api_err: ApiError = StationError::KitCodeMismatch {
            kit_name: "刹车套件".to_string(),
        }
        .into();
        assert_eq!(api_err.code(), "kit_mismatch");
        assert!(api_err.to_string().contains("刹车套件"));
    }

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "Activity".to_string(),
            id: "A001".to_string(),
        };
        let api_err: ApiError = StationError::from(repo_err).into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Activity"));
                assert!(msg.contains("A001"));
            }
            _ => panic!("Expected NotFound"),
        }

        let api_err: ApiError = RepositoryError::OptimisticLockFailure {
            activity_id: "A001".to_string(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert_eq!(api_err.code(), "conflict");
    }
}
