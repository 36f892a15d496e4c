// ==========================================
// 装配工位套件追踪系统 - API 层
// ==========================================
// 职责: 面向调用方的门面，输入校验 + 错误码映射
// 红线: API 不含状态机规则，只委托给引擎层
// ==========================================

pub mod error;
pub mod station_api;

pub use error::{ApiError, ApiResult};
pub use station_api::{
    DetectionInput, ResolveInput, StartJobInput, StationApi, StationResponse, ValidationInput,
};
