// ==========================================
// 装配工位套件追踪系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、派生谓词
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod activity;
pub mod archive;
pub mod detection;
pub mod error_record;
pub mod kit_template;
pub mod slot;
pub mod types;

// 重导出核心类型
pub use activity::{Activity, LaneState, FIRST_KIT_NUMBER};
pub use archive::{KitArchiveRecord, ResolutionLogEntry};
pub use detection::DetectionEvent;
pub use error_record::{ErrorDetail, ErrorRecord, ValidationDetail};
pub use kit_template::{AlertFlags, BomLine, KitTemplate};
pub use slot::{BomSlot, CaptureRecord, SlotResolution};
pub use types::{
    ActivityStatus, ArchiveStatus, ErrorKind, KitGridColor, KitGridState, Lane, SlotStatus,
};
