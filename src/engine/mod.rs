// ==========================================
// 装配工位套件追踪系统 - 引擎层
// ==========================================
// 职责: 实现工位状态机规则,不拼 SQL
// 红线: Engine 不拼 SQL, 存储通过 store 端口访问
// ==========================================

pub mod completion;
pub mod error;
pub mod events;
pub mod lock_ledger;
pub mod matcher;
pub mod station;
pub mod status_grid;
pub mod store;
pub mod validation;
pub mod workstation_locks;

// 重导出核心引擎
pub use completion::{CompletionEngine, CompletionPlan, CompletionRequest};
pub use error::{StationError, StationResult};
pub use events::{
    channel_for, NoOpEventPublisher, OptionalEventPublisher, StationEvent, StationEventKind,
    StationEventPublisher,
};
pub use lock_ledger::LockLedger;
pub use matcher::{LaneMatcher, MatchResult};
pub use station::{
    DetectionOutcome, KitCompletionSummary, ResolveOutcome, ResolveRequest, StartJobRequest,
    StationController, ValidationOutcome, DEFAULT_MAX_TOTAL_KITS,
};
pub use status_grid::{build_status_grid, KitGridEntry, LaneGrid, StatusGrid};
pub use store::{ActivityStore, KitCatalog, TemplateLookup};
pub use validation::{SlotSummary, ValidationEngine, ValidationReport};
pub use workstation_locks::WorkstationLocks;
