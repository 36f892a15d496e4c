// ==========================================
// 装配工位套件追踪系统 - 应用层
// ==========================================
// 职责: 组装各层，提供进程级共享状态
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
