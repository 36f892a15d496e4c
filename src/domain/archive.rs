// ==========================================
// 装配工位套件追踪系统 - 套件归档与解决日志
// ==========================================
// 红线: 归档记录与解决日志一经写入不可修改
// ==========================================

use crate::domain::error_record::ErrorDetail;
use crate::domain::slot::BomSlot;
use crate::domain::types::{ArchiveStatus, ErrorKind, Lane};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ResolutionLogEntry - 错误解决日志
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionLogEntry {
    pub log_id: String,
    pub activity_id: String,
    pub workstation_id: String,
    pub lane: Lane,
    pub kit_number: u32,
    pub error_kind: ErrorKind,
    pub reason: String,
    pub detail: ErrorDetail,
    pub resolved_at: DateTime<Utc>,
}

// ==========================================
// KitArchiveRecord - 套件归档记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitArchiveRecord {
    pub archive_id: String,
    pub workstation_id: String,
    pub activity_id: String,
    pub lane: Lane,
    pub kit_number: u32,
    pub completed_at: DateTime<Utc>,
    pub slots: Vec<BomSlot>,                     // 完成时通道槽位快照
    pub resolved_errors: Vec<ResolutionLogEntry>, // 本套件周期内已解决的错误
    pub status: ArchiveStatus,
    pub proof_image_ref: Option<String>,         // 校验凭证图片
    pub override_applied: bool,                  // 是否由人工放行强制完成
}

impl KitArchiveRecord {
    /// 本套件周期内是否出现过错误
    pub fn has_errors(&self) -> bool {
        !self.resolved_errors.is_empty()
    }

    /// 是否存在数量不精确的槽位
    pub fn has_inexact_counts(&self) -> bool {
        self.slots.iter().any(|slot| !slot.is_exact())
    }
}
