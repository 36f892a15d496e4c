// ==========================================
// 装配工位套件追踪系统 - 错误记录
// ==========================================
// 红线: 通道未解决错误列表非空 = 通道锁定
// ==========================================

use crate::domain::detection::DetectionEvent;
use crate::domain::types::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ValidationDetail - 校验失败明细
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDetail {
    pub missing: Vec<String>,    // 缺件（found = 0）
    pub undercount: Vec<String>, // 少件（0 < found < required）
    pub overcount: Vec<String>,  // 多件（found > required）
}

impl ValidationDetail {
    /// 缺件/少件中涉及的槽位名称
    pub fn implicated_slots(&self) -> impl Iterator<Item = &String> {
        self.missing.iter().chain(self.undercount.iter())
    }
}

// ==========================================
// ErrorDetail - 错误载荷
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ErrorDetail {
    Detection(DetectionEvent),
    Validation(ValidationDetail),
}

impl ErrorDetail {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorDetail::Detection(_) => ErrorKind::DetectionMismatch,
            ErrorDetail::Validation(_) => ErrorKind::ValidationMismatch,
        }
    }
}

// ==========================================
// ErrorRecord - 通道错误记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub detail: ErrorDetail,
    pub raised_at: DateTime<Utc>,
    pub resolution_reason: Option<String>, // 仅在解决时填写
}

impl ErrorRecord {
    pub fn detection_mismatch(event: DetectionEvent) -> Self {
        Self {
            kind: ErrorKind::DetectionMismatch,
            detail: ErrorDetail::Detection(event),
            raised_at: Utc::now(),
            resolution_reason: None,
        }
    }
}
