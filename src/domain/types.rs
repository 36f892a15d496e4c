// ==========================================
// 装配工位套件追踪系统 - 领域类型定义
// ==========================================
// 职责: 相机通道、活动状态、槽位状态、错误类型等枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 相机通道 (Lane)
// ==========================================
// 一个工位有两条独立的相机通道: A (相机1) / B (相机2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Lane {
    A, // 相机 1
    B, // 相机 2
}

impl Lane {
    /// 全部通道（按固定顺序）
    pub const ALL: [Lane; 2] = [Lane::A, Lane::B];

    /// 宽松归一化调用方传入的通道标识
    ///
    /// # 规则
    /// - 只看最后一个数字: `1` → A，`2` → B（"Cam 2" / "CAM1" / "Cam 12" → B）
    /// - 最后一个数字不是 1/2 或没有数字时，单独的字母 `B` / `b` → B
    /// - 其他无法识别的输入 → A
    pub fn normalize(raw: &str) -> Lane {
        let trimmed = raw.trim();
        match trimmed.chars().rev().find(|c| c.is_ascii_digit()) {
            Some('1') => return Lane::A,
            Some('2') => return Lane::B,
            _ => {}
        }
        if trimmed.eq_ignore_ascii_case("b") || trimmed.eq_ignore_ascii_case("lane b") {
            return Lane::B;
        }
        Lane::A
    }

    /// 对应的相机编号（1 / 2）
    pub fn camera_number(&self) -> u8 {
        match self {
            Lane::A => 1,
            Lane::B => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::A => "A",
            Lane::B => "B",
        }
    }

    pub fn from_db_str(s: &str) -> Lane {
        Lane::normalize(s)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 活动生命周期状态 (Activity Status)
// ==========================================
// 红线: 同一工位同一时刻最多只有一个 RUNNING 活动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Running,               // 进行中
    Completed,             // 全部套件完成
    CompletedWithOverride, // 完成（含人工放行的套件）
    ManuallyTerminated,    // 人工终止
}

impl ActivityStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ActivityStatus::Running => "RUNNING",
            ActivityStatus::Completed => "COMPLETED",
            ActivityStatus::CompletedWithOverride => "COMPLETED_WITH_OVERRIDE",
            ActivityStatus::ManuallyTerminated => "MANUALLY_TERMINATED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(ActivityStatus::Running),
            "COMPLETED" => Some(ActivityStatus::Completed),
            "COMPLETED_WITH_OVERRIDE" => Some(ActivityStatus::CompletedWithOverride),
            "MANUALLY_TERMINATED" => Some(ActivityStatus::ManuallyTerminated),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ActivityStatus::Running)
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 槽位状态 (Slot Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Pending,   // 未齐套
    Completed, // 已齐套 (found >= required)
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Pending => write!(f, "PENDING"),
            SlotStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

// ==========================================
// 错误记录类型 (Error Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DetectionMismatch,  // 识别到不属于本通道 BOM 的零件
    ValidationMismatch, // 校验(打卡)时缺件/少件
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DetectionMismatch => "DETECTION_MISMATCH",
            ErrorKind::ValidationMismatch => "VALIDATION_MISMATCH",
        }
    }

    pub fn from_db_str(s: &str) -> ErrorKind {
        match s {
            "VALIDATION_MISMATCH" => ErrorKind::ValidationMismatch,
            _ => ErrorKind::DetectionMismatch,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 套件归档状态 (Archive Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchiveStatus {
    Completed,            // 正常完成
    CompletedWithWarning, // 完成但有多件/人工放行
}

impl ArchiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveStatus::Completed => "COMPLETED",
            ArchiveStatus::CompletedWithWarning => "COMPLETED_WITH_WARNING",
        }
    }

    pub fn from_db_str(s: &str) -> ArchiveStatus {
        match s {
            "COMPLETED_WITH_WARNING" => ArchiveStatus::CompletedWithWarning,
            _ => ArchiveStatus::Completed,
        }
    }
}

// ==========================================
// 套件状态网格 (Status Grid)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KitGridState {
    Completed,
    InProgress,
    Pending,
}

/// 已完成套件的颜色分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KitGridColor {
    Green,  // 无错误且全部数量精确匹配
    Yellow, // 无错误但存在数量偏差
    Red,    // 本套件周期内出现过错误
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_normalize_digits() {
        assert_eq!(Lane::normalize("1"), Lane::A);
        assert_eq!(Lane::normalize("Cam 1"), Lane::A);
        assert_eq!(Lane::normalize("CAM1"), Lane::A);
        assert_eq!(Lane::normalize("2"), Lane::B);
        assert_eq!(Lane::normalize("cam 2"), Lane::B);
        assert_eq!(Lane::normalize("CAM2"), Lane::B);
    }

    #[test]
    fn test_lane_normalize_uses_last_digit() {
        assert_eq!(Lane::normalize("Cam 12"), Lane::B);
        assert_eq!(Lane::normalize("camera 21"), Lane::A);
        assert_eq!(Lane::normalize("table_2_cam1"), Lane::A);
        assert_eq!(Lane::normalize("cam 3"), Lane::A);
    }

    #[test]
    fn test_lane_normalize_fallback() {
        assert_eq!(Lane::normalize("b"), Lane::B);
        assert_eq!(Lane::normalize(" B "), Lane::B);
        assert_eq!(Lane::normalize("A"), Lane::A);
        assert_eq!(Lane::normalize(""), Lane::A);
        assert_eq!(Lane::normalize("left camera"), Lane::A);
    }

    #[test]
    fn test_activity_status_db_round() {
        for status in [
            ActivityStatus::Running,
            ActivityStatus::Completed,
            ActivityStatus::CompletedWithOverride,
            ActivityStatus::ManuallyTerminated,
        ] {
            assert_eq!(ActivityStatus::from_db_str(status.to_db_str()), Some(status));
        }
        assert_eq!(ActivityStatus::from_db_str("in_progress"), None);
    }
}
