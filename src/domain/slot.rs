// ==========================================
// 装配工位套件追踪系统 - BOM 槽位模型
// ==========================================
// 职责: 一个通道上一个必需零件的运行态
// 红线: 纯数据 + 派生谓词，无副作用
// ==========================================

use crate::domain::kit_template::{AlertFlags, BomLine};
use crate::domain::types::{Lane, SlotStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// CaptureRecord - 抓拍记录
// ==========================================
/// 当前套件周期内匹配到本槽位的一次检测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub image_ref: Option<String>,   // 图片引用（上传失败时为 None）
    pub raw_label: String,           // 分类器原始标签
    pub confidence: f64,             // 置信度
    pub tracking_id: Option<String>, // 跟踪ID
    pub captured_at: DateTime<Utc>,  // 抓拍时间
}

// ==========================================
// SlotResolution - 人工放行注记
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotResolution {
    pub reason: String,        // 操作员选择的放行原因
    pub override_applied: bool, // 是否为人工强制放行
}

// ==========================================
// BomSlot - BOM 槽位
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomSlot {
    pub name: String,
    pub lane: Lane,
    pub required_qty: u32,
    pub found_qty: u32,                      // 套件边界归零
    pub status: SlotStatus,
    pub alerts: AlertFlags,
    pub sequence_order: Option<u32>,         // 本套件周期内首次齐套的顺序
    pub resolution: Option<SlotResolution>,
    pub captures: Vec<CaptureRecord>,
}

impl BomSlot {
    /// 由 BOM 行创建初始槽位
    pub fn from_line(line: &BomLine) -> Self {
        Self {
            name: line.name.clone(),
            lane: line.lane,
            required_qty: line.required_qty,
            found_qty: 0,
            status: SlotStatus::Pending,
            alerts: line.alerts,
            sequence_order: None,
            resolution: None,
            captures: Vec::new(),
        }
    }

    /// 仍未齐套 (found < required)
    pub fn is_hungry(&self) -> bool {
        self.found_qty < self.required_qty
    }

    /// 名称匹配即可作为多件目标（不看已找到数量）
    pub fn is_overcount_target(&self, part_name: &str) -> bool {
        self.name == part_name
    }

    pub fn is_completed(&self) -> bool {
        self.status == SlotStatus::Completed
    }

    /// 数量是否精确匹配
    pub fn is_exact(&self) -> bool {
        self.found_qty == self.required_qty
    }

    /// 当前周期内所有抓拍的平均置信度
    pub fn average_confidence(&self) -> Option<f64> {
        if self.captures.is_empty() {
            return None;
        }
        let sum: f64 = self.captures.iter().map(|c| c.confidence).sum();
        Some(sum / self.captures.len() as f64)
    }

    /// 为下一个套件周期重置
    pub fn reset_for_next_kit(&mut self) {
        self.found_qty = 0;
        self.status = SlotStatus::Pending;
        self.sequence_order = None;
        self.resolution = None;
        self.captures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(required: u32, found: u32) -> BomSlot {
        let mut slot = BomSlot::from_line(&BomLine {
            name: "M6 螺栓".to_string(),
            lane: Lane::A,
            required_qty: required,
            alerts: AlertFlags::default(),
        });
        slot.found_qty = found;
        slot
    }

    #[test]
    fn test_hungry_predicate() {
        assert!(slot(2, 0).is_hungry());
        assert!(slot(2, 1).is_hungry());
        assert!(!slot(2, 2).is_hungry());
        assert!(!slot(2, 3).is_hungry());
    }

    #[test]
    fn test_overcount_target_ignores_found() {
        let full = slot(1, 5);
        assert!(full.is_overcount_target("M6 螺栓"));
        assert!(!full.is_overcount_target("M8 螺栓"));
    }

    #[test]
    fn test_reset_clears_cycle_state() {
        let mut s = slot(1, 1);
        s.status = SlotStatus::Completed;
        s.sequence_order = Some(1);
        s.resolution = Some(SlotResolution {
            reason: "缺料".to_string(),
            override_applied: true,
        });
        s.captures.push(CaptureRecord {
            image_ref: None,
            raw_label: "bolt_m6".to_string(),
            confidence: 0.9,
            tracking_id: None,
            captured_at: Utc::now(),
        });

        s.reset_for_next_kit();

        assert_eq!(s.found_qty, 0);
        assert_eq!(s.status, SlotStatus::Pending);
        assert!(s.sequence_order.is_none());
        assert!(s.resolution.is_none());
        assert!(s.captures.is_empty());
        assert_eq!(s.required_qty, 1);
    }
}
