// ==========================================
// 装配工位套件追踪系统 - 套件校验引擎
// ==========================================
// 职责: 操作员在一个通道上请求校验时，判定当前套件能否完成
// 输入: 通道运行态
// 输出: 校验报告（缺件/少件/多件 + 每槽位汇总）
// 规则: 每个槽位至多归入一类；告警开关关闭时不归类
// 判定: 缺件或少件 = 失败；仅多件 = 通过（带告警）
// ==========================================

use crate::domain::{BomSlot, Lane, LaneState, ValidationDetail};
use serde::{Deserialize, Serialize};

/// 槽位校验汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub name: String,
    pub expected: u32,
    pub found: u32,
    pub avg_confidence: Option<f64>,
    pub capture_count: usize,
}

impl SlotSummary {
    fn from_slot(slot: &BomSlot) -> Self {
        Self {
            name: slot.name.clone(),
            expected: slot.required_qty,
            found: slot.found_qty,
            avg_confidence: slot.average_confidence(),
            capture_count: slot.captures.len(),
        }
    }
}

/// 校验报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub lane: Lane,
    pub kit_number: u32,
    pub detail: ValidationDetail,
    pub summaries: Vec<SlotSummary>,
}

impl ValidationReport {
    /// 无缺件、无少件
    pub fn is_pass(&self) -> bool {
        self.detail.missing.is_empty() && self.detail.undercount.is_empty()
    }

    /// 通过但存在多件
    pub fn has_warnings(&self) -> bool {
        !self.detail.overcount.is_empty()
    }

    /// 告警文本（多件）
    pub fn warnings(&self) -> Vec<String> {
        self.detail
            .overcount
            .iter()
            .filter_map(|name| self.summaries.iter().find(|s| &s.name == name))
            .map(|s| format!("{}: 需求 {}，实际 {}", s.name, s.expected, s.found))
            .collect()
    }
}

// ==========================================
// ValidationEngine - 校验引擎
// ==========================================
#[derive(Debug, Default)]
pub struct ValidationEngine;

impl ValidationEngine {
    pub fn new() -> Self {
        Self
    }

    /// 评估通道当前套件
    pub fn evaluate(&self, lane_state: &LaneState) -> ValidationReport {
        let mut detail = ValidationDetail::default();
        let mut summaries = Vec::with_capacity(lane_state.slots.len());

        for slot in lane_state.slots.values() {
            summaries.push(SlotSummary::from_slot(slot));

            if slot.found_qty == 0 && slot.required_qty > 0 {
                if slot.alerts.on_missing {
                    detail.missing.push(slot.name.clone());
                }
            } else if slot.found_qty < slot.required_qty {
                if slot.alerts.on_undercount {
                    detail.undercount.push(slot.name.clone());
                }
            } else if slot.found_qty > slot.required_qty && slot.alerts.on_overcount {
                detail.overcount.push(slot.name.clone());
            }
        }

        ValidationReport {
            lane: lane_state.lane,
            kit_number: lane_state.kit_index,
            detail,
            summaries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Activity, AlertFlags, BomLine, KitTemplate};

    fn lane_with(lines: Vec<(&str, u32, u32, AlertFlags)>) -> LaneState {
        let template = KitTemplate {
            template_id: "T".into(),
            kit_name: "K".into(),
            kit_code: "C".into(),
            lines: lines
                .iter()
                .map(|(name, required, _, alerts)| BomLine {
                    name: name.to_string(),
                    lane: Lane::A,
                    required_qty: *required,
                    alerts: *alerts,
                })
                .collect(),
        };
        let mut activity = Activity::from_template("A".into(), "1".into(), "PO".into(), &template, 1);
        for (name, _, found, _) in &lines {
            if let Some(slot) = activity.lane_a.slots.get_mut(*name) {
                slot.found_qty = *found;
            }
        }
        activity.lane_a
    }

    #[test]
    fn test_classification_is_exclusive() {
        let all = AlertFlags::default();
        let lane = lane_with(vec![
            ("缺件", 2, 0, all),
            ("少件", 3, 1, all),
            ("多件", 1, 2, all),
            ("正好", 2, 2, all),
        ]);
        let report = ValidationEngine::new().evaluate(&lane);

        assert_eq!(report.detail.missing, vec!["缺件"]);
        assert_eq!(report.detail.undercount, vec!["少件"]);
        assert_eq!(report.detail.overcount, vec!["多件"]);
        assert!(!report.is_pass());
        assert_eq!(report.summaries.len(), 4);
        assert_eq!(report.kit_number, 1);
    }

    #[test]
    fn test_overcount_only_passes_with_warning() {
        let lane = lane_with(vec![("螺栓", 1, 3, AlertFlags::default())]);
        let report = ValidationEngine::new().evaluate(&lane);

        assert!(report.is_pass());
        assert!(report.has_warnings());
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn test_disabled_alert_suppresses_classification() {
        let quiet = AlertFlags {
            on_missing: false,
            on_undercount: false,
            on_overcount: false,
        };
        let lane = lane_with(vec![("可选件", 2, 0, quiet), ("垫圈", 4, 1, quiet)]);
        let report = ValidationEngine::new().evaluate(&lane);

        assert!(report.is_pass());
        assert!(!report.has_warnings());
    }
}
