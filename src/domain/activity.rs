// ==========================================
// 装配工位套件追踪系统 - 活动聚合根
// ==========================================
// 职责: 一个工位上一次运行中的作业
// 结构: 两条独立相机通道，每条通道持有按名称索引的有序槽位表
// 红线: 通道套件序号只增不减（从 1 开始）
// ==========================================

use crate::domain::archive::KitArchiveRecord;
use crate::domain::error_record::ErrorRecord;
use crate::domain::kit_template::KitTemplate;
use crate::domain::slot::BomSlot;
use crate::domain::types::{ActivityStatus, Lane};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 第一个套件的序号
pub const FIRST_KIT_NUMBER: u32 = 1;

// ==========================================
// LaneState - 单条相机通道的运行态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneState {
    pub lane: Lane,
    pub kit_index: u32,                   // 当前套件序号
    pub errors: Vec<ErrorRecord>,         // 未解决错误（空 = 未锁定）
    pub last_matched: Option<usize>,      // 最近匹配的槽位下标
    pub slots: IndexMap<String, BomSlot>, // 按 BOM 定义顺序
}

impl LaneState {
    fn new(lane: Lane) -> Self {
        Self {
            lane,
            kit_index: FIRST_KIT_NUMBER,
            errors: Vec::new(),
            last_matched: None,
            slots: IndexMap::new(),
        }
    }

    /// 通道是否被未解决错误锁定
    pub fn is_locked(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 通道是否已完成全部分配的套件（或本作业在该通道上没有任何槽位）
    pub fn is_done(&self, total_kits: u32) -> bool {
        self.kit_index > total_kits || self.slots.is_empty()
    }

    /// 已齐套槽位数
    pub fn completed_slot_count(&self) -> usize {
        self.slots.values().filter(|s| s.is_completed()).count()
    }
}

// ==========================================
// Activity - 活动
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    // ===== 标识 =====
    pub activity_id: String,
    pub workstation_id: String,
    pub order_reference: String,
    pub kit_template_id: String,
    pub kit_name: String,
    pub kit_code: String,

    // ===== 生命周期 =====
    pub status: ActivityStatus,
    pub total_kits: u32,

    // ===== 相机通道 =====
    pub lane_a: LaneState,
    pub lane_b: LaneState,

    // ===== 归档历史（只追加）=====
    pub history: Vec<KitArchiveRecord>,

    // ===== 审计 =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub revision: i64, // 乐观锁版本
}

impl Activity {
    /// 由套件模板实例化活动，两条通道均从第 1 套开始，全部槽位待齐套
    ///
    /// 同一通道上同名的 BOM 行合并为一个槽位（数量求和，告警开关取并集）
    pub fn from_template(
        activity_id: String,
        workstation_id: String,
        order_reference: String,
        template: &KitTemplate,
        total_kits: u32,
    ) -> Self {
        let now = Utc::now();
        let mut lane_a = LaneState::new(Lane::A);
        let mut lane_b = LaneState::new(Lane::B);

        for line in &template.lines {
            let lane_state = match line.lane {
                Lane::A => &mut lane_a,
                Lane::B => &mut lane_b,
            };
            match lane_state.slots.get_mut(&line.name) {
                Some(existing) => {
                    existing.required_qty += line.required_qty;
                    existing.alerts = existing.alerts.union(line.alerts);
                }
                None => {
                    lane_state
                        .slots
                        .insert(line.name.clone(), BomSlot::from_line(line));
                }
            }
        }

        Self {
            activity_id,
            workstation_id,
            order_reference,
            kit_template_id: template.template_id.clone(),
            kit_name: template.kit_name.clone(),
            kit_code: template.kit_code.clone(),
            status: ActivityStatus::Running,
            total_kits,
            lane_a,
            lane_b,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            finished_at: None,
            revision: 0,
        }
    }

    pub fn lane(&self, lane: Lane) -> &LaneState {
        match lane {
            Lane::A => &self.lane_a,
            Lane::B => &self.lane_b,
        }
    }

    pub fn lane_mut(&mut self, lane: Lane) -> &mut LaneState {
        match lane {
            Lane::A => &mut self.lane_a,
            Lane::B => &mut self.lane_b,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// 两条通道均已完成
    pub fn all_lanes_done(&self) -> bool {
        Lane::ALL
            .iter()
            .all(|lane| self.lane(*lane).is_done(self.total_kits))
    }

    /// 历史中是否存在人工强制放行的套件
    pub fn has_override_history(&self) -> bool {
        self.history.iter().any(|record| record.override_applied)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kit_template::{AlertFlags, BomLine};

    fn line(name: &str, lane: Lane, qty: u32, alerts: AlertFlags) -> BomLine {
        BomLine {
            name: name.to_string(),
            lane,
            required_qty: qty,
            alerts,
        }
    }

    #[test]
    fn test_from_template_splits_lanes_and_starts_at_one() {
        let template = KitTemplate {
            template_id: "T1".to_string(),
            kit_name: "刹车套件".to_string(),
            kit_code: "EDP-100".to_string(),
            lines: vec![
                line("卡钳", Lane::A, 1, AlertFlags::default()),
                line("刹车片", Lane::B, 4, AlertFlags::default()),
                line("螺栓", Lane::A, 2, AlertFlags::default()),
            ],
        };

        let activity = Activity::from_template(
            "ACT1".to_string(),
            "1".to_string(),
            "PO-1".to_string(),
            &template,
            3,
        );

        assert_eq!(activity.status, ActivityStatus::Running);
        assert_eq!(activity.lane_a.kit_index, 1);
        assert_eq!(activity.lane_b.kit_index, 1);
        let names: Vec<&String> = activity.lane_a.slots.keys().collect();
        assert_eq!(names, vec!["卡钳", "螺栓"]);
        assert_eq!(activity.lane_b.slots.len(), 1);
        assert!(!activity.all_lanes_done());
    }

    #[test]
    fn test_duplicate_lines_are_merged() {
        let quiet = AlertFlags {
            on_missing: false,
            on_undercount: false,
            on_overcount: false,
        };
        let template = KitTemplate {
            template_id: "T2".to_string(),
            kit_name: "K".to_string(),
            kit_code: "C".to_string(),
            lines: vec![
                line("螺栓", Lane::A, 2, quiet),
                line("螺栓", Lane::A, 3, AlertFlags::default()),
            ],
        };

        let activity =
            Activity::from_template("A".into(), "1".into(), "PO".into(), &template, 1);
        let slot = &activity.lane_a.slots["螺栓"];
        assert_eq!(slot.required_qty, 5);
        assert!(slot.alerts.on_missing);
    }

    #[test]
    fn test_lane_without_slots_counts_as_done() {
        let template = KitTemplate {
            template_id: "T3".to_string(),
            kit_name: "K".to_string(),
            kit_code: "C".to_string(),
            lines: vec![line("螺栓", Lane::A, 1, AlertFlags::default())],
        };
        let activity =
            Activity::from_template("A".into(), "1".into(), "PO".into(), &template, 2);
        assert!(activity.lane_b.is_done(activity.total_kits));
        assert!(!activity.lane_a.is_done(activity.total_kits));
    }
}
