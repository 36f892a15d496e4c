// ==========================================
// 装配工位套件追踪系统 - 相机通道匹配器
// ==========================================
// 职责: 为一次检测事件选择所满足的槽位，并更新计数
// 输入: 检测事件 + 活动（已通过锁定/完成检查）
// 输出: 匹配结果（匹配 / 错件）
// 红线: 错件是唯一会锁定通道的动作
// ==========================================

use crate::domain::{
    Activity, CaptureRecord, DetectionEvent, ErrorRecord, LaneState, SlotStatus,
};
use chrono::Utc;

/// 单次检测的匹配结果
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// 命中槽位
    Matched {
        slot_name: String,
        slot_index: usize,
        found: u32,
        required: u32,
        /// 本次检测是否使槽位首次齐套
        newly_completed: bool,
        sequence_order: Option<u32>,
    },
    /// 通道上没有同名槽位，已追加错误记录
    Mismatch { unresolved: usize },
}

// ==========================================
// LaneMatcher - 通道匹配器
// ==========================================
/// 无状态匹配器
#[derive(Debug, Default)]
pub struct LaneMatcher;

impl LaneMatcher {
    pub fn new() -> Self {
        Self
    }

    /// 选择槽位（只读）
    ///
    /// # 规则
    /// - 第一轮: 同名且仍缺数的槽位
    /// - 第二轮: 同名槽位（不看缺数），多出的合法零件登记为多件而不是丢弃
    /// - 槽位按名称唯一，两轮命中的是同一个槽位
    pub fn select_slot(&self, lane_state: &LaneState, part_name: &str) -> Option<usize> {
        let (index, _, slot) = lane_state.slots.get_full(part_name)?;
        if slot.is_hungry() || slot.is_overcount_target(part_name) {
            return Some(index);
        }
        None
    }

    /// 对活动应用一次检测
    ///
    /// 调用方需先确认通道未锁定且未完成
    pub fn apply(&self, activity: &mut Activity, event: &DetectionEvent) -> MatchResult {
        let lane_state = activity.lane_mut(event.lane);

        let Some(index) = self.select_slot(lane_state, &event.part_name) else {
            lane_state
                .errors
                .push(ErrorRecord::detection_mismatch(event.clone()));
            let unresolved = lane_state.errors.len();
            activity.touch();
            return MatchResult::Mismatch { unresolved };
        };

        let already_completed = lane_state.completed_slot_count() as u32;
        let Some((_, slot)) = lane_state.slots.get_index_mut(index) else {
            return MatchResult::Mismatch {
                unresolved: lane_state.errors.len(),
            };
        };

        slot.found_qty += 1;
        slot.captures.push(CaptureRecord {
            image_ref: event.image_ref.clone(),
            raw_label: event.raw_label.clone(),
            confidence: event.confidence,
            tracking_id: event.tracking_id.clone(),
            captured_at: Utc::now(),
        });

        let mut newly_completed = false;
        if slot.found_qty >= slot.required_qty && slot.status != SlotStatus::Completed {
            slot.status = SlotStatus::Completed;
            newly_completed = true;
            // 顺序号按检测处理顺序分配，而不是槽位声明顺序
            if slot.sequence_order.is_none() {
                slot.sequence_order = Some(already_completed + 1);
            }
        }

        let result = MatchResult::Matched {
            slot_name: slot.name.clone(),
            slot_index: index,
            found: slot.found_qty,
            required: slot.required_qty,
            newly_completed,
            sequence_order: slot.sequence_order,
        };

        lane_state.last_matched = Some(index);
        activity.touch();
        result
    }
}
