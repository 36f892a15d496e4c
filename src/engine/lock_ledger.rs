// ==========================================
// 装配工位套件追踪系统 - 通道锁定台账
// ==========================================
// 职责: 通道锁定判断 / 错误清除 / 解决日志生成
// 红线: 通道锁定当且仅当存在未解决错误
// 红线: 解决日志先于清除写入（由调用方按顺序持久化）
// ==========================================

use crate::domain::{
    Activity, ErrorDetail, ErrorKind, ErrorRecord, Lane, ResolutionLogEntry, SlotResolution,
    ValidationDetail,
};
use crate::engine::error::{StationError, StationResult};
use chrono::Utc;
use uuid::Uuid;

// ==========================================
// LockLedger - 锁定台账
// ==========================================
#[derive(Debug, Default)]
pub struct LockLedger;

impl LockLedger {
    pub fn new() -> Self {
        Self
    }

    pub fn is_locked(&self, activity: &Activity, lane: Lane) -> bool {
        activity.lane(lane).is_locked()
    }

    /// 通道锁定时拒绝
    pub fn ensure_unlocked(&self, activity: &Activity, lane: Lane) -> StationResult<()> {
        let lane_state = activity.lane(lane);
        if lane_state.is_locked() {
            return Err(StationError::LaneLocked {
                lane,
                unresolved: lane_state.errors.len(),
            });
        }
        Ok(())
    }

    /// 生成解决日志条目（不修改活动）
    ///
    /// # 规则
    /// - 每条未解决的错件记录生成一条日志
    /// - 提供校验明细时，额外生成一条校验类日志
    pub fn build_log_entries(
        &self,
        activity: &Activity,
        lane: Lane,
        reason: &str,
        validation: Option<&ValidationDetail>,
    ) -> Vec<ResolutionLogEntry> {
        let lane_state = activity.lane(lane);
        let resolved_at = Utc::now();

        let mut details: Vec<ErrorDetail> = lane_state
            .errors
            .iter()
            .map(|record| record.detail.clone())
            .collect();
        if let Some(detail) = validation {
            details.push(ErrorDetail::Validation(detail.clone()));
        }

        details
            .into_iter()
            .map(|detail| ResolutionLogEntry {
                log_id: Uuid::new_v4().to_string(),
                activity_id: activity.activity_id.clone(),
                workstation_id: activity.workstation_id.clone(),
                lane,
                kit_number: lane_state.kit_index,
                error_kind: detail.kind(),
                reason: reason.to_string(),
                detail,
                resolved_at,
            })
            .collect()
    }

    /// 清除通道全部未解决错误（解锁），返回带解决原因的已清除记录
    pub fn clear(&self, activity: &mut Activity, lane: Lane, reason: &str) -> Vec<ErrorRecord> {
        let lane_state = activity.lane_mut(lane);
        let cleared: Vec<ErrorRecord> = lane_state
            .errors
            .drain(..)
            .map(|mut record| {
                record.resolution_reason = Some(reason.to_string());
                record
            })
            .collect();
        activity.touch();
        cleared
    }

    /// 在缺件/少件槽位上标注人工放行
    ///
    /// 返回被标注的槽位数
    pub fn annotate_override(
        &self,
        activity: &mut Activity,
        lane: Lane,
        detail: &ValidationDetail,
        reason: &str,
    ) -> usize {
        let lane_state = activity.lane_mut(lane);
        let mut annotated = 0;
        for name in detail.implicated_slots() {
            if let Some(slot) = lane_state.slots.get_mut(name) {
                slot.resolution = Some(SlotResolution {
                    reason: reason.to_string(),
                    override_applied: true,
                });
                annotated += 1;
            }
        }
        annotated
    }
}

/// 解决动作的错误类型：提供校验明细即为校验类
pub fn resolve_kind(validation: Option<&ValidationDetail>) -> ErrorKind {
    match validation {
        Some(_) => ErrorKind::ValidationMismatch,
        None => ErrorKind::DetectionMismatch,
    }
}
