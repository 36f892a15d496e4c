// ==========================================
// 装配工位套件追踪系统 - 套件完成引擎
// ==========================================
// 职责: 归档当前套件、推进通道序号、判定作业是否完成
// 输入: 活动（调用方的工作副本）+ 完成请求
// 输出: 完成计划（归档记录 + 作业完成标志）
// 红线: 仅修改工作副本；归档与活动更新由存储层在同一事务提交
// ==========================================

use crate::domain::{
    Activity, ActivityStatus, ArchiveStatus, KitArchiveRecord, Lane, ResolutionLogEntry,
};
use chrono::Utc;
use uuid::Uuid;

/// 完成请求
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub warning: bool,
    pub proof_image_ref: Option<String>,
    pub override_applied: bool,
    /// 当前套件周期内已写入的解决日志
    pub resolved_errors: Vec<ResolutionLogEntry>,
}

/// 完成计划
#[derive(Debug, Clone)]
pub struct CompletionPlan {
    pub archive: KitArchiveRecord,
    pub kit_number: u32,
    pub job_completed: bool,
}

// ==========================================
// CompletionEngine - 套件完成引擎
// ==========================================
#[derive(Debug, Default)]
pub struct CompletionEngine;

impl CompletionEngine {
    pub fn new() -> Self {
        Self
    }

    /// 完成通道当前套件
    ///
    /// # 步骤
    /// 1. 快照槽位生成归档记录，追加到活动历史
    /// 2. 仍有后续套件时重置槽位
    /// 3. 推进套件序号，清空错误与最近匹配
    /// 4. 两条通道都完成时结束作业
    pub fn complete(
        &self,
        activity: &mut Activity,
        lane: Lane,
        request: CompletionRequest,
    ) -> CompletionPlan {
        let now = Utc::now();
        let total_kits = activity.total_kits;
        let workstation_id = activity.workstation_id.clone();
        let activity_id = activity.activity_id.clone();

        let lane_state = activity.lane_mut(lane);
        let kit_number = lane_state.kit_index;

        let archive = KitArchiveRecord {
            archive_id: Uuid::new_v4().to_string(),
            workstation_id,
            activity_id,
            lane,
            kit_number,
            completed_at: now,
            slots: lane_state.slots.values().cloned().collect(),
            resolved_errors: request.resolved_errors,
            status: if request.warning {
                ArchiveStatus::CompletedWithWarning
            } else {
                ArchiveStatus::Completed
            },
            proof_image_ref: request.proof_image_ref,
            override_applied: request.override_applied,
        };

        let next_index = kit_number + 1;
        if next_index <= total_kits {
            for slot in lane_state.slots.values_mut() {
                slot.reset_for_next_kit();
            }
        }
        lane_state.kit_index = next_index;
        lane_state.errors.clear();
        lane_state.last_matched = None;

        activity.history.push(archive.clone());

        let job_completed = activity.all_lanes_done();
        if job_completed {
            activity.status = if activity.has_override_history() {
                ActivityStatus::CompletedWithOverride
            } else {
                ActivityStatus::Completed
            };
            activity.finished_at = Some(now);
        }
        activity.updated_at = now;

        tracing::debug!(
            "套件完成: activity_id={}, lane={}, kit_number={}, job_completed={}",
            archive.activity_id,
            lane,
            kit_number,
            job_completed
        );

        CompletionPlan {
            archive,
            kit_number,
            job_completed,
        }
    }
}
