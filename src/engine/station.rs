// ==========================================
// 装配工位套件追踪系统 - 工位控制器
// ==========================================
// 职责: 作业启动 / 检测提交 / 校验 / 错误解决 / 人工终止 / 查询
// 流程: 工位锁 -> 读取运行活动 -> 修改工作副本 -> 持久化 -> 发布通知
// 红线: 持久化失败时内存与存储均保持原状态
// 红线: 通知只在持久化成功后发出，发布失败不回滚
// ==========================================

use crate::domain::{
    Activity, ActivityStatus, ArchiveStatus, DetectionEvent, ErrorKind, KitArchiveRecord, Lane,
    ResolutionLogEntry, ValidationDetail,
};
use crate::engine::completion::{CompletionEngine, CompletionPlan, CompletionRequest};
use crate::engine::error::{StationError, StationResult};
use crate::engine::events::{OptionalEventPublisher, StationEvent, StationEventKind};
use crate::engine::lock_ledger::{resolve_kind, LockLedger};
use crate::engine::matcher::{LaneMatcher, MatchResult};
use crate::engine::status_grid::{build_status_grid, StatusGrid};
use crate::engine::store::{ActivityStore, KitCatalog, TemplateLookup};
use crate::engine::validation::{ValidationEngine, ValidationReport};
use crate::engine::workstation_locks::WorkstationLocks;
use crate::repository::error::RepositoryError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// 单个作业默认允许的最大套件数
pub const DEFAULT_MAX_TOTAL_KITS: u32 = 10_000;

// ==========================================
// 请求 / 结果类型
// ==========================================

/// 作业启动请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJobRequest {
    pub workstation_id: String,
    pub kit_name: String,
    pub kit_code: String,
    pub order_reference: String,
    pub total_kits: u32,
}

/// 错误解决请求
///
/// 携带校验明细即为校验类解决（强制完成当前套件）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub lane: Lane,
    pub reason: String,
    pub validation: Option<ValidationDetail>,
}

/// 检测提交结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DetectionOutcome {
    Matched {
        lane: Lane,
        kit_number: u32,
        slot_name: String,
        found: u32,
        required: u32,
        slot_completed: bool,
    },
    WrongPart {
        lane: Lane,
        kit_number: u32,
        part_name: String,
        unresolved: usize,
    },
    LaneAlreadyComplete {
        lane: Lane,
        kit_index: u32,
        total_kits: u32,
    },
}

/// 套件完成摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitCompletionSummary {
    pub lane: Lane,
    pub kit_number: u32,
    pub archive_status: ArchiveStatus,
    pub override_applied: bool,
    pub job_completed: bool,
    pub job_status: ActivityStatus,
}

/// 校验结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Passed {
        report: ValidationReport,
        warnings: Vec<String>,
        completion: KitCompletionSummary,
    },
    Failed {
        report: ValidationReport,
    },
    LaneAlreadyComplete {
        lane: Lane,
        kit_index: u32,
        total_kits: u32,
    },
}

/// 错误解决结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub lane: Lane,
    pub kind: ErrorKind,
    pub cleared: usize,
    pub logged: usize,
    pub completion: Option<KitCompletionSummary>,
}

// ==========================================
// StationController - 工位控制器
// ==========================================
pub struct StationController {
    store: Arc<dyn ActivityStore>,
    catalog: Arc<dyn KitCatalog>,
    publisher: OptionalEventPublisher,
    locks: WorkstationLocks,
    matcher: LaneMatcher,
    ledger: LockLedger,
    validator: ValidationEngine,
    completion: CompletionEngine,
    max_total_kits: u32,
}

impl StationController {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        catalog: Arc<dyn KitCatalog>,
        publisher: OptionalEventPublisher,
    ) -> Self {
        Self {
            store,
            catalog,
            publisher,
            locks: WorkstationLocks::new(),
            matcher: LaneMatcher::new(),
            ledger: LockLedger::new(),
            validator: ValidationEngine::new(),
            completion: CompletionEngine::new(),
            max_total_kits: DEFAULT_MAX_TOTAL_KITS,
        }
    }

    /// 设置单个作业允许的最大套件数（至少为 1）
    pub fn with_max_total_kits(mut self, max_total_kits: u32) -> Self {
        self.max_total_kits = max_total_kits.max(1);
        self
    }

    pub fn max_total_kits(&self) -> u32 {
        self.max_total_kits
    }

    // ==========================================
    // 作业启动
    // ==========================================

    /// 在工位上启动新作业
    ///
    /// # 错误
    /// - `InvalidInput`: 必填字段为空，或 `total_kits` 不在 1..=上限 内
    /// - `WorkstationBusy`: 工位已有运行中的作业
    /// - `KitCodeMismatch` / `KitNameMismatch` / `KitTemplateNotFound`: 模板查找失败
    #[instrument(skip(self, request), fields(workstation_id = %request.workstation_id))]
    pub fn start_job(&self, request: StartJobRequest) -> StationResult<Activity> {
        let workstation_id = require_text("workstation_id", &request.workstation_id)?;
        let kit_name = require_text("kit_name", &request.kit_name)?;
        let kit_code = require_text("kit_code", &request.kit_code)?;
        if request.total_kits == 0 {
            return Err(StationError::InvalidInput("total_kits 必须大于 0".to_string()));
        }
        if request.total_kits > self.max_total_kits {
            return Err(StationError::InvalidInput(format!(
                "total_kits 不能超过 {}",
                self.max_total_kits
            )));
        }

        self.locks.with_lock(&workstation_id, || {
            if self.store.find_running_by_workstation(&workstation_id)?.is_some() {
                return Err(StationError::WorkstationBusy {
                    workstation_id: workstation_id.clone(),
                });
            }

            let template = match self.catalog.find_kit_template(&kit_name, &kit_code)? {
                TemplateLookup::Found(template) => template,
                TemplateLookup::CodeMismatch { kit_name } => {
                    return Err(StationError::KitCodeMismatch { kit_name })
                }
                TemplateLookup::NameMismatch { kit_code } => {
                    return Err(StationError::KitNameMismatch { kit_code })
                }
                TemplateLookup::NotFound => {
                    return Err(StationError::KitTemplateNotFound {
                        kit_name: kit_name.clone(),
                        kit_code: kit_code.clone(),
                    })
                }
            };
            if template.lines.is_empty() {
                return Err(StationError::InvalidInput(format!(
                    "套件模板 {} 没有任何 BOM 行",
                    template.template_id
                )));
            }

            let activity = Activity::from_template(
                Uuid::new_v4().to_string(),
                workstation_id.clone(),
                request.order_reference.trim().to_string(),
                &template,
                request.total_kits,
            );

            match self.store.insert_activity(&activity) {
                Ok(()) => {}
                Err(RepositoryError::UniqueConstraintViolation(_)) => {
                    return Err(StationError::WorkstationBusy {
                        workstation_id: workstation_id.clone(),
                    })
                }
                Err(e) => return Err(e.into()),
            }

            tracing::info!(
                "作业启动: workstation_id={}, activity_id={}, kit={}/{}, total_kits={}",
                workstation_id,
                activity.activity_id,
                activity.kit_name,
                activity.kit_code,
                activity.total_kits
            );

            self.emit(
                &activity,
                StationEventKind::JobStarted,
                json!({
                    "activity_id": activity.activity_id,
                    "kit_name": activity.kit_name,
                    "kit_code": activity.kit_code,
                    "order_reference": activity.order_reference,
                    "total_kits": activity.total_kits,
                }),
            );
            Ok(activity)
        })
    }

    // ==========================================
    // 检测提交
    // ==========================================

    /// 提交一次检测
    ///
    /// 检查顺序: 无运行作业 -> 通道锁定 -> 通道已完成
    #[instrument(skip(self, event), fields(lane = %event.lane, part = %event.part_name))]
    pub fn submit_detection(
        &self,
        workstation_id: &str,
        event: DetectionEvent,
    ) -> StationResult<DetectionOutcome> {
        let workstation_id = require_text("workstation_id", workstation_id)?;
        require_text("part_name", &event.part_name)?;

        self.locks.with_lock(&workstation_id, || {
            let mut activity = self.load_running(&workstation_id)?;
            let lane = event.lane;
            self.ledger.ensure_unlocked(&activity, lane)?;

            let kit_index = activity.lane(lane).kit_index;
            if kit_index > activity.total_kits {
                return Ok(DetectionOutcome::LaneAlreadyComplete {
                    lane,
                    kit_index,
                    total_kits: activity.total_kits,
                });
            }

            let result = self.matcher.apply(&mut activity, &event);
            activity.revision = self.store.update_activity(&activity)?;

            match result {
                MatchResult::Matched {
                    slot_name,
                    found,
                    required,
                    newly_completed,
                    ..
                } => {
                    tracing::debug!(
                        "零件匹配: activity_id={}, lane={}, slot={}, {}/{}",
                        activity.activity_id,
                        lane,
                        slot_name,
                        found,
                        required
                    );
                    self.emit(
                        &activity,
                        StationEventKind::PartMatched,
                        json!({
                            "activity_id": activity.activity_id,
                            "lane": lane.as_str(),
                            "kit_number": kit_index,
                            "part_name": slot_name,
                            "found": found,
                            "required": required,
                            "slot_completed": newly_completed,
                            "image_ref": event.image_ref,
                        }),
                    );
                    Ok(DetectionOutcome::Matched {
                        lane,
                        kit_number: kit_index,
                        slot_name,
                        found,
                        required,
                        slot_completed: newly_completed,
                    })
                }
                MatchResult::Mismatch { unresolved } => {
                    tracing::warn!(
                        "错件: activity_id={}, lane={}, part={}, 未解决错误={}",
                        activity.activity_id,
                        lane,
                        event.part_name,
                        unresolved
                    );
                    self.emit(
                        &activity,
                        StationEventKind::WrongPart,
                        json!({
                            "activity_id": activity.activity_id,
                            "lane": lane.as_str(),
                            "kit_number": kit_index,
                            "part_name": event.part_name,
                            "confidence": event.confidence,
                            "image_ref": event.image_ref,
                            "unresolved": unresolved,
                        }),
                    );
                    Ok(DetectionOutcome::WrongPart {
                        lane,
                        kit_number: kit_index,
                        part_name: event.part_name.clone(),
                        unresolved,
                    })
                }
            }
        })
    }

    // ==========================================
    // 校验
    // ==========================================

    /// 操作员请求校验通道当前套件
    ///
    /// 失败时不修改任何状态，也不锁定通道
    #[instrument(skip(self, proof_image_ref))]
    pub fn submit_validation(
        &self,
        workstation_id: &str,
        lane: Lane,
        proof_image_ref: Option<String>,
    ) -> StationResult<ValidationOutcome> {
        let workstation_id = require_text("workstation_id", workstation_id)?;

        self.locks.with_lock(&workstation_id, || {
            let mut activity = self.load_running(&workstation_id)?;
            self.ledger.ensure_unlocked(&activity, lane)?;

            let lane_state = activity.lane(lane);
            if lane_state.is_done(activity.total_kits) {
                return Ok(ValidationOutcome::LaneAlreadyComplete {
                    lane,
                    kit_index: lane_state.kit_index,
                    total_kits: activity.total_kits,
                });
            }

            let report = self.validator.evaluate(lane_state);
            if !report.is_pass() {
                tracing::info!(
                    "校验失败: activity_id={}, lane={}, kit={}, missing={:?}, undercount={:?}",
                    activity.activity_id,
                    lane,
                    report.kit_number,
                    report.detail.missing,
                    report.detail.undercount
                );
                self.emit(
                    &activity,
                    StationEventKind::ValidationFailed,
                    json!({
                        "activity_id": activity.activity_id,
                        "lane": lane.as_str(),
                        "kit_number": report.kit_number,
                        "missing": report.detail.missing,
                        "undercount": report.detail.undercount,
                        "overcount": report.detail.overcount,
                        "summaries": report.summaries,
                    }),
                );
                return Ok(ValidationOutcome::Failed { report });
            }

            let warnings = report.warnings();
            let request = CompletionRequest {
                warning: report.has_warnings(),
                proof_image_ref,
                override_applied: false,
                resolved_errors: Vec::new(),
            };
            let completion = self.complete_kit(&mut activity, lane, request, &[], None)?;

            Ok(ValidationOutcome::Passed {
                report,
                warnings,
                completion,
            })
        })
    }

    // ==========================================
    // 错误解决
    // ==========================================

    /// 解决通道错误
    ///
    /// # 步骤
    /// 1. 生成解决日志
    /// 2. 清除通道错误（解锁）
    /// 3. 校验类: 标注人工放行并强制完成当前套件
    /// 4. 解决日志与活动文档（及归档）一次提交
    /// 5. 发布解锁通知（以及完成通知）
    #[instrument(skip(self, request), fields(lane = %request.lane))]
    pub fn resolve_error(
        &self,
        workstation_id: &str,
        request: ResolveRequest,
    ) -> StationResult<ResolveOutcome> {
        let workstation_id = require_text("workstation_id", workstation_id)?;
        let reason = require_text("reason", &request.reason)?;
        let lane = request.lane;
        let kind = resolve_kind(request.validation.as_ref());

        self.locks.with_lock(&workstation_id, || {
            let mut activity = self.load_running(&workstation_id)?;
            let lane_state = activity.lane(lane);

            match &request.validation {
                None if !lane_state.is_locked() => {
                    return Err(StationError::NothingToResolve { lane });
                }
                Some(_) if lane_state.is_done(activity.total_kits) => {
                    return Err(StationError::LaneAlreadyComplete {
                        lane,
                        kit_index: lane_state.kit_index,
                        total_kits: activity.total_kits,
                    });
                }
                _ => {}
            }

            // 解决日志与状态变更在同一事务中写入
            let entries =
                self.ledger
                    .build_log_entries(&activity, lane, &reason, request.validation.as_ref());
            let cleared = self.ledger.clear(&mut activity, lane, &reason).len();

            let unlocked = lane_unlocked_payload(&activity, lane, kind, &reason, cleared);
            let completion = match &request.validation {
                Some(detail) => {
                    self.ledger
                        .annotate_override(&mut activity, lane, detail, &reason);
                    let request = CompletionRequest {
                        warning: true,
                        proof_image_ref: None,
                        override_applied: true,
                        resolved_errors: Vec::new(),
                    };
                    Some(self.complete_kit(
                        &mut activity,
                        lane,
                        request,
                        &entries,
                        Some(unlocked),
                    )?)
                }
                None => {
                    activity.revision = self.store.commit_resolution(&activity, &entries)?;
                    self.emit(&activity, StationEventKind::LaneUnlocked, unlocked);
                    None
                }
            };

            tracing::info!(
                "错误已解决: activity_id={}, lane={}, kind={}, cleared={}, reason={}",
                activity.activity_id,
                lane,
                kind,
                cleared,
                reason
            );

            Ok(ResolveOutcome {
                lane,
                kind,
                cleared,
                logged: entries.len(),
                completion,
            })
        })
    }

    // ==========================================
    // 人工终止
    // ==========================================

    /// 人工终止工位上运行中的作业
    #[instrument(skip(self))]
    pub fn manual_terminate(&self, workstation_id: &str) -> StationResult<Activity> {
        let workstation_id = require_text("workstation_id", workstation_id)?;

        self.locks.with_lock(&workstation_id, || {
            let mut activity = self.load_running(&workstation_id)?;
            let now = Utc::now();
            activity.status = ActivityStatus::ManuallyTerminated;
            activity.finished_at = Some(now);
            activity.updated_at = now;
            activity.revision = self.store.update_activity(&activity)?;

            tracing::warn!(
                "作业被人工终止: workstation_id={}, activity_id={}",
                workstation_id,
                activity.activity_id
            );
            self.emit(
                &activity,
                StationEventKind::JobTerminated,
                json!({
                    "activity_id": activity.activity_id,
                    "lane_a_kit_index": activity.lane_a.kit_index,
                    "lane_b_kit_index": activity.lane_b.kit_index,
                }),
            );
            Ok(activity)
        })
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 工位当前运行中的活动
    pub fn current_state(&self, workstation_id: &str) -> StationResult<Option<Activity>> {
        Ok(self.store.find_running_by_workstation(workstation_id)?)
    }

    pub fn get_activity(&self, activity_id: &str) -> StationResult<Activity> {
        self.store
            .find_activity(activity_id)?
            .ok_or_else(|| StationError::ActivityNotFound(activity_id.to_string()))
    }

    /// 单个套件归档详情
    pub fn archive_detail(
        &self,
        activity_id: &str,
        lane: Lane,
        kit_number: u32,
    ) -> StationResult<KitArchiveRecord> {
        self.store
            .find_archive(activity_id, lane, kit_number)?
            .ok_or_else(|| StationError::ArchiveNotFound {
                activity_id: activity_id.to_string(),
                lane,
                kit_number,
            })
    }

    pub fn list_archives(&self, activity_id: &str) -> StationResult<Vec<KitArchiveRecord>> {
        Ok(self.store.list_archives(activity_id)?)
    }

    /// 活动的套件状态网格
    pub fn status_grid(&self, activity_id: &str) -> StationResult<StatusGrid> {
        let activity = self.get_activity(activity_id)?;
        let archives = self.store.list_archives(activity_id)?;
        Ok(build_status_grid(&activity, &archives))
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn load_running(&self, workstation_id: &str) -> StationResult<Activity> {
        self.store
            .find_running_by_workstation(workstation_id)?
            .ok_or_else(|| StationError::NoActiveJob {
                workstation_id: workstation_id.to_string(),
            })
    }

    /// 完成当前套件并原子提交
    ///
    /// `pending` 为本次新生成、尚未落库的解决日志，与归档同事务写入
    ///
    /// 提交成功后依次发布: 解锁（如有）/ 套件完成 / 作业完成
    fn complete_kit(
        &self,
        activity: &mut Activity,
        lane: Lane,
        mut request: CompletionRequest,
        pending: &[ResolutionLogEntry],
        unlocked: Option<JsonValue>,
    ) -> StationResult<KitCompletionSummary> {
        // 本套件周期内的全部解决日志随归档一起保存
        let mut resolved_errors = self.store.list_resolution_logs(
            &activity.activity_id,
            lane,
            activity.lane(lane).kit_index,
        )?;
        resolved_errors.extend_from_slice(pending);
        request.resolved_errors = resolved_errors;

        let mut working = activity.clone();
        let CompletionPlan {
            archive,
            kit_number,
            job_completed,
        } = self.completion.complete(&mut working, lane, request);
        working.revision = self.store.commit_kit_completion(&archive, &working, pending)?;
        *activity = working;

        let summary = KitCompletionSummary {
            lane,
            kit_number,
            archive_status: archive.status,
            override_applied: archive.override_applied,
            job_completed,
            job_status: activity.status,
        };

        if let Some(payload) = unlocked {
            self.emit(activity, StationEventKind::LaneUnlocked, payload);
        }

        let kit_kind = match archive.status {
            ArchiveStatus::Completed => StationEventKind::KitCompleted,
            ArchiveStatus::CompletedWithWarning => StationEventKind::KitCompletedWithWarning,
        };
        self.emit(
            activity,
            kit_kind,
            json!({
                "activity_id": activity.activity_id,
                "lane": lane.as_str(),
                "kit_number": kit_number,
                "status": archive.status.as_str(),
                "override_applied": archive.override_applied,
                "proof_image_ref": archive.proof_image_ref,
                "next_kit_index": activity.lane(lane).kit_index,
            }),
        );

        tracing::info!(
            "套件归档: activity_id={}, lane={}, kit_number={}, status={}",
            activity.activity_id,
            lane,
            kit_number,
            archive.status.as_str()
        );

        if job_completed {
            tracing::info!(
                "作业完成: activity_id={}, status={}",
                activity.activity_id,
                activity.status
            );
            self.emit(
                activity,
                StationEventKind::JobCompleted,
                json!({
                    "activity_id": activity.activity_id,
                    "status": activity.status.to_db_str(),
                    "total_kits": activity.total_kits,
                }),
            );
        }

        Ok(summary)
    }

    fn emit(&self, activity: &Activity, kind: StationEventKind, payload: JsonValue) {
        self.publisher
            .publish(StationEvent::new(&activity.workstation_id, kind, payload));
    }
}

fn lane_unlocked_payload(
    activity: &Activity,
    lane: Lane,
    kind: ErrorKind,
    reason: &str,
    cleared: usize,
) -> JsonValue {
    json!({
        "activity_id": activity.activity_id,
        "lane": lane.as_str(),
        "kit_number": activity.lane(lane).kit_index,
        "kind": kind.as_str(),
        "reason": reason,
        "cleared": cleared,
    })
}

/// 必填文本字段（去除首尾空白）
fn require_text(field: &str, value: &str) -> StationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StationError::InvalidInput(format!("{} 不能为空", field)));
    }
    Ok(trimmed.to_string())
}
