// ==========================================
// 装配工位套件追踪系统 - 工位 API
// ==========================================
// 职责: 面向 HTTP/Socket 层的薄门面
// - 接收原始字符串（相机标签、图片字节）并做输入校验
// - 通道归一化、抓拍图片上传（带超时，失败降级为无图片）
// - 调用工位控制器，把结果映射为稳定的响应 code
// ==========================================

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::blob_store::{put_with_timeout, BlobStore};
use crate::domain::{Activity, DetectionEvent, KitArchiveRecord, Lane, ValidationDetail};
use crate::engine::{
    DetectionOutcome, ResolveOutcome, ResolveRequest, StartJobRequest, StationController,
    StatusGrid, ValidationOutcome,
};

// ==========================================
// 请求 DTO
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJobInput {
    pub workstation_id: String,
    pub kit_name: String,
    pub kit_code: String,
    pub order_reference: String,
    pub total_kits: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionInput {
    pub workstation_id: String,
    pub camera: String,
    pub part_name: String,
    pub raw_label: Option<String>,
    pub confidence: f64,
    pub tracking_id: Option<String>,
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationInput {
    pub workstation_id: String,
    pub camera: String,
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveInput {
    pub workstation_id: String,
    pub camera: String,
    pub reason: String,
    pub validation: Option<ValidationDetail>,
}

// ==========================================
// 响应
// ==========================================

/// 统一响应: code + 可读消息 + 数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationResponse<T> {
    pub code: String,
    pub message: String,
    pub data: T,
}

impl<T> StationResponse<T> {
    fn new(code: &str, message: impl Into<String>, data: T) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            data,
        }
    }
}

// ==========================================
// StationApi - 工位 API
// ==========================================
pub struct StationApi {
    controller: Arc<StationController>,
    blob_store: Arc<dyn BlobStore>,
    upload_timeout: Duration,
}

impl StationApi {
    pub fn new(
        controller: Arc<StationController>,
        blob_store: Arc<dyn BlobStore>,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            controller,
            blob_store,
            upload_timeout,
        }
    }

    pub fn controller(&self) -> &Arc<StationController> {
        &self.controller
    }

    // ==========================================
    // 作业
    // ==========================================

    pub async fn start_job(&self, input: StartJobInput) -> ApiResult<StationResponse<Activity>> {
        let max_total_kits = self.controller.max_total_kits();
        if input.total_kits <= 0 || input.total_kits > i64::from(max_total_kits) {
            return Err(ApiError::InvalidInput(format!(
                "total_kits 超出范围: {}",
                input.total_kits
            )));
        }
        let request = StartJobRequest {
            workstation_id: input.workstation_id,
            kit_name: input.kit_name,
            kit_code: input.kit_code,
            order_reference: input.order_reference,
            total_kits: input.total_kits as u32,
        };

        let activity = self
            .run_blocking(move |controller| controller.start_job(request))
            .await?;
        let message = format!("作业已启动: {} x{}", activity.kit_name, activity.total_kits);
        Ok(StationResponse::new("job_started", message, activity))
    }

    pub async fn manual_terminate(&self, workstation_id: &str) -> ApiResult<StationResponse<Activity>> {
        let workstation_id = workstation_id.to_string();
        let activity = self
            .run_blocking(move |controller| controller.manual_terminate(&workstation_id))
            .await?;
        Ok(StationResponse::new("job_terminated", "作业已人工终止", activity))
    }

    // ==========================================
    // 检测
    // ==========================================

    pub async fn submit_detection(
        &self,
        input: DetectionInput,
    ) -> ApiResult<StationResponse<DetectionOutcome>> {
        if input.part_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("part_name 不能为空".to_string()));
        }
        if !input.confidence.is_finite() || !(0.0..=1.0).contains(&input.confidence) {
            return Err(ApiError::InvalidInput(format!(
                "confidence 超出范围: {}",
                input.confidence
            )));
        }

        let lane = Lane::normalize(&input.camera);
        let image_ref = self
            .upload(&input.workstation_id, lane, "part", input.image.as_deref())
            .await;

        let part_name = input.part_name.trim().to_string();
        let event = DetectionEvent {
            lane,
            raw_label: input.raw_label.unwrap_or_else(|| part_name.clone()),
            part_name,
            confidence: input.confidence,
            tracking_id: input.tracking_id,
            image_ref,
        };
        let workstation_id = input.workstation_id;

        let outcome = self
            .run_blocking(move |controller| controller.submit_detection(&workstation_id, event))
            .await?;

        let response = match &outcome {
            DetectionOutcome::Matched {
                slot_name,
                found,
                required,
                ..
            } => StationResponse::new(
                "matched",
                format!("{}: {}/{}", slot_name, found, required),
                outcome.clone(),
            ),
            DetectionOutcome::WrongPart { part_name, .. } => StationResponse::new(
                "wrong_part",
                format!("错误零件: {}，通道已锁定", part_name),
                outcome.clone(),
            ),
            DetectionOutcome::LaneAlreadyComplete { lane, .. } => StationResponse::new(
                "lane_complete",
                format!("通道 {} 已完成全部套件", lane),
                outcome.clone(),
            ),
        };
        Ok(response)
    }

    // ==========================================
    // 校验
    // ==========================================

    pub async fn submit_validation(
        &self,
        input: ValidationInput,
    ) -> ApiResult<StationResponse<ValidationOutcome>> {
        let lane = Lane::normalize(&input.camera);
        let proof_image_ref = self
            .upload(&input.workstation_id, lane, "proof", input.image.as_deref())
            .await;
        let workstation_id = input.workstation_id;

        let outcome = self
            .run_blocking(move |controller| {
                controller.submit_validation(&workstation_id, lane, proof_image_ref)
            })
            .await?;

        let response = match &outcome {
            ValidationOutcome::Passed { completion, .. } if completion.job_completed => {
                StationResponse::new("job_completed", "全部套件已完成", outcome.clone())
            }
            ValidationOutcome::Passed {
                completion,
                warnings,
                ..
            } => {
                let code = if warnings.is_empty() {
                    "kit_completed"
                } else {
                    "kit_completed_warning"
                };
                StationResponse::new(
                    code,
                    format!("通道 {} 第 {} 套完成", completion.lane, completion.kit_number),
                    outcome.clone(),
                )
            }
            ValidationOutcome::Failed { report } => StationResponse::new(
                "validation_failed",
                format!(
                    "缺件 {} 项，少件 {} 项",
                    report.detail.missing.len(),
                    report.detail.undercount.len()
                ),
                outcome.clone(),
            ),
            ValidationOutcome::LaneAlreadyComplete { lane, .. } => StationResponse::new(
                "lane_complete",
                format!("通道 {} 已完成全部套件", lane),
                outcome.clone(),
            ),
        };
        Ok(response)
    }

    // ==========================================
    // 错误解决
    // ==========================================

    pub async fn resolve_error(&self, input: ResolveInput) -> ApiResult<StationResponse<ResolveOutcome>> {
        let request = ResolveRequest {
            lane: Lane::normalize(&input.camera),
            reason: input.reason,
            validation: input.validation,
        };
        let workstation_id = input.workstation_id;

        let outcome = self
            .run_blocking(move |controller| controller.resolve_error(&workstation_id, request))
            .await?;

        let code = match &outcome.completion {
            Some(summary) if summary.job_completed => "job_completed",
            Some(_) => "kit_completed_warning",
            None => "unlocked",
        };
        let message = format!("通道 {} 已解锁，清除 {} 条错误", outcome.lane, outcome.cleared);
        Ok(StationResponse::new(code, message, outcome))
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn current_state(&self, workstation_id: &str) -> ApiResult<Option<Activity>> {
        Ok(self.controller.current_state(workstation_id)?)
    }

    pub fn get_activity(&self, activity_id: &str) -> ApiResult<Activity> {
        Ok(self.controller.get_activity(activity_id)?)
    }

    pub fn status_grid(&self, activity_id: &str) -> ApiResult<StatusGrid> {
        Ok(self.controller.status_grid(activity_id)?)
    }

    pub fn archive_detail(
        &self,
        activity_id: &str,
        camera: &str,
        kit_number: u32,
    ) -> ApiResult<KitArchiveRecord> {
        Ok(self
            .controller
            .archive_detail(activity_id, Lane::normalize(camera), kit_number)?)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 上传抓拍图片；失败或超时只告警，返回 None
    async fn upload(
        &self,
        workstation_id: &str,
        lane: Lane,
        kind: &str,
        image: Option<&[u8]>,
    ) -> Option<String> {
        let bytes = image?;
        let prefix = format!("table_{}_{}_{}", workstation_id, lane.as_str(), kind);
        match put_with_timeout(self.blob_store.as_ref(), &prefix, bytes, self.upload_timeout).await {
            Ok(image_ref) => Some(image_ref),
            Err(e) => {
                tracing::warn!(
                    "抓拍图片上传失败，继续处理: workstation_id={}, lane={}, error={}",
                    workstation_id,
                    lane,
                    e
                );
                None
            }
        }
    }

    /// 在阻塞线程池上执行控制器操作（SQLite 为同步 I/O）
    async fn run_blocking<T, F>(&self, f: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&StationController) -> crate::engine::StationResult<T> + Send + 'static,
    {
        let controller = Arc::clone(&self.controller);
        let result = tokio::task::spawn_blocking(move || f(&controller))
            .await
            .map_err(|e| ApiError::InternalError(format!("工位任务执行失败: {}", e)))?;
        Ok(result?)
    }
}
