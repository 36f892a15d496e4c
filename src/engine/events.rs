// ==========================================
// 装配工位套件追踪系统 - 引擎层事件发布
// ==========================================
// 职责: 定义工位通知发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，realtime 层实现（按工位频道广播）
// 约束: 通知为“发出即忘”，发布失败不得影响已提交的状态
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 工位事件类型
// ==========================================

/// 工位通知事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationEventKind {
    /// 作业启动
    JobStarted,
    /// 零件匹配成功
    PartMatched,
    /// 识别到错误零件（通道锁定）
    WrongPart,
    /// 校验失败（缺件/少件）
    ValidationFailed,
    /// 套件完成
    KitCompleted,
    /// 套件完成（有告警）
    KitCompletedWithWarning,
    /// 整个作业完成
    JobCompleted,
    /// 通道解锁
    LaneUnlocked,
    /// 作业被人工终止
    JobTerminated,
}

impl StationEventKind {
    /// 对外事件名
    pub fn as_str(&self) -> &'static str {
        match self {
            StationEventKind::JobStarted => "job_started",
            StationEventKind::PartMatched => "part_matched",
            StationEventKind::WrongPart => "wrong_part_detected",
            StationEventKind::ValidationFailed => "validation_error",
            StationEventKind::KitCompleted => "kit_completed",
            StationEventKind::KitCompletedWithWarning => "kit_completed_warning",
            StationEventKind::JobCompleted => "job_completed",
            StationEventKind::LaneUnlocked => "lane_unlocked",
            StationEventKind::JobTerminated => "job_terminated",
        }
    }
}

/// 工位通知事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationEvent {
    /// 工位 ID
    pub workstation_id: String,
    /// 事件类型
    pub kind: StationEventKind,
    /// 事件载荷
    pub payload: JsonValue,
    /// 产生时间
    pub emitted_at: DateTime<Utc>,
}

impl StationEvent {
    pub fn new(workstation_id: &str, kind: StationEventKind, payload: JsonValue) -> Self {
        Self {
            workstation_id: workstation_id.to_string(),
            kind,
            payload,
            emitted_at: Utc::now(),
        }
    }

    /// 按工位寻址的频道名
    pub fn channel(&self) -> String {
        channel_for(&self.workstation_id)
    }

    pub fn event_name(&self) -> &'static str {
        self.kind.as_str()
    }
}

/// 工位频道名: `table_{workstation_id}`
pub fn channel_for(workstation_id: &str) -> String {
    format!("table_{}", workstation_id)
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 工位事件发布者 Trait
///
/// # 实现说明
/// - `RealtimeHub` 实现此 trait，按频道广播给 UI/检测客户端
/// - 实现不得阻塞调用方
pub trait StationEventPublisher: Send + Sync {
    /// 发布工位事件
    fn publish(&self, event: StationEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl StationEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: StationEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - channel={}, event={}",
            event.channel(),
            event.event_name()
        );
        Ok(())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn StationEventPublisher>> 的使用，发布失败只记录告警
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn StationEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn StationEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（尽力而为，失败仅告警）
    pub fn publish(&self, event: StationEvent) {
        match &self.inner {
            Some(publisher) => {
                let channel = event.channel();
                let name = event.event_name();
                if let Err(e) = publisher.publish(event) {
                    tracing::warn!("工位事件发布失败: channel={}, event={}, error={}", channel, name, e);
                }
            }
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - channel={}, event={}",
                    event.channel(),
                    event.event_name()
                );
            }
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingPublisher;

    impl StationEventPublisher for FailingPublisher {
        fn publish(&self, _event: StationEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("频道不可用".into())
        }
    }

    #[test]
    fn test_event_channel_naming() {
        let event = StationEvent::new("7", StationEventKind::KitCompleted, json!({"lane": "A"}));
        assert_eq!(event.channel(), "table_7");
        assert_eq!(event.event_name(), "kit_completed");
    }

    #[test]
    fn test_noop_publisher() {
        let publisher = NoOpEventPublisher;
        let event = StationEvent::new("1", StationEventKind::JobStarted, json!({}));
        assert!(publisher.publish(event).is_ok());
    }

    #[test]
    fn test_optional_publisher_none() {
        let publisher = OptionalEventPublisher::none();
        assert!(!publisher.is_configured());
        publisher.publish(StationEvent::new("1", StationEventKind::JobStarted, json!({})));
    }

    #[test]
    fn test_optional_publisher_swallows_failure() {
        let failing = Arc::new(FailingPublisher) as Arc<dyn StationEventPublisher>;
        let publisher = OptionalEventPublisher::with_publisher(failing);
        assert!(publisher.is_configured());

        // 发布失败不会传播到调用方
        publisher.publish(StationEvent::new("1", StationEventKind::WrongPart, json!({})));
    }
}
