// ==========================================
// 装配工位套件追踪系统 - 实时通知中心
// ==========================================
// 职责: 进程内发布/订阅，按频道 `table_{workstation_id}` 广播工位事件
// 职责: 中转 UI 与检测客户端之间的房间消息（指令/握手/抓拍信号）
// 说明: 实现 StationEventPublisher，供 UI/检测客户端订阅
// 约束: 无订阅者或订阅者滞后均不阻塞发布方
// 约束: 频道在最后一个订阅者离开后的下一次发送时回收
// ==========================================

use crate::domain::Lane;
use crate::engine::events::{channel_for, StationEvent, StationEventPublisher};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// 默认频道容量
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

type HubResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// ChannelMap - 按频道名索引的广播发送端
// ==========================================
struct ChannelMap<E> {
    capacity: usize,
    senders: Mutex<HashMap<String, broadcast::Sender<E>>>,
}

impl<E: Clone> ChannelMap<E> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            senders: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> HubResult<std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<E>>>> {
        Ok(self
            .senders
            .lock()
            .map_err(|e| format!("频道表锁获取失败: {}", e))?)
    }

    /// 订阅（在表锁内创建接收端，避免与回收竞争）
    fn subscribe(&self, channel: &str) -> HubResult<broadcast::Receiver<E>> {
        let mut senders = self.lock()?;
        let capacity = self.capacity;
        Ok(senders
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe())
    }

    /// 发送，返回收到的订阅者数
    ///
    /// 没有订阅者的频道不会被创建；发送失败（订阅者已全部离开）时回收该频道
    fn send(&self, channel: &str, event: E) -> HubResult<usize> {
        let mut senders = self.lock()?;
        let Some(tx) = senders.get(channel) else {
            return Ok(0);
        };
        match tx.send(event) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                senders.remove(channel);
                tracing::debug!("频道已无订阅者，回收: channel={}", channel);
                Ok(0)
            }
        }
    }

    fn receiver_count(&self, channel: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|senders| senders.get(channel).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }

    fn len(&self) -> usize {
        self.lock().map(|senders| senders.len()).unwrap_or(0)
    }
}

// ==========================================
// 客户端中转消息
// ==========================================

/// 在工位房间内中转的客户端消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// 工位 ID
    pub workstation_id: String,
    /// 转发出去的事件名
    pub event_name: String,
    /// 原样转发的载荷
    pub payload: JsonValue,
    /// 发送方客户端 ID
    pub sender: Option<String>,
    /// 为 true 时发送方自己收不到
    pub exclude_sender: bool,
    pub emitted_at: DateTime<Utc>,
}

impl RelayEvent {
    pub fn channel(&self) -> String {
        channel_for(&self.workstation_id)
    }

    fn is_visible_to(&self, client_id: &str) -> bool {
        !(self.exclude_sender && self.sender.as_deref() == Some(client_id))
    }
}

/// 客户端发往工位房间的消息
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// 加入房间，房间内回一条 `status_update`
    JoinTable,
    /// UI 指令，转给检测客户端（`ai_command`）
    UiCommand(JsonValue),
    /// UI 正在创建新活动，通知检测客户端（不回发给自己）
    CreateActivitySignal(JsonValue),
    /// 检测客户端启动确认，回给 UI
    AiHandshakeResponse(JsonValue),
    /// 请求某相机抓拍（不回发给自己）
    CaptureSignal { lane: Lane, payload: JsonValue },
    /// 相机开始上传的确认
    SendingAck { lane: Lane, payload: JsonValue },
    /// 相机识别结果
    CameraResult { lane: Lane, payload: JsonValue },
}

impl ClientEvent {
    /// 按收到的事件名解析；未知事件返回 None
    ///
    /// 相机类事件名中的编号经 `Lane::normalize` 归一化（`cam1` / `cam2`）
    pub fn from_wire(event_name: &str, payload: JsonValue) -> Option<ClientEvent> {
        match event_name {
            "join_table" => return Some(ClientEvent::JoinTable),
            "ui_command" => return Some(ClientEvent::UiCommand(payload)),
            "create_activity_signal" => return Some(ClientEvent::CreateActivitySignal(payload)),
            "ai_handshake_response" => return Some(ClientEvent::AiHandshakeResponse(payload)),
            _ => {}
        }

        if let Some(lane) = event_name
            .strip_prefix("capture_")
            .and_then(|rest| rest.strip_suffix("_signal"))
            .and_then(camera_lane)
        {
            return Some(ClientEvent::CaptureSignal { lane, payload });
        }
        if let Some(lane) = event_name
            .strip_prefix("sending_")
            .and_then(|rest| rest.strip_suffix("_ack"))
            .and_then(camera_lane)
        {
            return Some(ClientEvent::SendingAck { lane, payload });
        }
        if let Some(lane) = event_name.strip_suffix("_result").and_then(camera_lane) {
            return Some(ClientEvent::CameraResult { lane, payload });
        }
        None
    }

    /// 转发出去的事件名、载荷，以及是否排除发送方
    fn route(self, workstation_id: &str) -> (String, JsonValue, bool) {
        match self {
            ClientEvent::JoinTable => (
                "status_update".to_string(),
                json!({ "message": format!("Joined {}", channel_for(workstation_id)) }),
                false,
            ),
            ClientEvent::UiCommand(payload) => ("ai_command".to_string(), payload, false),
            ClientEvent::CreateActivitySignal(payload) => {
                ("create_activity_signal".to_string(), payload, true)
            }
            ClientEvent::AiHandshakeResponse(payload) => {
                ("ai_handshake_response".to_string(), payload, false)
            }
            ClientEvent::CaptureSignal { lane, payload } => (
                format!("capture_cam{}_signal", lane.camera_number()),
                payload,
                true,
            ),
            ClientEvent::SendingAck { lane, payload } => (
                format!("sending_cam{}_ack", lane.camera_number()),
                payload,
                false,
            ),
            ClientEvent::CameraResult { lane, payload } => {
                (format!("cam{}_result", lane.camera_number()), payload, false)
            }
        }
    }
}

/// 事件名里的相机段（`cam1` / `CAM 2`）
fn camera_lane(segment: &str) -> Option<Lane> {
    if segment.to_ascii_lowercase().starts_with("cam") {
        Some(Lane::normalize(segment))
    } else {
        None
    }
}

/// 某个客户端在工位房间上的中转订阅
///
/// 自动跳过该客户端自己发出且要求排除发送方的消息
pub struct RelaySubscription {
    client_id: String,
    rx: broadcast::Receiver<RelayEvent>,
}

impl RelaySubscription {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn recv(&mut self) -> Result<RelayEvent, RecvError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.is_visible_to(&self.client_id) => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("中转订阅滞后: client_id={}, skipped={}", self.client_id, skipped);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<RelayEvent, TryRecvError> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.is_visible_to(&self.client_id) => return Ok(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

// ==========================================
// RealtimeHub - 频道广播中心
// ==========================================
pub struct RealtimeHub {
    events: ChannelMap<StationEvent>,
    relays: ChannelMap<RelayEvent>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: ChannelMap::new(capacity),
            relays: ChannelMap::new(capacity),
        }
    }

    /// 订阅工位频道
    pub fn subscribe(&self, workstation_id: &str) -> HubResult<broadcast::Receiver<StationEvent>> {
        let channel = channel_for(workstation_id);
        tracing::debug!("订阅频道: {}", channel);
        self.events.subscribe(&channel)
    }

    /// 频道当前订阅者数
    pub fn subscriber_count(&self, workstation_id: &str) -> usize {
        self.events.receiver_count(&channel_for(workstation_id))
    }

    /// 当前保有的工位事件频道数
    pub fn channel_count(&self) -> usize {
        self.events.len()
    }

    // ==========================================
    // 客户端中转
    // ==========================================

    /// 以客户端身份加入工位房间的中转消息
    pub fn subscribe_relay(
        &self,
        workstation_id: &str,
        client_id: &str,
    ) -> HubResult<RelaySubscription> {
        let rx = self.relays.subscribe(&channel_for(workstation_id))?;
        Ok(RelaySubscription {
            client_id: client_id.to_string(),
            rx,
        })
    }

    /// 向工位房间转发一条消息，返回收到的订阅数
    pub fn relay(
        &self,
        workstation_id: &str,
        event_name: &str,
        payload: JsonValue,
        sender: Option<&str>,
        exclude_sender: bool,
    ) -> HubResult<usize> {
        let event = RelayEvent {
            workstation_id: workstation_id.to_string(),
            event_name: event_name.to_string(),
            payload,
            sender: sender.map(str::to_string),
            exclude_sender,
            emitted_at: Utc::now(),
        };
        let channel = event.channel();
        let receivers = self.relays.send(&channel, event)?;
        tracing::debug!(
            "中转消息: channel={}, event={}, receivers={}",
            channel,
            event_name,
            receivers
        );
        Ok(receivers)
    }

    /// 处理客户端发来的房间消息
    pub fn handle_client_event(
        &self,
        workstation_id: &str,
        sender: &str,
        event: ClientEvent,
    ) -> HubResult<usize> {
        let (event_name, payload, exclude_sender) = event.route(workstation_id);
        self.relay(workstation_id, &event_name, payload, Some(sender), exclude_sender)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl StationEventPublisher for RealtimeHub {
    fn publish(&self, event: StationEvent) -> HubResult<()> {
        let channel = event.channel();
        let name = event.event_name();

        let receivers = self.events.send(&channel, event)?;
        if receivers == 0 {
            tracing::debug!("频道无订阅者，事件丢弃: channel={}, event={}", channel, name);
        } else {
            tracing::debug!("事件已广播: channel={}, event={}, receivers={}", channel, name, receivers);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::StationEventKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscriber_receives_own_channel_only() {
        let hub = RealtimeHub::new(8);
        let mut rx_one = hub.subscribe("1").unwrap();
        let mut rx_two = hub.subscribe("2").unwrap();

        hub.publish(StationEvent::new("1", StationEventKind::PartMatched, json!({"lane": "A"})))
            .unwrap();

        let received = rx_one.recv().await.unwrap();
        assert_eq!(received.kind, StationEventKind::PartMatched);
        assert_eq!(received.channel(), "table_1");
        assert!(rx_two.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let hub = RealtimeHub::default();
        let event = StationEvent::new("9", StationEventKind::JobStarted, json!({}));
        assert!(hub.publish(event).is_ok());
        assert_eq!(hub.subscriber_count("9"), 0);
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn test_channel_released_after_last_subscriber_leaves() {
        let hub = RealtimeHub::new(4);
        for ws in ["1", "2", "3"] {
            let rx = hub.subscribe(ws).unwrap();
            drop(rx);
        }
        let _kept = hub.subscribe("4").unwrap();
        assert_eq!(hub.channel_count(), 4);

        for ws in ["1", "2", "3", "4"] {
            hub.publish(StationEvent::new(ws, StationEventKind::JobStarted, json!({})))
                .unwrap();
        }
        assert_eq!(hub.channel_count(), 1);
        assert_eq!(hub.subscriber_count("4"), 1);

        // 回收后可以重新订阅
        let mut rx = hub.subscribe("1").unwrap();
        hub.publish(StationEvent::new("1", StationEventKind::JobTerminated, json!({})))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().kind, StationEventKind::JobTerminated);
    }

    // ==========================================
    // 客户端中转
    // ==========================================

    #[test]
    fn test_join_and_commands_reach_whole_room() {
        let hub = RealtimeHub::new(8);
        let mut ui = hub.subscribe_relay("1", "ui").unwrap();
        let mut ai = hub.subscribe_relay("1", "ai").unwrap();
        let mut other = hub.subscribe_relay("2", "ai-2").unwrap();

        hub.handle_client_event("1", "ui", ClientEvent::JoinTable).unwrap();
        let ack = ui.try_recv().unwrap();
        assert_eq!(ack.event_name, "status_update");
        assert_eq!(ack.payload["message"], "Joined table_1");
        assert_eq!(ai.try_recv().unwrap().event_name, "status_update");

        let command = json!({"table_id": "1", "command": "stop_process"});
        let delivered = hub
            .handle_client_event("1", "ui", ClientEvent::UiCommand(command.clone()))
            .unwrap();
        assert_eq!(delivered, 2);
        let received = ai.try_recv().unwrap();
        assert_eq!(received.event_name, "ai_command");
        assert_eq!(received.payload, command);
        assert_eq!(received.sender.as_deref(), Some("ui"));
        assert_eq!(ui.try_recv().unwrap().event_name, "ai_command");

        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_signals_skip_their_sender() {
        let hub = RealtimeHub::new(8);
        let mut ui = hub.subscribe_relay("3", "ui").unwrap();
        let mut ai = hub.subscribe_relay("3", "ai").unwrap();

        hub.handle_client_event(
            "3",
            "ui",
            ClientEvent::CreateActivitySignal(json!({"tableId": "3"})),
        )
        .unwrap();
        assert_eq!(ai.try_recv().unwrap().event_name, "create_activity_signal");
        assert!(ui.try_recv().is_err());

        hub.handle_client_event(
            "3",
            "ai",
            ClientEvent::AiHandshakeResponse(json!({"tableId": "3", "ready": true})),
        )
        .unwrap();
        assert_eq!(ui.try_recv().unwrap().event_name, "ai_handshake_response");
        assert_eq!(ai.try_recv().unwrap().event_name, "ai_handshake_response");
    }

    #[test]
    fn test_camera_events_are_numbered_by_lane() {
        let hub = RealtimeHub::new(16);
        let mut ui = hub.subscribe_relay("1", "ui").unwrap();
        let mut ai = hub.subscribe_relay("1", "ai").unwrap();

        let capture = ClientEvent::from_wire("capture_cam2_signal", json!({"tableId": "1"})).unwrap();
        assert_eq!(
            capture,
            ClientEvent::CaptureSignal {
                lane: Lane::B,
                payload: json!({"tableId": "1"})
            }
        );
        hub.handle_client_event("1", "ui", capture).unwrap();
        assert_eq!(ai.try_recv().unwrap().event_name, "capture_cam2_signal");
        assert!(ui.try_recv().is_err());

        let ack = ClientEvent::from_wire("sending_cam1_ack", json!({})).unwrap();
        hub.handle_client_event("1", "ai", ack).unwrap();
        assert_eq!(ui.try_recv().unwrap().event_name, "sending_cam1_ack");
        assert_eq!(ai.try_recv().unwrap().event_name, "sending_cam1_ack");

        let result = ClientEvent::from_wire("cam2_result", json!({"parts": ["刹车片"]})).unwrap();
        hub.handle_client_event("1", "ai", result).unwrap();
        let received = ui.try_recv().unwrap();
        assert_eq!(received.event_name, "cam2_result");
        assert_eq!(received.payload["parts"][0], "刹车片");

        assert_eq!(ClientEvent::from_wire("ai_update", json!({})), None);
        assert_eq!(ClientEvent::from_wire("job_result", json!({})), None);
    }

    #[tokio::test]
    async fn test_relay_recv_waits_past_own_signal() {
        let hub = RealtimeHub::new(8);
        let mut ui = hub.subscribe_relay("5", "ui").unwrap();

        hub.handle_client_event("5", "ui", ClientEvent::CreateActivitySignal(json!({})))
            .unwrap();
        hub.handle_client_event("5", "ai", ClientEvent::AiHandshakeResponse(json!({"ok": 1})))
            .unwrap();

        let received = ui.recv().await.unwrap();
        assert_eq!(received.event_name, "ai_handshake_response");
        assert_eq!(received.channel(), "table_5");
    }

    #[test]
    fn test_relay_without_room_members_is_dropped() {
        let hub = RealtimeHub::default();
        let delivered = hub
            .relay("7", "ai_command", json!({"command": "retry"}), None, false)
            .unwrap();
        assert_eq!(delivered, 0);

        let sub = hub.subscribe_relay("7", "ui").unwrap();
        assert_eq!(sub.client_id(), "ui");
        drop(sub);
        assert_eq!(hub.relay("7", "ai_command", json!({}), None, false).unwrap(), 0);
    }
}
