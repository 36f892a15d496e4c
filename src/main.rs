// ==========================================
// 装配工位套件追踪系统 - 主入口
// ==========================================
// 职责: 初始化日志与应用状态，报告各工位运行中的作业
// 用法: kitting-station [db_path]
// ==========================================

use anyhow::{anyhow, Context};
use kitting_station::app::{get_default_db_path, AppState};
use kitting_station::engine::channel_for;
use kitting_station::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", kitting_station::APP_NAME);
    tracing::info!("系统版本: {}", kitting_station::VERSION);
    tracing::info!("==================================================");

    let db_path = std::env::args()
        .nth(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = tokio::task::spawn_blocking(move || AppState::new(db_path))
        .await
        .context("AppState 初始化任务失败")?
        .map_err(|e| anyhow!(e))?;

    let socket_url = state
        .config_manager
        .get_socket_server_url()
        .map_err(|e| anyhow!("读取 socket_server_url 失败: {}", e))?;
    tracing::info!("通知服务地址: {}", socket_url);

    let running = state
        .activity_repo
        .list_running()
        .context("读取运行中的作业失败")?;
    if running.is_empty() {
        tracing::info!("当前没有运行中的作业");
    }
    for activity in &running {
        tracing::info!(
            "工位 {} [{}]: {} ({}) 订单={}, A通道 {}/{}, B通道 {}/{}, 锁定: A={} B={}",
            activity.workstation_id,
            channel_for(&activity.workstation_id),
            activity.kit_name,
            activity.kit_code,
            activity.order_reference,
            activity.lane_a.kit_index.min(activity.total_kits + 1) - 1,
            activity.total_kits,
            activity.lane_b.kit_index.min(activity.total_kits + 1) - 1,
            activity.total_kits,
            activity.lane_a.is_locked(),
            activity.lane_b.is_locked()
        );
    }

    tracing::info!("就绪: {} 个运行中的作业", running.len());
    Ok(())
}
