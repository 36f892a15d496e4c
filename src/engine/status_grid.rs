// ==========================================
// 装配工位套件追踪系统 - 套件状态网格
// ==========================================
// 职责: 为看板生成每通道 1..=total 的套件状态
// 规则: 已归档 = 完成（红/黄/绿）；当前序号 = 进行中；其余 = 待处理
// 颜色: 有已解决错误 = 红；数量不精确 = 黄；否则 = 绿
// ==========================================

use crate::domain::{Activity, KitArchiveRecord, KitGridColor, KitGridState, Lane};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 网格单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitGridEntry {
    pub kit_number: u32,
    pub state: KitGridState,
    pub color: Option<KitGridColor>,
}

/// 单通道网格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneGrid {
    pub lane: Lane,
    pub kit_index: u32,
    pub entries: Vec<KitGridEntry>,
}

/// 活动网格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusGrid {
    pub activity_id: String,
    pub total_kits: u32,
    pub lanes: Vec<LaneGrid>,
}

/// 归档记录着色
pub fn archive_color(record: &KitArchiveRecord) -> KitGridColor {
    if record.has_errors() {
        KitGridColor::Red
    } else if record.has_inexact_counts() {
        KitGridColor::Yellow
    } else {
        KitGridColor::Green
    }
}

/// 生成状态网格
///
/// 归档集合优先于活动内嵌历史
pub fn build_status_grid(activity: &Activity, archives: &[KitArchiveRecord]) -> StatusGrid {
    let mut by_key: HashMap<(Lane, u32), &KitArchiveRecord> = HashMap::new();
    for record in activity.history.iter().chain(archives.iter()) {
        by_key.insert((record.lane, record.kit_number), record);
    }

    let lanes = Lane::ALL
        .iter()
        .map(|&lane| {
            let lane_state = activity.lane(lane);
            let in_progress = activity.is_running() && !lane_state.is_done(activity.total_kits);

            let entries = (1..=activity.total_kits)
                .map(|kit_number| match by_key.get(&(lane, kit_number)) {
                    Some(record) => KitGridEntry {
                        kit_number,
                        state: KitGridState::Completed,
                        color: Some(archive_color(record)),
                    },
                    None if in_progress && kit_number == lane_state.kit_index => KitGridEntry {
                        kit_number,
                        state: KitGridState::InProgress,
                        color: None,
                    },
                    None => KitGridEntry {
                        kit_number,
                        state: KitGridState::Pending,
                        color: None,
                    },
                })
                .collect();

            LaneGrid {
                lane,
                kit_index: lane_state.kit_index,
                entries,
            }
        })
        .collect();

    StatusGrid {
        activity_id: activity.activity_id.clone(),
        total_kits: activity.total_kits,
        lanes,
    }
}
