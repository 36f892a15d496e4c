// ==========================================
// 装配工位套件追踪系统 - 检测事件
// ==========================================
// 来源: 外部检测代理，每识别到一个零件上报一次
// ==========================================

use crate::domain::types::Lane;
use serde::{Deserialize, Serialize};

/// 检测事件（瞬时输入，通道已归一化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub lane: Lane,
    pub part_name: String,           // 识别出的零件名称
    pub raw_label: String,           // 分类器原始标签
    pub confidence: f64,             // 置信度
    pub tracking_id: Option<String>, // 跟踪ID
    pub image_ref: Option<String>,   // 抓拍图片引用
}
