// ==========================================
// 装配工位套件追踪系统 - 套件模板(BOM)领域模型
// ==========================================
// 来源: 外部目录服务 (kit_template 表)，核心只读
// ==========================================

use crate::domain::types::Lane;
use serde::{Deserialize, Serialize};

// ==========================================
// AlertFlags - 槽位告警开关
// ==========================================
/// 校验时是否对缺件/少件/多件进行分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFlags {
    #[serde(default = "default_true")]
    pub on_missing: bool,
    #[serde(default = "default_true")]
    pub on_undercount: bool,
    #[serde(default = "default_true")]
    pub on_overcount: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AlertFlags {
    fn default() -> Self {
        Self {
            on_missing: true,
            on_undercount: true,
            on_overcount: true,
        }
    }
}

impl AlertFlags {
    /// 合并重复 BOM 行时任一开启即开启
    pub fn union(self, other: AlertFlags) -> AlertFlags {
        AlertFlags {
            on_missing: self.on_missing || other.on_missing,
            on_undercount: self.on_undercount || other.on_undercount,
            on_overcount: self.on_overcount || other.on_overcount,
        }
    }
}

// ==========================================
// BomLine - BOM 行定义
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub name: String,       // 零件名称（与检测代理的零件名一致）
    pub lane: Lane,         // 所属相机通道
    pub required_qty: u32,  // 需求数量
    #[serde(default)]
    pub alerts: AlertFlags, // 告警开关
}

// ==========================================
// KitTemplate - 套件模板
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitTemplate {
    pub template_id: String, // 模板ID
    pub kit_name: String,    // 套件名称
    pub kit_code: String,    // 期望识别码 (EDP 号)
    pub lines: Vec<BomLine>, // 有序 BOM 行
}

impl KitTemplate {
    /// 指定通道的 BOM 行（保持定义顺序）
    pub fn lines_for(&self, lane: Lane) -> impl Iterator<Item = &BomLine> {
        self.lines.iter().filter(move |line| line.lane == lane)
    }
}
