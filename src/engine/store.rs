// ==========================================
// 装配工位套件追踪系统 - 引擎层存储端口
// ==========================================
// 职责: 定义核心所需的存储/目录接口，实现依赖倒置
// 说明: Engine 层定义 trait，Repository 层实现
// ==========================================

use crate::domain::{Activity, KitArchiveRecord, KitTemplate, Lane, ResolutionLogEntry};
use crate::repository::error::RepositoryResult;

// ==========================================
// ActivityStore - 活动文档存储
// ==========================================

/// 活动文档存储
///
/// # 实现说明
/// - `ActivityRepository`（rusqlite）实现此 trait
/// - 归档集合与解决日志均为只追加
pub trait ActivityStore: Send + Sync {
    /// 插入新活动
    fn insert_activity(&self, activity: &Activity) -> RepositoryResult<()>;

    /// 按ID读取活动
    fn find_activity(&self, activity_id: &str) -> RepositoryResult<Option<Activity>>;

    /// 读取工位上正在运行的活动
    fn find_running_by_workstation(&self, workstation_id: &str)
        -> RepositoryResult<Option<Activity>>;

    /// 乐观锁更新活动文档
    ///
    /// # 返回
    /// - `Ok(new_revision)`: 更新成功
    /// - `Err(OptimisticLockFailure)`: `activity.revision` 与存储不一致
    fn update_activity(&self, activity: &Activity) -> RepositoryResult<i64>;

    /// 原子提交一次套件完成：追加解决日志 + 追加归档记录 + 更新活动文档
    ///
    /// 任一步失败则整体回滚，`logs` 可为空
    fn commit_kit_completion(
        &self,
        archive: &KitArchiveRecord,
        activity: &Activity,
        logs: &[ResolutionLogEntry],
    ) -> RepositoryResult<i64>;

    /// 原子提交一次错误解决：追加解决日志 + 更新活动文档
    ///
    /// 任一步失败则整体回滚
    fn commit_resolution(
        &self,
        activity: &Activity,
        logs: &[ResolutionLogEntry],
    ) -> RepositoryResult<i64>;

    /// 查询某活动/通道/套件序号下的解决日志（按时间顺序）
    fn list_resolution_logs(
        &self,
        activity_id: &str,
        lane: Lane,
        kit_number: u32,
    ) -> RepositoryResult<Vec<ResolutionLogEntry>>;

    /// 读取单个套件归档
    fn find_archive(
        &self,
        activity_id: &str,
        lane: Lane,
        kit_number: u32,
    ) -> RepositoryResult<Option<KitArchiveRecord>>;

    /// 列出活动的全部归档（按通道、套件序号排序）
    fn list_archives(&self, activity_id: &str) -> RepositoryResult<Vec<KitArchiveRecord>>;
}

// ==========================================
// KitCatalog - 套件模板目录
// ==========================================

/// 模板查找结果（带失败原因）
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateLookup {
    /// 名称与识别码均匹配（精确或忽略大小写）
    Found(KitTemplate),
    /// 名称存在但识别码不匹配
    CodeMismatch { kit_name: String },
    /// 识别码存在但名称不匹配
    NameMismatch { kit_code: String },
    /// 名称与识别码都不存在
    NotFound,
}

/// 套件模板目录
pub trait KitCatalog: Send + Sync {
    /// 查找模板：先精确匹配，再忽略大小写回退
    fn find_kit_template(&self, kit_name: &str, kit_code: &str)
        -> RepositoryResult<TemplateLookup>;
}
