// ==========================================
// 装配工位套件追踪系统 - 套件模板仓储
// ==========================================
// 职责: kit_template 表读取（目录查询）
// 说明: 模板维护不在本系统范围内，insert 仅供初始化/测试
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::{BomLine, KitTemplate};
use crate::engine::store::{KitCatalog, TemplateLookup};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// KitTemplateRepository - 套件模板仓储
// ==========================================
pub struct KitTemplateRepository {
    conn: Arc<Mutex<Connection>>,
}

impl KitTemplateRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn to_template(raw: (String, String, String, String)) -> RepositoryResult<KitTemplate> {
        let (template_id, kit_name, kit_code, lines_json) = raw;
        let lines: Vec<BomLine> = serde_json::from_str(&lines_json)
            .map_err(|e| RepositoryError::document("kit_template", e))?;
        Ok(KitTemplate {
            template_id,
            kit_name,
            kit_code,
            lines,
        })
    }

    /// 插入或覆盖模板
    pub fn insert(&self, template: &KitTemplate) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let lines_json = serde_json::to_string(&template.lines)
            .map_err(|e| RepositoryError::document("kit_template", e))?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT OR REPLACE INTO kit_template (
                template_id, kit_name, kit_code, lines_json, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![
                template.template_id,
                template.kit_name,
                template.kit_code,
                lines_json,
                now,
            ],
        )?;
        Ok(())
    }

    /// 按ID读取模板
    pub fn find_by_id(&self, template_id: &str) -> RepositoryResult<Option<KitTemplate>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                "SELECT template_id, kit_name, kit_code, lines_json FROM kit_template WHERE template_id = ?1",
                params![template_id],
                Self::map_row,
            )
            .optional()?;
        raw.map(Self::to_template).transpose()
    }

    /// 列出全部模板（按名称）
    pub fn list_all(&self) -> RepositoryResult<Vec<KitTemplate>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT template_id, kit_name, kit_code, lines_json FROM kit_template ORDER BY kit_name",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::to_template).collect()
    }
}

impl KitCatalog for KitTemplateRepository {
    fn find_kit_template(
        &self,
        kit_name: &str,
        kit_code: &str,
    ) -> RepositoryResult<TemplateLookup> {
        let conn = self.get_conn()?;

        // 1. 精确匹配
        let exact = conn
            .query_row(
                r#"SELECT template_id, kit_name, kit_code, lines_json FROM kit_template
                   WHERE kit_name = ?1 AND kit_code = ?2 LIMIT 1"#,
                params![kit_name, kit_code],
                Self::map_row,
            )
            .optional()?;
        if let Some(raw) = exact {
            return Ok(TemplateLookup::Found(Self::to_template(raw)?));
        }

        // 2. 忽略大小写回退
        let folded = conn
            .query_row(
                r#"SELECT template_id, kit_name, kit_code, lines_json FROM kit_template
                   WHERE kit_name = ?1 COLLATE NOCASE AND kit_code = ?2 COLLATE NOCASE
                   ORDER BY created_at LIMIT 1"#,
                params![kit_name, kit_code],
                Self::map_row,
            )
            .optional()?;
        if let Some(raw) = folded {
            return Ok(TemplateLookup::Found(Self::to_template(raw)?));
        }

        // 3. 诊断失败原因
        let name_exists: bool = conn
            .query_row(
                "SELECT 1 FROM kit_template WHERE kit_name = ?1 COLLATE NOCASE LIMIT 1",
                params![kit_name],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if name_exists {
            return Ok(TemplateLookup::CodeMismatch {
                kit_name: kit_name.to_string(),
            });
        }

        let code_exists: bool = conn
            .query_row(
                "SELECT 1 FROM kit_template WHERE kit_code = ?1 COLLATE NOCASE LIMIT 1",
                params![kit_code],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if code_exists {
            return Ok(TemplateLookup::NameMismatch {
                kit_code: kit_code.to_string(),
            });
        }

        Ok(TemplateLookup::NotFound)
    }
}
