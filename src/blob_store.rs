// ==========================================
// 装配工位套件追踪系统 - 抓拍图片存储
// ==========================================
// 职责: 保存检测/校验抓拍图片，返回可检索的图片引用
// 实现: LocalBlobStore 写入本地上传目录（相对路径引用）
// 约束: 上传有超时上限；失败由调用方降级为“无图片”
// ==========================================

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 图片存储错误
#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("图片写入失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("图片上传超时: {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("图片内容为空")]
    EmptyPayload,
}

/// 图片存储端口
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 保存图片，返回图片引用
    async fn put(&self, prefix: &str, bytes: &[u8]) -> Result<String, BlobStoreError>;
}

/// 带超时的上传
pub async fn put_with_timeout(
    store: &dyn BlobStore,
    prefix: &str,
    bytes: &[u8],
    timeout: Duration,
) -> Result<String, BlobStoreError> {
    match tokio::time::timeout(timeout, store.put(prefix, bytes)).await {
        Ok(result) => result,
        Err(_) => Err(BlobStoreError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

// ==========================================
// LocalBlobStore - 本地目录存储
// ==========================================
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 引用（相对上传目录的文件名）-> 绝对路径
    pub fn resolve(&self, image_ref: &str) -> PathBuf {
        self.root.join(image_ref)
    }

    fn file_name(prefix: &str) -> String {
        let prefix: String = prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!(
            "{}_{}_{}.jpg",
            prefix,
            Utc::now().format("%Y%m%d%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        )
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, prefix: &str, bytes: &[u8]) -> Result<String, BlobStoreError> {
        if bytes.is_empty() {
            return Err(BlobStoreError::EmptyPayload);
        }
        tokio::fs::create_dir_all(&self.root).await?;

        let name = Self::file_name(prefix);
        tokio::fs::write(self.root.join(&name), bytes).await?;
        tracing::debug!("图片已保存: {}/{}", self.root.display(), name);
        Ok(name)
    }
}
