use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attachment::Attachment;

/// 材料处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaterialStatus {
    Pending,
    Done,
}

/// 教学材料
///
/// 由上传创建（pending），只有材料整理流程会把它改成 done 并写入 content。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    pub class_id: String,
    pub title: String,
    pub description: Option<String>,
    pub attachments: Vec<Attachment>,
    pub status: MaterialStatus,
    /// 整理后的教学内容，done 之前为空；生成失败时 done 之后也可能为空
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}
