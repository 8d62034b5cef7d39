//! 附件引用
//!
//! 材料附件和答卷附件都只保存 URI + MIME 类型，文件本身由外部存储负责。

use serde::{Deserialize, Serialize};

/// 可以直接交给生成模型的附件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
}

impl Attachment {
    pub fn new(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let uri = uri.into();
        let mut mime_type = mime_type.into();
        if mime_type.trim().is_empty() {
            mime_type = guess_mime_type(&uri).to_string();
        }
        Self { uri, mime_type }
    }

    /// 只有 URI，MIME 类型根据扩展名推断
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self::new(uri, "")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// 答卷中存储的文件记录
///
/// 上传端写入的字段并不统一（`gcsUri` 或 `uri`），也可能缺失，
/// 评分前需要先经过 [`StoredFile::resolve`] 过滤。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl StoredFile {
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    /// 转换为可用附件；没有可解析 URI 的记录返回 None
    pub fn resolve(&self) -> Option<Attachment> {
        let uri = self
            .gcs_uri
            .as_deref()
            .or(self.uri.as_deref())
            .map(str::trim)
            .filter(|u| !u.is_empty())?;

        Some(Attachment::new(uri, self.mime_type.clone().unwrap_or_default()))
    }
}

/// 根据扩展名推断 MIME 类型
pub fn guess_mime_type(uri: &str) -> &'static str {
    // 去掉查询参数，例如 `a.png?resizew=151`
    let path = uri.split(['?', '#']).next().unwrap_or(uri).to_lowercase();

    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("gs://bucket/a.PNG"), "image/png");
        assert_eq!(guess_mime_type("https://x/y.jpeg?resizew=151"), "image/jpeg");
        assert_eq!(guess_mime_type("gs://bucket/handout.pdf"), "application/pdf");
        assert_eq!(guess_mime_type("/uploads/s1-1700000000"), "application/octet-stream");
    }

    #[test]
    fn test_resolve_prefers_gcs_uri() {
        let file = StoredFile {
            gcs_uri: Some("gs://answers/s1.png".to_string()),
            uri: Some("/uploads/s1".to_string()),
            mime_type: None,
        };
        let resolved = file.resolve().unwrap();
        assert_eq!(resolved.uri, "gs://answers/s1.png");
        assert_eq!(resolved.mime_type, "image/png");
    }

    #[test]
    fn test_resolve_drops_missing_uri() {
        assert!(StoredFile::default().resolve().is_none());
        assert!(StoredFile::with_uri("   ").resolve().is_none());
    }

    #[test]
    fn test_explicit_mime_type_is_kept() {
        let attachment = Attachment::new("gs://bucket/scan", "image/webp");
        assert!(attachment.is_image());
        assert_eq!(attachment.mime_type, "image/webp");
    }
}
