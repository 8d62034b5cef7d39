//! 消息契约
//!
//! 所有经过消息总线的数据都在这里定义和解码。
//! 发送方一律写 [`Envelope`]（带 schema_version 的标签化消息）；
//! 接收方额外兼容 Pub/Sub push 包装和旧版不带版本号的裸 payload。

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use super::attachment::Attachment;
use crate::error::{AppError, AppResult};

/// 当前消息版本
pub const SCHEMA_VERSION: u32 = 1;

/// 消息主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "material.ready")]
    MaterialReady,
    #[serde(rename = "exam.requested")]
    ExamRequested,
    #[serde(rename = "grade.requested")]
    GradeRequested,
    #[serde(rename = "profile.refresh")]
    ProfileRefresh,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::MaterialReady,
        Topic::ExamRequested,
        Topic::GradeRequested,
        Topic::ProfileRefresh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::MaterialReady => "material.ready",
            Topic::ExamRequested => "exam.requested",
            Topic::GradeRequested => "grade.requested",
            Topic::ProfileRefresh => "profile.refresh",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `material.ready`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialReady {
    #[serde(default)]
    pub material_id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// 旧版网关只发 URI 列表
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gcs_uris: Vec<String>,
}

impl MaterialReady {
    /// 合并新旧两种写法，过滤掉空 URI
    pub fn attachment_refs(&self) -> Vec<Attachment> {
        self.attachments
            .iter()
            .cloned()
            .chain(self.gcs_uris.iter().map(Attachment::from_uri))
            .filter(|a| !a.uri.trim().is_empty())
            .collect()
    }
}

/// 出卷参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSettings {
    /// 选择题数量
    pub mcq: u32,
    /// 问答题数量
    pub essay: u32,
    #[serde(default)]
    pub unique_per_student: bool,
}

/// `exam.requested`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRequested {
    pub exam_id: String,
    pub class_id: String,
    #[serde(default)]
    pub material_ids: Vec<String>,
    pub settings: ExamSettings,
}

/// `grade.requested`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequested {
    pub exam_id: String,
    pub student_id: String,
}

/// `profile.refresh`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRefresh {
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
    /// 学生表里查不到姓名时使用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
}

/// 标签化消息体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    #[serde(rename = "material.ready")]
    MaterialReady(MaterialReady),
    #[serde(rename = "exam.requested")]
    ExamRequested(ExamRequested),
    #[serde(rename = "grade.requested")]
    GradeRequested(GradeRequested),
    #[serde(rename = "profile.refresh")]
    ProfileRefresh(ProfileRefresh),
}

impl Message {
    pub fn topic(&self) -> Topic {
        match self {
            Message::MaterialReady(_) => Topic::MaterialReady,
            Message::ExamRequested(_) => Topic::ExamRequested,
            Message::GradeRequested(_) => Topic::GradeRequested,
            Message::ProfileRefresh(_) => Topic::ProfileRefresh,
        }
    }

    /// 按订阅主题解码不带版本号的旧版 payload
    fn from_legacy(topic: Topic, value: JsonValue) -> AppResult<Self> {
        let message = match topic {
            Topic::MaterialReady => Message::MaterialReady(serde_json::from_value(value)?),
            Topic::ExamRequested => Message::ExamRequested(serde_json::from_value(value)?),
            Topic::GradeRequested => Message::GradeRequested(serde_json::from_value(value)?),
            Topic::ProfileRefresh => Message::ProfileRefresh(serde_json::from_value(value)?),
        };
        Ok(message)
    }
}

/// 带版本号的消息信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub schema_version: u32,
    pub message: Message,
}

impl Envelope {
    pub fn new(message: Message) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            message,
        }
    }

    pub fn topic(&self) -> Topic {
        self.message.topic()
    }

    pub fn encode(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AppError::notify(format!("encode failed: {}", e)))
    }

    /// 解码一条投递到 `topic` 订阅上的消息
    ///
    /// 任何无法识别的形状都返回 `Validation`，由调度器直接拒绝，不再重投。
    pub fn decode(topic: Topic, bytes: &[u8]) -> AppResult<Self> {
        let value: JsonValue = serde_json::from_slice(bytes)
            .map_err(|e| AppError::validation(format!("malformed payload: {}", e)))?;
        let value = unwrap_push(value)?;

        let envelope = if value.get("schema_version").is_some() {
            let version = value
                .get("schema_version")
                .and_then(JsonValue::as_u64)
                .ok_or_else(|| AppError::validation("malformed payload: bad schema_version"))?;
            if version == 0 || version > u64::from(SCHEMA_VERSION) {
                return Err(AppError::validation(format!(
                    "unsupported schema_version {} (max {})",
                    version, SCHEMA_VERSION
                )));
            }
            serde_json::from_value::<Envelope>(value)?
        } else {
            Envelope::new(Message::from_legacy(topic, value)?)
        };

        if envelope.topic() != topic {
            return Err(AppError::validation(format!(
                "message type {} delivered on topic {}",
                envelope.topic(),
                topic
            )));
        }

        Ok(envelope)
    }
}

/// 拆开 Pub/Sub push 包装 `{"message": {"data": "<base64>"}}`
fn unwrap_push(value: JsonValue) -> AppResult<JsonValue> {
    let Some(data) = value
        .get("message")
        .and_then(|m| m.get("data"))
        .and_then(JsonValue::as_str)
    else {
        return Ok(value);
    };

    let raw = STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::validation(format!("malformed payload: bad base64 data: {}", e)))?;
    serde_json::from_slice(&raw)
        .map_err(|e| AppError::validation(format!("malformed payload: {}", e)))
}
