use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 班级
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    pub id: String,
    pub name: String,
    pub subject: String,
}

/// 学生（按加入班级的先后排序）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_code: Option<String>,
    pub created_at: DateTime<Utc>,
}
