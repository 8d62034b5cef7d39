//! 结构化输出解析 - 业务能力层
//!
//! 模型返回的 JSON 经常被包在 markdown 代码块里，或者前后带说明文字。
//! 这里只负责"把文本变成 JSON / 领域字段"，解析不了就明确返回错误或空值，
//! 由各流程决定如何降级。

use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

use crate::error::{AppError, AppResult};
use crate::models::ProfileDraft;

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)```").expect("valid regex"))
}

/// 从模型输出中提取 JSON
pub fn extract_json(text: &str) -> AppResult<JsonValue> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return Ok(value);
    }

    if let Some(inner) = fenced_block().captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(value) = serde_json::from_str::<JsonValue>(inner.as_str().trim()) {
            return Ok(value);
        }
    }

    // 最后尝试第一个 `{` 到最后一个 `}`
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<JsonValue>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(AppError::generator(format!(
        "无法解析结构化输出: {}",
        crate::utils::truncate_text(trimmed, 80)
    )))
}

/// 解析分数：数字或数字字符串，四舍五入后截断到 [0, 100]
///
/// 缺失时为 0；不是数字时返回 None（调用方使用兜底反馈）。
pub fn parse_score(value: Option<&JsonValue>) -> Option<u8> {
    let raw = match value {
        None | Some(JsonValue::Null) => 0.0,
        Some(JsonValue::Number(n)) => n.as_f64()?,
        Some(JsonValue::String(s)) => s.trim().trim_end_matches("/100").trim().parse::<f64>().ok()?,
        Some(_) => return None,
    };

    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

/// 宽松解析画像草稿，类型不对的字段视为空
pub fn parse_profile_draft(value: &JsonValue) -> ProfileDraft {
    let overview = value
        .get("overview")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    ProfileDraft {
        overview,
        strengths: string_list(value.get("strengths")),
        challenges: string_list(value.get("challenges")),
    }
}

fn string_list(value: Option<&JsonValue>) -> Vec<String> {
    value
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json(r#"{"score": 80, "feedback": "bagus"}"#).unwrap();
        assert_eq!(value["score"], json!(80));
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Berikut hasilnya:\n```json\n{\"score\": \"75\", \"feedback\": \"ok\"}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["score"], json!("75"));
    }

    #[test]
    fn test_extract_embedded_json() {
        let value = extract_json("hasil: {\"overview\": \"x\"} selesai").unwrap();
        assert_eq!(value["overview"], json!("x"));
    }

    #[test]
    fn test_extract_garbage_fails() {
        assert!(matches!(
            extract_json("tidak ada json di sini"),
            Err(AppError::Generator(_))
        ));
    }

    #[test]
    fn test_parse_score_clamps() {
        assert_eq!(parse_score(Some(&json!("150"))), Some(100));
        assert_eq!(parse_score(Some(&json!(-5))), Some(0));
        assert_eq!(parse_score(Some(&json!(87.6))), Some(88));
        assert_eq!(parse_score(Some(&json!("90/100"))), Some(90));
        assert_eq!(parse_score(None), Some(0));
    }

    #[test]
    fn test_parse_score_non_numeric() {
        assert_eq!(parse_score(Some(&json!("sangat baik"))), None);
        assert_eq!(parse_score(Some(&json!({"value": 3}))), None);
    }

    #[test]
    fn test_parse_profile_draft_is_lenient() {
        let draft = parse_profile_draft(&json!({
            "overview": "  Rajin  ",
            "strengths": ["aljabar", 3, ""],
            "challenges": "bukan array"
        }));
        assert_eq!(draft.overview, "Rajin");
        assert_eq!(draft.strengths, vec!["aljabar".to_string()]);
        assert!(draft.challenges.is_empty());
    }
}
