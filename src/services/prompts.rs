//! 提示词构建 - 业务能力层
//!
//! 只拼字符串，不调用模型。

use crate::models::{ExamResult, Material, StudentProfile};
use crate::utils::truncate_text;

/// 一次生成调用的提示词
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

const MATERIAL_SYSTEM: &str = "You are an expert teacher and learning-material designer. \
Turn the attached references (documents, images, diagrams) into teachable material: \
explain concepts step by step with concrete examples, describe diagrams and tables and \
connect them to the topic, and add short reflective questions or exercises when relevant. \
Write in the language of the source material.";

const EXAM_SYSTEM: &str = "You are a teacher assembling an exam from prepared material. \
Output only the questions, without any preamble, and number every question sequentially.";

const GRADING_SYSTEM: &str = "You are an automatic exam grader. \
Read the questions, then read the student's answer, which may be text or images of \
handwriting (read the text in images). Multiple choice: 10 points per correct answer. \
Essays: judge relevance, structure and completeness. \
Respond with JSON only: {\"score\": <number 0-100>, \"feedback\": \"<short reason>\"}.";

const PROFILE_SYSTEM: &str = "You are a teaching assistant. \
Produce a short, concrete summary of the student's profile.";

/// 材料整理：所有附件放在同一个请求里
pub fn material_prompt(title: Option<&str>) -> Prompt {
    let mut user = String::from(
        "Help me build teaching material from the attachments below.\n\
         Goal: a summary of the key concepts that is easy to teach.\n\
         Where possible also include:\n\
         - a short explanation per section\n\
         - key points or example questions\n\
         - a learning activity or reflection",
    );
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        user.push_str(&format!("\n\nMaterial title: {}", title));
    }

    Prompt {
        system: MATERIAL_SYSTEM.to_string(),
        user,
        temperature: 0.2,
    }
}

/// 按给定顺序拼接材料标题和内容
pub fn material_digest(materials: &[Material]) -> String {
    materials
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "Material {}: {}\n{}",
                i + 1,
                m.title,
                m.content.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 出卷；`target_name` 只是个性化信号
pub fn exam_prompt(digest: &str, target_name: Option<&str>, mcq: u32, essay: u32) -> Prompt {
    let material = match target_name {
        Some(name) => format!("{}\n\nTarget student: {}", digest, name),
        None => digest.to_string(),
    };

    Prompt {
        system: EXAM_SYSTEM.to_string(),
        user: format!(
            "material:\n{}\n\nCreate:\n- Multiple choice questions: {} (4 options each)\n- Essay questions: {}",
            material, mcq, essay
        ),
        temperature: 0.3,
    }
}

/// 评分：题目在文本里，答卷在附件里
pub fn grading_prompt(question: &str) -> Prompt {
    Prompt {
        system: GRADING_SYSTEM.to_string(),
        user: format!("questions: {}", question),
        temperature: 0.2,
    }
}

/// 画像刷新
pub fn profile_prompt(
    previous: &StudentProfile,
    recent: &[ExamResult],
    materials: &[Material],
) -> Prompt {
    let or_none = |s: String| if s.trim().is_empty() { "(none)".to_string() } else { s };

    let previous_text = format!(
        "Previously:\nOverview: {}\nStrengths: {}\nChallenges: {}",
        or_none(previous.overview.clone()),
        or_none(previous.strengths.join(", ")),
        or_none(previous.challenges.join(", "))
    );

    let recent_text = recent
        .iter()
        .map(|r| {
            let score = r.score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
            match r.feedback.as_deref().filter(|f| !f.is_empty()) {
                Some(feedback) => format!("- {}: {}/100 ({})", r.title, score, feedback),
                None => format!("- {}: {}/100", r.title, score),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let materials_text = materials
        .iter()
        .map(|m| match m.content.as_deref().filter(|c| !c.is_empty()) {
            Some(content) => format!("- {} ({})", m.title, truncate_text(content, 200)),
            None => format!("- {}", m.title),
        })
        .collect::<Vec<_>>()
        .join("\n");

    Prompt {
        system: PROFILE_SYSTEM.to_string(),
        user: format!(
            "Update the student profile summary from the data below.\n\n\
             Student name: {}\n\n{}\n\nSupporting material:\n{}\n\nLatest exam results:\n{}\n\n\
             Output JSON with keys: overview (string), strengths (array of strings), \
             challenges (array of strings). No other text.",
            previous.name,
            previous_text,
            or_none(materials_text),
            or_none(recent_text)
        ),
        temperature: 0.3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MaterialStatus;
    use chrono::Utc;

    fn material(title: &str, content: Option<&str>) -> Material {
        Material {
            id: title.to_lowercase(),
            class_id: "c1".to_string(),
            title: title.to_string(),
            description: None,
            attachments: vec![],
            status: MaterialStatus::Done,
            content: content.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_material_digest_keeps_order() {
        let digest = material_digest(&[
            material("Fotosintesis", Some("klorofil")),
            material("Respirasi", None),
        ]);
        assert_eq!(digest, "Material 1: Fotosintesis\nklorofil\n\nMaterial 2: Respirasi\n");
    }

    #[test]
    fn test_exam_prompt_names_target() {
        let shared = exam_prompt("digest", None, 5, 2);
        let unique = exam_prompt("digest", Some("Budi"), 5, 2);

        assert!(!shared.user.contains("Target student"));
        assert!(unique.user.contains("Target student: Budi"));
        assert!(unique.user.contains("Multiple choice questions: 5"));
        assert!(unique.user.contains("Essay questions: 2"));
    }

    #[test]
    fn test_profile_prompt_marks_missing_sections() {
        let prompt = profile_prompt(&StudentProfile::empty("s1", "Sari"), &[], &[]);
        assert!(prompt.user.contains("Student name: Sari"));
        assert!(prompt.user.contains("Overview: (none)"));
        assert!(prompt.user.contains("Latest exam results:\n(none)"));
    }
}
