use crate::models::attachment::Attachment;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 本地演示用的班级种子数据（TOML）
///
/// ```toml
/// [class]
/// name = "Kelas 8A"
/// subject = "IPA"
///
/// [[students]]
/// name = "Budi"
///
/// [[materials]]
/// title = "Sistem Pencernaan"
/// attachments = [{ uri = "gs://bucket/bab3.pdf", mimeType = "application/pdf" }]
///
/// [[exams]]
/// title = "Ulangan Bab 3"
/// materials = ["Sistem Pencernaan"]
/// mcq = 5
/// essay = 2
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Seed {
    pub class: SeedClass,
    #[serde(default)]
    pub students: Vec<SeedStudent>,
    #[serde(default)]
    pub materials: Vec<SeedMaterial>,
    #[serde(default)]
    pub exams: Vec<SeedExam>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedClass {
    pub name: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedStudent {
    pub name: String,
    #[serde(default)]
    pub student_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedMaterial {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedExam {
    pub title: String,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    /// 按材料标题引用
    pub materials: Vec<String>,
    pub mcq: u32,
    pub essay: u32,
    #[serde(default)]
    pub unique_per_student: bool,
}

fn default_duration() -> u32 {
    90
}

/// 从 TOML 文件加载种子数据
pub async fn load_seed(path: &Path) -> Result<Seed> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取种子文件: {}", path.display()))?;

    parse_seed(&content).with_context(|| format!("无法解析种子文件: {}", path.display()))
}

pub fn parse_seed(content: &str) -> Result<Seed> {
    let seed: Seed = toml::from_str(content)?;

    for exam in &seed.exams {
        for title in &exam.materials {
            if !seed.materials.iter().any(|m| &m.title == title) {
                anyhow::bail!("考试 {} 引用了不存在的材料: {}", exam.title, title);
            }
        }
    }

    tracing::info!(
        "种子数据: 班级 {}, 学生 {} 人, 材料 {} 份, 考试 {} 场",
        seed.class.name,
        seed.students.len(),
        seed.materials.len(),
        seed.exams.len()
    );

    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
[class]
name = "Kelas 8A"
subject = "IPA"

[[students]]
name = "Budi"

[[students]]
name = "Sari"
student_code = "S-002"

[[materials]]
title = "Sistem Pencernaan"
attachments = [{ uri = "gs://bucket/bab3.pdf", mimeType = "application/pdf" }]

[[exams]]
title = "Ulangan Bab 3"
materials = ["Sistem Pencernaan"]
mcq = 5
essay = 2
"#;

    #[test]
    fn test_parse_seed() {
        let seed = parse_seed(SEED).unwrap();
        assert_eq!(seed.students.len(), 2);
        assert_eq!(seed.students[1].student_code.as_deref(), Some("S-002"));
        assert_eq!(seed.materials[0].attachments[0].mime_type, "application/pdf");
        assert_eq!(seed.exams[0].duration_minutes, 90);
        assert!(!seed.exams[0].unique_per_student);
    }

    #[test]
    fn test_unknown_material_reference_fails() {
        let broken = SEED.replace(r#"materials = ["Sistem Pencernaan"]"#, r#"materials = ["Bab 9"]"#);
        assert!(parse_seed(&broken).is_err());
    }
}
