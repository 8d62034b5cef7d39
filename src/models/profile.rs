use serde::{Deserialize, Serialize};

/// 学生画像
///
/// 首次刷新时懒创建，之后每次刷新整体覆盖。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    /// 与学生 ID 相同
    pub student_id: String,
    pub name: String,
    pub overview: String,
    pub strengths: Vec<String>,
    pub challenges: Vec<String>,
}

impl StudentProfile {
    /// 还没有画像时使用的默认值
    pub fn empty(student_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// 模型返回的画像草稿
///
/// 解析失败时为全空，合并时全部回退到旧值。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDraft {
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
}

impl ProfileDraft {
    pub fn is_empty(&self) -> bool {
        self.overview.trim().is_empty() && self.strengths.is_empty() && self.challenges.is_empty()
    }

    /// 非空字段覆盖旧值，空字段保留旧值
    pub fn merge_into(self, previous: &StudentProfile) -> StudentProfile {
        let overview = if self.overview.trim().is_empty() {
            previous.overview.clone()
        } else {
            self.overview
        };
        let strengths = if self.strengths.is_empty() {
            previous.strengths.clone()
        } else {
            self.strengths
        };
        let challenges = if self.challenges.is_empty() {
            previous.challenges.clone()
        } else {
            self.challenges
        };

        StudentProfile {
            student_id: previous.student_id.clone(),
            name: previous.name.clone(),
            overview,
            strengths,
            challenges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn previous() -> StudentProfile {
        StudentProfile {
            student_id: "s1".to_string(),
            name: "Budi".to_string(),
            overview: "old overview".to_string(),
            strengths: vec!["fractions".to_string()],
            challenges: vec!["geometry".to_string()],
        }
    }

    #[test]
    fn test_merge_only_overview() {
        let draft = ProfileDraft {
            overview: "X".to_string(),
            ..Default::default()
        };
        let merged = draft.merge_into(&previous());

        assert_eq!(merged.overview, "X");
        assert_eq!(merged.strengths, vec!["fractions".to_string()]);
        assert_eq!(merged.challenges, vec!["geometry".to_string()]);
    }

    #[test]
    fn test_merge_empty_draft_keeps_everything() {
        let merged = ProfileDraft::default().merge_into(&previous());
        assert_eq!(merged, previous());
    }

    #[test]
    fn test_blank_overview_counts_as_empty() {
        let draft = ProfileDraft {
            overview: "   ".to_string(),
            strengths: vec!["reading".to_string()],
            challenges: vec![],
        };
        assert!(!draft.is_empty());

        let merged = draft.merge_into(&previous());
        assert_eq!(merged.overview, "old overview");
        assert_eq!(merged.strengths, vec!["reading".to_string()]);
    }
}
