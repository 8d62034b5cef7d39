//! 考试、题目集与学生作答记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attachment::StoredFile;

/// 考试状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExamStatus {
    /// 题目尚未生成完毕，读取方不能假设题目已存在
    Pending,
    Done,
}

/// 考试
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    pub id: String,
    pub class_id: String,
    pub title: String,
    /// 考试时长（分钟）
    pub duration_minutes: u32,
    pub unique_per_student: bool,
    pub status: ExamStatus,
    pub material_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// 一份生成的题目集
///
/// `student_id` 为空表示全班共用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: String,
    pub exam_id: String,
    pub student_id: Option<String>,
    pub content: String,
}

/// 作答状态，只会 not-submitted → grading → graded 单向推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStatus {
    NotSubmitted,
    Grading,
    Graded,
}

/// 学生与考试的关联记录（exam_student）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub exam_id: String,
    pub student_id: String,
    pub question_set_id: Option<String>,
    pub status: AssignmentStatus,
    pub answer_files: Vec<StoredFile>,
    /// 0-100
    pub score: Option<u8>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// 出卷时创建的空记录
    pub fn not_submitted(
        exam_id: impl Into<String>,
        student_id: impl Into<String>,
        question_set_id: impl Into<String>,
    ) -> Self {
        Self {
            exam_id: exam_id.into(),
            student_id: student_id.into(),
            question_set_id: Some(question_set_id.into()),
            status: AssignmentStatus::NotSubmitted,
            answer_files: Vec::new(),
            score: None,
            feedback: None,
            graded_at: None,
        }
    }

    /// 上传答卷：进入 grading
    ///
    /// 已评分的记录重新上传时回到 grading，并清掉旧分数，
    /// 保证不会出现 graded 状态挂着过期分数的情况。
    pub fn submit(&mut self, files: Vec<StoredFile>) {
        self.answer_files = files;
        self.status = AssignmentStatus::Grading;
        self.score = None;
        self.feedback = None;
        self.graded_at = None;
    }

    /// 写入评分结果
    pub fn record_grade(&mut self, grade: &Grade) {
        self.status = AssignmentStatus::Graded;
        self.score = Some(grade.score);
        self.feedback = Some(grade.feedback.clone());
        self.graded_at = Some(grade.graded_at);
    }
}

/// 评分结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    pub score: u8,
    pub feedback: String,
    pub graded_at: DateTime<Utc>,
}

/// 出卷流程一次性提交的结果
///
/// 存储层必须原子地写入：题目集、作答记录、考试状态 done。
#[derive(Debug, Clone)]
pub struct ExamDraft {
    pub exam_id: String,
    /// 实际生效的模式（申请了 unique 但班级没人时为 false）
    pub unique_per_student: bool,
    pub question_sets: Vec<QuestionSet>,
    /// (student_id, question_set_id)
    pub assignments: Vec<(String, String)>,
}

/// 学生的一次考试结果，用于画像刷新
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamResult {
    pub exam_id: String,
    pub title: String,
    pub score: Option<u8>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graded(score: u8) -> Grade {
        Grade {
            score,
            feedback: "ok".to_string(),
            graded_at: Utc::now(),
        }
    }

    #[test]
    fn test_submit_moves_to_grading() {
        let mut assignment = Assignment::not_submitted("e1", "s1", "q1");
        assignment.submit(vec![StoredFile::with_uri("gs://a/s1.png")]);

        assert_eq!(assignment.status, AssignmentStatus::Grading);
        assert_eq!(assignment.answer_files.len(), 1);
    }

    #[test]
    fn test_resubmit_after_graded_clears_score() {
        let mut assignment = Assignment::not_submitted("e1", "s1", "q1");
        assignment.submit(vec![StoredFile::with_uri("gs://a/v1.png")]);
        assignment.record_grade(&graded(80));
        assert_eq!(assignment.status, AssignmentStatus::Graded);

        assignment.submit(vec![StoredFile::with_uri("gs://a/v2.png")]);

        assert_eq!(assignment.status, AssignmentStatus::Grading);
        assert_eq!(assignment.score, None);
        assert_eq!(assignment.feedback, None);
        assert!(assignment.graded_at.is_none());
        assert_eq!(assignment.question_set_id.as_deref(), Some("q1"));
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        let json = serde_json::to_string(&AssignmentStatus::NotSubmitted).unwrap();
        assert_eq!(json, "\"not-submitted\"");
    }
}
