//! 状态存储 - 基础设施层
//!
//! 生命周期状态的唯一来源。各个流程只通过 [`StatusStore`] 读写，
//! 每一列只归一种流程写，所以这里不需要跨行事务，
//! 唯一的例外是出卷结果必须整体提交（[`StatusStore::commit_exam_draft`]）。

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::{
    Assignment, Class, Exam, ExamDraft, ExamResult, ExamStatus, Grade, Material,
    MaterialStatus, QuestionSet, StoredFile, Student, StudentProfile,
};

/// 状态存储能力
#[async_trait]
pub trait StatusStore: Send + Sync {
    // ---------- 网关创建的骨架记录 ----------
    async fn insert_class(&self, class: Class) -> AppResult<()>;
    async fn insert_student(&self, student: Student) -> AppResult<()>;
    async fn insert_material(&self, material: Material) -> AppResult<()>;
    async fn insert_exam(&self, exam: Exam) -> AppResult<()>;
    /// 上传答卷：不存在则创建，存在则回到 grading
    async fn submit_answer(
        &self,
        exam_id: &str,
        student_id: &str,
        files: Vec<StoredFile>,
    ) -> AppResult<Assignment>;

    // ---------- 读取 ----------
    async fn get_class(&self, class_id: &str) -> AppResult<Option<Class>>;
    async fn get_student(&self, student_id: &str) -> AppResult<Option<Student>>;
    /// 按入班先后排序
    async fn students_in_class(&self, class_id: &str) -> AppResult<Vec<Student>>;
    async fn get_material(&self, material_id: &str) -> AppResult<Option<Material>>;
    /// 按传入顺序返回，找不到的 ID 直接跳过
    async fn materials_by_ids(&self, ids: &[String]) -> AppResult<Vec<Material>>;
    /// 考试关联的材料，最新的在前
    async fn materials_for_exam(&self, exam_id: &str, limit: usize) -> AppResult<Vec<Material>>;
    /// 班级最近的材料，最新的在前
    async fn recent_class_materials(&self, class_id: &str, limit: usize)
        -> AppResult<Vec<Material>>;
    async fn get_exam(&self, exam_id: &str) -> AppResult<Option<Exam>>;
    async fn question_sets_for_exam(&self, exam_id: &str) -> AppResult<Vec<QuestionSet>>;
    async fn get_question_set(&self, question_set_id: &str) -> AppResult<Option<QuestionSet>>;
    async fn get_assignment(&self, exam_id: &str, student_id: &str)
        -> AppResult<Option<Assignment>>;
    async fn assignments_for_exam(&self, exam_id: &str) -> AppResult<Vec<Assignment>>;
    /// 某场考试的结果（未评分时 score 为空）
    async fn exam_result(&self, student_id: &str, exam_id: &str) -> AppResult<Option<ExamResult>>;
    /// 最近已评分的结果，graded_at 倒序
    async fn recent_results(&self, student_id: &str, limit: usize) -> AppResult<Vec<ExamResult>>;
    async fn get_profile(&self, student_id: &str) -> AppResult<Option<StudentProfile>>;

    // ---------- 各流程独占的写入 ----------
    /// 材料整理：写内容并置为 done
    async fn complete_material(&self, material_id: &str, content: Option<String>)
        -> AppResult<()>;
    /// 出卷：原子写入题目集、作答记录并把考试置为 done
    async fn commit_exam_draft(&self, draft: ExamDraft) -> AppResult<()>;
    /// 评分：写分数并置为 graded
    async fn record_grade(&self, exam_id: &str, student_id: &str, grade: Grade) -> AppResult<()>;
    /// 画像：不存在则插入，存在则整体覆盖
    async fn upsert_profile(&self, profile: StudentProfile) -> AppResult<()>;
}

#[derive(Default)]
struct Tables {
    classes: HashMap<String, Class>,
    /// 插入顺序即创建顺序
    students: Vec<Student>,
    materials: Vec<Material>,
    exams: HashMap<String, Exam>,
    question_sets: Vec<QuestionSet>,
    assignments: Vec<Assignment>,
    profiles: HashMap<String, StudentProfile>,
}

impl Tables {
    fn assignment_mut(&mut self, exam_id: &str, student_id: &str) -> Option<&mut Assignment> {
        self.assignments
            .iter_mut()
            .find(|a| a.exam_id == exam_id && a.student_id == student_id)
    }

    fn result_of(&self, assignment: &Assignment) -> Option<ExamResult> {
        let exam = self.exams.get(&assignment.exam_id)?;
        Some(ExamResult {
            exam_id: exam.id.clone(),
            title: exam.title.clone(),
            score: assignment.score,
            feedback: assignment.feedback.clone(),
            graded_at: assignment.graded_at,
        })
    }
}

/// 进程内存储
///
/// 一把读写锁保护所有表，单个方法内的多行写入天然是原子的。
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn insert_class(&self, class: Class) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.classes.insert(class.id.clone(), class);
        Ok(())
    }

    async fn insert_student(&self, student: Student) -> AppResult<()> {
        let mut t = self.tables.write().await;
        if !t.classes.contains_key(&student.class_id) {
            return Err(AppError::not_found(format!("class {}", student.class_id)));
        }
        t.students.retain(|s| s.id != student.id);
        t.students.push(student);
        Ok(())
    }

    async fn insert_material(&self, material: Material) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.materials.retain(|m| m.id != material.id);
        t.materials.push(material);
        Ok(())
    }

    async fn insert_exam(&self, exam: Exam) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.exams.insert(exam.id.clone(), exam);
        Ok(())
    }

    async fn submit_answer(
        &self,
        exam_id: &str,
        student_id: &str,
        files: Vec<StoredFile>,
    ) -> AppResult<Assignment> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.assignment_mut(exam_id, student_id) {
            existing.submit(files);
            return Ok(existing.clone());
        }

        let mut assignment = Assignment {
            exam_id: exam_id.to_string(),
            student_id: student_id.to_string(),
            question_set_id: None,
            status: crate::models::AssignmentStatus::NotSubmitted,
            answer_files: Vec::new(),
            score: None,
            feedback: None,
            graded_at: None,
        };
        assignment.submit(files);
        t.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn get_class(&self, class_id: &str) -> AppResult<Option<Class>> {
        Ok(self.tables.read().await.classes.get(class_id).cloned())
    }

    async fn get_student(&self, student_id: &str) -> AppResult<Option<Student>> {
        let t = self.tables.read().await;
        Ok(t.students.iter().find(|s| s.id == student_id).cloned())
    }

    async fn students_in_class(&self, class_id: &str) -> AppResult<Vec<Student>> {
        let t = self.tables.read().await;
        Ok(t.students
            .iter()
            .filter(|s| s.class_id == class_id)
            .cloned()
            .collect())
    }

    async fn get_material(&self, material_id: &str) -> AppResult<Option<Material>> {
        let t = self.tables.read().await;
        Ok(t.materials.iter().find(|m| m.id == material_id).cloned())
    }

    async fn materials_by_ids(&self, ids: &[String]) -> AppResult<Vec<Material>> {
        let t = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| t.materials.iter().find(|m| &m.id == id).cloned())
            .collect())
    }

    async fn materials_for_exam(&self, exam_id: &str, limit: usize) -> AppResult<Vec<Material>> {
        let t = self.tables.read().await;
        let Some(exam) = t.exams.get(exam_id) else {
            return Ok(Vec::new());
        };
        Ok(t.materials
            .iter()
            .rev()
            .filter(|m| exam.material_ids.contains(&m.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_class_materials(
        &self,
        class_id: &str,
        limit: usize,
    ) -> AppResult<Vec<Material>> {
        let t = self.tables.read().await;
        Ok(t.materials
            .iter()
            .rev()
            .filter(|m| m.class_id == class_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_exam(&self, exam_id: &str) -> AppResult<Option<Exam>> {
        Ok(self.tables.read().await.exams.get(exam_id).cloned())
    }

    async fn question_sets_for_exam(&self, exam_id: &str) -> AppResult<Vec<QuestionSet>> {
        let t = self.tables.read().await;
        Ok(t.question_sets
            .iter()
            .filter(|q| q.exam_id == exam_id)
            .cloned()
            .collect())
    }

    async fn get_question_set(&self, question_set_id: &str) -> AppResult<Option<QuestionSet>> {
        let t = self.tables.read().await;
        Ok(t.question_sets
            .iter()
            .find(|q| q.id == question_set_id)
            .cloned())
    }

    async fn get_assignment(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> AppResult<Option<Assignment>> {
        let t = self.tables.read().await;
        Ok(t.assignments
            .iter()
            .find(|a| a.exam_id == exam_id && a.student_id == student_id)
            .cloned())
    }

    async fn assignments_for_exam(&self, exam_id: &str) -> AppResult<Vec<Assignment>> {
        let t = self.tables.read().await;
        Ok(t.assignments
            .iter()
            .filter(|a| a.exam_id == exam_id)
            .cloned()
            .collect())
    }

    async fn exam_result(&self, student_id: &str, exam_id: &str) -> AppResult<Option<ExamResult>> {
        let t = self.tables.read().await;
        Ok(t.assignments
            .iter()
            .find(|a| a.exam_id == exam_id && a.student_id == student_id)
            .and_then(|a| t.result_of(a)))
    }

    async fn recent_results(&self, student_id: &str, limit: usize) -> AppResult<Vec<ExamResult>> {
        let t = self.tables.read().await;
        let mut results: Vec<ExamResult> = t
            .assignments
            .iter()
            .filter(|a| a.student_id == student_id && a.score.is_some())
            .filter_map(|a| t.result_of(a))
            .collect();
        results.sort_by(|a, b| b.graded_at.cmp(&a.graded_at));
        results.truncate(limit);
        Ok(results)
    }

    async fn get_profile(&self, student_id: &str) -> AppResult<Option<StudentProfile>> {
        Ok(self.tables.read().await.profiles.get(student_id).cloned())
    }

    async fn complete_material(
        &self,
        material_id: &str,
        content: Option<String>,
    ) -> AppResult<()> {
        let mut t = self.tables.write().await;
        let material = t
            .materials
            .iter_mut()
            .find(|m| m.id == material_id)
            .ok_or_else(|| AppError::not_found(format!("material {}", material_id)))?;
        material.content = content;
        material.status = MaterialStatus::Done;
        Ok(())
    }

    async fn commit_exam_draft(&self, draft: ExamDraft) -> AppResult<()> {
        let mut t = self.tables.write().await;
        if !t.exams.contains_key(&draft.exam_id) {
            return Err(AppError::not_found(format!("exam {}", draft.exam_id)));
        }

        // 重投时替换上一次的题目集
        t.question_sets.retain(|q| q.exam_id != draft.exam_id);
        t.question_sets.extend(draft.question_sets);

        for (student_id, question_set_id) in draft.assignments {
            match t.assignment_mut(&draft.exam_id, &student_id) {
                Some(existing) => existing.question_set_id = Some(question_set_id),
                None => t.assignments.push(Assignment::not_submitted(
                    draft.exam_id.clone(),
                    student_id,
                    question_set_id,
                )),
            }
        }

        if let Some(exam) = t.exams.get_mut(&draft.exam_id) {
            exam.status = ExamStatus::Done;
            exam.unique_per_student = draft.unique_per_student;
        }
        Ok(())
    }

    async fn record_grade(&self, exam_id: &str, student_id: &str, grade: Grade) -> AppResult<()> {
        let mut t = self.tables.write().await;
        let assignment = t.assignment_mut(exam_id, student_id).ok_or_else(|| {
            AppError::not_found(format!("assignment {}/{}", exam_id, student_id))
        })?;
        assignment.record_grade(&grade);
        Ok(())
    }

    async fn upsert_profile(&self, profile: StudentProfile) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.profiles.insert(profile.student_id.clone(), profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssignmentStatus, Attachment};
    use chrono::{Duration, Utc};

    fn material(id: &str, class_id: &str) -> Material {
        Material {
            id: id.to_string(),
            class_id: class_id.to_string(),
            title: format!("title {}", id),
            description: None,
            attachments: vec![Attachment::from_uri(format!("gs://b/{}.pdf", id))],
            status: MaterialStatus::Pending,
            content: None,
            created_at: Utc::now(),
        }
    }

    fn exam(id: &str, material_ids: &[&str]) -> Exam {
        Exam {
            id: id.to_string(),
            class_id: "c1".to_string(),
            title: format!("exam {}", id),
            duration_minutes: 90,
            unique_per_student: false,
            status: ExamStatus::Pending,
            material_ids: material_ids.iter().map(|s| s.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_materials_by_ids_keeps_requested_order() {
        let store = MemoryStore::new();
        for id in ["m1", "m2", "m3"] {
            store.insert_material(material(id, "c1")).await.unwrap();
        }

        let ids = vec!["m3".to_string(), "missing".to_string(), "m1".to_string()];
        let found = store.materials_by_ids(&ids).await.unwrap();
        let found: Vec<&str> = found.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(found, vec!["m3", "m1"]);
    }

    #[tokio::test]
    async fn test_materials_for_exam_most_recent_first() {
        let store = MemoryStore::new();
        for id in ["m1", "m2", "m3"] {
            store.insert_material(material(id, "c1")).await.unwrap();
        }
        store.insert_exam(exam("e1", &["m1", "m2", "m3"])).await.unwrap();

        let found = store.materials_for_exam("e1", 2).await.unwrap();
        let found: Vec<&str> = found.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(found, vec!["m3", "m2"]);
    }

    #[tokio::test]
    async fn test_commit_exam_draft_is_idempotent() {
        let store = MemoryStore::new();
        store.insert_exam(exam("e1", &[])).await.unwrap();

        for round in 0..2 {
            let qs_id = format!("q{}", round);
            store
                .commit_exam_draft(ExamDraft {
                    exam_id: "e1".to_string(),
                    unique_per_student: false,
                    question_sets: vec![QuestionSet {
                        id: qs_id.clone(),
                        exam_id: "e1".to_string(),
                        student_id: None,
                        content: "soal".to_string(),
                    }],
                    assignments: vec![("s1".to_string(), qs_id)],
                })
                .await
                .unwrap();
        }

        assert_eq!(store.question_sets_for_exam("e1").await.unwrap().len(), 1);
        let assignments = store.assignments_for_exam("e1").await.unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].question_set_id.as_deref(), Some("q1"));
        assert_eq!(
            store.get_exam("e1").await.unwrap().unwrap().status,
            ExamStatus::Done
        );
    }

    #[tokio::test]
    async fn test_commit_for_unknown_exam_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .commit_exam_draft(ExamDraft {
                exam_id: "nope".to_string(),
                unique_per_student: false,
                question_sets: vec![],
                assignments: vec![],
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_recent_results_ordered_by_graded_at() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (i, id) in ["e1", "e2", "e3"].iter().enumerate() {
            store.insert_exam(exam(id, &[])).await.unwrap();
            store.submit_answer(id, "s1", vec![]).await.unwrap();
            store
                .record_grade(
                    id,
                    "s1",
                    Grade {
                        score: 70 + i as u8,
                        feedback: "ok".to_string(),
                        graded_at: now + Duration::minutes(i as i64),
                    },
                )
                .await
                .unwrap();
        }
        // 未评分的不算
        store.insert_exam(exam("e4", &[])).await.unwrap();
        store.submit_answer("e4", "s1", vec![]).await.unwrap();

        let recent = store.recent_results("s1", 2).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|r| r.exam_id.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e2"]);
    }

    #[tokio::test]
    async fn test_submit_answer_creates_grading_row() {
        let store = MemoryStore::new();
        let assignment = store
            .submit_answer("e1", "s1", vec![StoredFile::with_uri("gs://a/1.png")])
            .await
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Grading);
        assert!(assignment.question_set_id.is_none());
    }
}
