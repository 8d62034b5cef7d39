#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use classroom_pipeline::error::{AppError, AppResult};
use classroom_pipeline::infrastructure::{Delivery, MessageBus, StatusStore};
use classroom_pipeline::models::{
    Attachment, Class, Exam, ExamDraft, ExamStatus, Material, MaterialStatus, QuestionSet,
    StoredFile, Student, Topic,
};
use classroom_pipeline::services::{ContentGenerator, Prompt};
use classroom_pipeline::Config;

/// 生成调用的种类，按系统提示词区分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Material,
    Exam,
    Grading,
    Profile,
}

impl Kind {
    fn of(prompt: &Prompt) -> Self {
        if prompt.system.contains("learning-material designer") {
            Kind::Material
        } else if prompt.system.contains("assembling an exam") {
            Kind::Exam
        } else if prompt.system.contains("exam grader") {
            Kind::Grading
        } else {
            Kind::Profile
        }
    }
}

/// 预设的模型回复
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Empty,
    Fail,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: Kind,
    pub user: String,
    pub attachments: Vec<Attachment>,
}

/// 按调用种类返回预设回复的生成器
pub struct ScriptedGenerator {
    material: Reply,
    exam: Reply,
    grading: Reply,
    profile: Reply,
    /// 出卷提示词里带这个学生名字时返回空
    fail_exam_for: Option<String>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            material: Reply::text("Key concepts: chlorophyll absorbs light."),
            exam: Reply::text("1. What does chlorophyll absorb?\n2. Explain photosynthesis."),
            grading: Reply::text("```json\n{\"score\": 85, \"feedback\": \"Good work\"}\n```"),
            profile: Reply::text(
                r#"{"overview": "Steady progress", "strengths": ["biology"], "challenges": ["essays"]}"#,
            ),
            fail_exam_for: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn material(mut self, reply: Reply) -> Self {
        self.material = reply;
        self
    }

    pub fn exam(mut self, reply: Reply) -> Self {
        self.exam = reply;
        self
    }

    pub fn grading(mut self, reply: Reply) -> Self {
        self.grading = reply;
        self
    }

    pub fn profile(mut self, reply: Reply) -> Self {
        self.profile = reply;
        self
    }

    pub fn fail_exam_for(mut self, name: &str) -> Self {
        self.fail_exam_for = Some(name.to_string());
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self, kind: Kind) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &Prompt,
        attachments: &[Attachment],
    ) -> AppResult<Option<String>> {
        let kind = Kind::of(prompt);
        self.calls.lock().unwrap().push(Call {
            kind,
            user: prompt.user.clone(),
            attachments: attachments.to_vec(),
        });

        if kind == Kind::Exam {
            if let Some(name) = &self.fail_exam_for {
                if prompt.user.contains(&format!("Target student: {}", name)) {
                    return Ok(None);
                }
            }
        }

        let reply = match kind {
            Kind::Material => &self.material,
            Kind::Exam => &self.exam,
            Kind::Grading => &self.grading,
            Kind::Profile => &self.profile,
        };
        match reply {
            Reply::Text(text) => Ok(Some(text.clone())),
            Reply::Empty => Ok(None),
            Reply::Fail => Err(AppError::generator("scripted failure")),
        }
    }
}

/// 发布总是失败的总线
pub struct BrokenBus;

#[async_trait]
impl MessageBus for BrokenBus {
    async fn publish(&self, topic: Topic, _data: Vec<u8>) -> AppResult<()> {
        Err(AppError::notify(format!("topic {} unavailable", topic)))
    }

    async fn consume(&self, _topic: Topic) -> Option<Delivery> {
        None
    }

    async fn redeliver(&self, _delivery: Delivery, _delay: Duration) -> AppResult<()> {
        Ok(())
    }

    async fn ack(&self, _delivery: &Delivery) {}
}

/// 重投很快、次数很少的配置
pub fn test_config() -> Config {
    Config {
        retry_backoff_base_ms: 1,
        retry_backoff_max_ms: 5,
        max_delivery_attempts: 2,
        not_found_max_attempts: 2,
        message_timeout_secs: 5,
        ..Config::default()
    }
}

pub async fn seed_class(store: &dyn StatusStore, names: &[&str]) -> (Class, Vec<Student>) {
    let class = Class {
        id: "class-1".to_string(),
        name: "Kelas 8A".to_string(),
        subject: "IPA".to_string(),
    };
    store.insert_class(class.clone()).await.unwrap();

    let mut students = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let student = Student {
            id: format!("student-{}", i + 1),
            class_id: class.id.clone(),
            name: name.to_string(),
            student_code: None,
            created_at: Utc::now(),
        };
        store.insert_student(student.clone()).await.unwrap();
        students.push(student);
    }
    (class, students)
}

pub async fn seed_material(store: &dyn StatusStore, class_id: &str, id: &str, title: &str) -> Material {
    let material = Material {
        id: id.to_string(),
        class_id: class_id.to_string(),
        title: title.to_string(),
        description: None,
        attachments: vec![Attachment::from_uri(format!("gs://materials/{}.pdf", id))],
        status: MaterialStatus::Done,
        content: Some(format!("{} content", title)),
        created_at: Utc::now(),
    };
    store.insert_material(material.clone()).await.unwrap();
    material
}

pub async fn seed_pending_exam(store: &dyn StatusStore, class_id: &str, material_ids: &[&str]) -> Exam {
    let exam = Exam {
        id: "exam-1".to_string(),
        class_id: class_id.to_string(),
        title: "Ulangan Bab 1".to_string(),
        duration_minutes: 90,
        unique_per_student: false,
        status: ExamStatus::Pending,
        material_ids: material_ids.iter().map(|s| s.to_string()).collect(),
        created_at: Utc::now(),
    };
    store.insert_exam(exam.clone()).await.unwrap();
    exam
}

/// 一个已出卷、学生已提交答卷的考试
pub async fn seed_submission(store: &dyn StatusStore) -> (Exam, Student) {
    let (class, students) = seed_class(store, &["Budi"]).await;
    seed_material(store, &class.id, "m1", "Fotosintesis").await;
    let exam = seed_pending_exam(store, &class.id, &["m1"]).await;
    let student = students[0].clone();

    store
        .commit_exam_draft(ExamDraft {
            exam_id: exam.id.clone(),
            unique_per_student: false,
            question_sets: vec![QuestionSet {
                id: "qs-1".to_string(),
                exam_id: exam.id.clone(),
                student_id: None,
                content: "1. What does chlorophyll absorb?".to_string(),
            }],
            assignments: vec![(student.id.clone(), "qs-1".to_string())],
        })
        .await
        .unwrap();
    store
        .submit_answer(
            &exam.id,
            &student.id,
            vec![
                StoredFile::with_uri("gs://answers/budi.png"),
                StoredFile::default(),
            ],
        )
        .await
        .unwrap();
    (exam, student)
}
