//! 网关 - 编排层
//!
//! 创建各条链路的初始记录并发布第一条消息。记录先写，消息后发；
//! 发布失败只记录日志，记录保持 pending，与线上 API 的行为一致。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::{MessageBus, StatusStore};
use crate::models::{
    Assignment, Attachment, Class, Exam, ExamRequested, ExamSettings, ExamStatus, GradeRequested,
    Material, MaterialReady, MaterialStatus, Message, ProfileRefresh, StoredFile, Student,
};

pub struct Gateway {
    store: Arc<dyn StatusStore>,
    bus: Arc<dyn MessageBus>,
}

impl Gateway {
    pub fn new(store: Arc<dyn StatusStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self { store, bus }
    }

    pub async fn create_class(&self, name: &str, subject: &str) -> AppResult<Class> {
        if name.trim().is_empty() {
            return Err(AppError::validation("class name is required"));
        }
        let class = Class {
            id: new_id(),
            name: name.trim().to_string(),
            subject: subject.trim().to_string(),
        };
        self.store.insert_class(class.clone()).await?;
        info!("[gateway] 创建班级 {} ({})", class.name, class.id);
        Ok(class)
    }

    pub async fn enroll_student(
        &self,
        class_id: &str,
        name: &str,
        student_code: Option<&str>,
    ) -> AppResult<Student> {
        if name.trim().is_empty() {
            return Err(AppError::validation("student name is required"));
        }
        let student = Student {
            id: new_id(),
            class_id: class_id.to_string(),
            name: name.trim().to_string(),
            student_code: student_code.map(str::to_string),
            created_at: Utc::now(),
        };
        self.store.insert_student(student.clone()).await?;
        Ok(student)
    }

    /// 上传材料：pending 记录 + `material.ready`
    pub async fn upload_material(
        &self,
        class_id: &str,
        title: &str,
        description: Option<&str>,
        attachments: Vec<Attachment>,
    ) -> AppResult<Material> {
        if title.trim().is_empty() {
            return Err(AppError::validation("material title is required"));
        }
        self.require_class(class_id).await?;

        let material = Material {
            id: new_id(),
            class_id: class_id.to_string(),
            title: title.trim().to_string(),
            description: description.map(str::to_string),
            attachments,
            status: MaterialStatus::Pending,
            content: None,
            created_at: Utc::now(),
        };
        self.store.insert_material(material.clone()).await?;

        self.publish(Message::MaterialReady(MaterialReady {
            material_id: material.id.clone(),
            class_id: material.class_id.clone(),
            attachments: material.attachments.clone(),
            gcs_uris: Vec::new(),
        }))
        .await;
        Ok(material)
    }

    /// 申请出卷：pending 考试 + `exam.requested`
    pub async fn request_exam(
        &self,
        class_id: &str,
        title: &str,
        duration_minutes: u32,
        material_ids: Vec<String>,
        settings: ExamSettings,
    ) -> AppResult<Exam> {
        if material_ids.is_empty() {
            return Err(AppError::validation("at least one material is required"));
        }
        if title.trim().is_empty() {
            return Err(AppError::validation("exam title is required"));
        }
        self.require_class(class_id).await?;

        let exam = Exam {
            id: new_id(),
            class_id: class_id.to_string(),
            title: title.trim().to_string(),
            duration_minutes,
            unique_per_student: settings.unique_per_student,
            status: ExamStatus::Pending,
            material_ids: material_ids.clone(),
            created_at: Utc::now(),
        };
        self.store.insert_exam(exam.clone()).await?;

        self.publish(Message::ExamRequested(ExamRequested {
            exam_id: exam.id.clone(),
            class_id: exam.class_id.clone(),
            material_ids,
            settings,
        }))
        .await;
        Ok(exam)
    }

    /// 上传答卷：作答记录进入 grading + `grade.requested`
    pub async fn submit_answer(
        &self,
        exam_id: &str,
        student_id: &str,
        files: Vec<StoredFile>,
    ) -> AppResult<Assignment> {
        let exam = self
            .store
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("exam {}", exam_id)))?;
        if exam.status != ExamStatus::Done {
            return Err(AppError::validation(format!(
                "exam {} is still being drafted",
                exam_id
            )));
        }
        if self.store.get_student(student_id).await?.is_none() {
            return Err(AppError::not_found(format!("student {}", student_id)));
        }

        let assignment = self.store.submit_answer(exam_id, student_id, files).await?;
        info!("[gateway] 学生 {} 提交考试 {} 答卷", student_id, exam_id);

        self.publish(Message::GradeRequested(GradeRequested {
            exam_id: exam_id.to_string(),
            student_id: student_id.to_string(),
        }))
        .await;
        Ok(assignment)
    }

    /// 手动触发画像刷新（不带考试）
    pub async fn request_profile_refresh(&self, student_id: &str) -> AppResult<()> {
        let student = self
            .store
            .get_student(student_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("student {}", student_id)))?;

        self.publish(Message::ProfileRefresh(ProfileRefresh {
            student_id: student.id,
            exam_id: None,
            student_name: Some(student.name),
        }))
        .await;
        Ok(())
    }

    async fn require_class(&self, class_id: &str) -> AppResult<()> {
        match self.store.get_class(class_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found(format!("class {}", class_id))),
        }
    }

    async fn publish(&self, message: Message) {
        let topic = message.topic();
        if let Err(e) = self.bus.publish_message(message).await {
            warn!(
                event = "notify_failed",
                topic = %topic,
                "[gateway] 消息发布失败，记录保持 pending: {}",
                e
            );
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}
