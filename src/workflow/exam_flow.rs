//! 出卷流程 - 流程层
//!
//! 核心职责：把一次出卷请求变成题目集和作答记录
//!
//! 流程顺序：
//! 1. 读取材料，拼成材料摘要（按请求顺序）
//! 2. 决定共用卷还是一人一卷（班级没人时退化为共用卷）
//! 3. 调用生成模型（一人一卷时有界并发扇出）
//! 4. 一次性提交题目集、作答记录和考试状态
//!
//! 任意一个学生生成失败，整个请求失败，什么都不提交。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::StatusStore;
use crate::models::{
    ExamDraft, ExamRequested, ExamSettings, ExamStatus, Message, QuestionSet, Student, Topic,
};
use crate::services::prompts::{exam_prompt, material_digest};
use crate::services::ContentGenerator;
use crate::workflow::MessageHandler;

/// 一次生成调用的目标
struct DraftTarget<'a> {
    student: Option<&'a Student>,
}

impl DraftTarget<'_> {
    fn label(&self) -> &str {
        self.student.map(|s| s.name.as_str()).unwrap_or("all students")
    }
}

pub struct ExamFlow {
    store: Arc<dyn StatusStore>,
    generator: Arc<dyn ContentGenerator>,
    fanout_concurrency: usize,
}

impl ExamFlow {
    pub fn new(
        store: Arc<dyn StatusStore>,
        generator: Arc<dyn ContentGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            generator,
            fanout_concurrency: config.exam_fanout_concurrency.max(1),
        }
    }

    pub async fn run(&self, request: &ExamRequested) -> AppResult<()> {
        if request.exam_id.trim().is_empty() {
            return Err(AppError::validation("examId is required"));
        }

        let exam = self
            .store
            .get_exam(&request.exam_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("exam {}", request.exam_id)))?;
        if exam.status == ExamStatus::Done {
            info!("[exam] 考试 {} 已完成出卷，跳过重复消息", request.exam_id);
            return Ok(());
        }

        let materials = self.store.materials_by_ids(&request.material_ids).await?;
        if materials.is_empty() {
            return Err(AppError::not_found(format!(
                "no materials resolved for exam {}",
                request.exam_id
            )));
        }
        let digest = material_digest(&materials);

        let class_id = if request.class_id.is_empty() {
            exam.class_id.as_str()
        } else {
            request.class_id.as_str()
        };
        let students = self.store.students_in_class(class_id).await?;

        let unique = request.settings.unique_per_student && !students.is_empty();
        if request.settings.unique_per_student && students.is_empty() {
            warn!(
                "[exam] 考试 {} 申请一人一卷，但班级 {} 没有学生，改为共用卷",
                request.exam_id, class_id
            );
        }

        info!(
            "[exam] 考试 {}：材料 {} 份，学生 {} 人，模式 {}",
            request.exam_id,
            materials.len(),
            students.len(),
            if unique { "unique" } else { "shared" }
        );

        let created_at = Utc::now();
        let draft = if unique {
            let targets: Vec<DraftTarget> = students
                .iter()
                .map(|s| DraftTarget { student: Some(s) })
                .collect();
            let bodies = self
                .generate_all(&digest, &targets, &request.settings)
                .await?;

            let mut question_sets = Vec::with_capacity(students.len());
            let mut assignments = Vec::with_capacity(students.len());
            for (target, body) in targets.iter().zip(bodies) {
                let set = question_set(request, class_id, target, &body, created_at, true);
                assignments.push((set.student_id.clone().unwrap_or_default(), set.id.clone()));
                question_sets.push(set);
            }

            ExamDraft {
                exam_id: request.exam_id.clone(),
                unique_per_student: true,
                question_sets,
                assignments,
            }
        } else {
            let target = DraftTarget { student: None };
            let body = self.generate_one(&digest, &target, &request.settings).await?;
            let set = question_set(request, class_id, &target, &body, created_at, false);
            let assignments = students
                .iter()
                .map(|s| (s.id.clone(), set.id.clone()))
                .collect();

            ExamDraft {
                exam_id: request.exam_id.clone(),
                unique_per_student: false,
                question_sets: vec![set],
                assignments,
            }
        };

        let set_count = draft.question_sets.len();
        let assignment_count = draft.assignments.len();
        self.store.commit_exam_draft(draft).await?;

        info!(
            "[exam] ✓ 考试 {} 出卷完成：题目集 {} 份，作答记录 {} 条",
            request.exam_id, set_count, assignment_count
        );
        Ok(())
    }

    /// 有界并发扇出，结果按花名册顺序返回
    ///
    /// `buffered` 按顺序产出，第一个 Err 即终止并丢弃其余在途调用。
    async fn generate_all(
        &self,
        digest: &str,
        targets: &[DraftTarget<'_>],
        settings: &ExamSettings,
    ) -> AppResult<Vec<String>> {
        let calls: Vec<_> = targets
            .iter()
            .map(|target| self.generate_one(digest, target, settings))
            .collect();
        stream::iter(calls)
            .buffered(self.fanout_concurrency)
            .try_collect()
            .await
    }

    async fn generate_one(
        &self,
        digest: &str,
        target: &DraftTarget<'_>,
        settings: &ExamSettings,
    ) -> AppResult<String> {
        let prompt = exam_prompt(
            digest,
            target.student.map(|s| s.name.as_str()),
            settings.mcq,
            settings.essay,
        );
        debug!("[exam] 为 {} 生成题目", target.label());

        self.generator
            .generate(&prompt, &[])
            .await?
            .ok_or_else(|| AppError::generator(format!("empty exam content for {}", target.label())))
    }
}

fn question_set(
    request: &ExamRequested,
    class_id: &str,
    target: &DraftTarget<'_>,
    body: &str,
    created_at: DateTime<Utc>,
    unique: bool,
) -> QuestionSet {
    QuestionSet {
        id: Uuid::new_v4().to_string(),
        exam_id: request.exam_id.clone(),
        student_id: target.student.map(|s| s.id.clone()),
        content: format_exam_content(
            &request.exam_id,
            class_id,
            target.label(),
            created_at,
            &request.settings,
            unique,
            body,
        ),
    }
}

/// 题目集正文前加元数据头
pub fn format_exam_content(
    exam_id: &str,
    class_id: &str,
    target: &str,
    created_at: DateTime<Utc>,
    settings: &ExamSettings,
    unique: bool,
    body: &str,
) -> String {
    format!(
        "Exam ID: {}\nClass ID: {}\nTarget: {}\nCreated At: {}\nMCQ: {}\nEssay: {}\nMode: {}\n\n{}",
        exam_id,
        class_id,
        target,
        created_at.to_rfc3339(),
        settings.mcq,
        settings.essay,
        if unique { "unique" } else { "shared" },
        body.trim()
    )
}

#[async_trait]
impl MessageHandler for ExamFlow {
    fn topic(&self) -> Topic {
        Topic::ExamRequested
    }

    async fn handle(&self, message: Message) -> AppResult<()> {
        match message {
            Message::ExamRequested(request) => self.run(&request).await,
            other => Err(AppError::validation(format!(
                "unexpected {} message on {}",
                other.topic(),
                self.topic()
            ))),
        }
    }
}
