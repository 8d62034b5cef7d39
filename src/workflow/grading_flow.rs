//! 评分流程
//!
//! 读取题目集和答卷附件，调用模型打分，写回作答记录，然后通知画像刷新。
//! 模型输出不可用时降级为 0 分 + 固定反馈，评分本身从不因模型输出失败。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{MessageBus, StatusStore};
use crate::models::{Attachment, Grade, GradeRequested, Message, ProfileRefresh, Topic};
use crate::services::prompts::grading_prompt;
use crate::services::structured::parse_score;
use crate::services::ContentGenerator;
use crate::workflow::MessageHandler;

/// 模型输出无法解析时的反馈
pub const FALLBACK_FEEDBACK: &str = "Automatic grading could not read the result. Please ask your teacher to review this submission.";

pub struct GradingFlow {
    store: Arc<dyn StatusStore>,
    bus: Arc<dyn MessageBus>,
    generator: Arc<dyn ContentGenerator>,
    notify_profile_refresh: bool,
    notify_failures: AtomicU64,
}

impl GradingFlow {
    pub fn new(
        store: Arc<dyn StatusStore>,
        bus: Arc<dyn MessageBus>,
        generator: Arc<dyn ContentGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            bus,
            generator,
            notify_profile_refresh: config.notify_profile_refresh,
            notify_failures: AtomicU64::new(0),
        }
    }

    /// 被吞掉的画像刷新通知失败次数
    pub fn notify_failures(&self) -> u64 {
        self.notify_failures.load(Ordering::Relaxed)
    }

    pub async fn run(&self, request: &GradeRequested) -> AppResult<()> {
        if request.exam_id.trim().is_empty() || request.student_id.trim().is_empty() {
            return Err(AppError::validation("examId and studentId are required"));
        }
        let tag = format!("{}/{}", request.exam_id, request.student_id);

        let assignment = self
            .store
            .get_assignment(&request.exam_id, &request.student_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("assignment {}", tag)))?;

        let question_set_id = assignment
            .question_set_id
            .as_deref()
            .ok_or_else(|| AppError::not_found(format!("question set for {}", tag)))?;
        let question_set = self
            .store
            .get_question_set(question_set_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("question set {}", question_set_id)))?;

        let answers: Vec<Attachment> = assignment
            .answer_files
            .iter()
            .filter_map(|f| f.resolve())
            .collect();
        if answers.len() < assignment.answer_files.len() {
            warn!(
                "[grading] {} 有 {} 个答卷文件没有 URI，已忽略",
                tag,
                assignment.answer_files.len() - answers.len()
            );
        }

        info!("[grading] 评分 {}，答卷文件 {} 个", tag, answers.len());

        let prompt = grading_prompt(&question_set.content);
        let (score, feedback) = match self.generator.generate_structured(&prompt, &answers).await {
            Ok(value) => read_grade(&value),
            Err(e) => {
                warn!("[grading] {} 模型输出不可用，使用兜底结果: {}", tag, e);
                (0, FALLBACK_FEEDBACK.to_string())
            }
        };

        let grade = Grade {
            score,
            feedback,
            graded_at: Utc::now(),
        };
        self.store
            .record_grade(&request.exam_id, &request.student_id, grade)
            .await?;
        info!("[grading] ✓ {} 得分 {}", tag, score);

        self.notify(request).await;
        Ok(())
    }

    /// 尽力通知画像刷新，失败只记录
    async fn notify(&self, request: &GradeRequested) {
        if !self.notify_profile_refresh {
            warn!("[grading] 画像刷新通知已关闭，跳过 {}", request.student_id);
            return;
        }

        let message = Message::ProfileRefresh(ProfileRefresh {
            student_id: request.student_id.clone(),
            exam_id: Some(request.exam_id.clone()),
            student_name: None,
        });
        if let Err(e) = self.bus.publish_message(message).await {
            self.notify_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                event = "notify_failed",
                topic = %Topic::ProfileRefresh,
                student_id = %request.student_id,
                "[grading] 画像刷新通知发布失败: {}",
                e
            );
        }
    }
}

/// 从结构化输出里读出分数和反馈
fn read_grade(value: &JsonValue) -> (u8, String) {
    match parse_score(value.get("score")) {
        Some(score) => {
            let feedback = value
                .get("feedback")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            (score, feedback)
        }
        None => (0, FALLBACK_FEEDBACK.to_string()),
    }
}

#[async_trait]
impl MessageHandler for GradingFlow {
    fn topic(&self) -> Topic {
        Topic::GradeRequested
    }

    async fn handle(&self, message: Message) -> AppResult<()> {
        match message {
            Message::GradeRequested(request) => self.run(&request).await,
            other => Err(AppError::validation(format!(
                "unexpected {} message on {}",
                other.topic(),
                self.topic()
            ))),
        }
    }
}
