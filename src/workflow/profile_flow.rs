//! 画像刷新流程
//!
//! 汇总学生最近的成绩、相关材料和旧画像，让模型给出新的概述，
//! 按字段合并后整体写回。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::StatusStore;
use crate::models::{Material, Message, ProfileDraft, ProfileRefresh, StudentProfile, Topic};
use crate::services::prompts::profile_prompt;
use crate::services::structured::parse_profile_draft;
use crate::services::ContentGenerator;
use crate::workflow::MessageHandler;

const DEFAULT_STUDENT_NAME: &str = "Student";

pub struct ProfileFlow {
    store: Arc<dyn StatusStore>,
    generator: Arc<dyn ContentGenerator>,
    recent_results_limit: usize,
    materials_limit: usize,
}

impl ProfileFlow {
    pub fn new(
        store: Arc<dyn StatusStore>,
        generator: Arc<dyn ContentGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            generator,
            recent_results_limit: config.profile_recent_results_limit,
            materials_limit: config.profile_materials_limit,
        }
    }

    pub async fn run(&self, request: &ProfileRefresh) -> AppResult<()> {
        if request.student_id.trim().is_empty() {
            return Err(AppError::validation("studentId is required"));
        }
        let student_id = request.student_id.as_str();

        let student = self.store.get_student(student_id).await?;
        let name = student
            .as_ref()
            .map(|s| s.name.clone())
            .or_else(|| request.student_name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STUDENT_NAME.to_string());

        let previous = match self.store.get_profile(student_id).await? {
            Some(mut profile) => {
                profile.name = name;
                profile
            }
            None => {
                debug!("[profile] 学生 {} 还没有画像，使用默认值", student_id);
                StudentProfile::empty(student_id, name)
            }
        };

        let results = match &request.exam_id {
            Some(exam_id) => self
                .store
                .exam_result(student_id, exam_id)
                .await?
                .into_iter()
                .collect(),
            None => {
                self.store
                    .recent_results(student_id, self.recent_results_limit)
                    .await?
            }
        };

        let materials = self.context_materials(request, student.map(|s| s.class_id)).await?;

        info!(
            "[profile] 刷新学生 {} 画像：成绩 {} 条，材料 {} 份",
            student_id,
            results.len(),
            materials.len()
        );

        let prompt = profile_prompt(&previous, &results, &materials);
        let draft = match self.generator.generate_structured(&prompt, &[]).await {
            Ok(value) => parse_profile_draft(&value),
            Err(e) => {
                warn!("[profile] 学生 {} 画像生成失败，保留旧值: {}", student_id, e);
                ProfileDraft::default()
            }
        };
        if draft.is_empty() {
            warn!("[profile] 学生 {} 画像草稿为空，保留旧值", student_id);
        }

        self.store.upsert_profile(draft.merge_into(&previous)).await?;
        info!("[profile] ✓ 学生 {} 画像已更新", student_id);
        Ok(())
    }

    /// 有考试时取考试关联的材料，否则取学生所在班级最近的材料
    async fn context_materials(
        &self,
        request: &ProfileRefresh,
        class_id: Option<String>,
    ) -> AppResult<Vec<Material>> {
        match (&request.exam_id, class_id) {
            (Some(exam_id), _) => {
                self.store
                    .materials_for_exam(exam_id, self.materials_limit)
                    .await
            }
            (None, Some(class_id)) => {
                self.store
                    .recent_class_materials(&class_id, self.materials_limit)
                    .await
            }
            (None, None) => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl MessageHandler for ProfileFlow {
    fn topic(&self) -> Topic {
        Topic::ProfileRefresh
    }

    async fn handle(&self, message: Message) -> AppResult<()> {
        match message {
            Message::ProfileRefresh(request) => self.run(&request).await,
            other => Err(AppError::validation(format!(
                "unexpected {} message on {}",
                other.topic(),
                self.topic()
            ))),
        }
    }
}
