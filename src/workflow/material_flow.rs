//! 材料整理流程
//!
//! 把上传的附件整理成可教学的内容，写回材料并标记 done。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::StatusStore;
use crate::models::{MaterialReady, Message, Topic};
use crate::services::prompts::material_prompt;
use crate::services::ContentGenerator;
use crate::workflow::MessageHandler;

pub struct MaterialFlow {
    store: Arc<dyn StatusStore>,
    generator: Arc<dyn ContentGenerator>,
}

impl MaterialFlow {
    pub fn new(store: Arc<dyn StatusStore>, generator: Arc<dyn ContentGenerator>) -> Self {
        Self { store, generator }
    }

    pub async fn run(&self, request: &MaterialReady) -> AppResult<()> {
        if request.material_id.trim().is_empty() {
            return Err(AppError::validation("materialId is required"));
        }
        let attachments = request.attachment_refs();
        if attachments.is_empty() {
            return Err(AppError::validation(format!(
                "material {} has no attachments",
                request.material_id
            )));
        }

        let title = self
            .store
            .get_material(&request.material_id)
            .await?
            .map(|m| m.title);

        info!(
            "[material] 整理材料 {}，附件 {} 个",
            request.material_id,
            attachments.len()
        );

        // 所有附件放进同一次调用
        let prompt = material_prompt(title.as_deref());
        let content = match self.generator.generate(&prompt, &attachments).await {
            Ok(Some(text)) => Some(text),
            Ok(None) => {
                warn!("[material] 材料 {} 生成结果为空", request.material_id);
                None
            }
            Err(e) => {
                warn!("[material] 材料 {} 生成失败: {}", request.material_id, e);
                None
            }
        };

        self.store
            .complete_material(&request.material_id, content)
            .await?;
        info!("[material] ✓ 材料 {} 已完成", request.material_id);
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for MaterialFlow {
    fn topic(&self) -> Topic {
        Topic::MaterialReady
    }

    async fn handle(&self, message: Message) -> AppResult<()> {
        match message {
            Message::MaterialReady(request) => self.run(&request).await,
            other => Err(AppError::validation(format!(
                "unexpected {} message on {}",
                other.topic(),
                self.topic()
            ))),
        }
    }
}
