//! 内容生成服务 - 业务能力层
//!
//! 只负责"调用生成模型"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::Attachment;
use crate::services::prompts::Prompt;
use crate::services::structured::extract_json;

/// 内容生成能力
///
/// 材料整理、出卷、评分、画像刷新共用。
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// 返回模型文本；模型没有给出内容时返回 None
    async fn generate(&self, prompt: &Prompt, attachments: &[Attachment])
        -> AppResult<Option<String>>;

    /// 返回模型给出的 JSON；空输出或无法解析都是 `Generator` 错误
    async fn generate_structured(
        &self,
        prompt: &Prompt,
        attachments: &[Attachment],
    ) -> AppResult<JsonValue> {
        let text = self
            .generate(prompt, attachments)
            .await?
            .ok_or_else(|| AppError::generator("模型返回内容为空"))?;
        extract_json(&text)
    }
}

/// 基于 OpenAI 兼容接口的生成服务
///
/// 图片附件作为 Vision 内容传入；其它附件（PDF 等）以 URI 列表的形式写进文本并记录 warn，
/// 所有附件始终在同一个请求里，保证图文之间的引用关系。
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
}

impl LlmService {
    /// 创建新的生成服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            max_tokens: config.llm_max_tokens,
        }
    }

    /// 只能以 URI 形式出现在文本里的附件（非图片）
    fn uri_only(attachments: &[Attachment]) -> Vec<&Attachment> {
        attachments.iter().filter(|a| !a.is_image()).collect()
    }

    /// 构建用户消息内容（支持图片）
    fn build_user_content(
        prompt: &Prompt,
        attachments: &[Attachment],
    ) -> ChatCompletionRequestUserMessageContent {
        if attachments.is_empty() {
            return ChatCompletionRequestUserMessageContent::Text(prompt.user.clone());
        }

        let files = Self::uri_only(attachments);

        let mut text = prompt.user.clone();
        if !files.is_empty() {
            text.push_str("\n\nAttached files:");
            for file in &files {
                text.push_str(&format!("\n- {} ({})", file.uri, file.mime_type));
            }
        }

        let mut parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
            ChatCompletionRequestMessageContentPartText { text },
        )];
        for image in attachments.iter().filter(|a| a.is_image()) {
            parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: image.uri.clone(),
                        detail: Some(ImageDetail::Auto),
                    },
                },
            ));
        }

        ChatCompletionRequestUserMessageContent::Array(parts)
    }
}

#[async_trait]
impl ContentGenerator for LlmService {
    async fn generate(
        &self,
        prompt: &Prompt,
        attachments: &[Attachment],
    ) -> AppResult<Option<String>> {
        debug!(
            "调用生成模型: {}，用户消息 {} 字符，附件 {} 个",
            self.model_name,
            prompt.user.len(),
            attachments.len()
        );

        let files = Self::uri_only(attachments);
        if !files.is_empty() {
            warn!(
                "模型看不到 {} 个非图片附件的内容，只传入 URI: {}",
                files.len(),
                files.iter().map(|f| f.uri.as_str()).collect::<Vec<_>>().join(", ")
            );
        }

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(prompt.system.as_str())
            .build()
            .map_err(AppError::generator)?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(Self::build_user_content(prompt, attachments))
            .build()
            .map_err(AppError::generator)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(prompt.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(AppError::generator)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("生成模型调用失败: {}", e);
            AppError::generator(format!("模型 {} 调用失败: {}", self.model_name, e))
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        if content.is_none() {
            warn!("生成模型返回内容为空: {}", self.model_name);
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::prompts::grading_prompt;

    #[test]
    fn test_text_only_content() {
        let content = LlmService::build_user_content(&grading_prompt("1+1?"), &[]);
        assert!(matches!(content, ChatCompletionRequestUserMessageContent::Text(_)));
    }

    #[test]
    fn test_images_become_parts_and_files_are_listed() {
        let attachments = vec![
            Attachment::from_uri("gs://answers/s1.png"),
            Attachment::from_uri("gs://answers/s1.pdf"),
        ];
        let content = LlmService::build_user_content(&grading_prompt("1+1?"), &attachments);

        let ChatCompletionRequestUserMessageContent::Array(parts) = content else {
            panic!("expected multi-part content");
        };
        assert_eq!(parts.len(), 2);
        match &parts[0] {
            ChatCompletionRequestUserMessageContentPart::Text(t) => {
                assert!(t.text.contains("gs://answers/s1.pdf (application/pdf)"));
                assert!(!t.text.contains("s1.png"));
            }
            _ => panic!("first part should be text"),
        }
    }

    #[test]
    fn test_uri_only_keeps_non_image_attachments() {
        let attachments = vec![
            Attachment::from_uri("gs://materials/bab1.pdf"),
            Attachment::from_uri("gs://materials/diagram.png"),
            Attachment::from_uri("gs://materials/notes.docx"),
        ];
        let files = LlmService::uri_only(&attachments);
        let uris: Vec<&str> = files.iter().map(|f| f.uri.as_str()).collect();
        assert_eq!(uris, vec!["gs://materials/bab1.pdf", "gs://materials/notes.docx"]);
    }

    /// 需要真实的 API Key：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_live_generate -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_live_generate() {
        let _ = tracing_subscriber::fmt::try_init();

        let service = LlmService::new(&Config::from_env());
        let prompt = Prompt {
            system: "You are a concise assistant.".to_string(),
            user: "Reply with the single word: ok".to_string(),
            temperature: 0.0,
        };

        let result = service.generate(&prompt, &[]).await;
        match result {
            Ok(Some(text)) => println!("✅ 模型响应: {}", text),
            Ok(None) => panic!("模型返回为空"),
            Err(e) => panic!("调用失败: {}", e),
        }
    }
}
