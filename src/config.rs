use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// 程序配置
///
/// 加载顺序：默认值 → TOML 文件（`PIPELINE_CONFIG` 或 `pipeline.toml`）→ 环境变量。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_max_tokens: u32,
    /// 每人一卷时同时进行的生成调用数量
    pub exam_fanout_concurrency: usize,
    // --- 消息投递 ---
    /// 单条消息处理超时（秒）
    pub message_timeout_secs: u64,
    /// 暂时性失败的最大投递次数
    pub max_delivery_attempts: u32,
    /// NotFound 的最大投递次数
    pub not_found_max_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_max_ms: u64,
    // --- 学生画像 ---
    pub profile_recent_results_limit: usize,
    pub profile_materials_limit: usize,
    /// 评分后是否发布画像刷新消息
    pub notify_profile_refresh: bool,
    /// 本地演示用的种子文件
    pub seed_file: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_max_tokens: 4096,
            exam_fanout_concurrency: 4,
            message_timeout_secs: 300,
            max_delivery_attempts: 5,
            not_found_max_attempts: 3,
            retry_backoff_base_ms: 500,
            retry_backoff_max_ms: 30_000,
            profile_recent_results_limit: 5,
            profile_materials_limit: 3,
            notify_profile_refresh: true,
            seed_file: None,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 只使用默认值 + 环境变量
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// 默认值 + 配置文件（存在时）+ 环境变量
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("PIPELINE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("pipeline.toml"));

        let config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env().validate()
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(self) -> Self {
        Self {
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            llm_max_tokens: env_or("LLM_MAX_TOKENS", self.llm_max_tokens),
            exam_fanout_concurrency: env_or("EXAM_FANOUT_CONCURRENCY", self.exam_fanout_concurrency),
            message_timeout_secs: env_or("MESSAGE_TIMEOUT_SECS", self.message_timeout_secs),
            max_delivery_attempts: env_or("MAX_DELIVERY_ATTEMPTS", self.max_delivery_attempts),
            not_found_max_attempts: env_or("NOT_FOUND_MAX_ATTEMPTS", self.not_found_max_attempts),
            retry_backoff_base_ms: env_or("RETRY_BACKOFF_BASE_MS", self.retry_backoff_base_ms),
            retry_backoff_max_ms: env_or("RETRY_BACKOFF_MAX_MS", self.retry_backoff_max_ms),
            profile_recent_results_limit: env_or(
                "PROFILE_RECENT_RESULTS_LIMIT",
                self.profile_recent_results_limit,
            ),
            profile_materials_limit: env_or("PROFILE_MATERIALS_LIMIT", self.profile_materials_limit),
            notify_profile_refresh: env_or("NOTIFY_PROFILE_REFRESH", self.notify_profile_refresh),
            seed_file: std::env::var("SEED_FILE").ok().or(self.seed_file),
            verbose_logging: env_or("VERBOSE_LOGGING", self.verbose_logging),
        }
    }

    pub fn validate(self) -> AppResult<Self> {
        if self.exam_fanout_concurrency == 0 {
            return Err(AppError::Config("exam_fanout_concurrency 必须大于 0".to_string()));
        }
        if self.max_delivery_attempts == 0 || self.not_found_max_attempts == 0 {
            return Err(AppError::Config("投递次数必须大于 0".to_string()));
        }
        if self.message_timeout_secs == 0 {
            return Err(AppError::Config("message_timeout_secs 必须大于 0".to_string()));
        }
        Ok(self)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_secs(self.message_timeout_secs)
    }

    /// 第 `attempt` 次失败后的退避时间：base * 2^(attempt-1)，不超过上限
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .retry_backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.retry_backoff_max_ms);
        Duration::from_millis(delay)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
