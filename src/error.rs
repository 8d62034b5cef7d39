//! 错误分类
//!
//! 每个变体对应一种处理策略，调度器只看 [`AppError::disposition`]：
//! - `Validation`：输入有问题，永久拒绝（4xx），不重投
//! - `NotFound`：引用的记录还不存在，有限次重投后放弃
//! - `Generator` / `Persistence`：重投（5xx）
//! - `Notify`：尽力而为的下游通知失败，调用方记录后吞掉

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 消息或参数不合法
    #[error("校验失败: {0}")]
    Validation(String),
    /// 引用的实体不存在
    #[error("记录不存在: {0}")]
    NotFound(String),
    /// 生成模型调用失败或返回内容不可用
    #[error("生成失败: {0}")]
    Generator(String),
    /// 存储读写失败
    #[error("存储失败: {0}")]
    Persistence(String),
    /// 下游消息发布失败
    #[error("通知失败: {0}")]
    Notify(String),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
    /// 文件读写失败
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 调度器对失败消息的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 永久失败，丢弃
    Reject,
    /// 暂时失败，退避后重投
    Retry,
}

impl AppError {
    pub fn disposition(&self) -> Disposition {
        match self {
            AppError::Validation(_) | AppError::Config(_) => Disposition::Reject,
            _ => Disposition::Retry,
        }
    }

    /// 对应的 HTTP 状态码（push 订阅按此决定是否重投）
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::Config(_) => 400,
            AppError::NotFound(_) => 404,
            _ => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn generator(msg: impl std::fmt::Display) -> Self {
        AppError::Generator(msg.to_string())
    }

    pub fn persistence(msg: impl std::fmt::Display) -> Self {
        AppError::Persistence(msg.to_string())
    }

    pub fn notify(msg: impl std::fmt::Display) -> Self {
        AppError::Notify(msg.to_string())
    }
}

// ========== 从常见错误类型转换 ==========

/// JSON 解码失败一律视为 payload 不合法
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("malformed payload: {}", err))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
