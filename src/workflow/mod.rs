//! 流程层：每个 worker 一个流程
//!
//! 流程只依赖注入进来的能力（存储、总线、生成器），自身不持有状态。

pub mod exam_flow;
pub mod grading_flow;
pub mod material_flow;
pub mod profile_flow;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{Message, Topic};

pub use exam_flow::ExamFlow;
pub use grading_flow::GradingFlow;
pub use material_flow::MaterialFlow;
pub use profile_flow::ProfileFlow;

/// 订阅某个主题的消息处理器
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn topic(&self) -> Topic;

    /// 成功返回 Ok；错误按 [`crate::error::AppError::disposition`] 决定是否重投
    async fn handle(&self, message: Message) -> AppResult<()>;
}
