//! # Classroom Pipeline
//!
//! 课堂异步流水线：材料整理 → 出卷（共用卷或一人一卷）→ 答卷评分 → 学生画像刷新
//!
//! ## 架构设计
//!
//! 本系统采用四层架构，各 worker 之间只通过消息总线和状态存储联系：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有共享资源，只暴露能力
//! - `StatusStore` - 状态存储（班级、学生、材料、考试、作答记录、画像）
//! - `MessageBus` - 至少一次投递的消息总线
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，无状态
//! - `ContentGenerator` / `LlmService` - 生成模型调用
//! - `prompts` - 提示词构建
//! - `structured` - 结构化输出解析（JSON、分数、画像草稿）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 每个 worker 一个流程，实现 `MessageHandler`
//! - `MaterialFlow` / `ExamFlow` / `GradingFlow` / `ProfileFlow`
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/dispatcher` - 每个主题的调度循环（超时、重投、放弃）
//! - `orchestrator/gateway` - 创建初始记录并发布第一条消息
//! - `orchestrator/app` - 装配与生命周期
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{InMemoryBus, MemoryStore, MessageBus, StatusStore};
pub use orchestrator::{App, DispatchStats, Dispatcher, Gateway};
pub use services::{ContentGenerator, LlmService};
pub use workflow::{ExamFlow, GradingFlow, MaterialFlow, MessageHandler, ProfileFlow};
