//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用
//! - 装配存储、总线、生成服务和流程
//! - 为每个主题启动调度器，管理生命周期，输出统计
//!
//! ### `dispatcher` - 消息调度器
//! - 订阅一个主题，解码信封，带超时调用流程
//! - 按错误分类 ack、拒绝、退避重投或放弃
//!
//! ### `gateway` - 网关
//! - 创建初始记录并发布每条链路的第一条消息
//!
//! ## 层次关系
//!
//! ```text
//! app / gateway
//!     ↓
//! dispatcher (每个主题一个)
//!     ↓
//! workflow (Material / Exam / Grading / Profile)
//!     ↓
//! services (能力层：生成 / 提示词 / 结构化解析)
//!     ↓
//! infrastructure (基础设施：StatusStore / MessageBus)
//! ```

pub mod app;
pub mod dispatcher;
pub mod gateway;

pub use app::{App, Running};
pub use dispatcher::{DispatchStats, Dispatcher, Outcome};
pub use gateway::Gateway;
