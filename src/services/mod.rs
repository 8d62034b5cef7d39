pub mod llm_service;
pub mod prompts;
pub mod structured;

pub use llm_service::{ContentGenerator, LlmService};
pub use prompts::Prompt;
