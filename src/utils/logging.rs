//! 日志辅助函数
//!
//! 启动横幅、每个主题的投递统计、长文本截断

use tracing::info;

use crate::config::Config;
use crate::orchestrator::DispatchStats;

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 课堂流水线启动");
    info!("🤖 模型: {} ({})", config.llm_model_name, config.llm_api_base_url);
    info!("📊 出卷并发数: {}", config.exam_fanout_concurrency);
    info!(
        "🔁 最大投递次数: {} (NotFound: {}), 超时: {}s",
        config.max_delivery_attempts, config.not_found_max_attempts, config.message_timeout_secs
    );
    info!("{}", "=".repeat(60));
}

/// 打印每个主题的最终统计
pub fn print_final_stats(stats: &[DispatchStats]) {
    info!("\n{}", "=".repeat(60));
    info!("📊 消息处理统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    for s in stats {
        info!(
            "{:<16} ✅ 成功 {} | ⛔ 拒绝 {} | 🔁 重投 {} | 💀 放弃 {}",
            s.topic.as_str(),
            s.acked,
            s.rejected,
            s.redelivered,
            s.dead_lettered
        );
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("ringkasan materi", 4), "ring...");
    }
}
