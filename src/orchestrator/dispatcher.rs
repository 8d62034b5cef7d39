//! 消息调度器 - 编排层
//!
//! 每个主题一个调度循环：取投递 → 解码信封 → 带超时调用处理器 → 按错误分类决定
//! ack、拒绝、退避重投或放弃。重投策略属于传输层，流程本身不做重试。

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, Disposition};
use crate::infrastructure::{Delivery, MessageBus};
use crate::models::{Envelope, Topic};
use crate::workflow::MessageHandler;

/// 单条投递的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    /// 永久失败（校验错误）
    Rejected,
    /// 已安排退避重投
    Redelivered,
    /// 重投次数用尽
    DeadLettered,
}

/// 单个主题的统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    pub topic: Topic,
    pub acked: usize,
    pub rejected: usize,
    pub redelivered: usize,
    pub dead_lettered: usize,
}

impl DispatchStats {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            acked: 0,
            rejected: 0,
            redelivered: 0,
            dead_lettered: 0,
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Acked => self.acked += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::Redelivered => self.redelivered += 1,
            Outcome::DeadLettered => self.dead_lettered += 1,
        }
    }
}

pub struct Dispatcher {
    bus: Arc<dyn MessageBus>,
    handler: Arc<dyn MessageHandler>,
    config: Config,
}

impl Dispatcher {
    pub fn new(bus: Arc<dyn MessageBus>, handler: Arc<dyn MessageHandler>, config: &Config) -> Self {
        Self {
            bus,
            handler,
            config: config.clone(),
        }
    }

    pub fn topic(&self) -> Topic {
        self.handler.topic()
    }

    /// 调度循环，收到关闭信号或总线关闭时退出
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> DispatchStats {
        let topic = self.topic();
        let mut stats = DispatchStats::new(topic);
        info!("[dispatch:{}] 开始订阅", topic);

        loop {
            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                delivery = self.bus.consume(topic) => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let outcome = self.dispatch(delivery).await;
            stats.record(outcome);
        }

        info!("[dispatch:{}] 停止订阅", topic);
        stats
    }

    /// 处理一条投递并决定它的去向
    pub async fn dispatch(&self, delivery: Delivery) -> Outcome {
        let topic = delivery.topic;
        let attempt = delivery.attempt;

        let result = match Envelope::decode(topic, &delivery.data) {
            Ok(envelope) => {
                debug!("[dispatch:{}] 第 {} 次投递", topic, attempt);
                match timeout(self.config.message_timeout(), self.handler.handle(envelope.message)).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Generator(format!(
                        "处理超时 ({}s)",
                        self.config.message_timeout_secs
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        let err = match result {
            Ok(()) => {
                self.bus.ack(&delivery).await;
                return Outcome::Acked;
            }
            Err(err) => err,
        };

        if err.disposition() == Disposition::Reject {
            warn!(
                status = err.status_code(),
                "[dispatch:{}] ⛔ 消息被拒绝，不再重投: {}",
                topic,
                err
            );
            self.bus.ack(&delivery).await;
            return Outcome::Rejected;
        }

        let limit = if err.is_not_found() {
            self.config.not_found_max_attempts
        } else {
            self.config.max_delivery_attempts
        };

        if attempt < limit {
            let delay = self.config.backoff_for(attempt);
            warn!(
                status = err.status_code(),
                "[dispatch:{}] 🔁 第 {}/{} 次处理失败，{}ms 后重投: {}",
                topic,
                attempt,
                limit,
                delay.as_millis(),
                err
            );
            match self.bus.redeliver(delivery.clone(), delay).await {
                Ok(()) => return Outcome::Redelivered,
                Err(e) => error!("[dispatch:{}] 重投失败: {}", topic, e),
            }
        }

        error!(
            event = "dead_letter",
            status = err.status_code(),
            "[dispatch:{}] 💀 {} 次投递后放弃: {}",
            topic,
            attempt,
            err
        );
        self.bus.ack(&delivery).await;
        Outcome::DeadLettered
    }
}
