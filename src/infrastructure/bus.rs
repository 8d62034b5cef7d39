//! 消息总线 - 基础设施层
//!
//! 至少一次投递，不保证顺序。调度器对每条投递最终调用一次 `ack`
//! （成功、拒绝或放弃），需要重试时调用 `redeliver`。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{Envelope, Message, Topic};

/// 一次投递
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: Topic,
    pub data: Vec<u8>,
    /// 从 1 开始
    pub attempt: u32,
}

/// 消息总线能力
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 发布原始字节
    async fn publish(&self, topic: Topic, data: Vec<u8>) -> AppResult<()>;

    /// 取下一条投递；总线关闭时返回 None
    async fn consume(&self, topic: Topic) -> Option<Delivery>;

    /// 延迟 `delay` 后重新投递，attempt + 1
    async fn redeliver(&self, delivery: Delivery, delay: Duration) -> AppResult<()>;

    /// 这条投递处理结束（无论成败）
    async fn ack(&self, delivery: &Delivery);

    /// 以当前版本的信封发布一条消息
    async fn publish_message(&self, message: Message) -> AppResult<()> {
        let envelope = Envelope::new(message);
        let data = envelope.encode()?;
        self.publish(envelope.topic(), data).await
    }
}

struct Queue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Mutex<mpsc::UnboundedReceiver<Delivery>>,
}

/// 进程内总线：每个主题一个无界队列
pub struct InMemoryBus {
    queues: HashMap<Topic, Queue>,
    /// 已发布但还没 ack 的消息数（包括等待重投的）
    outstanding: Arc<AtomicUsize>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let queues = Topic::ALL
            .iter()
            .map(|topic| {
                let (tx, rx) = mpsc::unbounded_channel();
                (
                    *topic,
                    Queue {
                        tx,
                        rx: Mutex::new(rx),
                    },
                )
            })
            .collect();

        Self {
            queues,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// 等待所有消息处理完毕；超时返回 false
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.outstanding() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(10)).await;
        }
        true
    }

    fn queue(&self, topic: Topic) -> AppResult<&Queue> {
        self.queues
            .get(&topic)
            .ok_or_else(|| AppError::notify(format!("unknown topic {}", topic)))
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: Topic, data: Vec<u8>) -> AppResult<()> {
        let queue = self.queue(topic)?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        queue
            .tx
            .send(Delivery {
                topic,
                data,
                attempt: 1,
            })
            .map_err(|e| {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                AppError::notify(format!("publish to {} failed: {}", topic, e))
            })?;
        debug!("已发布消息到 {}", topic);
        Ok(())
    }

    async fn consume(&self, topic: Topic) -> Option<Delivery> {
        let queue = self.queues.get(&topic)?;
        let mut rx = queue.rx.lock().await;
        rx.recv().await
    }

    async fn redeliver(&self, delivery: Delivery, delay: Duration) -> AppResult<()> {
        let tx = self.queue(delivery.topic)?.tx.clone();
        let outstanding = Arc::clone(&self.outstanding);

        tokio::spawn(async move {
            sleep(delay).await;
            let next = Delivery {
                attempt: delivery.attempt + 1,
                ..delivery
            };
            if tx.send(next).is_err() {
                outstanding.fetch_sub(1, Ordering::SeqCst);
            }
        });
        Ok(())
    }

    async fn ack(&self, _delivery: &Delivery) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
