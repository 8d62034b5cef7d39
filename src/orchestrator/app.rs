//! 应用 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：创建存储、总线、生成服务和四个流程
//! 2. **订阅调度**：每个主题启动一个 [`Dispatcher`]
//! 3. **种子数据**：可选地用种子文件驱动网关，在本地跑通整条链路
//! 4. **生命周期**：等待 Ctrl+C，通知调度器停止，汇总统计
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有存储和总线的模块，向下以 `Arc<dyn ...>` 注入
//! - **无业务逻辑**：只做装配和统计

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{InMemoryBus, MemoryStore, MessageBus, StatusStore};
use crate::models::{load_seed, ExamSettings, MaterialStatus};
use crate::orchestrator::dispatcher::{DispatchStats, Dispatcher};
use crate::orchestrator::gateway::Gateway;
use crate::services::{ContentGenerator, LlmService};
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::{ExamFlow, GradingFlow, MaterialFlow, MessageHandler, ProfileFlow};

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<MemoryStore>,
    bus: Arc<InMemoryBus>,
    gateway: Gateway,
    grading: Arc<GradingFlow>,
    handlers: Vec<Arc<dyn MessageHandler>>,
}

/// 正在运行的调度器
pub struct Running {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<DispatchStats>>,
}

impl Running {
    /// 通知所有调度器停止并收集统计
    pub async fn stop(self) -> Vec<DispatchStats> {
        let _ = self.shutdown.send(true);

        let mut stats = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(s) => stats.push(s),
                Err(e) => error!("调度任务异常退出: {}", e),
            }
        }
        stats
    }
}

impl App {
    /// 初始化应用（使用真实的生成模型）
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);
        if config.llm_api_key.is_empty() {
            warn!("⚠️ 未配置 LLM_API_KEY，生成调用将会失败");
        }
        let generator: Arc<dyn ContentGenerator> = Arc::new(LlmService::new(&config));
        Ok(Self::with_generator(config, generator))
    }

    /// 使用指定的生成器装配整条流水线
    pub fn with_generator(config: Config, generator: Arc<dyn ContentGenerator>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let store_dyn: Arc<dyn StatusStore> = store.clone();
        let bus_dyn: Arc<dyn MessageBus> = bus.clone();

        let grading = Arc::new(GradingFlow::new(
            store_dyn.clone(),
            bus_dyn.clone(),
            generator.clone(),
            &config,
        ));
        let handlers: Vec<Arc<dyn MessageHandler>> = vec![
            Arc::new(MaterialFlow::new(store_dyn.clone(), generator.clone())),
            Arc::new(ExamFlow::new(store_dyn.clone(), generator.clone(), &config)),
            grading.clone(),
            Arc::new(ProfileFlow::new(store_dyn.clone(), generator, &config)),
        ];

        Self {
            gateway: Gateway::new(store_dyn, bus_dyn),
            config,
            store,
            bus,
            grading,
            handlers,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    pub fn bus(&self) -> Arc<InMemoryBus> {
        self.bus.clone()
    }

    pub fn grading(&self) -> Arc<GradingFlow> {
        self.grading.clone()
    }

    /// 每个主题启动一个调度器
    pub fn start(&self) -> Running {
        let (shutdown, rx) = watch::channel(false);
        let handles = self
            .handlers
            .iter()
            .map(|handler| {
                let bus: Arc<dyn MessageBus> = self.bus.clone();
                let dispatcher = Dispatcher::new(bus, handler.clone(), &self.config);
                tokio::spawn(dispatcher.run(rx.clone()))
            })
            .collect();

        Running { shutdown, handles }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let running = self.start();

        if let Some(seed_file) = self.config.seed_file.clone() {
            if let Err(e) = self.apply_seed(Path::new(&seed_file)).await {
                error!("❌ 种子数据加载失败: {:#}", e);
            }
        }

        info!("✅ 流水线已就绪，按 Ctrl+C 退出");
        tokio::signal::ctrl_c()
            .await
            .context("无法监听 Ctrl+C 信号")?;

        info!("🛑 正在停止...");
        let stats = running.stop().await;
        print_final_stats(&stats);
        if self.grading.notify_failures() > 0 {
            warn!(
                "⚠️ 画像刷新通知失败 {} 次",
                self.grading.notify_failures()
            );
        }
        Ok(())
    }

    /// 用种子数据驱动网关：建班、加学生、上传材料，材料整理完后申请出卷
    async fn apply_seed(&self, path: &Path) -> Result<()> {
        let seed = load_seed(path).await?;
        info!("📁 加载种子数据: {}", path.display());

        let class = self
            .gateway
            .create_class(&seed.class.name, &seed.class.subject)
            .await?;
        for student in &seed.students {
            self.gateway
                .enroll_student(&class.id, &student.name, student.student_code.as_deref())
                .await?;
        }

        let mut material_ids = HashMap::new();
        for material in seed.materials {
            let created = self
                .gateway
                .upload_material(
                    &class.id,
                    &material.title,
                    material.description.as_deref(),
                    material.attachments,
                )
                .await?;
            material_ids.insert(material.title, created.id);
        }

        let ids: Vec<String> = material_ids.values().cloned().collect();
        self.wait_materials(&ids).await?;

        for exam in seed.exams {
            let ids = exam
                .materials
                .iter()
                .filter_map(|title| material_ids.get(title).cloned())
                .collect();
            let settings = ExamSettings {
                mcq: exam.mcq,
                essay: exam.essay,
                unique_per_student: exam.unique_per_student,
            };
            self.gateway
                .request_exam(&class.id, &exam.title, exam.duration_minutes, ids, settings)
                .await?;
        }
        Ok(())
    }

    /// 轮询直到材料全部 done
    async fn wait_materials(&self, ids: &[String]) -> Result<()> {
        let deadline = Instant::now() + self.config.message_timeout();
        loop {
            let mut pending = 0;
            for id in ids {
                let done = self
                    .store
                    .get_material(id)
                    .await?
                    .is_some_and(|m| m.status == MaterialStatus::Done);
                if !done {
                    pending += 1;
                }
            }
            if pending == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("{} 份材料在超时前未整理完成", pending);
            }
            sleep(Duration::from_millis(200)).await;
        }
    }
}
