//! 应用装配 - 编排层
//!
//! 根据配置创建所有共享资源（RunStore、ProgressBus、提取器），
//! 是唯一持有这些资源的地方

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{ProgressBus, RunStore, SqliteRunStore};
use crate::models::{CompanyStatus, TestHistory, TestRunResult};
use crate::orchestrator::RunOrchestrator;
use crate::services::{AnswerKeyStore, ExtractionAdapter, LlmExtractor};

/// 应用主结构
pub struct App {
    config: Config,
    orchestrator: Arc<RunOrchestrator>,
    answer_keys: AnswerKeyStore,
    store: Arc<dyn RunStore>,
}

impl App {
    /// 初始化应用：打开数据库，使用基于模型的提取器
    pub fn initialize(config: Config) -> AppResult<Self> {
        let extractor: Arc<dyn ExtractionAdapter> = Arc::new(LlmExtractor::new(&config));
        Self::with_adapter(config, extractor)
    }

    /// 使用指定的提取器初始化应用
    pub fn with_adapter(config: Config, adapter: Arc<dyn ExtractionAdapter>) -> AppResult<Self> {
        config.validate()?;

        let store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::open(Path::new(&config.database_path))?);
        let bus = ProgressBus::new(config.progress_capacity);
        let answer_keys = AnswerKeyStore::new(&config.answer_keys_dir);

        info!("✓ 测试记录数据库: {}", config.database_path);
        info!("✓ 标准答案目录: {}", config.answer_keys_dir);

        let orchestrator = Arc::new(RunOrchestrator::new(
            config.clone(),
            answer_keys.clone(),
            adapter,
            Arc::clone(&store),
            bus,
        ));

        Ok(Self {
            config,
            orchestrator,
            answer_keys,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<RunOrchestrator> {
        &self.orchestrator
    }

    /// 分页查询历史记录，`limit` 为空时使用配置中的默认条数
    pub async fn history(
        &self,
        company_id: Option<&str>,
        limit: Option<usize>,
        offset: usize,
    ) -> AppResult<TestHistory> {
        let limit = limit.unwrap_or(self.config.history_limit);
        self.store.history(company_id, limit, offset).await
    }

    pub async fn get_run(&self, run_id: &str) -> AppResult<TestRunResult> {
        self.store.get(run_id).await
    }

    pub async fn list_companies(&self) -> AppResult<Vec<String>> {
        self.answer_keys.list_companies().await
    }

    /// 每个公司的文档是否就位，运行前用来确认能否测试
    pub async fn company_status(&self) -> AppResult<Vec<CompanyStatus>> {
        self.answer_keys
            .all_company_status(Path::new(&self.config.documents_dir))
            .await
    }
}
