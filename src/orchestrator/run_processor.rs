//! 测试运行处理器 - 编排层
//!
//! ## 职责
//!
//! 一次测试运行的完整生命周期：
//!
//! 1. **创建记录**：pending 状态立即写入 RunStore
//! 2. **加载标准答案**：失败则整次运行进入 error
//! 3. **分发文件**：顺序处理，或用 Semaphore 限制并发数的并行处理
//! 4. **汇总结果**：每完成一个文件就重新汇总并写回记录（状态保持 running）
//! 5. **结束**：complete 或 error，发出最后的 `complete` 进度事件
//!
//! 单个文件的失败由 `FileFlow` 记为 0 分文件，不会终止运行。

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::config::{clamp_concurrency, Config};
use crate::error::{AppResult, ConfigError, GradingError};
use crate::infrastructure::{ProgressBus, RunStore};
use crate::models::{
    AnswerKeyFile, FileGrade, ProgressEvent, ProgressPhase, RunRequest, RunStatus, TestRunResult,
};
use crate::services::{AnswerKeyStore, ExtractionAdapter, GradingPolicy, RunScorer};
use crate::utils::logging::{
    log_answer_key_loaded, log_file_done, log_run_start, print_final_stats, truncate_text,
};
use crate::workflow::{FileCtx, FileFlow, FileOutcome, FlowSettings};

/// 进度事件中错误信息的最大长度
const EVENT_ERROR_MAX_CHARS: usize = 200;

/// 测试运行编排器
///
/// 持有一次测试需要的全部协作者；多个运行可以共享同一个编排器并发执行
pub struct RunOrchestrator {
    config: Config,
    answer_keys: AnswerKeyStore,
    adapter: Arc<dyn ExtractionAdapter>,
    store: Arc<dyn RunStore>,
    bus: ProgressBus,
    scorer: RunScorer,
}

/// 分发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Sequential,
    Parallel(usize),
}

impl RunOrchestrator {
    pub fn new(
        config: Config,
        answer_keys: AnswerKeyStore,
        adapter: Arc<dyn ExtractionAdapter>,
        store: Arc<dyn RunStore>,
        bus: ProgressBus,
    ) -> Self {
        Self {
            config,
            answer_keys,
            adapter,
            store,
            bus,
            scorer: RunScorer::default(),
        }
    }

    pub fn with_scorer(mut self, scorer: RunScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub fn new_run_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// 执行一次测试并等待结束
    pub async fn run(&self, request: RunRequest) -> AppResult<TestRunResult> {
        self.run_with_id(Self::new_run_id(), request).await
    }

    /// 在后台启动一次测试，立即返回运行 ID
    ///
    /// 调用方可以先用返回的 ID 订阅进度，再等待句柄
    pub fn start(self: &Arc<Self>, request: RunRequest) -> (String, JoinHandle<AppResult<TestRunResult>>) {
        let run_id = Self::new_run_id();
        let orchestrator = Arc::clone(self);
        let id = run_id.clone();
        let handle = tokio::spawn(async move { orchestrator.run_with_id(id, request).await });
        (run_id, handle)
    }

    /// 用指定的运行 ID 执行一次测试
    ///
    /// # 返回
    /// 成功时返回 complete 状态的结果；运行级错误时记录已标记为 error，返回该错误
    pub async fn run_with_id(&self, run_id: String, request: RunRequest) -> AppResult<TestRunResult> {
        let started = Instant::now();
        let request = self.prepare_request(request)?;

        let dispatch = self.dispatch_for(&request);
        let mut result = TestRunResult::pending(&run_id, Utc::now(), &request.company_id, &request.model_name);
        result.prompt_content = request.prompt_override.clone();
        result.extended_thinking = request.extended_thinking;
        result.metadata.insert("parallel".to_string(), json!(matches!(dispatch, Dispatch::Parallel(_))));
        if let Dispatch::Parallel(n) = dispatch {
            result.metadata.insert("max_concurrent".to_string(), json!(n));
        }
        if let Some(tolerance) = request.tolerance_override {
            result.metadata.insert("tolerance_override".to_string(), json!(tolerance));
        }

        if let Err(e) = self.store.create(&result).await {
            error!("[测试 {}] ❌ 无法创建测试记录: {}", run_id, e);
            self.emit_failure(&run_id, started, &e.to_string());
            return Err(e);
        }

        match self.execute(&mut result, &request, dispatch, started).await {
            Ok(()) => Ok(result),
            Err(e) => {
                self.mark_failed(&mut result, started, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// 校验请求并补全默认值
    fn prepare_request(&self, mut request: RunRequest) -> AppResult<RunRequest> {
        if request.company_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "company_id".to_string(),
                reason: "不能为空".to_string(),
            }
            .into());
        }
        if request.model_name.trim().is_empty() {
            request.model_name = self.config.default_model.clone();
        }
        if let Some(tolerance) = request.tolerance_override {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(GradingError::NegativeTolerance {
                    field: "*".to_string(),
                    tolerance,
                }
                .into());
            }
        }
        Ok(request)
    }

    fn dispatch_for(&self, request: &RunRequest) -> Dispatch {
        if request.parallel.unwrap_or(self.config.parallel) {
            Dispatch::Parallel(clamp_concurrency(
                request.max_concurrent.unwrap_or(self.config.max_concurrent),
            ))
        } else {
            Dispatch::Sequential
        }
    }

    async fn execute(
        &self,
        result: &mut TestRunResult,
        request: &RunRequest,
        dispatch: Dispatch,
        started: Instant,
    ) -> AppResult<()> {
        let run_id = result.id.clone();

        // ========== 初始化 ==========
        self.emit(ProgressEvent::new(&run_id, ProgressPhase::Initializing, "初始化测试"), started);
        log_run_start(
            &run_id,
            &request.company_id,
            &request.model_name,
            match dispatch {
                Dispatch::Parallel(n) => Some(n),
                Dispatch::Sequential => None,
            },
        );

        // ========== 加载标准答案 ==========
        self.emit(
            ProgressEvent::new(&run_id, ProgressPhase::Loading, format!("加载 {} 的标准答案", request.company_id)),
            started,
        );
        let answer_key = self.answer_keys.load(&request.company_id).await?;
        log_answer_key_loaded(&answer_key.company_name, answer_key.files.len(), answer_key.total_periods());

        result.company_name = answer_key.company_name.clone();
        result.total_files = answer_key.files.len();
        result.status = RunStatus::Running;
        self.store.upsert(result).await?;

        if answer_key.files.is_empty() {
            warn!("[测试 {}] ⚠️ 标准答案中没有文件", run_id);
        }

        // ========== 处理文件 ==========
        let flow = Arc::new(FileFlow::new(
            Arc::clone(&self.adapter),
            self.bus.clone(),
            self.scorer.clone(),
            FlowSettings {
                documents_dir: PathBuf::from(&self.config.documents_dir),
                model_name: request.model_name.clone(),
                prompt_override: request.prompt_override.clone(),
                extended_thinking: request.extended_thinking,
                extraction_timeout: Duration::from_secs(self.config.extraction_timeout_secs),
                policy: GradingPolicy::default().with_tolerance_override(request.tolerance_override),
            },
        ));

        let total_files = answer_key.files.len();
        let jobs: Vec<(FileCtx, AnswerKeyFile)> = answer_key
            .files
            .into_iter()
            .enumerate()
            .map(|(i, file)| {
                let ctx = FileCtx::new(&run_id, i + 1, total_files, &file.filename, file.doc_type, started);
                (ctx, file)
            })
            .collect();

        let mut slots: Vec<Option<FileGrade>> = vec![None; total_files];
        match dispatch {
            Dispatch::Sequential => {
                for (completed, (ctx, file)) in jobs.iter().enumerate() {
                    let outcome = flow.run(ctx, file).await;
                    self.record_outcome(result, &mut slots, ctx, outcome, completed + 1, started)
                        .await?;
                }
            }
            Dispatch::Parallel(max_concurrent) => {
                self.dispatch_parallel(result, &mut slots, &flow, jobs, max_concurrent, started)
                    .await?;
            }
        }

        // ========== 结束 ==========
        result.status = RunStatus::Complete;
        result.execution_time_seconds = started.elapsed().as_secs_f64();
        self.scorer.refresh(result);
        self.store.upsert(result).await?;
        print_final_stats(result);

        self.emit(
            ProgressEvent::new(
                &run_id,
                ProgressPhase::Complete,
                format!("测试完成: {:.1} ({})", result.overall_score, result.overall_grade),
            )
            .files(result.total_files, result.file_results.len())
            .overall(result.overall_score, result.overall_grade),
            started,
        );
        Ok(())
    }

    /// 并行处理文件：同时最多 `max_concurrent` 个文件在提取
    async fn dispatch_parallel(
        &self,
        result: &mut TestRunResult,
        slots: &mut [Option<FileGrade>],
        flow: &Arc<FileFlow>,
        jobs: Vec<(FileCtx, AnswerKeyFile)>,
        max_concurrent: usize,
        started: Instant,
    ) -> AppResult<()> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut in_flight = FuturesUnordered::new();
        let mut abort_handles = Vec::with_capacity(jobs.len());

        for (ctx, file) in jobs {
            let task_flow = Arc::clone(flow);
            let semaphore = Arc::clone(&semaphore);
            let task_ctx = ctx.clone();
            let task_file = file.clone();
            let handle = tokio::spawn(async move {
                // 信号量不会被关闭，拿不到许可时直接执行
                let _permit = semaphore.acquire_owned().await.ok();
                task_flow.run(&task_ctx, &task_file).await
            });
            abort_handles.push(handle.abort_handle());

            let flow = Arc::clone(flow);
            in_flight.push(async move {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("{} 任务执行失败: {}", ctx, e);
                        flow.failed(&file, &format!("任务执行失败: {}", e))
                    }
                };
                (ctx, outcome)
            });
        }

        let mut completed = 0;
        while let Some((ctx, outcome)) = in_flight.next().await {
            completed += 1;
            if let Err(e) = self
                .record_outcome(result, slots, &ctx, outcome, completed, started)
                .await
            {
                // 记录写不进去，剩下的提取结果也无处保存
                warn!(
                    "⚠️ {} 保存结果失败，取消剩余 {} 个文件任务: {}",
                    ctx,
                    in_flight.len(),
                    e
                );
                for handle in &abort_handles {
                    handle.abort();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// 记录一个文件的结果：按标准答案中的顺序放回，重新汇总并写回记录
    async fn record_outcome(
        &self,
        result: &mut TestRunResult,
        slots: &mut [Option<FileGrade>],
        ctx: &FileCtx,
        outcome: FileOutcome,
        completed: usize,
        started: Instant,
    ) -> AppResult<()> {
        let failed = outcome.is_failed();
        let grade = outcome.into_grade();
        let (file_score, file_grade, file_error) =
            (grade.overall_score, grade.overall_grade, grade.error.clone());

        if let Some(slot) = slots.get_mut(ctx.file_index - 1) {
            *slot = Some(grade);
        }
        result.file_results = slots.iter().flatten().cloned().collect();
        result.execution_time_seconds = started.elapsed().as_secs_f64();
        self.scorer.refresh(result);
        self.store.upsert(result).await?;

        log_file_done(&result.id, completed, ctx.total_files, result.overall_score);

        let (phase, message) = if failed {
            (ProgressPhase::FileError, format!("{} 处理失败", ctx.filename))
        } else {
            (
                ProgressPhase::FileComplete,
                format!("{} 完成: {:.1} ({})", ctx.filename, file_score, file_grade),
            )
        };
        let mut event = ProgressEvent::new(&result.id, phase, message)
            .file(ctx.file_index, &ctx.filename)
            .files(ctx.total_files, completed)
            .file_result(file_score, file_grade)
            .overall(result.overall_score, result.overall_grade);
        if let Some(note) = file_error {
            event = event.error(truncate_text(&note, EVENT_ERROR_MAX_CHARS));
        }
        self.emit(event, started);
        Ok(())
    }

    /// 运行级失败：保留已有的部分结果，标记为 error
    async fn mark_failed(&self, result: &mut TestRunResult, started: Instant, message: &str) {
        error!("[测试 {}] ❌ 测试失败: {}", result.id, message);

        result.status = RunStatus::Error;
        result.error = Some(message.to_string());
        result.execution_time_seconds = started.elapsed().as_secs_f64();
        self.scorer.refresh(result);

        if let Err(e) = self.store.upsert(result).await {
            error!("[测试 {}] ❌ 无法写入失败状态: {}", result.id, e);
        }
        self.emit_failure(&result.id, started, message);
    }

    fn emit_failure(&self, run_id: &str, started: Instant, message: &str) {
        self.emit(
            ProgressEvent::new(run_id, ProgressPhase::Complete, "测试失败")
                .error(truncate_text(message, EVENT_ERROR_MAX_CHARS)),
            started,
        );
    }

    fn emit(&self, event: ProgressEvent, started: Instant) {
        self.bus.publish(event.elapsed(started.elapsed().as_secs_f64()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::infrastructure::SqliteRunStore;
    use crate::models::{
        AnswerKeyFile, CompanyAnswerKey, DocType, ExpectedLineItem, ExpectedPeriod, ExtractedPeriod,
        TestRunSummary,
    };
    use crate::services::ExtractionRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NeverCalled;

    #[async_trait]
    impl ExtractionAdapter for NeverCalled {
        async fn extract(&self, _request: &ExtractionRequest) -> AppResult<Vec<ExtractedPeriod>> {
            Err(AppError::Other("unexpected call".to_string()))
        }
    }

    /// 除 `fast.png` 外都要等一会儿才返回，记录真正完成的提取次数
    #[derive(Default)]
    struct SlowAfterFirst {
        finished: AtomicUsize,
    }

    #[async_trait]
    impl ExtractionAdapter for SlowAfterFirst {
        async fn extract(&self, request: &ExtractionRequest) -> AppResult<Vec<ExtractedPeriod>> {
            if !request.file_path.ends_with("fast.png") {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ExtractedPeriod::new("FY2024", None).with_value("revenue", Some(1.0))])
        }
    }

    /// 第一次写入文件结果时失败的存储
    struct BrokenAfterFirstFile {
        inner: SqliteRunStore,
    }

    #[async_trait]
    impl RunStore for BrokenAfterFirstFile {
        async fn create(&self, result: &TestRunResult) -> AppResult<()> {
            self.inner.create(result).await
        }

        async fn upsert(&self, result: &TestRunResult) -> AppResult<()> {
            if !result.file_results.is_empty() {
                return Err(AppError::Other("disk full".to_string()));
            }
            self.inner.upsert(result).await
        }

        async fn get(&self, id: &str) -> AppResult<TestRunResult> {
            self.inner.get(id).await
        }

        async fn list(&self, limit: usize, offset: usize) -> AppResult<Vec<TestRunSummary>> {
            self.inner.list(limit, offset).await
        }

        async fn list_for_company(&self, company_id: &str, limit: usize, offset: usize) -> AppResult<Vec<TestRunSummary>> {
            self.inner.list_for_company(company_id, limit, offset).await
        }

        async fn count(&self, company_id: Option<&str>) -> AppResult<usize> {
            self.inner.count(company_id).await
        }
    }

    fn orchestrator(config: Config) -> RunOrchestrator {
        let store = SqliteRunStore::open_in_memory().unwrap();
        RunOrchestrator::new(
            config,
            AnswerKeyStore::new("does-not-exist"),
            Arc::new(NeverCalled),
            Arc::new(store),
            ProgressBus::new(16),
        )
    }

    #[test]
    fn test_prepare_request_defaults_model() {
        let orch = orchestrator(Config::default());
        let request = orch.prepare_request(RunRequest::new("acme", " ")).unwrap();
        assert_eq!(request.model_name, Config::default().default_model);
    }

    #[test]
    fn test_prepare_request_rejects_bad_input() {
        let orch = orchestrator(Config::default());
        assert!(orch.prepare_request(RunRequest::new("", "m")).is_err());

        let mut request = RunRequest::new("acme", "m");
        request.tolerance_override = Some(-1.0);
        assert!(matches!(
            orch.prepare_request(request),
            Err(AppError::Grading(GradingError::NegativeTolerance { .. }))
        ));
    }

    #[test]
    fn test_dispatch_mode() {
        let orch = orchestrator(Config::default());
        let mut request = RunRequest::new("acme", "m");
        assert_eq!(orch.dispatch_for(&request), Dispatch::Parallel(3));

        request.max_concurrent = Some(50);
        assert_eq!(orch.dispatch_for(&request), Dispatch::Parallel(10));

        request.parallel = Some(false);
        assert_eq!(orch.dispatch_for(&request), Dispatch::Sequential);
    }

    #[tokio::test]
    async fn test_missing_answer_key_marks_run_as_error() {
        let orch = orchestrator(Config::default());
        let err = orch
            .run_with_id("run-x".to_string(), RunRequest::new("ghost", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AnswerKey(_)));

        let stored = orch.store().get("run-x").await.unwrap();
        assert_eq!(stored.status, RunStatus::Error);
        assert!(stored.error.is_some());
        assert!(stored.file_results.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_cancels_remaining_parallel_files() {
        let dir = tempfile::tempdir().unwrap();
        let keys_dir = dir.path().join("keys");
        let docs_dir = dir.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();

        let filenames = ["fast.png", "slow1.png", "slow2.png"];
        let files = filenames
            .iter()
            .map(|name| {
                std::fs::write(docs_dir.join(name), b"doc").unwrap();
                AnswerKeyFile {
                    filename: name.to_string(),
                    doc_type: DocType::Income,
                    periods: vec![ExpectedPeriod::new("FY2024", None)
                        .with_field("revenue", ExpectedLineItem::new(Some(1.0)))],
                }
            })
            .collect();
        let answer_keys = AnswerKeyStore::new(&keys_dir);
        answer_keys
            .save(&CompanyAnswerKey {
                company_id: "acme".to_string(),
                company_name: "Acme".to_string(),
                files,
            })
            .await
            .unwrap();

        let config = Config {
            documents_dir: docs_dir.display().to_string(),
            ..Config::default()
        };
        let adapter = Arc::new(SlowAfterFirst::default());
        let orch = RunOrchestrator::new(
            config,
            answer_keys,
            adapter.clone(),
            Arc::new(BrokenAfterFirstFile {
                inner: SqliteRunStore::open_in_memory().unwrap(),
            }),
            ProgressBus::new(16),
        );

        let mut request = RunRequest::new("acme", "m");
        request.max_concurrent = Some(3);
        let err = orch.run(request).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));

        // 被取消的提取不会在运行结束后继续完成
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(adapter.finished.load(Ordering::SeqCst), 1);
    }
}
