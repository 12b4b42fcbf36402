//! 单文件处理流程 - 流程层
//!
//! 核心职责：定义"一个文件"的完整处理流程
//!
//! 流程顺序：
//! 1. 提取（extracting）→ 调用 `ExtractionAdapter`，有超时限制
//! 2. 评分（grading）→ 期间对齐 → 字段评分 → 文件汇总
//! 3. 任一步失败 → 所有字段记为 missing 的 0 分文件，附带错误说明
//!
//! 单文件的失败只作为数据记录下来，不会向上抛出

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{AppResult, ExtractionError};
use crate::infrastructure::ProgressBus;
use crate::models::{AnswerKeyFile, ExtractedPeriod, FileGrade, ProgressEvent, ProgressPhase};
use crate::services::field_grader::{failed_period_grade, grade_period};
use crate::services::{align_periods, ExtractionAdapter, ExtractionRequest, GradingPolicy, RunScorer};
use crate::utils::logging::truncate_text;
use crate::workflow::file_ctx::FileCtx;

/// 进度事件中错误信息的最大长度
const PROGRESS_ERROR_MAX_CHARS: usize = 200;

/// 文件处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// 提取并评分成功
    Graded(FileGrade),
    /// 提取或评分失败，分数为 0
    Failed(FileGrade),
}

impl FileOutcome {
    pub fn grade(&self) -> &FileGrade {
        match self {
            FileOutcome::Graded(grade) | FileOutcome::Failed(grade) => grade,
        }
    }

    pub fn into_grade(self) -> FileGrade {
        match self {
            FileOutcome::Graded(grade) | FileOutcome::Failed(grade) => grade,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed(_))
    }
}

/// 一次测试中所有文件共用的参数
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub documents_dir: PathBuf,
    pub model_name: String,
    pub prompt_override: Option<String>,
    pub extended_thinking: bool,
    pub extraction_timeout: Duration,
    pub policy: GradingPolicy,
}

/// 单文件处理流程
///
/// - 不持有运行记录，不写数据库
/// - 只负责一个文件：提取、对齐、评分
/// - 通过 ProgressBus 报告 extracting / grading 两个阶段
pub struct FileFlow {
    adapter: Arc<dyn ExtractionAdapter>,
    bus: ProgressBus,
    scorer: RunScorer,
    settings: FlowSettings,
}

impl FileFlow {
    pub fn new(
        adapter: Arc<dyn ExtractionAdapter>,
        bus: ProgressBus,
        scorer: RunScorer,
        settings: FlowSettings,
    ) -> Self {
        Self {
            adapter,
            bus,
            scorer,
            settings,
        }
    }

    pub async fn run(&self, ctx: &FileCtx, key_file: &AnswerKeyFile) -> FileOutcome {
        info!("{} 📄 开始处理", ctx);

        match self.extract_and_grade(ctx, key_file).await {
            Ok(grade) => {
                info!(
                    "{} ✓ 评分完成: {:.1} ({})",
                    ctx, grade.overall_score, grade.overall_grade
                );
                FileOutcome::Graded(grade)
            }
            Err(e) => {
                error!("{} ❌ 处理失败: {}", ctx, e);
                self.failed(key_file, &e.to_string())
            }
        }
    }

    /// 生成失败文件的评分：所有期间 0 分
    pub fn failed(&self, key_file: &AnswerKeyFile, note: &str) -> FileOutcome {
        let periods = key_file
            .periods
            .iter()
            .map(|p| failed_period_grade(p, note, &self.settings.policy, &self.scorer))
            .collect();
        FileOutcome::Failed(self.scorer.score_file(
            &key_file.filename,
            key_file.doc_type,
            periods,
            Some(truncate_text(note, PROGRESS_ERROR_MAX_CHARS)),
        ))
    }

    async fn extract_and_grade(&self, ctx: &FileCtx, key_file: &AnswerKeyFile) -> AppResult<FileGrade> {
        // ========== 阶段 1: 提取 ==========
        self.emit(
            ctx,
            ProgressPhase::Extracting,
            format!("正在提取 {} ({}/{})", ctx.filename, ctx.file_index, ctx.total_files),
        );
        let extracted = self.extract(ctx, key_file).await?;
        info!("{} ✓ 提取完成，共 {} 个期间", ctx, extracted.len());

        // ========== 阶段 2: 评分 ==========
        self.emit(
            ctx,
            ProgressPhase::Grading,
            format!("正在评分 {} ({} 个期间)", ctx.filename, key_file.periods.len()),
        );

        let aligned = align_periods(&key_file.periods, &extracted);
        let mut periods = Vec::with_capacity(aligned.len());
        for pair in &aligned {
            periods.push(grade_period(pair, &self.settings.policy, &self.scorer)?);
        }

        Ok(self
            .scorer
            .score_file(&key_file.filename, key_file.doc_type, periods, None))
    }

    async fn extract(&self, ctx: &FileCtx, key_file: &AnswerKeyFile) -> AppResult<Vec<ExtractedPeriod>> {
        let file_path = self.settings.documents_dir.join(&key_file.filename);
        if !tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
            return Err(ExtractionError::FileNotFound {
                path: file_path.display().to_string(),
            }
            .into());
        }

        let request = ExtractionRequest {
            file_path,
            doc_type: key_file.doc_type,
            model_name: self.settings.model_name.clone(),
            prompt_override: self.settings.prompt_override.clone(),
            extended_thinking: self.settings.extended_thinking,
        };

        let timeout = self.settings.extraction_timeout;
        match tokio::time::timeout(timeout, self.adapter.extract(&request)).await {
            Ok(result) => result,
            Err(_) => {
                error!("{} ⏱️ 提取超时 ({} 秒)", ctx, timeout.as_secs());
                Err(ExtractionError::Timeout {
                    seconds: timeout.as_secs(),
                }
                .into())
            }
        }
    }

    fn emit(&self, ctx: &FileCtx, phase: ProgressPhase, message: String) {
        let mut event = ProgressEvent::new(&ctx.run_id, phase, message)
            .elapsed(ctx.elapsed_seconds())
            .file(ctx.file_index, &ctx.filename);
        event.total_files = Some(ctx.total_files);
        self.bus.publish(event);
    }
}
