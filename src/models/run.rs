//! 测试运行记录数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::grade::{FileGrade, GradeLevel};

/// 测试运行状态
///
/// 只能向前推进：pending → running → complete | error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Complete,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Complete => "complete",
            RunStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            RunStatus::Pending => 0,
            RunStatus::Running => 1,
            RunStatus::Complete | RunStatus::Error => 2,
        }
    }

    /// 是否允许从当前状态写入 `next`
    ///
    /// 非终态允许原地重写（用于写入阶段性结果），终态之后不再允许任何写入
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "complete" => Ok(RunStatus::Complete),
            "error" => Ok(RunStatus::Error),
            other => Err(format!("未知的运行状态: {}", other)),
        }
    }
}

/// 一次测试运行的完整结果
///
/// `overall_score` 以及所有汇总计数都由 `file_results` 推导（见 `RunScorer::refresh`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub id: String,
    /// 运行开始时间
    pub timestamp: DateTime<Utc>,
    pub company_id: String,
    pub company_name: String,
    pub model_name: String,
    #[serde(default)]
    pub prompt_content: Option<String>,
    #[serde(default)]
    pub extended_thinking: bool,
    pub status: RunStatus,
    pub overall_score: f64,
    pub overall_grade: GradeLevel,
    pub file_results: Vec<FileGrade>,
    pub total_files: usize,
    pub total_periods: usize,
    pub total_fields_tested: usize,
    pub fields_correct: usize,
    pub fields_partial: usize,
    pub fields_wrong: usize,
    pub fields_missing: usize,
    #[serde(default)]
    pub fields_extra: usize,
    pub execution_time_seconds: f64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TestRunResult {
    /// 创建 pending 状态的空记录
    pub fn pending(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        company_id: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        let company_id = company_id.into();
        Self {
            id: id.into(),
            timestamp,
            company_name: company_id.clone(),
            company_id,
            model_name: model_name.into(),
            prompt_content: None,
            extended_thinking: false,
            status: RunStatus::Pending,
            overall_score: 0.0,
            overall_grade: GradeLevel::F,
            file_results: Vec::new(),
            total_files: 0,
            total_periods: 0,
            total_fields_tested: 0,
            fields_correct: 0,
            fields_partial: 0,
            fields_wrong: 0,
            fields_missing: 0,
            fields_extra: 0,
            execution_time_seconds: 0.0,
            error: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn summary(&self) -> TestRunSummary {
        TestRunSummary {
            id: self.id.clone(),
            timestamp: self.timestamp,
            company_id: self.company_id.clone(),
            company_name: self.company_name.clone(),
            model_name: self.model_name.clone(),
            status: self.status,
            overall_score: self.overall_score,
            overall_grade: self.overall_grade,
            total_files: self.total_files,
            fields_correct: self.fields_correct,
            fields_partial: self.fields_partial,
            fields_wrong: self.fields_wrong,
            fields_missing: self.fields_missing,
            execution_time_seconds: self.execution_time_seconds,
            error: self.error.clone(),
        }
    }
}

/// 列表视图使用的摘要（不含字段级明细）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunSummary {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub company_id: String,
    pub company_name: String,
    pub model_name: String,
    pub status: RunStatus,
    pub overall_score: f64,
    pub overall_grade: GradeLevel,
    pub total_files: usize,
    pub fields_correct: usize,
    pub fields_partial: usize,
    pub fields_wrong: usize,
    pub fields_missing: usize,
    pub execution_time_seconds: f64,
    pub error: Option<String>,
}

/// 分页历史记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestHistory {
    pub runs: Vec<TestRunSummary>,
    pub total_count: usize,
}

/// 测试运行请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub company_id: String,
    pub model_name: String,
    #[serde(default)]
    pub prompt_override: Option<String>,
    #[serde(default)]
    pub extended_thinking: bool,
    /// 未指定时使用配置中的默认值
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    /// 覆盖所有字段的容差（百分比）
    #[serde(default)]
    pub tolerance_override: Option<f64>,
}

impl RunRequest {
    pub fn new(company_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            model_name: model_name.into(),
            ..Default::default()
        }
    }
}
