//! 进度事件数据模型
//!
//! 只用于界面反馈，权威结果永远以 RunStore 中的记录为准

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::grade::GradeLevel;

/// 进度阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Initializing,
    Loading,
    Extracting,
    Grading,
    FileComplete,
    FileError,
    Complete,
}

/// 进度事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "test_id")]
    pub run_id: String,
    pub phase: ProgressPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    /// 当前文件序号（从 1 开始）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_completed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_grade: Option<GradeLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_grade: Option<GradeLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(run_id: impl Into<String>, phase: ProgressPhase, message: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            phase,
            message: message.into(),
            elapsed_seconds: None,
            total_files: None,
            current_file: None,
            current_filename: None,
            files_completed: None,
            file_score: None,
            file_grade: None,
            overall_score: None,
            overall_grade: None,
            error: None,
        }
    }

    pub fn elapsed(mut self, seconds: f64) -> Self {
        self.elapsed_seconds = Some((seconds * 10.0).round() / 10.0);
        self
    }

    pub fn files(mut self, total_files: usize, files_completed: usize) -> Self {
        self.total_files = Some(total_files);
        self.files_completed = Some(files_completed);
        self
    }

    pub fn file(mut self, index: usize, filename: impl Into<String>) -> Self {
        self.current_file = Some(index);
        self.current_filename = Some(filename.into());
        self
    }

    pub fn file_result(mut self, score: f64, grade: GradeLevel) -> Self {
        self.file_score = Some(score);
        self.file_grade = Some(grade);
        self
    }

    pub fn overall(mut self, score: f64, grade: GradeLevel) -> Self {
        self.overall_score = Some(score);
        self.overall_grade = Some(grade);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// 转换为推送给前端的消息：`{type: "test_progress", payload: {...}}`
    pub fn to_message(&self) -> JsonValue {
        json!({
            "type": "test_progress",
            "payload": self,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_omits_absent_fields() {
        let event = ProgressEvent::new("run-1", ProgressPhase::FileComplete, "完成")
            .elapsed(3.14159)
            .file(2, "pnl.png")
            .file_result(95.0, GradeLevel::A);

        let message = event.to_message();
        assert_eq!(message["type"], "test_progress");
        let payload = &message["payload"];
        assert_eq!(payload["test_id"], "run-1");
        assert_eq!(payload["phase"], "file_complete");
        assert_eq!(payload["elapsed_seconds"], 3.1);
        assert_eq!(payload["current_filename"], "pnl.png");
        assert_eq!(payload["file_grade"], "A");
        assert!(payload.get("overall_score").is_none());
        assert!(payload.get("error").is_none());
    }
}
