//! 文件处理上下文
//!
//! 封装"我正在处理哪次测试的第几个文件"这一信息

use std::fmt::Display;
use std::time::Instant;

use crate::models::DocType;

/// 文件处理上下文
#[derive(Debug, Clone)]
pub struct FileCtx {
    /// 测试运行 ID
    pub run_id: String,

    /// 文件在标准答案中的序号（从 1 开始）
    pub file_index: usize,

    /// 本次测试的文件总数
    pub total_files: usize,

    pub filename: String,

    pub doc_type: DocType,

    /// 测试开始时间，用于计算进度事件中的耗时
    pub started_at: Instant,
}

impl FileCtx {
    pub fn new(
        run_id: impl Into<String>,
        file_index: usize,
        total_files: usize,
        filename: impl Into<String>,
        doc_type: DocType,
        started_at: Instant,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            file_index,
            total_files,
            filename: filename.into(),
            doc_type,
            started_at,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

impl Display for FileCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[测试 {} 文件#{}/{} {} ({})]",
            self.run_id, self.file_index, self.total_files, self.filename, self.doc_type
        )
    }
}
