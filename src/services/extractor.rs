//! 报表提取适配器 - 业务能力层
//!
//! `ExtractionAdapter` 是与外部提取服务之间的边界：给定文件、报表类型和模型，
//! 返回提取出的期间列表或失败。编排层只依赖这个 trait。
//!
//! `LlmExtractor` 是基于视觉模型的实现：图片以 base64 data URL 发送，
//! 文本类文件直接内联。PDF / Excel 渲染不在本 crate 范围内。

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppResult, ExtractionError};
use crate::models::fields::fields_for;
use crate::models::{parse_extraction, DocType, ExtractedPeriod};
use crate::services::llm_service::{LlmCall, LlmService};

const DEFAULT_MAX_TOKENS: u32 = 8192;
const EXTENDED_THINKING_MAX_TOKENS: u32 = 32000;

/// 单次提取请求
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub file_path: PathBuf,
    pub doc_type: DocType,
    pub model_name: String,
    pub prompt_override: Option<String>,
    pub extended_thinking: bool,
}

/// 外部提取服务边界
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    /// 从文档中提取报表
    ///
    /// 网络错误、结构校验错误都以 `AppError::Extraction` 返回，由编排层记为单文件失败
    async fn extract(&self, request: &ExtractionRequest) -> AppResult<Vec<ExtractedPeriod>>;
}

/// 文档内容
#[derive(Debug, Clone, PartialEq)]
enum DocumentContent {
    /// data URL
    Image(String),
    Text(String),
}

fn image_mime(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn is_text(extension: &str) -> bool {
    matches!(extension, "txt" | "csv" | "tsv" | "json" | "md")
}

async fn load_document(path: &Path) -> AppResult<DocumentContent> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let not_found = || ExtractionError::FileNotFound {
        path: path.display().to_string(),
    };

    if let Some(mime) = image_mime(&extension) {
        let bytes = tokio::fs::read(path).await.map_err(|_| not_found())?;
        debug!("读取图片 {} ({} 字节)", path.display(), bytes.len());
        return Ok(DocumentContent::Image(format!(
            "data:{};base64,{}",
            mime,
            BASE64.encode(bytes)
        )));
    }

    if is_text(&extension) {
        let text = tokio::fs::read_to_string(path).await.map_err(|_| not_found())?;
        return Ok(DocumentContent::Text(text));
    }

    Err(ExtractionError::UnsupportedFormat { extension }.into())
}

/// 默认系统提示词
fn default_system_prompt(doc_type: DocType) -> String {
    let statement = match doc_type {
        DocType::Income => "income statement",
        DocType::Balance => "balance sheet",
    };
    format!(
        "You are a financial analyst extracting a {statement} into a standardized schema. \
         Extract data for ALL visible period columns, most recent first. \
         Respond with JSON only, no commentary, in the form \
         {{\"periods\": [{{\"period_label\": str, \"end_date\": \"YYYY-MM-DD\" | null, \
         \"data\": {{<field>: {{\"value\": number | null, \"confidence\": number}}}}}}], \
         \"currency\": str, \"scale\": str}}. \
         Use null when a line item is not present. Allowed fields: {fields}.",
        statement = statement,
        fields = fields_for(doc_type).join(", ")
    )
}

/// 去掉模型可能包裹的 ```json 代码块标记
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 跳过语言标记所在的第一行
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// 基于视觉模型的提取器
pub struct LlmExtractor {
    llm: LlmService,
}

impl LlmExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            llm: LlmService::new(config),
        }
    }
}

#[async_trait]
impl ExtractionAdapter for LlmExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> AppResult<Vec<ExtractedPeriod>> {
        let content = load_document(&request.file_path).await?;

        let system_prompt = request
            .prompt_override
            .clone()
            .unwrap_or_else(|| default_system_prompt(request.doc_type));
        let max_tokens = if request.extended_thinking {
            EXTENDED_THINKING_MAX_TOKENS
        } else {
            DEFAULT_MAX_TOKENS
        };

        let (user_message, images) = match content {
            DocumentContent::Image(url) => (
                format!("Extract the {} from this document image.", request.doc_type),
                vec![url],
            ),
            DocumentContent::Text(text) => (
                format!("Extract the {} from this document:\n\n{}", request.doc_type, text),
                Vec::new(),
            ),
        };

        info!(
            "📄 提取 {} ({}), 模型: {}",
            request.file_path.display(),
            request.doc_type,
            request.model_name
        );

        let response = self
            .llm
            .send_to_llm(LlmCall {
                model: &request.model_name,
                system_message: Some(&system_prompt),
                user_message: &user_message,
                images: &images,
                max_tokens,
            })
            .await?;

        parse_extraction(strip_code_fence(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[]\n```  "), "[]");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_default_prompt_lists_fields() {
        let prompt = default_system_prompt(DocType::Balance);
        assert!(prompt.contains("balance sheet"));
        assert!(prompt.contains("total_liabilities_and_equity"));
        assert!(!prompt.contains("gross_profit"));
    }

    #[tokio::test]
    async fn test_load_document_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("pnl.PNG");
        std::fs::write(&png, [0x89, b'P', b'N', b'G']).unwrap();
        let csv = dir.path().join("bs.csv");
        std::fs::write(&csv, "label,2024\ncash,10").unwrap();
        let pdf = dir.path().join("packet.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();

        match load_document(&png).await.unwrap() {
            DocumentContent::Image(url) => assert!(url.starts_with("data:image/png;base64,")),
            other => panic!("expected image, got {:?}", other),
        }
        assert_eq!(
            load_document(&csv).await.unwrap(),
            DocumentContent::Text("label,2024\ncash,10".to_string())
        );
        assert!(matches!(
            load_document(&pdf).await,
            Err(AppError::Extraction(ExtractionError::UnsupportedFormat { .. }))
        ));
        assert!(matches!(
            load_document(&dir.path().join("missing.png")).await,
            Err(AppError::Extraction(ExtractionError::FileNotFound { .. }))
        ));
    }
}
