use serde::Deserialize;
use std::path::Path;

use crate::error::{AppResult, ConfigError};

/// 并发数上限
pub const MAX_CONCURRENT_LIMIT: usize = 10;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 标准答案 JSON 目录（每个公司一个 `{company_id}_answer_key.json`）
    pub answer_keys_dir: String,
    /// 待测试文档所在目录
    pub documents_dir: String,
    /// 测试记录数据库路径
    pub database_path: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    /// 未指定模型时使用的默认模型
    pub default_model: String,
    // --- 运行配置 ---
    /// 并行模式下同时处理的文件数量
    pub max_concurrent: usize,
    /// 是否并行处理文件
    pub parallel: bool,
    /// 单个文件提取的超时时间（秒）
    pub extraction_timeout_secs: u64,
    /// 进度通道容量
    pub progress_capacity: usize,
    /// 历史记录默认条数
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            answer_keys_dir: "answer_keys".to_string(),
            documents_dir: "documents".to_string(),
            database_path: "test_results.db".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            default_model: "claude-opus-4-5".to_string(),
            max_concurrent: 3,
            parallel: true,
            extraction_timeout_secs: 300,
            progress_capacity: 256,
            history_limit: 50,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载配置，环境变量优先
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        let base = self;
        Self {
            answer_keys_dir: std::env::var("ANSWER_KEYS_DIR").unwrap_or(base.answer_keys_dir),
            documents_dir: std::env::var("DOCUMENTS_DIR").unwrap_or(base.documents_dir),
            database_path: std::env::var("DATABASE_PATH").unwrap_or(base.database_path),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(base.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(base.llm_api_base_url),
            default_model: std::env::var("DEFAULT_MODEL").unwrap_or(base.default_model),
            max_concurrent: std::env::var("MAX_CONCURRENT").ok().and_then(|v| v.parse().ok()).unwrap_or(base.max_concurrent),
            parallel: std::env::var("PARALLEL").ok().and_then(|v| v.parse().ok()).unwrap_or(base.parallel),
            extraction_timeout_secs: std::env::var("EXTRACTION_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(base.extraction_timeout_secs),
            progress_capacity: std::env::var("PROGRESS_CAPACITY").ok().and_then(|v| v.parse().ok()).unwrap_or(base.progress_capacity),
            history_limit: std::env::var("HISTORY_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(base.history_limit),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> AppResult<()> {
        if self.extraction_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extraction_timeout_secs".to_string(),
                reason: "必须大于 0".to_string(),
            }
            .into());
        }
        if self.progress_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "progress_capacity".to_string(),
                reason: "必须大于 0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// 限制在 1..=10 之间的并发数
    pub fn effective_max_concurrent(&self) -> usize {
        clamp_concurrency(self.max_concurrent)
    }
}

pub fn clamp_concurrency(n: usize) -> usize {
    n.clamp(1, MAX_CONCURRENT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_max_concurrent(), 3);
        assert!(config.parallel);
    }

    #[test]
    fn test_clamp_concurrency() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(4), 4);
        assert_eq!(clamp_concurrency(64), MAX_CONCURRENT_LIMIT);
    }

    #[test]
    fn test_toml_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "documents_dir = \"fixtures/docs\"\nextraction_timeout_secs = 30").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.extraction_timeout_secs, 30);
        assert_eq!(config.progress_capacity, 256);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config {
            extraction_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
