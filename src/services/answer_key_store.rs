//! 标准答案存储 - 业务能力层
//!
//! 只负责"读写标准答案 JSON"能力，评分路径只读

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{AnswerKeyError, AppResult};
use crate::models::{CompanyAnswerKey, CompanyStatus, DocumentStatus};

const ANSWER_KEY_SUFFIX: &str = "_answer_key.json";

/// 标准答案存储
///
/// 每个公司一个文件：`{dir}/{company_id}_answer_key.json`
#[derive(Debug, Clone)]
pub struct AnswerKeyStore {
    dir: PathBuf,
}

impl AnswerKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, company_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", company_id, ANSWER_KEY_SUFFIX))
    }

    /// 加载公司的标准答案
    ///
    /// # 参数
    /// - `company_id`: 公司 ID
    ///
    /// # 返回
    /// 文件不存在时返回 `AnswerKeyError::NotFound`
    pub async fn load(&self, company_id: &str) -> AppResult<CompanyAnswerKey> {
        let path = self.path_for(company_id);
        let path_str = path.display().to_string();

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AnswerKeyError::NotFound {
                    company_id: company_id.to_string(),
                    path: path_str,
                }
                .into());
            }
            Err(source) => {
                return Err(AnswerKeyError::ReadFailed {
                    path: path_str,
                    source,
                }
                .into());
            }
        };

        let key: CompanyAnswerKey = serde_json::from_str(&content)
            .map_err(|source| AnswerKeyError::ParseFailed {
                path: path_str.clone(),
                source,
            })?;

        debug!(
            "已加载标准答案 {}: {} 个文件, {} 个期间",
            path_str,
            key.files.len(),
            key.total_periods()
        );
        Ok(key)
    }

    /// 保存标准答案
    ///
    /// 先写临时文件再重命名，读者不会看到写了一半的文件
    pub async fn save(&self, key: &CompanyAnswerKey) -> AppResult<PathBuf> {
        let path = self.path_for(&key.company_id);
        let path_str = path.display().to_string();

        let json = serde_json::to_string_pretty(key).map_err(|source| AnswerKeyError::ParseFailed {
            path: path_str.clone(),
            source,
        })?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| AnswerKeyError::WriteFailed {
                path: path_str.clone(),
                source,
            })?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .await
            .map_err(|source| AnswerKeyError::WriteFailed {
                path: tmp_path.display().to_string(),
                source,
            })?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| AnswerKeyError::WriteFailed {
                path: path_str.clone(),
                source,
            })?;

        info!("✓ 标准答案已保存: {}", path_str);
        Ok(path)
    }

    /// 列出所有有标准答案的公司 ID（排序）
    pub async fn list_companies(&self) -> AppResult<Vec<String>> {
        let mut companies = Vec::new();
        if !Path::new(&self.dir).exists() {
            return Ok(companies);
        }

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|source| AnswerKeyError::ReadFailed {
                path: self.dir.display().to_string(),
                source,
            })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| AnswerKeyError::ReadFailed {
                path: self.dir.display().to_string(),
                source,
            })?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(company_id) = name.strip_suffix(ANSWER_KEY_SUFFIX) {
                if !company_id.is_empty() {
                    companies.push(company_id.to_string());
                }
            }
        }

        companies.sort();
        Ok(companies)
    }

    /// 检查一个公司的文档是否都在文档目录中
    ///
    /// # 参数
    /// - `company_id`: 公司 ID
    /// - `documents_dir`: 文档目录，文件按 `{documents_dir}/{filename}` 查找
    pub async fn company_status(&self, company_id: &str, documents_dir: &Path) -> AppResult<CompanyStatus> {
        let key = self.load(company_id).await?;

        let mut files = Vec::with_capacity(key.files.len());
        for file in &key.files {
            let size_bytes = match fs::metadata(documents_dir.join(&file.filename)).await {
                Ok(meta) if meta.is_file() => Some(meta.len()),
                _ => None,
            };
            files.push(DocumentStatus {
                filename: file.filename.clone(),
                doc_type: file.doc_type,
                exists: size_bytes.is_some(),
                size_bytes,
            });
        }

        let path = self.path_for(company_id).display().to_string();
        Ok(CompanyStatus::new(&key, files, path))
    }

    /// 所有公司的文档情况，标准答案无法加载的公司跳过并记录警告
    pub async fn all_company_status(&self, documents_dir: &Path) -> AppResult<Vec<CompanyStatus>> {
        let mut statuses = Vec::new();
        for company_id in self.list_companies().await? {
            match self.company_status(&company_id, documents_dir).await {
                Ok(status) => statuses.push(status),
                Err(e) => warn!("⚠️ 跳过公司 {}: {}", company_id, e),
            }
        }
        Ok(statuses)
    }
}
