//! 标准答案数据模型
//!
//! 人工编写的"正确答案"：每个公司、每个文件、每个期间、每个字段的期望值

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 默认容差（百分比）
pub const DEFAULT_TOLERANCE_PERCENT: f64 = 5.0;

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE_PERCENT
}

/// 报表类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// 利润表
    Income,
    /// 资产负债表
    Balance,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Income => "income",
            DocType::Balance => "balance",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" | "income_statement" => Ok(DocType::Income),
            "balance" | "balance_sheet" => Ok(DocType::Balance),
            other => Err(format!("未知的报表类型: {}", other)),
        }
    }
}

/// 单个字段的期望值
///
/// `value` 为 `None` 表示"已知不存在/不适用"，而不是"尚未填写"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedLineItem {
    pub value: Option<f64>,
    #[serde(default = "default_tolerance")]
    pub tolerance_percent: f64,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ExpectedLineItem {
    pub fn new(value: Option<f64>) -> Self {
        Self {
            value,
            tolerance_percent: DEFAULT_TOLERANCE_PERCENT,
            required: false,
            notes: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_tolerance(mut self, tolerance_percent: f64) -> Self {
        self.tolerance_percent = tolerance_percent;
        self
    }
}

/// 单个期间的期望值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedPeriod {
    pub period_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// 字段名 → 期望值，保持编写顺序
    #[serde(default)]
    pub expected: IndexMap<String, ExpectedLineItem>,
}

impl ExpectedPeriod {
    pub fn new(period_label: impl Into<String>, end_date: Option<&str>) -> Self {
        Self {
            period_label: period_label.into(),
            end_date: end_date.map(str::to_string),
            expected: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, item: ExpectedLineItem) -> Self {
        self.expected.insert(name.into(), item);
        self
    }
}

/// 单个文件的标准答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerKeyFile {
    pub filename: String,
    pub doc_type: DocType,
    #[serde(default)]
    pub periods: Vec<ExpectedPeriod>,
}

/// 公司的完整标准答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyAnswerKey {
    pub company_id: String,
    pub company_name: String,
    #[serde(default)]
    pub files: Vec<AnswerKeyFile>,
}

impl CompanyAnswerKey {
    /// 所有文件中的期间总数
    pub fn total_periods(&self) -> usize {
        self.files.iter().map(|f| f.periods.len()).sum()
    }
}

/// 标准答案中一个文件在文档目录里的情况
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStatus {
    pub filename: String,
    pub doc_type: DocType,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// 一个公司能否开始测试：标准答案列出的文件有多少已经就位
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyStatus {
    pub company_id: String,
    pub company_name: String,
    pub total_files: usize,
    pub available_files: usize,
    pub missing_files: usize,
    /// 至少有一个文件存在
    pub can_test: bool,
    pub files: Vec<DocumentStatus>,
    pub answer_key_path: String,
}

impl CompanyStatus {
    pub fn new(key: &CompanyAnswerKey, files: Vec<DocumentStatus>, answer_key_path: String) -> Self {
        let available_files = files.iter().filter(|f| f.exists).count();
        Self {
            company_id: key.company_id.clone(),
            company_name: key.company_name.clone(),
            total_files: files.len(),
            available_files,
            missing_files: files.len() - available_files,
            can_test: available_files > 0,
            files,
            answer_key_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_defaults() {
        let item: ExpectedLineItem = serde_json::from_str(r#"{"value": 1200.5}"#).unwrap();
        assert_eq!(item.value, Some(1200.5));
        assert_eq!(item.tolerance_percent, 5.0);
        assert!(!item.required);
        assert!(item.notes.is_none());
    }

    #[test]
    fn test_expected_fields_keep_authored_order() {
        let json = r#"{
            "period_label": "FY2024",
            "doc_type": "income",
            "expected": {
                "revenue": {"value": 10},
                "cogs": {"value": 4},
                "gross_profit": {"value": 6}
            }
        }"#;
        let period: ExpectedPeriod = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = period.expected.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["revenue", "cogs", "gross_profit"]);
    }

    #[test]
    fn test_total_periods() {
        let key = CompanyAnswerKey {
            company_id: "acme".into(),
            company_name: "Acme".into(),
            files: vec![
                AnswerKeyFile {
                    filename: "packet.pdf".into(),
                    doc_type: DocType::Income,
                    periods: vec![ExpectedPeriod::new("FY2023", None), ExpectedPeriod::new("FY2024", None)],
                },
                AnswerKeyFile {
                    filename: "packet.pdf".into(),
                    doc_type: DocType::Balance,
                    periods: vec![ExpectedPeriod::new("FY2024", Some("2024-12-31"))],
                },
            ],
        };
        assert_eq!(key.total_periods(), 3);
    }

    #[test]
    fn test_doc_type_from_str() {
        assert_eq!("Balance_Sheet".parse::<DocType>(), Ok(DocType::Balance));
        assert!("cashflow".parse::<DocType>().is_err());
    }
}
