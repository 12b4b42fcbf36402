//! 评分结果数据模型

use serde::{Deserialize, Serialize};
use std::fmt;

use super::answer_key::DocType;

/// 字段准确度分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldAccuracy {
    /// 完全一致
    Exact,
    /// 在容差范围内
    Tolerance,
    /// 超出容差但在两倍容差内
    Partial,
    /// 错误
    Wrong,
    /// 缺失
    Missing,
    /// 多余（标准答案中没有的值）
    Extra,
}

impl FieldAccuracy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldAccuracy::Exact => "exact",
            FieldAccuracy::Tolerance => "tolerance",
            FieldAccuracy::Partial => "partial",
            FieldAccuracy::Wrong => "wrong",
            FieldAccuracy::Missing => "missing",
            FieldAccuracy::Extra => "extra",
        }
    }

    /// exact 和 tolerance 都算作正确
    pub fn is_match(&self) -> bool {
        matches!(self, FieldAccuracy::Exact | FieldAccuracy::Tolerance)
    }
}

impl fmt::Display for FieldAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 字母等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GradeLevel {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl GradeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeLevel::APlus => "A+",
            GradeLevel::A => "A",
            GradeLevel::B => "B",
            GradeLevel::C => "C",
            GradeLevel::D => "D",
            GradeLevel::F => "F",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "A+" => Some(GradeLevel::APlus),
            "A" => Some(GradeLevel::A),
            "B" => Some(GradeLevel::B),
            "C" => Some(GradeLevel::C),
            "D" => Some(GradeLevel::D),
            "F" => Some(GradeLevel::F),
            _ => None,
        }
    }
}

impl fmt::Display for GradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个字段的比较结果，生成后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    pub field_name: String,
    pub expected_value: Option<f64>,
    pub extracted_value: Option<f64>,
    pub accuracy: FieldAccuracy,
    pub difference: Option<f64>,
    pub difference_percent: Option<f64>,
    pub tolerance_used: f64,
    /// 0.0 ~ 1.0
    pub score: f64,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// 单个期间的评分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodGrade {
    pub period_label: String,
    /// 对齐到的提取期间标签，未对齐时为空
    #[serde(default)]
    pub matched_label: Option<String>,
    pub grade: GradeLevel,
    /// 0 ~ 100
    pub score: f64,
    pub total_fields: usize,
    pub matched_fields: usize,
    pub partial_fields: usize,
    pub wrong_fields: usize,
    pub missing_fields: usize,
    pub extra_fields: usize,
    pub field_comparisons: Vec<FieldComparison>,
}

/// 单个文件的评分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileGrade {
    pub filename: String,
    pub doc_type: DocType,
    pub periods: Vec<PeriodGrade>,
    pub overall_score: f64,
    pub overall_grade: GradeLevel,
    /// 提取或评分失败时的错误说明
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
