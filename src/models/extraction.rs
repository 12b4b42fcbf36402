//! 提取结果数据模型
//!
//! 模型返回的报表可能是单期间，也可能是多期间，这里统一转换为 `Vec<ExtractedPeriod>`

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 单个字段的提取值
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExtractedField {
    pub value: Option<f64>,
    pub confidence: f64,
}

impl ExtractedField {
    pub fn new(value: Option<f64>, confidence: f64) -> Self {
        Self { value, confidence }
    }
}

impl<'de> Deserialize<'de> for ExtractedField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // 既接受 {"value": .., "confidence": ..}，也接受裸数值 / null
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawField {
            Full {
                value: Option<f64>,
                #[serde(default)]
                confidence: Option<f64>,
            },
            Bare(Option<f64>),
        }

        Ok(match RawField::deserialize(deserializer)? {
            RawField::Full { value, confidence } => ExtractedField {
                value,
                confidence: confidence.unwrap_or(0.0),
            },
            RawField::Bare(value) => ExtractedField {
                value,
                confidence: 0.0,
            },
        })
    }
}

/// 单个期间的提取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPeriod {
    pub period_label: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub data: IndexMap<String, ExtractedField>,
}

impl ExtractedPeriod {
    pub fn new(period_label: impl Into<String>, end_date: Option<&str>) -> Self {
        Self {
            period_label: period_label.into(),
            end_date: end_date.map(str::to_string),
            data: IndexMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.data.insert(name.into(), ExtractedField::new(value, 1.0));
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtractionPayload {
    Multi {
        periods: Vec<ExtractedPeriod>,
        #[serde(default)]
        currency: Option<String>,
        #[serde(default)]
        scale: Option<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    List(Vec<ExtractedPeriod>),
    Single(ExtractedPeriod),
}

/// 解析模型返回的 JSON 报表
///
/// # 参数
/// - `json`: 已去掉代码块标记的 JSON 文本
///
/// # 返回
/// 返回按模型顺序排列的期间列表
pub fn parse_extraction(json: &str) -> AppResult<Vec<ExtractedPeriod>> {
    let payload: ExtractionPayload = serde_json::from_str(json)
        .map_err(|e| AppError::invalid_payload(format!("无法识别的报表结构: {}", e)))?;

    let periods = match payload {
        ExtractionPayload::Multi {
            periods,
            currency,
            scale,
            notes,
        } => {
            tracing::debug!(
                "多期间报表: {} 个期间, 币种 {:?}, 单位 {:?}, 备注 {:?}",
                periods.len(),
                currency,
                scale,
                notes
            );
            periods
        }
        ExtractionPayload::List(periods) => periods,
        ExtractionPayload::Single(period) => vec![period],
    };

    if periods.is_empty() {
        return Err(AppError::invalid_payload("报表中没有任何期间"));
    }

    Ok(periods)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_period_payload() {
        let json = r#"{
            "periods": [
                {"period_label": "Jan 2025", "end_date": "2025-01-31",
                 "data": {"revenue": {"value": 100.0, "confidence": 0.9, "raw_fields_used": ["Sales"]}}},
                {"period_label": "FY2024", "data": {"revenue": 1200, "cogs": null}}
            ],
            "currency": "USD",
            "scale": "units"
        }"#;
        let periods = parse_extraction(json).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].data["revenue"], ExtractedField::new(Some(100.0), 0.9));
        assert_eq!(periods[1].data["revenue"].value, Some(1200.0));
        assert_eq!(periods[1].data["cogs"].value, None);
        assert!(periods[1].end_date.is_none());
    }

    #[test]
    fn test_parse_single_period_payload() {
        let json = r#"{"period_label": "FY2023", "data": {"net_income": {"value": -5.5}}}"#;
        let periods = parse_extraction(json).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].data["net_income"].value, Some(-5.5));
        assert_eq!(periods[0].data["net_income"].confidence, 0.0);
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(parse_extraction(r#"{"periods": []}"#).is_err());
        assert!(parse_extraction("not json").is_err());
    }
}
