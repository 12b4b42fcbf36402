//! 字段评分 - 业务能力层
//!
//! 把一个标准答案期间与对齐到的提取期间逐字段比较，生成 `FieldComparison`。
//!
//! ## 判定顺序
//!
//! 1. 提取期间整体缺失 → 所有字段 `missing`（必填 0 分，非必填 1 分）
//! 2. 期望为空、提取为空 → `exact`
//! 3. 期望为空、提取有值 → `extra`
//! 4. 期望有值、提取为空 → `missing`（必填 0 分，非必填 0.5 分）
//! 5. 都有值时按差异百分比分档：`exact` / `tolerance` / `partial` / `wrong`
//!
//! 所有分数常量都放在 `GradingPolicy` 中，评分是纯函数，相同输入得到完全相同的输出。

use tracing::debug;

use crate::error::{AppResult, GradingError};
use crate::models::answer_key::DEFAULT_TOLERANCE_PERCENT;
use crate::models::{
    ExpectedLineItem, ExpectedPeriod, ExtractedField, FieldAccuracy, FieldComparison, PeriodGrade,
};
use crate::services::period_aligner::AlignedPeriod;
use crate::services::run_scorer::RunScorer;

/// 差异百分比保留的小数位数，消除 5.000000000000001 这类浮点噪声
const PERCENT_DECIMALS: i32 = 10;

/// 评分策略
#[derive(Debug, Clone, PartialEq)]
pub struct GradingPolicy {
    /// partial 区间上限 = 容差 × 该倍数
    pub partial_band_multiplier: f64,
    pub missing_required_score: f64,
    pub missing_optional_score: f64,
    /// 整个提取期间缺失时的字段分数
    pub absent_period_required_score: f64,
    pub absent_period_optional_score: f64,
    pub extra_score: f64,
    /// extra 字段是否计入期间得分的分母
    pub count_extra_in_denominator: bool,
    pub epsilon: f64,
    /// 覆盖所有字段的容差
    pub tolerance_override: Option<f64>,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            partial_band_multiplier: 2.0,
            missing_required_score: 0.0,
            missing_optional_score: 0.5,
            absent_period_required_score: 0.0,
            absent_period_optional_score: 1.0,
            extra_score: 1.0,
            count_extra_in_denominator: false,
            epsilon: 1e-9,
            tolerance_override: None,
        }
    }
}

impl GradingPolicy {
    pub fn with_tolerance_override(mut self, tolerance: Option<f64>) -> Self {
        self.tolerance_override = tolerance;
        self
    }

    fn tolerance_for(&self, item: &ExpectedLineItem) -> f64 {
        self.tolerance_override.unwrap_or(item.tolerance_percent)
    }
}

fn round_percent(value: f64) -> f64 {
    let factor = 10f64.powi(PERCENT_DECIMALS);
    (value * factor).round() / factor
}

fn check_finite(field: &str, side: &'static str, value: Option<f64>) -> AppResult<()> {
    match value {
        Some(v) if !v.is_finite() => Err(GradingError::NonFiniteValue {
            field: field.to_string(),
            side,
            value: v,
        }
        .into()),
        _ => Ok(()),
    }
}

/// 比较单个字段
///
/// # 参数
/// - `field_name`: 字段名
/// - `expected`: 标准答案中的期望值
/// - `extracted`: 提取到的值，字段不存在时为 None
/// - `period_present`: 提取期间是否存在（对齐失败时为 false）
/// - `policy`: 评分策略
pub fn compare_field(
    field_name: &str,
    expected: &ExpectedLineItem,
    extracted: Option<&ExtractedField>,
    period_present: bool,
    policy: &GradingPolicy,
) -> AppResult<FieldComparison> {
    let tolerance = policy.tolerance_for(expected);
    if tolerance < 0.0 || tolerance.is_nan() {
        return Err(GradingError::NegativeTolerance {
            field: field_name.to_string(),
            tolerance,
        }
        .into());
    }

    let expected_value = expected.value;
    let extracted_value = extracted.and_then(|f| f.value);
    check_finite(field_name, "期望", expected_value)?;
    check_finite(field_name, "提取", extracted_value)?;

    let base = FieldComparison {
        field_name: field_name.to_string(),
        expected_value,
        extracted_value,
        accuracy: FieldAccuracy::Missing,
        difference: None,
        difference_percent: None,
        tolerance_used: tolerance,
        score: 0.0,
        required: expected.required,
        notes: None,
    };

    if !period_present {
        let score = if expected.required {
            policy.absent_period_required_score
        } else {
            policy.absent_period_optional_score
        };
        return Ok(FieldComparison {
            accuracy: FieldAccuracy::Missing,
            score,
            notes: Some("未找到对应的提取期间".to_string()),
            ..base
        });
    }

    let comparison = match (expected_value, extracted_value) {
        (None, None) => FieldComparison {
            accuracy: FieldAccuracy::Exact,
            score: 1.0,
            ..base
        },
        (None, Some(_)) => FieldComparison {
            accuracy: FieldAccuracy::Extra,
            score: policy.extra_score,
            notes: Some("标准答案为空，但提取到了值".to_string()),
            ..base
        },
        (Some(_), None) => {
            let score = if expected.required {
                policy.missing_required_score
            } else {
                policy.missing_optional_score
            };
            FieldComparison {
                accuracy: FieldAccuracy::Missing,
                score,
                notes: Some("未提取到该字段".to_string()),
                ..base
            }
        }
        (Some(exp), Some(got)) => {
            let difference = got - exp;
            let percent =
                round_percent(difference.abs() * 100.0 / exp.abs().max(policy.epsilon));
            let (accuracy, score) = classify_difference(percent, tolerance, policy);
            FieldComparison {
                accuracy,
                score,
                difference: Some(difference),
                difference_percent: Some(percent),
                ..base
            }
        }
    };

    Ok(comparison)
}

/// 按差异百分比分档
pub fn classify_difference(percent: f64, tolerance: f64, policy: &GradingPolicy) -> (FieldAccuracy, f64) {
    if percent == 0.0 {
        (FieldAccuracy::Exact, 1.0)
    } else if percent <= tolerance {
        (FieldAccuracy::Tolerance, 1.0)
    } else if percent <= tolerance * policy.partial_band_multiplier {
        // 从容差边界的 1 分线性衰减到上限处的 0 分
        let band = tolerance * (policy.partial_band_multiplier - 1.0);
        let score = (1.0 - (percent - tolerance) / band).clamp(0.0, 1.0);
        (FieldAccuracy::Partial, score)
    } else {
        (FieldAccuracy::Wrong, 0.0)
    }
}

/// 比较一个期间的所有字段
///
/// 先按标准答案顺序输出期望字段，再按提取顺序追加标准答案中没有、且有值的 extra 字段
pub fn compare_period(aligned: &AlignedPeriod<'_>, policy: &GradingPolicy) -> AppResult<Vec<FieldComparison>> {
    let expected = aligned.expected;
    let data = aligned.extracted.map(|p| &p.data);
    let period_present = aligned.extracted.is_some();

    let mut comparisons = Vec::with_capacity(expected.expected.len());
    for (name, item) in &expected.expected {
        let extracted = data.and_then(|d| d.get(name));
        comparisons.push(compare_field(name, item, extracted, period_present, policy)?);
    }

    if let Some(data) = data {
        for (name, field) in data {
            if expected.expected.contains_key(name) {
                continue;
            }
            let Some(value) = field.value else {
                continue;
            };
            check_finite(name, "提取", Some(value))?;
            comparisons.push(FieldComparison {
                field_name: name.clone(),
                expected_value: None,
                extracted_value: Some(value),
                accuracy: FieldAccuracy::Extra,
                difference: None,
                difference_percent: None,
                tolerance_used: policy.tolerance_override.unwrap_or(DEFAULT_TOLERANCE_PERCENT),
                score: policy.extra_score,
                required: false,
                notes: Some("标准答案中没有该字段".to_string()),
            });
        }
    }

    Ok(comparisons)
}

/// 为一个对齐后的期间评分
pub fn grade_period(
    aligned: &AlignedPeriod<'_>,
    policy: &GradingPolicy,
    scorer: &RunScorer,
) -> AppResult<PeriodGrade> {
    let comparisons = compare_period(aligned, policy)?;
    let matched_label = aligned.extracted.map(|p| p.period_label.clone());
    let grade = scorer.score_period(&aligned.expected.period_label, matched_label, comparisons, policy);
    debug!(
        "期间 '{}' 得分 {:.1} ({})",
        grade.period_label, grade.score, grade.grade
    );
    Ok(grade)
}

/// 提取失败时使用的期间评分：所有字段 missing，0 分
pub fn failed_period_grade(
    expected: &ExpectedPeriod,
    note: &str,
    policy: &GradingPolicy,
    scorer: &RunScorer,
) -> PeriodGrade {
    let comparisons = expected
        .expected
        .iter()
        .map(|(name, item)| FieldComparison {
            field_name: name.clone(),
            expected_value: item.value,
            extracted_value: None,
            accuracy: FieldAccuracy::Missing,
            difference: None,
            difference_percent: None,
            tolerance_used: policy.tolerance_for(item),
            score: 0.0,
            required: item.required,
            notes: Some(note.to_string()),
        })
        .collect();
    scorer.score_failed_period(&expected.period_label, comparisons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedPeriod;
    use crate::services::period_aligner::AlignMethod;

    fn field(value: f64) -> ExtractedField {
        ExtractedField::new(Some(value), 0.9)
    }

    fn compare(expected: f64, extracted: f64) -> FieldComparison {
        let item = ExpectedLineItem::new(Some(expected)).required();
        compare_field("revenue", &item, Some(&field(extracted)), true, &GradingPolicy::default()).unwrap()
    }

    #[test]
    fn test_tolerance_boundaries() {
        let at_tolerance = compare(1000.0, 1050.0);
        assert_eq!(at_tolerance.accuracy, FieldAccuracy::Tolerance);
        assert_eq!(at_tolerance.difference_percent, Some(5.0));
        assert_eq!(at_tolerance.score, 1.0);

        let just_over = compare(1000.0, 1051.0);
        assert_eq!(just_over.accuracy, FieldAccuracy::Partial);
        assert!((just_over.difference_percent.unwrap() - 5.1).abs() < 1e-9);
        assert!((just_over.score - 0.98).abs() < 1e-9);

        let at_double = compare(1000.0, 1100.0);
        assert_eq!(at_double.accuracy, FieldAccuracy::Partial);
        assert_eq!(at_double.score, 0.0);

        let beyond = compare(1000.0, 1100.5);
        assert_eq!(beyond.accuracy, FieldAccuracy::Wrong);
        assert_eq!(beyond.score, 0.0);
        assert_eq!(beyond.difference, Some(100.5));
    }

    #[test]
    fn test_exact_and_negative_values() {
        let exact = compare(-250.0, -250.0);
        assert_eq!(exact.accuracy, FieldAccuracy::Exact);
        assert_eq!(exact.difference, Some(0.0));
        assert_eq!(exact.tolerance_used, 5.0);

        let within = compare(-1000.0, -960.0);
        assert_eq!(within.accuracy, FieldAccuracy::Tolerance);
    }

    #[test]
    fn test_missing_required_vs_optional() {
        let policy = GradingPolicy::default();
        let absent = ExtractedField::new(None, 0.0);

        let required = ExpectedLineItem::new(Some(100000.0)).required();
        let cmp = compare_field("net_income", &required, Some(&absent), true, &policy).unwrap();
        assert_eq!(cmp.accuracy, FieldAccuracy::Missing);
        assert_eq!(cmp.score, 0.0);

        let optional = ExpectedLineItem::new(Some(100000.0));
        let cmp = compare_field("net_income", &optional, None, true, &policy).unwrap();
        assert_eq!(cmp.accuracy, FieldAccuracy::Missing);
        assert_eq!(cmp.score, 0.5);
    }

    #[test]
    fn test_null_expectations() {
        let policy = GradingPolicy::default();
        let item = ExpectedLineItem::new(None);

        let both_null = compare_field("goodwill", &item, None, true, &policy).unwrap();
        assert_eq!(both_null.accuracy, FieldAccuracy::Exact);
        assert_eq!(both_null.score, 1.0);

        let extra = compare_field("goodwill", &item, Some(&field(12.0)), true, &policy).unwrap();
        assert_eq!(extra.accuracy, FieldAccuracy::Extra);
        assert_eq!(extra.score, 1.0);
    }

    #[test]
    fn test_absent_period() {
        let policy = GradingPolicy::default();
        let required = ExpectedLineItem::new(Some(5.0)).required();
        let optional = ExpectedLineItem::new(Some(5.0));

        let cmp = compare_field("revenue", &required, None, false, &policy).unwrap();
        assert_eq!((cmp.accuracy, cmp.score), (FieldAccuracy::Missing, 0.0));
        let cmp = compare_field("revenue", &optional, None, false, &policy).unwrap();
        assert_eq!((cmp.accuracy, cmp.score), (FieldAccuracy::Missing, 1.0));
    }

    #[test]
    fn test_zero_expected_uses_epsilon() {
        let cmp = compare(0.0, 0.0);
        assert_eq!(cmp.accuracy, FieldAccuracy::Exact);

        let cmp = compare(0.0, 1.0);
        assert_eq!(cmp.accuracy, FieldAccuracy::Wrong);
    }

    #[test]
    fn test_invalid_inputs_are_errors() {
        let policy = GradingPolicy::default();
        let item = ExpectedLineItem::new(Some(1.0)).with_tolerance(-1.0);
        assert!(compare_field("revenue", &item, None, true, &policy).is_err());

        let item = ExpectedLineItem::new(Some(f64::NAN));
        assert!(compare_field("revenue", &item, None, true, &policy).is_err());

        let item = ExpectedLineItem::new(Some(1.0));
        let inf = field(f64::INFINITY);
        assert!(compare_field("revenue", &item, Some(&inf), true, &policy).is_err());
    }

    #[test]
    fn test_tolerance_override() {
        let policy = GradingPolicy::default().with_tolerance_override(Some(10.0));
        let item = ExpectedLineItem::new(Some(1000.0));
        let cmp = compare_field("revenue", &item, Some(&field(1080.0)), true, &policy).unwrap();
        assert_eq!(cmp.accuracy, FieldAccuracy::Tolerance);
        assert_eq!(cmp.tolerance_used, 10.0);
    }

    #[test]
    fn test_compare_period_covers_union_and_is_idempotent() {
        let expected = ExpectedPeriod::new("FY2024", None)
            .with_field("revenue", ExpectedLineItem::new(Some(1000.0)).required())
            .with_field("cogs", ExpectedLineItem::new(Some(400.0)));
        let extracted = ExtractedPeriod::new("FY2024", None)
            .with_value("cogs", Some(400.0))
            .with_value("revenue", Some(1020.0))
            .with_value("goodwill", Some(7.0))
            .with_value("inventory", None);
        let aligned = AlignedPeriod {
            expected: &expected,
            extracted: Some(&extracted),
            method: AlignMethod::Label,
        };
        let policy = GradingPolicy::default();

        let first = compare_period(&aligned, &policy).unwrap();
        let names: Vec<&str> = first.iter().map(|c| c.field_name.as_str()).collect();
        assert_eq!(names, vec!["revenue", "cogs", "goodwill"]);
        assert_eq!(first[2].accuracy, FieldAccuracy::Extra);

        let second = compare_period(&aligned, &policy).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_period_grade_is_zero() {
        let expected = ExpectedPeriod::new("FY2024", None)
            .with_field("revenue", ExpectedLineItem::new(Some(1.0)))
            .with_field("cogs", ExpectedLineItem::new(None));
        let grade = failed_period_grade(&expected, "提取失败", &GradingPolicy::default(), &RunScorer::default());

        assert_eq!(grade.score, 0.0);
        assert_eq!(grade.missing_fields, 2);
        assert!(grade
            .field_comparisons
            .iter()
            .all(|c| c.accuracy == FieldAccuracy::Missing && c.score == 0.0));
    }
}
