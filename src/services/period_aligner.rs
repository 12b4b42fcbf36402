//! 期间对齐 - 业务能力层
//!
//! 把标准答案中的每个期间对齐到最能代表同一期间的提取期间。
//!
//! 两轮贪心匹配：
//! 1. 截止日期完全一致（双方都提供时）
//! 2. 期间标签匹配（见 `period_label::labels_match`）
//!
//! 同一轮内有多个候选时，选择在提取序列中位置最接近的那个；
//! 每个提取期间最多被使用一次。未匹配的期间一律记录日志，不静默丢弃。

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{ExpectedPeriod, ExtractedPeriod};
use crate::services::period_label::{labels_match, normalize_end_date};

/// 对齐方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMethod {
    EndDate,
    Label,
    Unmatched,
}

/// 一个标准答案期间及其对齐结果
#[derive(Debug, Clone, Copy)]
pub struct AlignedPeriod<'a> {
    pub expected: &'a ExpectedPeriod,
    pub extracted: Option<&'a ExtractedPeriod>,
    pub method: AlignMethod,
}

/// 对齐期间
///
/// # 参数
/// - `expected`: 标准答案中某个文件的期间列表
/// - `extracted`: 一次提取返回的期间列表
///
/// # 返回
/// 与 `expected` 一一对应的对齐结果，顺序不变
pub fn align_periods<'a>(
    expected: &'a [ExpectedPeriod],
    extracted: &'a [ExtractedPeriod],
) -> Vec<AlignedPeriod<'a>> {
    let mut used = vec![false; extracted.len()];
    let mut slots: Vec<Option<(usize, AlignMethod)>> = vec![None; expected.len()];

    // 第一轮：截止日期
    let extracted_dates: Vec<Option<String>> = extracted
        .iter()
        .map(|p| p.end_date.as_deref().map(normalize_end_date))
        .collect();

    for (i, exp) in expected.iter().enumerate() {
        let Some(exp_date) = exp.end_date.as_deref().map(normalize_end_date) else {
            continue;
        };
        let pick = closest_unused(i, &used, |j| {
            extracted_dates[j].as_deref() == Some(exp_date.as_str())
        });
        if let Some(j) = pick {
            used[j] = true;
            slots[i] = Some((j, AlignMethod::EndDate));
        }
    }

    // 第二轮：标签
    for (i, exp) in expected.iter().enumerate() {
        if slots[i].is_some() {
            continue;
        }
        let pick = closest_unused(i, &used, |j| {
            labels_match(&exp.period_label, &extracted[j].period_label)
        });
        if let Some(j) = pick {
            used[j] = true;
            slots[i] = Some((j, AlignMethod::Label));
        }
    }

    let aligned: Vec<AlignedPeriod<'a>> = expected
        .iter()
        .zip(slots)
        .map(|(exp, slot)| match slot {
            Some((j, method)) => {
                debug!(
                    "期间对齐: '{}' → '{}' ({:?})",
                    exp.period_label, extracted[j].period_label, method
                );
                AlignedPeriod {
                    expected: exp,
                    extracted: Some(&extracted[j]),
                    method,
                }
            }
            None => {
                warn!(
                    "⚠️ 期间 '{}' (截止日期 {:?}) 没有对应的提取期间，可用标签: {:?}",
                    exp.period_label,
                    exp.end_date,
                    extracted.iter().map(|p| p.period_label.as_str()).collect::<Vec<_>>()
                );
                AlignedPeriod {
                    expected: exp,
                    extracted: None,
                    method: AlignMethod::Unmatched,
                }
            }
        })
        .collect();

    for (j, period) in extracted.iter().enumerate() {
        if !used[j] {
            debug!("提取期间 '{}' 未被任何标准答案期间使用", period.period_label);
        }
    }

    aligned
}

/// 在未使用的候选中选出位置最接近 `target` 的一个；距离相同时取较小的下标
fn closest_unused(target: usize, used: &[bool], is_candidate: impl Fn(usize) -> bool) -> Option<usize> {
    (0..used.len())
        .filter(|&j| !used[j] && is_candidate(j))
        .min_by_key(|&j| (j.abs_diff(target), j))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(label: &str, end: Option<&str>) -> ExpectedPeriod {
        ExpectedPeriod::new(label, end)
    }

    fn ext(label: &str, end: Option<&str>) -> ExtractedPeriod {
        ExtractedPeriod::new(label, end)
    }

    fn matched_labels<'a>(aligned: &[AlignedPeriod<'a>]) -> Vec<Option<&'a str>> {
        aligned
            .iter()
            .map(|a| a.extracted.map(|p| p.period_label.as_str()))
            .collect()
    }

    #[test]
    fn test_end_date_wins_over_label_text() {
        let expected = vec![exp("FY2024", Some("2024-12-31"))];
        let extracted = vec![
            ext("FY2024", Some("2023-12-31")),
            ext("Column B", Some("12/31/2024")),
        ];

        let aligned = align_periods(&expected, &extracted);
        assert_eq!(matched_labels(&aligned), vec![Some("Column B")]);
        assert_eq!(aligned[0].method, AlignMethod::EndDate);
    }

    #[test]
    fn test_label_fallback_and_no_double_assignment() {
        let expected = vec![exp("FY2023", None), exp("2023", None)];
        let extracted = vec![ext("FY 2023", None)];

        let aligned = align_periods(&expected, &extracted);
        assert_eq!(matched_labels(&aligned), vec![Some("FY 2023"), None]);
        assert_eq!(aligned[0].method, AlignMethod::Label);
        assert_eq!(aligned[1].method, AlignMethod::Unmatched);
    }

    #[test]
    fn test_tie_prefers_closest_index() {
        // 两个提取期间都能匹配 FY2024，选位置最接近的
        let expected = vec![exp("Notes", None), exp("FY2024", None)];
        let extracted = vec![ext("FY 2024", None), ext("2024", None)];

        let aligned = align_periods(&expected, &extracted);
        assert_eq!(matched_labels(&aligned), vec![None, Some("2024")]);
    }

    #[test]
    fn test_mismatched_periods_align_to_none() {
        let expected = vec![exp("FY2022", Some("2022-12-31"))];
        let extracted = vec![ext("FY2024", Some("2024-12-31"))];

        let aligned = align_periods(&expected, &extracted);
        assert!(aligned[0].extracted.is_none());
    }

    #[test]
    fn test_empty_extraction() {
        let expected = vec![exp("FY2024", None)];
        let aligned = align_periods(&expected, &[]);
        assert_eq!(aligned.len(), 1);
        assert!(aligned[0].extracted.is_none());
    }
}
