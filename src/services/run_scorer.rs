//! 分数汇总 - 业务能力层
//!
//! 字段 → 期间 → 文件 → 整次运行，逐级汇总分数并映射为字母等级。
//! 运行的总分只由 `file_results` 推导，以期间为汇总单位（不按文件加权）。

use crate::models::{
    DocType, FieldAccuracy, FieldComparison, FileGrade, GradeLevel, PeriodGrade, TestRunResult,
};
use crate::services::field_grader::GradingPolicy;

/// 分数 → 等级阈值表，按下限从高到低排列，低于所有下限为 F
#[derive(Debug, Clone, PartialEq)]
pub struct GradeThresholds {
    table: Vec<(f64, GradeLevel)>,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self::new(vec![
            (97.0, GradeLevel::APlus),
            (93.0, GradeLevel::A),
            (85.0, GradeLevel::B),
            (70.0, GradeLevel::C),
            (50.0, GradeLevel::D),
        ])
    }
}

impl GradeThresholds {
    pub fn new(mut table: Vec<(f64, GradeLevel)>) -> Self {
        table.sort_by(|a, b| b.0.total_cmp(&a.0));
        Self { table }
    }

    pub fn grade_for(&self, score: f64) -> GradeLevel {
        self.table
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, grade)| *grade)
            .unwrap_or(GradeLevel::F)
    }
}

#[derive(Debug, Default)]
struct Tally {
    matched: usize,
    partial: usize,
    wrong: usize,
    missing: usize,
    extra: usize,
}

impl Tally {
    fn of(comparisons: &[FieldComparison]) -> Self {
        let mut tally = Tally::default();
        for c in comparisons {
            match c.accuracy {
                FieldAccuracy::Exact | FieldAccuracy::Tolerance => tally.matched += 1,
                FieldAccuracy::Partial => tally.partial += 1,
                FieldAccuracy::Wrong => tally.wrong += 1,
                FieldAccuracy::Missing => tally.missing += 1,
                FieldAccuracy::Extra => tally.extra += 1,
            }
        }
        tally
    }
}

/// 分数汇总器
#[derive(Debug, Clone, Default)]
pub struct RunScorer {
    thresholds: GradeThresholds,
}

impl RunScorer {
    pub fn new(thresholds: GradeThresholds) -> Self {
        Self { thresholds }
    }

    pub fn grade_for(&self, score: f64) -> GradeLevel {
        self.thresholds.grade_for(score)
    }

    /// 汇总一个期间
    ///
    /// 分数 = 100 × 字段分数之和 / 计分字段数；没有计分字段时为 100
    pub fn score_period(
        &self,
        period_label: &str,
        matched_label: Option<String>,
        comparisons: Vec<FieldComparison>,
        policy: &GradingPolicy,
    ) -> PeriodGrade {
        let counted: Vec<&FieldComparison> = comparisons
            .iter()
            .filter(|c| policy.count_extra_in_denominator || c.accuracy != FieldAccuracy::Extra)
            .collect();

        let score = if counted.is_empty() {
            100.0
        } else {
            let sum: f64 = counted.iter().map(|c| c.score).sum();
            (100.0 * sum / counted.len() as f64).clamp(0.0, 100.0)
        };

        self.build_period(period_label, matched_label, comparisons, score)
    }

    /// 提取失败的期间，分数固定为 0
    pub fn score_failed_period(&self, period_label: &str, comparisons: Vec<FieldComparison>) -> PeriodGrade {
        self.build_period(period_label, None, comparisons, 0.0)
    }

    fn build_period(
        &self,
        period_label: &str,
        matched_label: Option<String>,
        comparisons: Vec<FieldComparison>,
        score: f64,
    ) -> PeriodGrade {
        let tally = Tally::of(&comparisons);
        PeriodGrade {
            period_label: period_label.to_string(),
            matched_label,
            grade: self.grade_for(score),
            score,
            total_fields: comparisons.len() - tally.extra,
            matched_fields: tally.matched,
            partial_fields: tally.partial,
            wrong_fields: tally.wrong,
            missing_fields: tally.missing,
            extra_fields: tally.extra,
            field_comparisons: comparisons,
        }
    }

    /// 汇总一个文件：期间分数的平均值，没有期间时为 0
    pub fn score_file(
        &self,
        filename: &str,
        doc_type: DocType,
        periods: Vec<PeriodGrade>,
        error: Option<String>,
    ) -> FileGrade {
        let overall_score = mean(periods.iter().map(|p| p.score));
        FileGrade {
            filename: filename.to_string(),
            doc_type,
            overall_grade: self.grade_for(overall_score),
            overall_score,
            periods,
            error,
        }
    }

    /// 根据 `file_results` 重新计算总分和所有汇总计数
    ///
    /// 总分是所有文件所有期间分数的平均值；`total_files` 是计划处理的文件数，不在这里修改
    pub fn refresh(&self, result: &mut TestRunResult) {
        let periods: Vec<&PeriodGrade> = result
            .file_results
            .iter()
            .flat_map(|f| f.periods.iter())
            .collect();

        result.overall_score = mean(periods.iter().map(|p| p.score));
        result.overall_grade = self.grade_for(result.overall_score);
        result.total_periods = periods.len();
        result.total_fields_tested = periods.iter().map(|p| p.total_fields).sum();
        result.fields_correct = periods.iter().map(|p| p.matched_fields).sum();
        result.fields_partial = periods.iter().map(|p| p.partial_fields).sum();
        result.fields_wrong = periods.iter().map(|p| p.wrong_fields).sum();
        result.fields_missing = periods.iter().map(|p| p.missing_fields).sum();
        result.fields_extra = periods.iter().map(|p| p.extra_fields).sum();
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
