//! 期间标签解析
//!
//! 把 "FY2024"、"Year Ended December 31, 2024"、"Q3 '24"、"YTD May 2025" 这类标签
//! 归一化为可比较的 `PeriodKey`。只做确定性的规则匹配，不做语义推断。

use chrono::NaiveDate;
use phf::phf_map;
use regex::Regex;
use std::sync::OnceLock;

/// 月份名 → 月份序号
static MONTHS: phf::Map<&'static str, u32> = phf_map! {
    "january" => 1, "jan" => 1,
    "february" => 2, "feb" => 2,
    "march" => 3, "mar" => 3,
    "april" => 4, "apr" => 4,
    "may" => 5,
    "june" => 6, "jun" => 6,
    "july" => 7, "jul" => 7,
    "august" => 8, "aug" => 8,
    "september" => 9, "sep" => 9, "sept" => 9,
    "october" => 10, "oct" => 10,
    "november" => 11, "nov" => 11,
    "december" => 12, "dec" => 12,
};

/// 归一化后的期间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodKey {
    FiscalYear { year: i32 },
    Quarter { year: i32, quarter: u32 },
    YearToDate { year: i32, month: Option<u32> },
    Month { year: i32, month: u32 },
}

struct Patterns {
    year4: Regex,
    year_apostrophe: Regex,
    year_fy2: Regex,
    bare_year: Regex,
    fy_prefix: Regex,
    jan_to_dec: Regex,
    twelve_months: Regex,
    full_date_range: Regex,
    quarter_q: Regex,
    quarter_ordinal: Regex,
    three_months: Regex,
    n_months: Regex,
    jan_through: Regex,
    word: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // 字面量正则，编译失败属于程序缺陷
        let re = |p: &str| Regex::new(p).unwrap_or_else(|e| panic!("无效的正则 {}: {}", p, e));
        Patterns {
            year4: re(r"(?:^|[^0-9])((?:19|20)\d{2})(?:[^0-9]|$)"),
            year_apostrophe: re(r"['‘’`](\d{2})\b"),
            year_fy2: re(r"\bfy\s*(\d{2})\b"),
            bare_year: re(r"^(?:fy\s?)?\d{2,4}$"),
            fy_prefix: re(r"^(?:fy|fiscal\s+year)\s*'?\d{2,4}"),
            jan_to_dec: re(r"\bjan(?:uary)?\b[\s\-–—]*(?:to|through|thru)?[\s\-–—]*\bdec(?:ember)?\b"),
            twelve_months: re(r"\b(?:12|twelve)\s*months?\s*(?:ended|ending)"),
            full_date_range: re(r"\b0?1[/\-]0?1[/\-]\d{4}\s*(?:[-–—]|to)\s*12[/\-]31[/\-]\d{4}"),
            quarter_q: re(r"\bq\s*([1-4])\b"),
            quarter_ordinal: re(r"\b(first|1st|second|2nd|third|3rd|fourth|4th)\s+(?:fiscal\s+)?quarter\b"),
            three_months: re(r"\b(?:three|3)\s*months?\b"),
            n_months: re(r"\b(\d{1,2})\s*months?\s*(?:ended|ending)"),
            jan_through: re(r"\bjan(?:uary)?\s*(?:[-–—]|to|through|thru)\s*([a-z]+)"),
            word: re(r"[a-z]+"),
        }
    })
}

fn expand_two_digit(short: i32) -> i32 {
    if short < 50 {
        2000 + short
    } else {
        1900 + short
    }
}

fn extract_year(text: &str) -> Option<i32> {
    let p = patterns();
    if let Some(caps) = p.year4.captures(text) {
        return caps[1].parse().ok();
    }
    if let Some(caps) = p.year_apostrophe.captures(text) {
        return caps[1].parse().ok().map(expand_two_digit);
    }
    if let Some(caps) = p.year_fy2.captures(text) {
        return caps[1].parse().ok().map(expand_two_digit);
    }
    None
}

fn month_of_word(word: &str) -> Option<u32> {
    MONTHS.get(word).copied()
}

/// 文本中出现的第一个月份
fn first_month(text: &str) -> Option<u32> {
    patterns()
        .word
        .find_iter(text)
        .find_map(|m| month_of_word(m.as_str()))
}

fn is_full_year(text: &str) -> bool {
    let p = patterns();
    p.bare_year.is_match(text)
        || p.fy_prefix.is_match(text)
        || text.contains("year ended")
        || text.contains("year ending")
        || p.jan_to_dec.is_match(text)
        || p.twelve_months.is_match(text)
        || p.full_date_range.is_match(text)
}

fn detect_quarter(text: &str) -> Option<u32> {
    let p = patterns();
    if let Some(caps) = p.quarter_q.captures(text) {
        return caps[1].parse().ok();
    }
    if let Some(caps) = p.quarter_ordinal.captures(text) {
        return match &caps[1] {
            "first" | "1st" => Some(1),
            "second" | "2nd" => Some(2),
            "third" | "3rd" => Some(3),
            _ => Some(4),
        };
    }
    if p.three_months.is_match(text) {
        // 只认日历季度末月份
        return match first_month(text)? {
            3 => Some(1),
            6 => Some(2),
            9 => Some(3),
            12 => Some(4),
            _ => None,
        };
    }
    None
}

/// 返回 Some(月份) 表示识别为 YTD，内层 None 表示没有截止月份
fn detect_ytd(text: &str) -> Option<Option<u32>> {
    let p = patterns();
    if text.contains("ytd") || text.contains("year to date") || text.contains("year-to-date") {
        return Some(first_month(text));
    }
    if let Some(caps) = p.n_months.captures(text) {
        let n: u32 = caps[1].parse().ok()?;
        if n < 12 {
            return Some(first_month(text));
        }
    }
    if let Some(caps) = p.jan_through.captures(text) {
        if let Some(end) = month_of_word(&caps[1]) {
            if end != 12 {
                return Some(Some(end));
            }
        }
    }
    None
}

fn detect_single_month(text: &str) -> Option<u32> {
    let is_range = ["through", "thru", " to ", "-", "–", "—", "months"]
        .iter()
        .any(|marker| text.contains(marker));
    if is_range {
        return None;
    }
    first_month(text)
}

/// 解析期间标签
///
/// 依次尝试：全年 → 季度 → 年初至今 → 单月；都不符合但带有年份时按全年处理
/// （"2024 Restated"、"Audited 2024"），没有年份时返回 None
pub fn parse_period_label(label: &str) -> Option<PeriodKey> {
    let text = label.trim().to_lowercase();
    let year = extract_year(&text)?;

    if is_full_year(&text) {
        return Some(PeriodKey::FiscalYear { year });
    }
    if let Some(quarter) = detect_quarter(&text) {
        return Some(PeriodKey::Quarter { year, quarter });
    }
    if let Some(month) = detect_ytd(&text) {
        return Some(PeriodKey::YearToDate { year, month });
    }
    Some(
        detect_single_month(&text)
            .map(|month| PeriodKey::Month { year, month })
            .unwrap_or(PeriodKey::FiscalYear { year }),
    )
}

/// 紧凑形式：小写，只保留字母和数字，开头的 `fy` / `fiscal year` 加年份展开为四位年份
///
/// "FY 2024"、"fy-24" 都变为 "2024"
pub fn compact_label(label: &str) -> String {
    let compact: String = label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();

    let Some(rest) = compact
        .strip_prefix("fiscalyear")
        .or_else(|| compact.strip_prefix("fy"))
    else {
        return compact;
    };
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let year = match digits {
        4 => rest[..4].to_string(),
        2 => match rest[..2].parse::<i32>() {
            Ok(short) => expand_two_digit(short).to_string(),
            Err(_) => return compact,
        },
        _ => return compact,
    };
    format!("{}{}", year, &rest[digits..])
}

/// 判断两个期间标签是否指向同一期间
///
/// 两边都能解析时比较 `PeriodKey`；否则退回到紧凑形式的相等或包含关系
pub fn labels_match(a: &str, b: &str) -> bool {
    if a.trim().is_empty() || b.trim().is_empty() {
        return false;
    }
    if a.trim().eq_ignore_ascii_case(b.trim()) {
        return true;
    }

    if let (Some(ka), Some(kb)) = (parse_period_label(a), parse_period_label(b)) {
        return ka == kb;
    }

    let ca = compact_label(a);
    let cb = compact_label(b);
    if ca.is_empty() || cb.is_empty() {
        return false;
    }
    ca == cb || ca.contains(&cb) || cb.contains(&ca)
}

/// 归一化截止日期，支持 YYYY-MM-DD、MM/DD/YYYY、YYYY/MM/DD
///
/// 无法解析时返回去掉首尾空白后的原文
pub fn normalize_end_date(date: &str) -> String {
    let trimmed = date.trim();
    // 兼容 "2024-12-31T00:00:00" 这类带时间的写法
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);

    const FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_year_variants() {
        let fy = Some(PeriodKey::FiscalYear { year: 2024 });
        assert_eq!(parse_period_label("FY2024"), fy);
        assert_eq!(parse_period_label("FY 2024"), fy);
        assert_eq!(parse_period_label("fy24"), fy);
        assert_eq!(parse_period_label("2024"), fy);
        assert_eq!(parse_period_label("Year Ended December 31, 2024"), fy);
        assert_eq!(parse_period_label("Jan - Dec 2024"), fy);
        assert_eq!(parse_period_label("January through December 2024"), fy);
        assert_eq!(parse_period_label("Twelve Months Ended 12/31/2024"), fy);
    }

    #[test]
    fn test_quarter_variants() {
        let q3 = Some(PeriodKey::Quarter { year: 2024, quarter: 3 });
        assert_eq!(parse_period_label("Q3 2024"), q3);
        assert_eq!(parse_period_label("Q3 '24"), q3);
        assert_eq!(parse_period_label("Third Quarter 2024"), q3);
        assert_eq!(parse_period_label("Three Months Ended September 30, 2024"), q3);
    }

    #[test]
    fn test_ytd_and_month() {
        assert_eq!(
            parse_period_label("YTD May 2025"),
            Some(PeriodKey::YearToDate { year: 2025, month: Some(5) })
        );
        assert_eq!(
            parse_period_label("Jan - May 2025"),
            Some(PeriodKey::YearToDate { year: 2025, month: Some(5) })
        );
        assert_eq!(
            parse_period_label("11 Months Ended November 30, 2025"),
            Some(PeriodKey::YearToDate { year: 2025, month: Some(11) })
        );
        assert_eq!(
            parse_period_label("Jan 2025"),
            Some(PeriodKey::Month { year: 2025, month: 1 })
        );
        assert_eq!(parse_period_label("Total"), None);
    }

    #[test]
    fn test_labels_match() {
        assert!(labels_match("FY2024", "FY 2024"));
        assert!(labels_match("2023", "Year Ended December 31, 2023"));
        assert!(labels_match("January 2025", "Jan 2025"));
        assert!(!labels_match("FY2024", "FY2023"));
        assert!(!labels_match("Jan 2025", "Jan-Dec 2024"));
        assert!(!labels_match("Q1 2024", "FY2024"));
        // 无法解析的标签退回到紧凑形式比较
        assert!(labels_match("Current Period", "current-period"));
        assert!(labels_match("Prior Year Column", "prior year"));
        assert!(!labels_match("", "FY2024"));
    }

    #[test]
    fn test_year_only_labels_fall_back_to_fiscal_year() {
        let fy = Some(PeriodKey::FiscalYear { year: 2024 });
        assert_eq!(parse_period_label("2024 Restated"), fy);
        assert_eq!(parse_period_label("Audited 2024"), fy);

        assert!(labels_match("FY2024", "2024 Restated"));
        assert!(labels_match("FY2024", "Audited 2024"));
        assert!(labels_match("2024", "2024 Restated"));
        assert!(labels_match("FY24", "2024 Restated"));
        assert!(!labels_match("FY2023", "2024 Restated"));
        assert!(!labels_match("Q1 2024", "2024 Restated"));
    }

    #[test]
    fn test_compact_label_expands_fy_year() {
        assert_eq!(compact_label("FY 2024"), "2024");
        assert_eq!(compact_label("fy-24 restated"), "2024restated");
        assert_eq!(compact_label("Fiscal Year 2023"), "2023");
        assert_eq!(compact_label("Current Period"), "currentperiod");
        assert_eq!(compact_label("fyi"), "fyi");
    }

    #[test]
    fn test_normalize_end_date() {
        assert_eq!(normalize_end_date("2024-12-31"), "2024-12-31");
        assert_eq!(normalize_end_date("12/31/2024"), "2024-12-31");
        assert_eq!(normalize_end_date(" 2024/12/31 "), "2024-12-31");
        assert_eq!(normalize_end_date("2024-12-31T00:00:00"), "2024-12-31");
        assert_eq!(normalize_end_date("end of year"), "end of year");
    }
}
