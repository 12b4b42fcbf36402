//! 标准化科目字段名

use super::answer_key::DocType;

/// 利润表字段
pub const INCOME_FIELDS: &[&str] = &[
    "revenue",
    "cogs",
    "gross_profit",
    "sga",
    "research_and_development",
    "depreciation_amortization",
    "other_operating_expenses",
    "total_operating_expenses",
    "operating_income",
    "interest_expense",
    "interest_income",
    "other_income_expense",
    "pretax_income",
    "income_tax_expense",
    "net_income",
];

/// 资产负债表字段
pub const BALANCE_FIELDS: &[&str] = &[
    "cash_and_equivalents",
    "short_term_investments",
    "accounts_receivable",
    "inventory",
    "prepaid_expenses",
    "other_current_assets",
    "total_current_assets",
    "ppe_gross",
    "accumulated_depreciation",
    "ppe_net",
    "intangible_assets",
    "goodwill",
    "long_term_investments",
    "other_non_current_assets",
    "total_non_current_assets",
    "total_assets",
    "accounts_payable",
    "short_term_debt",
    "accrued_expenses",
    "deferred_revenue_current",
    "other_current_liabilities",
    "total_current_liabilities",
    "long_term_debt",
    "deferred_tax_liabilities",
    "pension_liabilities",
    "other_non_current_liabilities",
    "total_non_current_liabilities",
    "total_liabilities",
    "common_stock",
    "additional_paid_in_capital",
    "retained_earnings",
    "treasury_stock",
    "accumulated_other_comprehensive_income",
    "total_shareholders_equity",
    "total_liabilities_and_equity",
];

pub fn fields_for(doc_type: DocType) -> &'static [&'static str] {
    match doc_type {
        DocType::Income => INCOME_FIELDS,
        DocType::Balance => BALANCE_FIELDS,
    }
}
