/// 日志工具模块
///
/// 提供日志初始化以及测试运行生命周期的日志输出
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::TestRunResult;

/// 默认日志过滤规则
const DEFAULT_FILTER: &str = "statement_eval=info";

/// 初始化日志
///
/// 日志写到 stderr，stdout 留给 JSON 输出；可以重复调用
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 记录测试启动信息
///
/// # 参数
/// - `run_id`: 测试运行 ID
/// - `company_id`: 公司 ID
/// - `model_name`: 模型名称
/// - `max_concurrent`: 并发数，顺序模式下为 None
pub fn log_run_start(run_id: &str, company_id: &str, model_name: &str, max_concurrent: Option<usize>) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始测试 [{}]", run_id);
    info!("🏢 公司: {}", company_id);
    info!("🤖 模型: {}", model_name);
    match max_concurrent {
        Some(n) => info!("📊 并行模式，最大并发数: {}", n),
        None => info!("📊 顺序模式"),
    }
    info!("{}", "=".repeat(60));
}

/// 记录标准答案加载信息
///
/// # 参数
/// - `company_name`: 公司名称
/// - `total_files`: 文件数
/// - `total_periods`: 期间数
pub fn log_answer_key_loaded(company_name: &str, total_files: usize, total_periods: usize) {
    info!("✓ 已加载 {} 的标准答案", company_name);
    info!("📋 共 {} 个文件，{} 个期间\n", total_files, total_periods);
}

/// 记录单个文件完成信息
pub fn log_file_done(run_id: &str, completed: usize, total: usize, running_score: f64) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ [测试 {}] 已完成 {}/{} 个文件，当前总分 {:.1}",
        run_id, completed, total, running_score
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `result`: 测试结果
pub fn print_final_stats(result: &TestRunResult) {
    info!("\n{}", "=".repeat(60));
    info!("📊 测试完成统计 [{}]", result.id);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("🏆 总分: {:.1} ({})", result.overall_score, result.overall_grade);
    info!(
        "✅ 正确: {}  🟡 部分: {}  ❌ 错误: {}  ⬜ 缺失: {}",
        result.fields_correct, result.fields_partial, result.fields_wrong, result.fields_missing
    );
    info!(
        "📄 文件: {}  期间: {}  字段: {}",
        result.total_files, result.total_periods, result.total_fields_tested
    );
    info!("⏱️ 耗时: {:.1} 秒", result.execution_time_seconds);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("提取服务超时了", 4), "提取服务...");
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
