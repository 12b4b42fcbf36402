//! 命令行参数

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "statement_eval", version, about = "财务报表提取准确率测试")]
pub struct Cli {
    /// TOML 配置文件，不指定时只读取环境变量
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 对一个公司执行一次测试
    Run {
        #[arg(long)]
        company: String,
        /// 不指定时使用配置中的默认模型
        #[arg(long)]
        model: Option<String>,
        /// 替换默认提示词的文件
        #[arg(long)]
        prompt_file: Option<PathBuf>,
        #[arg(long)]
        extended_thinking: bool,
        /// 逐个处理文件
        #[arg(long)]
        sequential: bool,
        #[arg(long)]
        max_concurrent: Option<usize>,
        /// 覆盖所有字段的容差（百分比）
        #[arg(long)]
        tolerance: Option<f64>,
        /// 在 stdout 上逐行输出进度事件（JSON）
        #[arg(long)]
        follow: bool,
    },
    /// 查看历史记录（新的在前）
    History {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        company: Option<String>,
    },
    /// 查看一次测试的完整结果
    Show { run_id: String },
    /// 列出已有标准答案的公司，以及各自的文档是否就位
    Companies,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "statement_eval",
            "run",
            "--company",
            "acme",
            "--sequential",
            "--max-concurrent",
            "4",
            "--config",
            "eval.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("eval.toml")));
        match cli.command {
            Command::Run {
                company,
                sequential,
                max_concurrent,
                follow,
                model,
                ..
            } => {
                assert_eq!(company, "acme");
                assert!(sequential);
                assert_eq!(max_concurrent, Some(4));
                assert!(!follow);
                assert!(model.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_show() {
        let cli = Cli::parse_from(["statement_eval", "show", "abc"]);
        assert!(matches!(cli.command, Command::Show { run_id } if run_id == "abc"));
    }
}
