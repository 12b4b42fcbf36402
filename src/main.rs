mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use statement_eval::infrastructure::spawn_json_lines_forwarder;
use statement_eval::models::RunRequest;
use statement_eval::orchestrator::{App, RunOrchestrator};
use statement_eval::utils::logging;
use statement_eval::Config;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    let cli = Cli::parse();

    // 加载配置
    let config = match &cli.config {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
        None => Config::from_env(),
    };

    let app = App::initialize(config).context("初始化应用失败")?;

    match cli.command {
        Command::Run {
            company,
            model,
            prompt_file,
            extended_thinking,
            sequential,
            max_concurrent,
            tolerance,
            follow,
        } => {
            let prompt_override = match prompt_file {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("无法读取提示词文件 {}", path.display()))?,
                ),
                None => None,
            };

            let request = RunRequest {
                company_id: company,
                model_name: model.unwrap_or_default(),
                prompt_override,
                extended_thinking,
                parallel: sequential.then_some(false),
                max_concurrent,
                tolerance_override: tolerance,
            };

            let run_id = RunOrchestrator::new_run_id();
            let orchestrator = app.orchestrator().clone();
            let forwarder = follow.then(|| {
                spawn_json_lines_forwarder(orchestrator.bus().subscribe_run(&run_id), std::io::stdout())
            });

            let outcome = orchestrator.run_with_id(run_id.clone(), request).await;

            // 关闭进度总线，转发任务输出剩余事件后结束
            drop(orchestrator);
            drop(app);
            if let Some(handle) = forwarder {
                handle.await.context("进度转发任务失败")?;
            }

            let result = outcome.with_context(|| format!("测试 {} 失败", run_id))?;
            println!("{}", serde_json::to_string(&result.summary())?);
        }
        Command::History {
            limit,
            offset,
            company,
        } => {
            let history = app.history(company.as_deref(), limit, offset).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Show { run_id } => {
            let result = app
                .get_run(&run_id)
                .await
                .with_context(|| format!("找不到测试记录 {}", run_id))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Companies => {
            let statuses = app.company_status().await?;
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
    }

    Ok(())
}
