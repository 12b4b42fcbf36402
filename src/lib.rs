//! # Statement Eval
//!
//! 财务报表提取准确率测试引擎：把模型从报表文档中提取出的数字，
//! 与人工整理的标准答案逐字段比对、打分，并保存每次测试的结果
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有共享资源，只暴露能力
//! - `RunStore` - 测试记录持久化（SQLite）
//! - `ProgressBus` - 进度事件发布/订阅
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，都是单一职责的能力
//! - `AnswerKeyStore` - 读写标准答案
//! - `ExtractionAdapter` / `LlmExtractor` - 报表提取
//! - `align_periods` - 期间对齐
//! - `field_grader` - 字段评分
//! - `RunScorer` - 分数汇总与等级
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的完整处理流程
//! - `FileCtx` - 上下文封装（run_id + 文件序号）
//! - `FileFlow` - 流程编排（extract → align → grade → score）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/run_processor` - 一次测试运行，管理状态和并发
//! - `orchestrator/app` - 按配置装配资源
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ProgressBus, RunStore, SqliteRunStore};
pub use models::{RunRequest, RunStatus, TestRunResult};
pub use orchestrator::{App, RunOrchestrator};
pub use services::{AnswerKeyStore, ExtractionAdapter, ExtractionRequest};
pub use workflow::{FileCtx, FileFlow, FileOutcome};
