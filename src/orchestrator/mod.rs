//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责测试运行的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用装配
//! - 根据配置打开数据库、创建进度总线和提取器
//! - 提供历史记录、单条记录、公司列表查询
//!
//! ### `run_processor` - 测试运行处理器
//! - 创建并更新测试记录（pending → running → complete | error）
//! - 加载标准答案
//! - 顺序或并行（Semaphore）分发文件
//! - 每个文件完成后重新汇总分数
//!
//! ## 层次关系
//!
//! ```text
//! app (资源装配)
//!     ↓
//! run_processor (处理 Vec<AnswerKeyFile>)
//!     ↓
//! workflow::FileFlow (处理单个文件)
//!     ↓
//! services (能力层：extract / align / grade / score)
//!     ↓
//! infrastructure (基础设施：RunStore / ProgressBus)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：app 管资源，run_processor 管一次运行
//! 2. **资源隔离**：只有编排层持有 RunStore 和 ProgressBus
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度和汇总，评分规则在 services 中

pub mod app;
pub mod run_processor;

// 重新导出主要类型
pub use app::App;
pub use run_processor::RunOrchestrator;
