//! 基础设施层（Infrastructure）
//!
//! 持有进程内的共享资源，只暴露能力：
//! - `RunStore` - 测试记录的唯一持久化入口（SQLite，写入串行化）
//! - `ProgressBus` - 进度事件的发布/订阅通道

pub mod progress_bus;
pub mod run_store;

pub use progress_bus::{spawn_json_lines_forwarder, ProgressBus, ProgressSubscription};
pub use run_store::{RunStore, SqliteRunStore};
