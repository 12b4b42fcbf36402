//! 进度总线 - 基础设施层
//!
//! 进程内发布/订阅通道，基于 `tokio::sync::broadcast`。
//!
//! - `publish` 永不阻塞；没有订阅者时事件直接丢弃
//! - 订阅者只收到订阅之后发布的事件，不回放历史
//! - 慢订阅者落后过多时跳过旧事件并记录警告，不影响测试运行

use std::io::Write;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::ProgressEvent;

/// 进度总线
#[derive(Debug, Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布事件，返回收到事件的订阅者数量
    pub fn publish(&self, event: ProgressEvent) -> usize {
        debug!("[进度] {:?} - {}", event.phase, event.message);
        // 没有订阅者时 send 返回错误，事件被丢弃
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription {
            receiver: self.sender.subscribe(),
            run_id: None,
        }
    }

    /// 只订阅某一次运行的事件
    pub fn subscribe_run(&self, run_id: impl Into<String>) -> ProgressSubscription {
        ProgressSubscription {
            receiver: self.sender.subscribe(),
            run_id: Some(run_id.into()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 订阅句柄
#[derive(Debug)]
pub struct ProgressSubscription {
    receiver: broadcast::Receiver<ProgressEvent>,
    run_id: Option<String>,
}

impl ProgressSubscription {
    /// 接收下一个事件；总线关闭后返回 None
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Some(run_id) = &self.run_id {
                        if &event.run_id != run_id {
                            continue;
                        }
                    }
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ 进度订阅落后，跳过 {} 条事件", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// 把订阅到的事件逐行写成 JSON（`{type: "test_progress", payload}`）
///
/// 总线关闭或写入失败时结束
pub fn spawn_json_lines_forwarder<W>(mut subscription: ProgressSubscription, mut writer: W) -> JoinHandle<()>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let line = event.to_message().to_string();
            if writeln!(writer, "{}", line).and_then(|_| writer.flush()).is_err() {
                warn!("进度输出写入失败，停止转发");
                break;
            }
        }
    })
}
