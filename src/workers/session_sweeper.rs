use crate::domain::services::session_store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 会话清理工作器
///
/// 定期从进程内会话表中移除过期的会话
pub struct SessionSweeper {
    store: Arc<SessionStore>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<SessionStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// 运行工作器
    pub async fn run(&self) {
        info!("Session sweeper started");

        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;

            let evicted = self.store.evict_expired();
            if !evicted.is_empty() {
                debug!("Evicted sessions: {:?}", evicted);
            }
        }
    }

    /// 启动后台运行
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }
}
