// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

/// 会话已被停止
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stopped")]
pub struct Stopped;

/// 抓取控制对象
///
/// 在所有异步调用之间传递的暂停/停止信号。`Stopped` 是终态。
/// 克隆得到的副本共享同一个状态。
#[derive(Clone, Debug)]
pub struct ScrapeControl {
    state: Arc<watch::Sender<RunState>>,
}

impl Default for ScrapeControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::Running);
        Self {
            state: Arc::new(tx),
        }
    }

    /// 当前状态
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == RunState::Stopped
    }

    /// Running → Paused，返回状态是否改变
    pub fn pause(&self) -> bool {
        self.state.send_if_modified(|s| {
            if *s == RunState::Running {
                *s = RunState::Paused;
                true
            } else {
                false
            }
        })
    }

    /// Paused → Running，返回状态是否改变
    pub fn resume(&self) -> bool {
        self.state.send_if_modified(|s| {
            if *s == RunState::Paused {
                *s = RunState::Running;
                true
            } else {
                false
            }
        })
    }

    /// 任意状态 → Stopped，返回状态是否改变
    pub fn stop(&self) -> bool {
        self.state.send_if_modified(|s| {
            if *s == RunState::Stopped {
                false
            } else {
                *s = RunState::Stopped;
                true
            }
        })
    }

    /// 工作单元之间的检查点
    ///
    /// 暂停时阻塞直到恢复；已停止时返回 `Err(Stopped)`
    pub async fn checkpoint(&self) -> Result<(), Stopped> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| *s != RunState::Paused)
            .await
            .map_err(|_| Stopped)?;
        match *state {
            RunState::Stopped => Err(Stopped),
            _ => Ok(()),
        }
    }

    /// 在停止时完成
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == RunState::Stopped).await;
    }

    /// 可被停止打断的等待
    pub async fn sleep(&self, duration: Duration) -> Result<(), Stopped> {
        if self.is_stopped() {
            return Err(Stopped);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Stopped),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// 让 `fut` 和停止信号竞争
    pub async fn guard<F>(&self, fut: F) -> Result<F::Output, Stopped>
    where
        F: Future,
    {
        if self.is_stopped() {
            return Err(Stopped);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Stopped),
            output = fut => Ok(output),
        }
    }
}
