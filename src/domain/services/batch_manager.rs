// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

use crate::config::settings::LookupSettings;

/// 批次大小调整参数
#[derive(Debug, Clone)]
pub struct BatchManagerConfig {
    /// 下限
    pub min_size: usize,
    /// 上限（初始值）
    pub max_size: usize,
    /// 连续成功多少批后 +1
    pub grow_after: u32,
    /// 连续失败多少批后 -1
    pub shrink_after: u32,
    /// 成功率达到该值的批次算成功
    pub success_threshold: f64,
    /// 最近结果窗口大小
    pub window: usize,
}

impl Default for BatchManagerConfig {
    fn default() -> Self {
        Self {
            min_size: 3,
            max_size: 5,
            grow_after: 3,
            shrink_after: 2,
            success_threshold: 0.8,
            window: 10,
        }
    }
}

impl From<&LookupSettings> for BatchManagerConfig {
    fn from(settings: &LookupSettings) -> Self {
        let min_size = settings.batch_min.max(1);
        Self {
            min_size,
            max_size: settings.batch_max.max(min_size),
            grow_after: settings.grow_after.max(1),
            shrink_after: settings.shrink_after.max(1),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct BatchState {
    current_size: usize,
    consecutive_successes: u32,
    consecutive_failures: u32,
    recent: VecDeque<bool>,
}

/// 自适应批次大小
///
/// 从上限开始；连续失败时向下限收缩，连续成功时向上限扩张
#[derive(Debug)]
pub struct BatchManager {
    config: BatchManagerConfig,
    state: Mutex<BatchState>,
}

impl BatchManager {
    pub fn new(config: BatchManagerConfig) -> Self {
        let state = BatchState {
            current_size: config.max_size,
            consecutive_successes: 0,
            consecutive_failures: 0,
            recent: VecDeque::with_capacity(config.window),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// 当前批次大小
    pub fn current_size(&self) -> usize {
        self.state.lock().current_size
    }

    /// 最近窗口内的批次成功率，没有记录时为 1.0
    pub fn success_rate(&self) -> f64 {
        let state = self.state.lock();
        if state.recent.is_empty() {
            return 1.0;
        }
        let successes = state.recent.iter().filter(|ok| **ok).count();
        successes as f64 / state.recent.len() as f64
    }

    /// 记录一个批次的结果
    ///
    /// # 参数
    ///
    /// * `resolved` - 成功解析的号码数
    /// * `total` - 批次中的号码数
    pub fn record_batch(&self, resolved: usize, total: usize) {
        if total == 0 {
            return;
        }
        let success = resolved as f64 / total as f64 >= self.config.success_threshold;

        let mut state = self.state.lock();
        if state.recent.len() == self.config.window {
            state.recent.pop_front();
        }
        state.recent.push_back(success);

        if success {
            state.consecutive_successes += 1;
            state.consecutive_failures = 0;
            if state.consecutive_successes >= self.config.grow_after
                && state.current_size < self.config.max_size
            {
                state.current_size += 1;
                state.consecutive_successes = 0;
                debug!(size = state.current_size, "Lookup batch size increased");
            }
        } else {
            state.consecutive_failures += 1;
            state.consecutive_successes = 0;
            if state.consecutive_failures >= self.config.shrink_after
                && state.current_size > self.config.min_size
            {
                state.current_size -= 1;
                state.consecutive_failures = 0;
                debug!(size = state.current_size, "Lookup batch size decreased");
            }
        }
    }
}
