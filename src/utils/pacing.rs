// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 在 `[min_ms, max_ms]` 之间取一个随机等待时间
///
/// `max_ms <= min_ms` 时直接返回 `min_ms`
pub fn jittered_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::random_range(min_ms..=max_ms))
}
