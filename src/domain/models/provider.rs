// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 运营商缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCacheEntry {
    /// 规范化后的号码
    pub phone: String,
    /// 运营商名称
    pub provider: String,
    /// 写入时间
    pub cached_at: DateTime<Utc>,
}

impl ProviderCacheEntry {
    pub fn new(phone: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            provider: provider.into(),
            cached_at: Utc::now(),
        }
    }

    /// 在 `now` 时刻是否仍在有效期内
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.cached_at < ttl
    }
}

/// 运营商查询统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupStats {
    /// 去重后需要处理的号码数
    pub requested: usize,
    /// 启动的浏览器数
    pub browsers_launched: usize,
    /// 命中缓存的号码数
    pub cache_hits: usize,
    /// 成功解析的号码数
    pub resolved: usize,
    /// 解析为 Unknown 的号码数
    pub unknown: usize,
    /// 放入重试队列的号码数
    pub queued: usize,
    /// 是否遇到人机验证
    pub captcha_detected: bool,
}
