// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::models::business::UNKNOWN_PROVIDER;
use crate::domain::models::provider::ProviderCacheEntry;
use crate::domain::repositories::provider_cache_repository::ProviderCacheRepository;

/// 运营商缓存
///
/// 内存 `DashMap` 在前，数据库表在后；后写覆盖先写。
/// 过期条目视为未命中。`Unknown` 结果不写入缓存。
pub struct ProviderCache {
    entries: DashMap<String, ProviderCacheEntry>,
    repository: Option<Arc<dyn ProviderCacheRepository>>,
    ttl: Duration,
}

impl ProviderCache {
    /// 只使用内存的缓存
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            repository: None,
            ttl,
        }
    }

    /// 带持久化的缓存
    pub fn with_repository(repository: Arc<dyn ProviderCacheRepository>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            repository: Some(repository),
            ttl,
        }
    }

    /// 按规范化号码查询，过期或不存在返回 None
    pub async fn get(&self, phone: &str) -> Option<String> {
        let now = Utc::now();

        if let Some(entry) = self.entries.get(phone) {
            if entry.is_fresh(now, self.ttl) {
                return Some(entry.provider.clone());
            }
        }

        let repository = self.repository.as_ref()?;
        match repository.find(phone).await {
            Ok(Some(entry)) if entry.is_fresh(now, self.ttl) => {
                debug!(phone = %phone, "Provider cache hit from database");
                let provider = entry.provider.clone();
                self.entries.insert(phone.to_string(), entry);
                Some(provider)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(phone = %phone, "Provider cache read failed: {}", e);
                None
            }
        }
    }

    /// 写入缓存
    pub async fn put(&self, phone: &str, provider: &str) {
        if provider.is_empty() || provider == UNKNOWN_PROVIDER {
            return;
        }

        let entry = ProviderCacheEntry::new(phone, provider);
        if let Some(repository) = &self.repository {
            if let Err(e) = repository.upsert(&entry).await {
                warn!(phone = %phone, "Provider cache write failed: {}", e);
            }
        }
        self.entries.insert(phone.to_string(), entry);
    }

    /// 内存中的条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
