// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::domain::models::business::UNKNOWN_PROVIDER;
use crate::domain::models::retry_item::{
    ProviderLookupPayload, RetryItemStatus, RetryItemType, RetryQueueItem,
};
use crate::domain::repositories::business_repository::BusinessRepository;
use crate::domain::repositories::retry_queue_repository::RetryQueueRepository;
use crate::domain::services::provider_lookup_service::ProviderLookupService;
use crate::infrastructure::metrics::RETRY_QUEUE_ITEMS_TOTAL;
use crate::utils::errors::WorkerError;
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::worker::Worker;

/// 重试条目处理器
#[async_trait]
pub trait RetryHandler: Send + Sync {
    /// 负责的条目类型
    fn item_type(&self) -> RetryItemType;

    /// 重放一个条目
    async fn handle(&self, item: &RetryQueueItem) -> Result<(), String>;
}

/// 重放运营商查询，成功后回填该会话的商家
pub struct ProviderRetryHandler {
    lookup: Arc<ProviderLookupService>,
    businesses: Option<Arc<dyn BusinessRepository>>,
}

impl ProviderRetryHandler {
    pub fn new(
        lookup: Arc<ProviderLookupService>,
        businesses: Option<Arc<dyn BusinessRepository>>,
    ) -> Self {
        Self { lookup, businesses }
    }
}

#[async_trait]
impl RetryHandler for ProviderRetryHandler {
    fn item_type(&self) -> RetryItemType {
        RetryItemType::ProviderLookup
    }

    async fn handle(&self, item: &RetryQueueItem) -> Result<(), String> {
        let payload: ProviderLookupPayload =
            serde_json::from_value(item.payload.clone()).map_err(|e| e.to_string())?;

        let provider = self
            .lookup
            .retry_lookup(&payload.phone)
            .await
            .map_err(|e| e.to_string())?;
        if provider == UNKNOWN_PROVIDER {
            return Err("provider still unknown".to_string());
        }

        if let (Some(businesses), Some(session_id)) = (&self.businesses, item.session_id) {
            let mut phones = payload.raw_phones.clone();
            if !phones.contains(&payload.phone) {
                phones.push(payload.phone.clone());
            }
            let updated = businesses
                .update_provider_by_phones(session_id, &phones, &provider)
                .await
                .map_err(|e| e.to_string())?;
            debug!(%session_id, updated, provider = %provider, "Backfilled provider");
        }
        Ok(())
    }
}

/// 重试队列Worker
///
/// 定期取出到期的条目交给对应的处理器。成功的条目被删除，
/// 失败的条目按退避策略重新排期，次数耗尽后标记为 Failed。
pub struct RetryQueueWorker {
    repository: Arc<dyn RetryQueueRepository>,
    handlers: Vec<Arc<dyn RetryHandler>>,
    policy: RetryPolicy,
    sweep_interval: Duration,
    batch_limit: u64,
}

/// 一次扫描的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub succeeded: usize,
    pub rescheduled: usize,
    pub failed: usize,
}

impl RetryQueueWorker {
    pub fn new(
        repository: Arc<dyn RetryQueueRepository>,
        sweep_interval: Duration,
        batch_limit: u64,
    ) -> Self {
        Self {
            repository,
            handlers: Vec::new(),
            policy: RetryPolicy::queue(),
            sweep_interval,
            batch_limit,
        }
    }

    /// 注册处理器
    pub fn with_handler(mut self, handler: Arc<dyn RetryHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// 处理一批到期条目
    pub async fn sweep_once(&self) -> Result<SweepReport, WorkerError> {
        let due = self
            .repository
            .due_items(Utc::now(), self.batch_limit)
            .await?;

        let mut report = SweepReport::default();
        if due.is_empty() {
            return Ok(report);
        }
        info!("发现 {} 个到期的重试条目", due.len());

        for item in due {
            match self.process_item(item).await {
                Ok(ItemOutcome::Succeeded) => report.succeeded += 1,
                Ok(ItemOutcome::Rescheduled) => report.rescheduled += 1,
                Ok(ItemOutcome::Failed) => report.failed += 1,
                Err(e) => error!("处理重试条目失败: {}", e),
            }
        }

        info!(
            "重试条目处理完成: 成功={}, 重新排期={}, 失败={}",
            report.succeeded, report.rescheduled, report.failed
        );
        Ok(report)
    }

    async fn process_item(&self, mut item: RetryQueueItem) -> Result<ItemOutcome, WorkerError> {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.item_type() == item.item_type)
            .ok_or_else(|| WorkerError::HandlerNotFound(item.item_type.to_string()))?;

        match handler.handle(&item).await {
            Ok(()) => {
                self.repository.delete(item.id).await?;
                metrics::counter!(RETRY_QUEUE_ITEMS_TOTAL, "outcome" => "succeeded").increment(1);
                debug!("重试条目 {} 处理成功", item.id);
                Ok(ItemOutcome::Succeeded)
            }
            Err(reason) => {
                let attempt = (item.attempt_count + 1).max(1) as u32;
                let next_retry_at = self.policy.next_retry_time(attempt, Utc::now());
                item.record_failure(reason.clone(), next_retry_at);
                self.repository.update(&item).await?;

                if item.status == RetryItemStatus::Failed {
                    warn!(
                        "重试条目 {} 已达到最大次数 {}，标记为失败: {}",
                        item.id, item.max_attempts, reason
                    );
                    metrics::counter!(RETRY_QUEUE_ITEMS_TOTAL, "outcome" => "failed").increment(1);
                    Ok(ItemOutcome::Failed)
                } else {
                    debug!("重试条目 {} 将于 {} 再次尝试", item.id, item.next_retry_at);
                    metrics::counter!(RETRY_QUEUE_ITEMS_TOTAL, "outcome" => "rescheduled")
                        .increment(1);
                    Ok(ItemOutcome::Rescheduled)
                }
            }
        }
    }
}

enum ItemOutcome {
    Succeeded,
    Rescheduled,
    Failed,
}

#[async_trait]
impl Worker for RetryQueueWorker {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("启动重试队列Worker，间隔: {:?}", self.sweep_interval);

        let mut ticker = interval(self.sweep_interval);
        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep_once().await {
                error!("重试队列扫描失败: {}", e);
            }

            match self
                .repository
                .count_by_status(RetryItemStatus::Failed)
                .await
            {
                Ok(failed) if failed > 0 => debug!("已放弃的重试条目: {}", failed),
                Ok(_) => {}
                Err(e) => warn!("统计重试条目失败: {}", e),
            }
        }
    }

    fn name(&self) -> &str {
        "RetryQueueWorker"
    }
}
