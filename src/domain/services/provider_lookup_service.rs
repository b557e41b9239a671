// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::LookupSettings;
use crate::domain::models::business::UNKNOWN_PROVIDER;
use crate::domain::models::provider::LookupStats;
use crate::domain::models::retry_item::{ProviderLookupPayload, RetryQueueItem};
use crate::domain::repositories::retry_queue_repository::RetryQueueRepository;
use crate::domain::services::batch_manager::{BatchManager, BatchManagerConfig};
use crate::domain::services::captcha_detector::CaptchaDetector;
use crate::domain::services::retry_strategy::RetryStrategy;
use crate::domain::services::scrape_control::ScrapeControl;
use crate::engines::traits::{BrowserFactory, BrowserHandle, EngineError, PageHandle};
use crate::infrastructure::cache::provider_cache::ProviderCache;
use crate::infrastructure::metrics::{PROVIDER_LOOKUPS_TOTAL, PROVIDER_LOOKUP_BROWSERS_TOTAL};
use crate::infrastructure::parsers::carrier_parser::CarrierParser;
use crate::utils::errors::LookupError;
use crate::utils::pacing::jittered_delay;
use crate::utils::phone::normalize_phone;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::url_utils::lookup_url;

/// 一次批量查询的结果
#[derive(Debug, Clone, Default)]
pub struct LookupReport {
    /// 以调用方传入的原始号码为键
    pub providers: HashMap<String, String>,
    /// 统计
    pub stats: LookupStats,
}

impl LookupReport {
    /// 查询某个原始号码的运营商
    pub fn provider_for(&self, raw_phone: &str) -> &str {
        self.providers
            .get(raw_phone)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_PROVIDER)
    }
}

/// 一个规范化号码和它对应的原始写法
#[derive(Debug, Clone)]
struct PendingNumber {
    phone: String,
    raws: Vec<String>,
}

struct BatchOutcome {
    results: Vec<(PendingNumber, Result<String, LookupError>)>,
    browser_launched: bool,
    captcha: bool,
}

/// 运营商查询服务
///
/// 每个批次（最多 5 个号码）只启动一个浏览器，批内的号码依次复用它，
/// 批次结束后关闭。缓存命中的号码不会触发任何浏览器操作。
/// 重试耗尽的号码解析为 `Unknown` 并写入重试队列。
pub struct ProviderLookupService {
    browsers: Arc<dyn BrowserFactory>,
    cache: Arc<ProviderCache>,
    retry_queue: Option<Arc<dyn RetryQueueRepository>>,
    queue_max_attempts: i32,
    settings: LookupSettings,
    batch_manager: BatchManager,
    captcha: CaptchaDetector,
    parser: CarrierParser,
    strategy: RetryStrategy,
}

impl ProviderLookupService {
    /// # 参数
    ///
    /// * `browsers` - 浏览器工厂
    /// * `cache` - 运营商缓存
    /// * `settings` - 查询配置
    pub fn new(
        browsers: Arc<dyn BrowserFactory>,
        cache: Arc<ProviderCache>,
        settings: LookupSettings,
    ) -> Self {
        Self {
            browsers,
            cache,
            retry_queue: None,
            queue_max_attempts: 3,
            batch_manager: BatchManager::new(BatchManagerConfig::from(&settings)),
            captcha: CaptchaDetector::new(settings.captcha_detection),
            parser: CarrierParser::new(&settings.result_selector),
            strategy: RetryStrategy::new(RetryPolicy::from(&settings.retry)),
            settings,
        }
    }

    /// 启用重试队列
    pub fn with_retry_queue(
        mut self,
        repository: Arc<dyn RetryQueueRepository>,
        max_attempts: i32,
    ) -> Self {
        self.retry_queue = Some(repository);
        self.queue_max_attempts = max_attempts;
        self
    }

    pub fn batch_manager(&self) -> &BatchManager {
        &self.batch_manager
    }

    pub fn cache(&self) -> &Arc<ProviderCache> {
        &self.cache
    }

    /// 批量查询运营商
    ///
    /// # 参数
    ///
    /// * `phones` - 原始号码（可重复、可带格式）
    /// * `session_id` - 来源会话，写入重试队列时使用
    /// * `simultaneous_lookups` - 同时进行的批次数
    /// * `control` - 暂停/停止信号
    ///
    /// # 返回值
    ///
    /// 原始号码到运营商的映射以及统计信息
    #[instrument(skip_all, fields(phones = phones.len(), session_id = ?session_id))]
    pub async fn lookup_providers(
        &self,
        phones: &[String],
        session_id: Option<Uuid>,
        simultaneous_lookups: usize,
        control: &ScrapeControl,
    ) -> LookupReport {
        let mut report = LookupReport::default();

        let mut groups: Vec<PendingNumber> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for raw in phones {
            if !seen.insert(raw.as_str()) {
                continue;
            }
            match normalize_phone(raw, &self.settings.country_code) {
                Some(phone) => match index.get(&phone) {
                    Some(&i) => groups[i].raws.push(raw.clone()),
                    None => {
                        index.insert(phone.clone(), groups.len());
                        groups.push(PendingNumber {
                            phone,
                            raws: vec![raw.clone()],
                        });
                    }
                },
                None => {
                    debug!(phone = %raw, "Phone number too short, skipping lookup");
                    report
                        .providers
                        .insert(raw.clone(), UNKNOWN_PROVIDER.to_string());
                    report.stats.unknown += 1;
                }
            }
        }
        report.stats.requested = groups.len();

        let mut pending = VecDeque::new();
        for group in groups {
            match self.cache.get(&group.phone).await {
                Some(provider) => {
                    report.stats.cache_hits += 1;
                    metrics::counter!(PROVIDER_LOOKUPS_TOTAL, "outcome" => "cache_hit").increment(1);
                    assign(&mut report, &group, &provider);
                }
                None => pending.push_back(group),
            }
        }

        if pending.is_empty() {
            return report;
        }
        info!(
            numbers = pending.len(),
            cache_hits = report.stats.cache_hits,
            "Starting browser lookups"
        );

        let concurrency = simultaneous_lookups.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut batch_index = 0usize;

        loop {
            while in_flight.len() < concurrency && !pending.is_empty() && !control.is_stopped() {
                let size = self.batch_manager.current_size().min(pending.len());
                let batch: Vec<PendingNumber> = pending.drain(..size).collect();
                in_flight.push(self.run_batch(batch_index, batch, control));
                batch_index += 1;
            }

            let Some(outcome) = in_flight.next().await else {
                break;
            };
            self.merge(outcome, session_id, &mut report).await;
        }

        // 停止后未处理的号码
        for group in pending {
            assign(&mut report, &group, UNKNOWN_PROVIDER);
        }

        info!(
            resolved = report.stats.resolved,
            unknown = report.stats.unknown,
            browsers = report.stats.browsers_launched,
            captcha = report.stats.captcha_detected,
            "Provider lookups finished"
        );
        report
    }

    /// 单号码查询（重试队列使用），失败不会再次入队
    pub async fn retry_lookup(&self, phone: &str) -> Result<String, LookupError> {
        let normalized = normalize_phone(phone, &self.settings.country_code)
            .ok_or_else(|| LookupError::InvalidPhone(phone.to_string()))?;

        if let Some(provider) = self.cache.get(&normalized).await {
            return Ok(provider);
        }

        let control = ScrapeControl::new();
        let browser = self.browsers.launch().await?;
        metrics::counter!(PROVIDER_LOOKUP_BROWSERS_TOTAL).increment(1);

        let strategy = self.strategy.cancellable(&control);
        let result = self
            .lookup_number(browser.as_ref(), &normalized, &strategy, &control)
            .await;
        if let Err(e) = browser.close().await {
            debug!("Failed to close lookup browser: {}", e);
        }

        if let Ok(provider) = &result {
            self.cache.put(&normalized, provider).await;
        }
        result
    }

    #[instrument(skip_all, fields(batch = index, size = batch.len()))]
    async fn run_batch(
        &self,
        index: usize,
        batch: Vec<PendingNumber>,
        control: &ScrapeControl,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(batch.len()),
            browser_launched: false,
            captcha: false,
        };

        if index > 0 {
            let delay = jittered_delay(
                self.settings.inter_batch_delay_min_ms,
                self.settings.inter_batch_delay_max_ms,
            );
            if control.sleep(delay).await.is_err() {
                outcome.results = fail_all(batch, || LookupError::Stopped);
                return outcome;
            }
        }

        let browser = match control.guard(self.browsers.launch()).await {
            Err(_) => {
                outcome.results = fail_all(batch, || LookupError::Stopped);
                return outcome;
            }
            Ok(Err(e)) => {
                warn!("Failed to launch lookup browser: {}", e);
                let message = e.to_string();
                outcome.results = fail_all(batch, || {
                    LookupError::Engine(EngineError::Launch(message.clone()))
                });
                return outcome;
            }
            Ok(Ok(browser)) => browser,
        };
        outcome.browser_launched = true;
        metrics::counter!(PROVIDER_LOOKUP_BROWSERS_TOTAL).increment(1);

        let strategy = self.strategy.cancellable(control);
        let per_lookup_delay = Duration::from_millis(self.settings.per_lookup_delay_ms);
        let mut remaining = batch.into_iter();

        while let Some(number) = remaining.next() {
            if control.checkpoint().await.is_err() {
                outcome.results.push((number, Err(LookupError::Stopped)));
                outcome
                    .results
                    .extend(remaining.by_ref().map(|n| (n, Err(LookupError::Stopped))));
                break;
            }

            let result = self
                .lookup_number(browser.as_ref(), &number.phone, &strategy, control)
                .await;
            let captcha = matches!(result, Err(LookupError::CaptchaDetected));
            outcome.results.push((number, result));

            if captcha {
                warn!("Captcha detected, aborting the rest of the batch");
                outcome.captcha = true;
                outcome.results.extend(
                    remaining
                        .by_ref()
                        .map(|n| (n, Err(LookupError::CaptchaDetected))),
                );
                break;
            }

            let _ = control.sleep(per_lookup_delay).await;
        }

        if let Err(e) = browser.close().await {
            debug!("Failed to close lookup browser: {}", e);
        }

        if !control.is_stopped() {
            let resolved = outcome.results.iter().filter(|(_, r)| r.is_ok()).count();
            self.batch_manager
                .record_batch(resolved, outcome.results.len());
        }
        outcome
    }

    /// 在新页面里查询一个号码，失败时在同一页面内重试
    async fn lookup_number(
        &self,
        browser: &dyn BrowserHandle,
        phone: &str,
        strategy: &RetryStrategy,
        control: &ScrapeControl,
    ) -> Result<String, LookupError> {
        let page = control.guard(browser.new_page()).await??;
        let url = lookup_url(&self.settings.url_template, phone);

        let result = strategy
            .execute_when(
                |attempt| self.lookup_attempt(&page, &url, attempt, control),
                LookupError::is_retryable,
            )
            .await;

        if let Err(e) = page.close().await {
            debug!("Failed to close lookup page: {}", e);
        }

        match &result {
            Ok(provider) => debug!(phone = %phone, provider = %provider, "Provider resolved"),
            Err(e) if !control.is_stopped() => {
                warn!(phone = %phone, "Provider lookup failed: {}", e)
            }
            Err(_) => {}
        }
        result
    }

    async fn lookup_attempt(
        &self,
        page: &Arc<dyn PageHandle>,
        url: &str,
        attempt: u32,
        control: &ScrapeControl,
    ) -> Result<String, LookupError> {
        debug!(attempt, url = %url, "Looking up provider");
        let navigation_timeout = Duration::from_millis(self.settings.navigation_timeout_ms);
        let element_timeout = Duration::from_millis(self.settings.element_timeout_ms);

        control.guard(page.goto(url, navigation_timeout)).await??;

        if self.captcha.is_enabled() && self.captcha.detect(&page.content().await?) {
            return Err(LookupError::CaptchaDetected);
        }

        let waited = control
            .guard(page.wait_for_selector(&self.settings.result_selector, element_timeout))
            .await?;
        if let Err(e) = waited {
            if self.captcha.is_enabled() && self.captcha.detect(&page.content().await?) {
                return Err(LookupError::CaptchaDetected);
            }
            return Err(e.into());
        }

        let html = page.content().await?;
        self.parser.parse(&html).ok_or(LookupError::ProviderNotFound)
    }

    async fn merge(
        &self,
        outcome: BatchOutcome,
        session_id: Option<Uuid>,
        report: &mut LookupReport,
    ) {
        if outcome.browser_launched {
            report.stats.browsers_launched += 1;
        }
        if outcome.captcha {
            report.stats.captcha_detected = true;
        }

        for (number, result) in outcome.results {
            match result {
                Ok(provider) => {
                    self.cache.put(&number.phone, &provider).await;
                    report.stats.resolved += 1;
                    metrics::counter!(PROVIDER_LOOKUPS_TOTAL, "outcome" => "resolved").increment(1);
                    assign(report, &number, &provider);
                }
                Err(LookupError::Stopped) => {
                    assign(report, &number, UNKNOWN_PROVIDER);
                }
                Err(e) => {
                    report.stats.unknown += 1;
                    metrics::counter!(PROVIDER_LOOKUPS_TOTAL, "outcome" => "unknown").increment(1);
                    assign(report, &number, UNKNOWN_PROVIDER);
                    if self.enqueue(&number, session_id, &e).await {
                        report.stats.queued += 1;
                    }
                }
            }
        }
    }

    async fn enqueue(
        &self,
        number: &PendingNumber,
        session_id: Option<Uuid>,
        error: &LookupError,
    ) -> bool {
        let Some(repository) = &self.retry_queue else {
            return false;
        };

        let payload = ProviderLookupPayload {
            phone: number.phone.clone(),
            raw_phones: number.raws.clone(),
        };
        let first_retry = RetryPolicy::queue().next_retry_time(1, Utc::now());
        let mut item = match RetryQueueItem::provider_lookup(
            &payload,
            session_id,
            self.queue_max_attempts,
            first_retry,
        ) {
            Ok(item) => item,
            Err(e) => {
                warn!("Failed to build retry item: {}", e);
                return false;
            }
        };
        item.last_error = Some(error.to_string());

        match repository.enqueue(&item).await {
            Ok(_) => {
                debug!(phone = %number.phone, "Queued provider lookup for retry");
                true
            }
            Err(e) => {
                warn!(phone = %number.phone, "Failed to queue provider lookup: {}", e);
                false
            }
        }
    }
}

fn assign(report: &mut LookupReport, number: &PendingNumber, provider: &str) {
    for raw in &number.raws {
        report.providers.insert(raw.clone(), provider.to_string());
    }
}

fn fail_all<F>(
    batch: Vec<PendingNumber>,
    error: F,
) -> Vec<(PendingNumber, Result<String, LookupError>)>
where
    F: Fn() -> LookupError,
{
    batch.into_iter().map(|n| (n, Err(error()))).collect()
}
