// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::settings::ScraperSettings;
use crate::domain::models::business::ScrapedBusiness;
use crate::domain::services::retry_strategy::RetryStrategy;
use crate::domain::services::scrape_control::ScrapeControl;
use crate::engines::traits::{BrowserFactory, BrowserHandle, EngineError, PageHandle};
use crate::infrastructure::metrics::BUSINESSES_TOTAL;
use crate::infrastructure::parsers::listing_parser::{
    ListingParser, FEED_SELECTOR, SCROLL_FEED_SCRIPT,
};
use crate::utils::errors::ScrapeError;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::url_utils::maps_search_url;

/// 工作者状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Navigating,
    Extracting,
    Scrolling,
    Stopped,
}

/// 浏览器工作者
///
/// 持有一个浏览器实例，按城镇处理行业搜索。同一城镇的行业按
/// `simultaneous_industries` 分块，每块内的行业在各自的页面上并发抓取。
/// 所有打开的页面都会被登记，`force_stop` 时一并关闭。
pub struct BrowserWorker {
    id: usize,
    factory: Arc<dyn BrowserFactory>,
    settings: ScraperSettings,
    parser: Arc<ListingParser>,
    control: ScrapeControl,
    browser: Mutex<Option<Arc<dyn BrowserHandle>>>,
    pages: Mutex<Vec<Arc<dyn PageHandle>>>,
    state: Mutex<WorkerState>,
}

impl BrowserWorker {
    pub fn new(
        id: usize,
        factory: Arc<dyn BrowserFactory>,
        settings: ScraperSettings,
        parser: Arc<ListingParser>,
        control: ScrapeControl,
    ) -> Self {
        Self {
            id,
            factory,
            settings,
            parser,
            control,
            browser: Mutex::new(None),
            pages: Mutex::new(Vec::new()),
            state: Mutex::new(WorkerState::Idle),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// 当前打开的页面数
    pub fn open_pages(&self) -> usize {
        self.pages.lock().len()
    }

    /// 启动浏览器
    pub async fn start(&self) -> Result<(), ScrapeError> {
        self.ensure_browser().await.map(|_| ())
    }

    /// 抓取一个城镇的所有行业
    ///
    /// 单个行业失败只会记录警告；导航重试耗尽会让整个城镇失败。
    ///
    /// # 参数
    ///
    /// * `town` - 城镇名
    /// * `industries` - 行业列表
    /// * `simultaneous_industries` - 同时打开的页面数
    ///
    /// # 返回值
    ///
    /// 该城镇抓取到的商家
    #[instrument(skip(self, industries), fields(worker = self.id))]
    pub async fn process_town(
        &self,
        town: &str,
        industries: &[String],
        simultaneous_industries: usize,
    ) -> Result<Vec<ScrapedBusiness>, ScrapeError> {
        let browser = self.ensure_browser().await?;
        let chunk_delay = Duration::from_millis(self.settings.industry_batch_delay_ms);
        let mut results = Vec::new();

        for (i, chunk) in industries
            .chunks(simultaneous_industries.max(1))
            .enumerate()
        {
            if i > 0 {
                self.control.sleep(chunk_delay).await?;
            }
            self.control.checkpoint().await?;

            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|industry| self.scrape_industry(&browser, town, industry)),
            )
            .await;

            for (industry, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(mut found) => results.append(&mut found),
                    Err(_) if self.control.is_stopped() => return Err(ScrapeError::Stopped),
                    Err(e @ ScrapeError::NavigationExhausted { .. }) => {
                        self.set_state(WorkerState::Idle);
                        return Err(e);
                    }
                    Err(e) => warn!(industry = %industry, "Industry scrape failed: {}", e),
                }
            }
        }

        if self.control.is_stopped() {
            return Err(ScrapeError::Stopped);
        }
        self.set_state(WorkerState::Idle);
        info!(businesses = results.len(), "Town finished");
        Ok(results)
    }

    /// 强制停止：关闭所有页面和浏览器，错误被忽略
    pub async fn force_stop(&self) {
        self.set_state(WorkerState::Stopped);
        self.close_all().await;
    }

    /// 正常退出时释放浏览器
    pub async fn shutdown(&self) {
        self.close_all().await;
        if self.state() != WorkerState::Stopped {
            self.set_state(WorkerState::Idle);
        }
    }

    async fn close_all(&self) {
        let pages: Vec<Arc<dyn PageHandle>> = std::mem::take(&mut *self.pages.lock());
        for page in pages {
            if let Err(e) = page.close().await {
                debug!(worker = self.id, "Failed to close page: {}", e);
            }
        }

        let browser = self.browser.lock().take();
        if let Some(browser) = browser {
            if let Err(e) = browser.close().await {
                debug!(worker = self.id, "Failed to close browser: {}", e);
            }
        }
    }

    async fn ensure_browser(&self) -> Result<Arc<dyn BrowserHandle>, ScrapeError> {
        let existing = self.browser.lock().clone();
        if let Some(browser) = existing {
            if !browser.is_closed() {
                return Ok(browser);
            }
        }

        let browser = self
            .control
            .guard(self.factory.launch())
            .await?
            .map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;

        if self.control.is_stopped() {
            let _ = browser.close().await;
            return Err(ScrapeError::Stopped);
        }

        info!(worker = self.id, engine = self.factory.name(), "Browser launched");
        *self.browser.lock() = Some(browser.clone());

        self.control
            .sleep(Duration::from_millis(self.settings.browser_settle_ms))
            .await?;
        Ok(browser)
    }

    async fn scrape_industry(
        &self,
        browser: &Arc<dyn BrowserHandle>,
        town: &str,
        industry: &str,
    ) -> Result<Vec<ScrapedBusiness>, ScrapeError> {
        let url = maps_search_url(&self.settings.maps_base_url, industry, town)
            .map_err(|e| EngineError::Navigation(e.to_string()))?;

        let page = self.control.guard(browser.new_page()).await??;
        self.pages.lock().push(page.clone());
        if self.control.is_stopped() {
            self.release(&page).await;
            return Err(ScrapeError::Stopped);
        }

        let result = self.scrape_page(&page, &url, town, industry).await;
        self.release(&page).await;
        result
    }

    async fn scrape_page(
        &self,
        page: &Arc<dyn PageHandle>,
        url: &str,
        town: &str,
        industry: &str,
    ) -> Result<Vec<ScrapedBusiness>, ScrapeError> {
        self.set_state(WorkerState::Navigating);
        self.navigate_with_retry(page, url).await?;

        self.set_state(WorkerState::Extracting);
        let feed = self
            .control
            .guard(page.wait_for_selector(FEED_SELECTOR, self.settings.element_timeout()))
            .await?;
        match feed {
            Ok(()) => {}
            Err(EngineError::ElementNotFound(_)) => {
                debug!(town = %town, industry = %industry, "No results feed");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        }

        self.set_state(WorkerState::Scrolling);
        self.scroll_feed(page).await?;

        self.set_state(WorkerState::Extracting);
        let html = self.control.guard(page.content()).await??;
        let found = self.parser.parse(&html, town, industry);
        debug!(town = %town, industry = %industry, count = found.len(), "Listings extracted");
        metrics::counter!(BUSINESSES_TOTAL).increment(found.len() as u64);
        Ok(found)
    }

    /// 导航，只在超时时重试
    async fn navigate_with_retry(
        &self,
        page: &Arc<dyn PageHandle>,
        url: &str,
    ) -> Result<(), ScrapeError> {
        let attempts = self.settings.navigation_retries + 1;
        let delay = Duration::from_millis(self.settings.navigation_retry_delay_ms);
        let strategy = RetryStrategy::new(RetryPolicy {
            max_attempts: attempts,
            initial_backoff: delay,
            max_backoff: delay,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
            enable_jitter: false,
        })
        .cancellable(&self.control);
        let timeout = self.settings.navigation_timeout();

        let result = strategy
            .execute_when(
                |attempt| async move {
                    debug!(worker = self.id, attempt, url = %url, "Navigating");
                    match self.control.guard(page.goto(url, timeout)).await {
                        Ok(outcome) => outcome.map_err(ScrapeError::from),
                        Err(stopped) => Err(stopped.into()),
                    }
                },
                |e| matches!(e, ScrapeError::Engine(engine) if engine.is_timeout()),
            )
            .await;

        match result {
            Err(ScrapeError::Engine(e)) if e.is_timeout() => {
                Err(ScrapeError::NavigationExhausted {
                    url: url.to_string(),
                    attempts,
                })
            }
            other => other,
        }
    }

    /// 滚动结果列表直到到底、数量稳定或达到上限
    async fn scroll_feed(&self, page: &Arc<dyn PageHandle>) -> Result<(), ScrapeError> {
        let settle = Duration::from_millis(self.settings.scroll_settle_ms);
        let mut last_count = 0;
        let mut stable_rounds = 0;

        for round in 0..self.settings.max_scrolls {
            self.control.checkpoint().await?;
            let value = self
                .control
                .guard(page.evaluate(SCROLL_FEED_SCRIPT))
                .await??;
            let count = value.get("count").and_then(Value::as_u64).unwrap_or(0);
            let reached_end = value.get("end").and_then(Value::as_bool).unwrap_or(false);

            if reached_end {
                debug!(round, count, "Reached end of list");
                break;
            }
            if count == last_count {
                stable_rounds += 1;
                if stable_rounds >= self.settings.stable_scroll_rounds {
                    debug!(round, count, "Listing count stable");
                    break;
                }
            } else {
                stable_rounds = 0;
                last_count = count;
            }

            self.control.sleep(settle).await?;
        }
        Ok(())
    }

    async fn release(&self, page: &Arc<dyn PageHandle>) {
        self.pages.lock().retain(|p| !Arc::ptr_eq(p, page));
        if !page.is_closed() {
            if let Err(e) = page.close().await {
                debug!(worker = self.id, "Failed to close page: {}", e);
            }
        }
    }

    fn set_state(&self, state: WorkerState) {
        let mut current = self.state.lock();
        if *current != WorkerState::Stopped {
            *current = state;
        }
    }
}
