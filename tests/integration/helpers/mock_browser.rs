use async_trait::async_trait;
use leadscrape::domain::services::scrape_control::ScrapeControl;
use leadscrape::engines::traits::{BrowserFactory, BrowserHandle, EngineError, PageHandle};
use leadscrape::utils::url_utils::parse_maps_query;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const CAPTCHA_PAGE: &str =
    r#"<html><head><title>Attention Required</title></head><body><div class="g-recaptcha"></div></body></html>"#;

/// 模拟浏览器的共享状态
#[derive(Default)]
pub struct MockState {
    listings: Mutex<HashMap<(String, String), usize>>,
    default_listings: AtomicUsize,
    cards_per_scroll: AtomicUsize,
    combos: Mutex<HashMap<(String, String), usize>>,
    timeout_towns: Mutex<HashSet<String>>,
    navigation_delay_ms: AtomicUsize,
    fail_launch: AtomicBool,
    captcha: AtomicBool,
    lookup_missing: AtomicBool,
    carrier: Mutex<String>,
    stop_on_listing: Mutex<Option<ScrapeControl>>,
    pub launches: AtomicUsize,
    pub closed_browsers: AtomicUsize,
    pub navigations: AtomicUsize,
    pub lookup_navigations: AtomicUsize,
    pub open_pages: AtomicUsize,
    pub max_open_pages: AtomicUsize,
}

impl MockState {
    fn phone_for(&self, town: &str, industry: &str, index: usize) -> String {
        let mut combos = self.combos.lock().unwrap();
        let next = combos.len();
        let combo = *combos
            .entry((town.to_string(), industry.to_string()))
            .or_insert(next);
        let n = combo * 100 + index;
        format!("082 {:03} {:04}", n / 10_000, n % 10_000)
    }

    fn listing_count(&self, town: &str, industry: &str) -> usize {
        self.listings
            .lock()
            .unwrap()
            .get(&(town.to_string(), industry.to_string()))
            .copied()
            .unwrap_or_else(|| self.default_listings.load(Ordering::SeqCst))
    }

    fn page_opened(&self) {
        let open = self.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open_pages.fetch_max(open, Ordering::SeqCst);
    }
}

/// 模拟浏览器工厂
///
/// 地图搜索页根据 URL 中的 `"<industry> in <town>"` 生成卡片，
/// 每次滚动多加载 `cards_per_scroll` 张；查询页返回固定的运营商。
#[derive(Clone)]
pub struct MockBrowserFactory {
    pub state: Arc<MockState>,
}

impl Default for MockBrowserFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrowserFactory {
    pub fn new() -> Self {
        let state = MockState::default();
        state.default_listings.store(3, Ordering::SeqCst);
        state.cards_per_scroll.store(2, Ordering::SeqCst);
        *state.carrier.lock().unwrap() = "Vodacom".to_string();
        Self {
            state: Arc::new(state),
        }
    }

    pub fn with_listings(self, town: &str, industry: &str, count: usize) -> Self {
        self.state
            .listings
            .lock()
            .unwrap()
            .insert((town.to_string(), industry.to_string()), count);
        self
    }

    pub fn with_default_listings(self, count: usize) -> Self {
        self.state.default_listings.store(count, Ordering::SeqCst);
        self
    }

    /// 该城镇的所有导航都会超时
    pub fn with_timeout_town(self, town: &str) -> Self {
        self.state
            .timeout_towns
            .lock()
            .unwrap()
            .insert(town.to_string());
        self
    }

    pub fn with_navigation_delay(self, delay: Duration) -> Self {
        self.state
            .navigation_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
        self
    }

    pub fn with_failing_launch(self) -> Self {
        self.state.fail_launch.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_captcha(self) -> Self {
        self.state.captcha.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_missing_lookup_result(self) -> Self {
        self.state.lookup_missing.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_carrier(self, carrier: &str) -> Self {
        *self.state.carrier.lock().unwrap() = carrier.to_string();
        self
    }

    /// 读取地图结果页的内容后立即发出停止信号
    pub fn stop_after_listing(&self, control: ScrapeControl) {
        *self.state.stop_on_listing.lock().unwrap() = Some(control);
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn closed_browsers(&self) -> usize {
        self.state.closed_browsers.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> usize {
        self.state.navigations.load(Ordering::SeqCst)
    }

    pub fn lookup_navigations(&self) -> usize {
        self.state.lookup_navigations.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.state.open_pages.load(Ordering::SeqCst)
    }

    pub fn max_open_pages(&self) -> usize {
        self.state.max_open_pages.load(Ordering::SeqCst)
    }

    /// 模拟数据中第 `index` 张卡片的号码
    pub fn phone_for(&self, town: &str, industry: &str, index: usize) -> String {
        self.state.phone_for(town, industry, index)
    }
}

#[async_trait]
impl BrowserFactory for MockBrowserFactory {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, EngineError> {
        if self.state.fail_launch.load(Ordering::SeqCst) {
            return Err(EngineError::Launch("chrome not found".to_string()));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBrowser {
            state: self.state.clone(),
            pages: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct MockBrowser {
    state: Arc<MockState>,
    pages: Mutex<Vec<Arc<MockPage>>>,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserHandle for MockBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        let page = Arc::new(MockPage {
            state: self.state.clone(),
            url: Mutex::new(None),
            scrolls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            closing: Notify::new(),
        });
        self.state.page_opened();
        self.pages.lock().unwrap().push(page.clone());
        Ok(page)
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let pages: Vec<Arc<MockPage>> = self.pages.lock().unwrap().drain(..).collect();
        for page in pages {
            page.shut();
        }
        self.state.closed_browsers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockPage {
    state: Arc<MockState>,
    url: Mutex<Option<String>>,
    scrolls: AtomicUsize,
    closed: AtomicBool,
    closing: Notify,
}

impl MockPage {
    fn shut(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.open_pages.fetch_sub(1, Ordering::SeqCst);
            self.closing.notify_waiters();
        }
    }

    fn maps_query(&self) -> Option<(String, String)> {
        self.url.lock().unwrap().as_deref().and_then(parse_maps_query)
    }

    fn visible_cards(&self, total: usize) -> usize {
        let per_scroll = self.state.cards_per_scroll.load(Ordering::SeqCst).max(1);
        let scrolls = self.scrolls.load(Ordering::SeqCst).max(1);
        total.min(per_scroll * scrolls)
    }

    fn listing_html(&self, town: &str, industry: &str) -> String {
        let total = self.state.listing_count(town, industry);
        let cards: String = (0..self.visible_cards(total))
            .map(|i| {
                let phone = self.state.phone_for(town, industry, i);
                format!(
                    r#"<div class="Nv2PK"><a class="hfpxzc" aria-label="{industry} {i} ({town})" href="/maps/place/{slug}-{i}"></a><div class="W4Efsd"><span>{industry}</span> · <span>{i} Main Road</span></div><div class="W4Efsd"><span class="UsdlK">{phone}</span></div></div>"#,
                    slug = town.replace(' ', "+"),
                )
            })
            .collect();
        format!(r#"<html><body><div role="feed">{cards}</div></body></html>"#)
    }
}

#[async_trait]
impl PageHandle for MockPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        self.state.navigations.fetch_add(1, Ordering::SeqCst);

        let maps = parse_maps_query(url);
        match &maps {
            Some((_, town)) => {
                if self.state.timeout_towns.lock().unwrap().contains(town) {
                    return Err(EngineError::Timeout(format!("{:?}", timeout)));
                }
            }
            None => {
                self.state.lookup_navigations.fetch_add(1, Ordering::SeqCst);
            }
        }

        let delay = self.state.navigation_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::select! {
                _ = self.closing.notified() => return Err(EngineError::Closed),
                _ = tokio::time::sleep(Duration::from_millis(delay as u64)) => {}
            }
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }

        *self.url.lock().unwrap() = Some(url.to_string());
        self.scrolls.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        let found = match self.maps_query() {
            Some((industry, town)) => self.state.listing_count(&town, &industry) > 0,
            None => {
                !self.state.captcha.load(Ordering::SeqCst)
                    && !self.state.lookup_missing.load(Ordering::SeqCst)
            }
        };
        if found {
            Ok(())
        } else {
            Err(EngineError::ElementNotFound(selector.to_string()))
        }
    }

    async fn evaluate(&self, _script: &str) -> Result<Value, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        let Some((industry, town)) = self.maps_query() else {
            return Ok(Value::Null);
        };
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        let total = self.state.listing_count(&town, &industry);
        let visible = self.visible_cards(total);
        Ok(json!({ "count": visible, "end": visible >= total }))
    }

    async fn content(&self) -> Result<String, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        match self.maps_query() {
            Some((industry, town)) => {
                let html = self.listing_html(&town, &industry);
                if let Some(control) = self.state.stop_on_listing.lock().unwrap().as_ref() {
                    control.stop();
                }
                Ok(html)
            }
            None if self.state.captcha.load(Ordering::SeqCst) => Ok(CAPTCHA_PAGE.to_string()),
            None if self.state.lookup_missing.load(Ordering::SeqCst) => {
                Ok("<html><body><p>No data</p></body></html>".to_string())
            }
            None => Ok(format!(
                r#"<html><body><div class="carrier">{}</div></body></html>"#,
                self.state.carrier.lock().unwrap()
            )),
        }
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.shut();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
