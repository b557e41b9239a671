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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含数据库、浏览器、抓取节奏、运营商查询、重试队列和会话清理等配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 浏览器启动配置
    pub browser: BrowserSettings,
    /// 地图列表抓取配置
    pub scraper: ScraperSettings,
    /// 运营商查询配置
    pub lookup: LookupSettings,
    /// 重试队列配置
    pub retry_queue: RetryQueueSettings,
    /// 会话注册表配置
    pub sessions: SessionSettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 浏览器启动配置
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    /// 是否无头模式
    pub headless: bool,
    /// 是否关闭沙箱（容器内运行时需要）
    pub no_sandbox: bool,
    /// Chrome 可执行文件路径，未设置时读取 `CHROME_EXECUTABLE_PATH`
    pub executable_path: Option<String>,
    /// 远程 DevTools 地址，设置后连接已有浏览器而不是启动新进程
    pub remote_url: Option<String>,
    /// 额外的启动参数
    #[serde(default)]
    pub args: Vec<String>,
    /// CDP 请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 视口宽度
    pub window_width: u32,
    /// 视口高度
    pub window_height: u32,
}

impl BrowserSettings {
    /// 解析最终使用的可执行文件路径
    pub fn resolved_executable(&self) -> Option<String> {
        self.executable_path
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| std::env::var("CHROME_EXECUTABLE_PATH").ok())
            .filter(|p| !p.is_empty())
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            no_sandbox: true,
            executable_path: None,
            remote_url: None,
            args: Vec::new(),
            request_timeout_ms: 60_000,
            window_width: 1366,
            window_height: 900,
        }
    }
}

/// 地图列表抓取配置
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperSettings {
    /// 地图搜索基础地址
    pub maps_base_url: String,
    /// 导航超时（毫秒）
    pub navigation_timeout_ms: u64,
    /// 等待结果面板超时（毫秒）
    pub element_timeout_ms: u64,
    /// 浏览器启动后首次导航前的等待（毫秒）
    pub browser_settle_ms: u64,
    /// 行业分组之间的间隔（毫秒）
    pub industry_batch_delay_ms: u64,
    /// 导航超时后的额外重试次数
    pub navigation_retries: u32,
    /// 导航重试间隔（毫秒）
    pub navigation_retry_delay_ms: u64,
    /// 每次滚动后的等待（毫秒）
    pub scroll_settle_ms: u64,
    /// 最多滚动次数
    pub max_scrolls: u32,
    /// 连续多少轮没有新卡片视为到底
    pub stable_scroll_rounds: u32,
    /// 默认同时处理的城镇数
    pub default_simultaneous_towns: u32,
    /// 默认同时处理的行业数
    pub default_simultaneous_industries: u32,
    /// 默认同时进行的查询批次数
    pub default_simultaneous_lookups: u32,
}

impl ScraperSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            maps_base_url: "https://www.google.com/maps/search/".to_string(),
            navigation_timeout_ms: 60_000,
            element_timeout_ms: 5_000,
            browser_settle_ms: 2_000,
            industry_batch_delay_ms: 1_000,
            navigation_retries: 2,
            navigation_retry_delay_ms: 3_000,
            scroll_settle_ms: 1_500,
            max_scrolls: 30,
            stable_scroll_rounds: 3,
            default_simultaneous_towns: 2,
            default_simultaneous_industries: 2,
            default_simultaneous_lookups: 1,
        }
    }
}

/// 重试参数
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// 最大尝试次数（包含第一次）
    pub max_attempts: u32,
    /// 初始等待（毫秒）
    pub base_delay_ms: u64,
    /// 最大等待（毫秒）
    pub max_delay_ms: u64,
    /// 抖动因子，0 表示不抖动
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            jitter_factor: 0.0,
        }
    }
}

/// 运营商查询配置
#[derive(Debug, Clone, Deserialize)]
pub struct LookupSettings {
    /// 查询地址模板，`{phone}` 会被替换为规范化后的号码
    pub url_template: String,
    /// 结果元素选择器
    pub result_selector: String,
    /// 国家区号（不含 +）
    pub country_code: String,
    /// 批次大小下限
    pub batch_min: usize,
    /// 批次大小上限
    pub batch_max: usize,
    /// 连续成功多少批后扩大批次
    pub grow_after: u32,
    /// 连续失败多少批后缩小批次
    pub shrink_after: u32,
    /// 单次查询之后的等待（毫秒）
    pub per_lookup_delay_ms: u64,
    /// 批次之间的最小随机等待（毫秒）
    pub inter_batch_delay_min_ms: u64,
    /// 批次之间的最大随机等待（毫秒）
    pub inter_batch_delay_max_ms: u64,
    /// 等待结果元素超时（毫秒）
    pub element_timeout_ms: u64,
    /// 导航超时（毫秒）
    pub navigation_timeout_ms: u64,
    /// 缓存有效期（天）
    pub cache_ttl_days: i64,
    /// 是否在查询时检测人机验证
    pub captcha_detection: bool,
    /// 单号码重试参数
    pub retry: RetrySettings,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            url_template: "https://www.porting.co.za/PublicWebsite/crdb?msisdn={phone}"
                .to_string(),
            result_selector: "#result, .result, .carrier".to_string(),
            country_code: "27".to_string(),
            batch_min: 3,
            batch_max: 5,
            grow_after: 3,
            shrink_after: 2,
            per_lookup_delay_ms: 500,
            inter_batch_delay_min_ms: 2_000,
            inter_batch_delay_max_ms: 5_000,
            element_timeout_ms: 5_000,
            navigation_timeout_ms: 60_000,
            cache_ttl_days: 30,
            captcha_detection: false,
            retry: RetrySettings::default(),
        }
    }
}

/// 重试队列配置
#[derive(Debug, Clone, Deserialize)]
pub struct RetryQueueSettings {
    /// 扫描间隔（秒）
    pub sweep_interval_secs: u64,
    /// 每次扫描最多处理的条目
    pub batch_limit: u64,
    /// 入队时的最大尝试次数
    pub max_attempts: i32,
}

impl Default for RetryQueueSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            batch_limit: 20,
            max_attempts: 3,
        }
    }
}

/// 会话注册表配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// 终态会话保留时间（秒）
    pub completed_ttl_secs: i64,
    /// 非终态会话在最后一次更新后的保留时间（秒）
    pub stale_ttl_secs: i64,
    /// 清理间隔（秒）
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            completed_ttl_secs: 5 * 60,
            stale_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

/// 指标导出配置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用 Prometheus 导出
    pub enabled: bool,
    /// 监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次读取内置默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和 `LEADSCRAPE__*` 环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("LEADSCRAPE").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// 只使用内置默认值（测试和嵌入场景）
    pub fn from_defaults() -> Result<Self, ConfigError> {
        Self::defaults(Config::builder())?.build()?.try_deserialize()
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let browser = BrowserSettings::default();
        let scraper = ScraperSettings::default();
        let lookup = LookupSettings::default();
        let retry_queue = RetryQueueSettings::default();
        let sessions = SessionSettings::default();

        builder
            // Database
            .set_default("database.url", "sqlite://leadscrape.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Browser
            .set_default("browser.headless", browser.headless)?
            .set_default("browser.no_sandbox", browser.no_sandbox)?
            .set_default("browser.args", Vec::<String>::new())?
            .set_default("browser.request_timeout_ms", browser.request_timeout_ms)?
            .set_default("browser.window_width", browser.window_width)?
            .set_default("browser.window_height", browser.window_height)?
            // Scraper
            .set_default("scraper.maps_base_url", scraper.maps_base_url)?
            .set_default("scraper.navigation_timeout_ms", scraper.navigation_timeout_ms)?
            .set_default("scraper.element_timeout_ms", scraper.element_timeout_ms)?
            .set_default("scraper.browser_settle_ms", scraper.browser_settle_ms)?
            .set_default("scraper.industry_batch_delay_ms", scraper.industry_batch_delay_ms)?
            .set_default("scraper.navigation_retries", scraper.navigation_retries)?
            .set_default(
                "scraper.navigation_retry_delay_ms",
                scraper.navigation_retry_delay_ms,
            )?
            .set_default("scraper.scroll_settle_ms", scraper.scroll_settle_ms)?
            .set_default("scraper.max_scrolls", scraper.max_scrolls)?
            .set_default("scraper.stable_scroll_rounds", scraper.stable_scroll_rounds)?
            .set_default(
                "scraper.default_simultaneous_towns",
                scraper.default_simultaneous_towns,
            )?
            .set_default(
                "scraper.default_simultaneous_industries",
                scraper.default_simultaneous_industries,
            )?
            .set_default(
                "scraper.default_simultaneous_lookups",
                scraper.default_simultaneous_lookups,
            )?
            // Lookup
            .set_default("lookup.url_template", lookup.url_template)?
            .set_default("lookup.result_selector", lookup.result_selector)?
            .set_default("lookup.country_code", lookup.country_code)?
            .set_default("lookup.batch_min", lookup.batch_min as u64)?
            .set_default("lookup.batch_max", lookup.batch_max as u64)?
            .set_default("lookup.grow_after", lookup.grow_after)?
            .set_default("lookup.shrink_after", lookup.shrink_after)?
            .set_default("lookup.per_lookup_delay_ms", lookup.per_lookup_delay_ms)?
            .set_default(
                "lookup.inter_batch_delay_min_ms",
                lookup.inter_batch_delay_min_ms,
            )?
            .set_default(
                "lookup.inter_batch_delay_max_ms",
                lookup.inter_batch_delay_max_ms,
            )?
            .set_default("lookup.element_timeout_ms", lookup.element_timeout_ms)?
            .set_default("lookup.navigation_timeout_ms", lookup.navigation_timeout_ms)?
            .set_default("lookup.cache_ttl_days", lookup.cache_ttl_days)?
            .set_default("lookup.captcha_detection", lookup.captcha_detection)?
            .set_default("lookup.retry.max_attempts", lookup.retry.max_attempts)?
            .set_default("lookup.retry.base_delay_ms", lookup.retry.base_delay_ms)?
            .set_default("lookup.retry.max_delay_ms", lookup.retry.max_delay_ms)?
            .set_default("lookup.retry.jitter_factor", lookup.retry.jitter_factor)?
            // Retry queue
            .set_default(
                "retry_queue.sweep_interval_secs",
                retry_queue.sweep_interval_secs,
            )?
            .set_default("retry_queue.batch_limit", retry_queue.batch_limit)?
            .set_default("retry_queue.max_attempts", retry_queue.max_attempts)?
            // Sessions
            .set_default("sessions.completed_ttl_secs", sessions.completed_ttl_secs)?
            .set_default("sessions.stale_ttl_secs", sessions.stale_ttl_secs)?
            .set_default("sessions.sweep_interval_secs", sessions.sweep_interval_secs)?
            // Metrics
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")
    }
}
