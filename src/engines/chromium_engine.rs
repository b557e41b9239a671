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

use crate::config::settings::BrowserSettings;
use crate::engines::traits::{BrowserFactory, BrowserHandle, EngineError, PageHandle};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 基于 chromiumoxide 的浏览器工厂
///
/// 配置了 `remote_url` 时连接已有的 DevTools 端点，否则启动本地 Chrome
pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn build_config(&self) -> Result<BrowserConfig, EngineError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_millis(self.settings.request_timeout_ms))
            .window_size(self.settings.window_width, self.settings.window_height);

        if !self.settings.headless {
            builder = builder.with_head();
        }
        if self.settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = self.settings.resolved_executable() {
            builder = builder.chrome_executable(path);
        }

        // Production environment setup
        builder = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        for arg in &self.settings.args {
            builder = builder.arg(arg.as_str());
        }

        builder.build().map_err(EngineError::Launch)
    }
}

#[async_trait]
impl BrowserFactory for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, EngineError> {
        let remote = self.settings.remote_url.clone().filter(|u| !u.is_empty());

        let (browser, mut handler) = if let Some(ref url) = remote {
            tracing::info!("Connecting to remote Chrome instance at: {}", url);
            Browser::connect(url)
                .await
                .map_err(|e| EngineError::Launch(format!("Failed to connect to remote Chrome: {}", e)))?
        } else {
            Browser::launch(self.build_config()?)
                .await
                .map_err(|e| EngineError::Launch(e.to_string()))?
        };

        // Spawn a handler to process browser events
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Arc::new(ChromiumBrowser {
            browser: Mutex::new(Some(browser)),
            handler: parking_lot::Mutex::new(Some(handler_task)),
            remote: remote.is_some(),
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// 一个 chromiumoxide 浏览器实例
pub struct ChromiumBrowser {
    browser: Mutex<Option<Browser>>,
    handler: parking_lot::Mutex<Option<JoinHandle<()>>>,
    remote: bool,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(EngineError::Closed)?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::Other(e.to_string()))?;

        Ok(Arc::new(ChromiumPage {
            page,
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let browser = self.browser.lock().await.take();
        let result = match browser {
            // 远程浏览器不属于我们，只断开连接
            Some(_) if self.remote => Ok(()),
            Some(mut browser) => {
                let closed = browser
                    .close()
                    .await
                    .map(|_| ())
                    .map_err(|e| EngineError::Other(e.to_string()));
                let _ = browser.wait().await;
                closed
            }
            None => Ok(()),
        };

        if let Some(handle) = self.handler.lock().take() {
            handle.abort();
        }

        result
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// 一个 chromiumoxide 页面
pub struct ChromiumPage {
    page: Page,
    closed: AtomicBool,
}

impl ChromiumPage {
    async fn dom_ready(&self) -> bool {
        let probe = "document.readyState !== 'loading' && location.href !== 'about:blank'";
        match self.page.evaluate(probe).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            // Execution context is replaced while the new document commits
            Err(_) => false,
        }
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }

        let navigate = async {
            let response = self
                .page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| {
                    if self.is_closed() {
                        EngineError::Closed
                    } else {
                        EngineError::Navigation(e.to_string())
                    }
                })?;
            if let Some(error_text) = response.result.error_text.as_ref() {
                return Err(EngineError::Navigation(error_text.clone()));
            }

            while !self.dom_ready().await {
                if self.is_closed() {
                    return Err(EngineError::Closed);
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Ok(())
        };

        tokio::time::timeout(timeout, navigate)
            .await
            .map_err(|_| EngineError::Timeout(format!("navigation to {} exceeded {:?}", url, timeout)))?
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let wait = async {
            loop {
                if self.is_closed() {
                    return Err(EngineError::Closed);
                }
                if self.page.find_element(selector).await.is_ok() {
                    return Ok(());
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| EngineError::ElementNotFound(selector.to_string()))?
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| EngineError::Script(e.to_string()))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        self.page
            .content()
            .await
            .map_err(|e| EngineError::Other(e.to_string()))
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| EngineError::Other(e.to_string()))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
