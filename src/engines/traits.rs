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

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 浏览器启动或连接失败
    #[error("Launch failed: {0}")]
    Launch(String),
    /// 导航失败（非超时）
    #[error("Navigation failed: {0}")]
    Navigation(String),
    /// 超时
    #[error("Timeout: {0}")]
    Timeout(String),
    /// 等待的元素没有出现
    #[error("Element not found: {0}")]
    ElementNotFound(String),
    /// 页面脚本执行失败
    #[error("Script error: {0}")]
    Script(String),
    /// 页面或浏览器已关闭
    #[error("Target closed")]
    Closed,
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl EngineError {
    /// 判断是否为超时错误
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout(_))
    }

    /// 判断错误是否可重试
    ///
    /// # 返回值
    ///
    /// 只有超时可以重试，其余错误直接放弃
    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }
}

/// 浏览器工厂特质
///
/// 每次调用 `launch` 得到一个独立的浏览器实例
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    /// 启动（或连接）一个浏览器
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, EngineError>;

    /// 工厂名称
    fn name(&self) -> &'static str;
}

/// 浏览器实例
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// 打开一个空白页面
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, EngineError>;

    /// 关闭浏览器；重复调用是安全的
    async fn close(&self) -> Result<(), EngineError>;

    /// 是否已关闭
    fn is_closed(&self) -> bool;
}

/// 浏览器页面
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// 导航到 `url`，只等待 DOM 解析完成（DOMContentLoaded）
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), EngineError>;

    /// 等待选择器匹配到元素
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
        -> Result<(), EngineError>;

    /// 执行脚本并返回 JSON 结果
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, EngineError>;

    /// 当前页面的 HTML
    async fn content(&self) -> Result<String, EngineError>;

    /// 关闭页面；重复调用是安全的
    async fn close(&self) -> Result<(), EngineError>;

    /// 是否已关闭
    fn is_closed(&self) -> bool;
}
