// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::services::scrape_control::Stopped;
use crate::engines::traits::EngineError;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// 记录未找到
    #[error("Record not found")]
    NotFound,

    /// JSON 列序列化失败
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 列中的数据无法映射为领域类型
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// 抓取编排错误类型
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// 浏览器引擎错误
    #[error("Browser error: {0}")]
    Engine(#[from] EngineError),

    /// 导航重试耗尽
    #[error("Navigation timed out after {attempts} attempts: {url}")]
    NavigationExhausted { url: String, attempts: u32 },

    /// 浏览器无法启动
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    /// 会话已被强制停止
    #[error("Scrape stopped")]
    Stopped,

    /// 城镇已全部处理，正在收尾
    #[error("Scrape is finishing")]
    Finished,

    /// 持久化失败
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// 非法的状态转换
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::models::session::DomainError),
}

impl From<Stopped> for ScrapeError {
    fn from(_: Stopped) -> Self {
        ScrapeError::Stopped
    }
}

/// 运营商查询错误类型
#[derive(Error, Debug)]
pub enum LookupError {
    /// 浏览器引擎错误
    #[error("Browser error: {0}")]
    Engine(#[from] EngineError),

    /// 页面出现人机验证
    #[error("captcha_detected")]
    CaptchaDetected,

    /// 结果元素中没有运营商信息
    #[error("Provider not found on lookup page")]
    ProviderNotFound,

    /// 号码无效，无法查询
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    /// 查询被停止
    #[error("Lookup stopped")]
    Stopped,
}

impl From<Stopped> for LookupError {
    fn from(_: Stopped) -> Self {
        LookupError::Stopped
    }
}

impl LookupError {
    /// 是否值得在同一页面内重试
    pub fn is_retryable(&self) -> bool {
        match self {
            LookupError::Engine(e) => !matches!(e, EngineError::Closed),
            LookupError::ProviderNotFound => true,
            LookupError::CaptchaDetected | LookupError::InvalidPhone(_) | LookupError::Stopped => {
                false
            }
        }
    }
}

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("仓库错误: {0}")]
    RepositoryError(String),

    #[error("未找到处理器: {0}")]
    HandlerNotFound(String),
}

impl From<RepositoryError> for WorkerError {
    fn from(e: RepositoryError) -> Self {
        WorkerError::RepositoryError(e.to_string())
    }
}

/// 用例层错误类型
#[derive(Error, Debug)]
pub enum ServiceError {
    /// 请求参数校验失败
    #[error("Validation error: {0}")]
    Validation(String),

    /// 会话不存在
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// 会话状态不允许该操作
    #[error("Session {id} is {status}, cannot {action}")]
    InvalidState {
        id: Uuid,
        status: String,
        action: &'static str,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(e: validator::ValidationErrors) -> Self {
        ServiceError::Validation(e.to_string())
    }
}
