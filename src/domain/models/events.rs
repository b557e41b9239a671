// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

use super::business::ScrapedBusiness;
use super::session::{Progress, SessionSummary};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// 编排器向调用方推送的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScrapeEvent {
    /// 每个城镇处理完成时推送
    Progress(Progress),
    /// 运行日志
    Log { level: LogLevel, message: String },
    /// 单个城镇失败（不影响整体）
    Error {
        town: Option<String>,
        message: String,
    },
    /// 正常结束
    Complete {
        summary: SessionSummary,
        businesses: Vec<ScrapedBusiness>,
    },
    /// 被强制停止
    Stopped { summary: SessionSummary },
}

impl ScrapeEvent {
    pub fn info(message: impl Into<String>) -> Self {
        ScrapeEvent::Log {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        ScrapeEvent::Log {
            level: LogLevel::Warn,
            message: message.into(),
        }
    }

    /// 是否为结束事件
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScrapeEvent::Complete { .. } | ScrapeEvent::Stopped { .. })
    }
}
