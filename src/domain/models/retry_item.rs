// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 重试队列条目
///
/// 进程内重试耗尽后的操作被持久化到这里，由重试队列 worker 定期重放。
/// 成功后删除；`attempt_count` 达到 `max_attempts` 后标记为 failed 并保留。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryQueueItem {
    pub id: Uuid,
    pub item_type: RetryItemType,
    pub payload: serde_json::Value,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub status: RetryItemStatus,
    pub next_retry_at: DateTime<FixedOffset>,
    pub session_id: Option<Uuid>,
    pub last_error: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryItemType {
    /// 运营商查询
    ProviderLookup,
}

impl fmt::Display for RetryItemType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RetryItemType::ProviderLookup => write!(f, "provider_lookup"),
        }
    }
}

impl FromStr for RetryItemType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider_lookup" => Ok(RetryItemType::ProviderLookup),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryItemStatus {
    Pending,
    Failed,
}

impl fmt::Display for RetryItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RetryItemStatus::Pending => write!(f, "pending"),
            RetryItemStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RetryItemStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RetryItemStatus::Pending),
            "failed" => Ok(RetryItemStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 运营商查询条目的负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderLookupPayload {
    /// 规范化后的号码
    pub phone: String,
    /// 对应的原始号码写法
    pub raw_phones: Vec<String>,
}

impl RetryQueueItem {
    /// 创建一个运营商查询条目
    ///
    /// # 参数
    ///
    /// * `payload` - 号码负载
    /// * `session_id` - 来源会话
    /// * `max_attempts` - 最大重放次数
    /// * `next_retry_at` - 首次重放时间
    pub fn provider_lookup(
        payload: &ProviderLookupPayload,
        session_id: Option<Uuid>,
        max_attempts: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let now: DateTime<FixedOffset> = Utc::now().into();
        Ok(Self {
            id: Uuid::new_v4(),
            item_type: RetryItemType::ProviderLookup,
            payload: serde_json::to_value(payload)?,
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            status: RetryItemStatus::Pending,
            next_retry_at: next_retry_at.into(),
            session_id,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// 是否已耗尽重放次数
    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// 记录一次失败
    ///
    /// 次数耗尽时状态变为 Failed，否则按 `next_retry_at` 重新排期
    pub fn record_failure(&mut self, error: impl Into<String>, next_retry_at: DateTime<Utc>) {
        self.attempt_count = (self.attempt_count + 1).min(self.max_attempts);
        self.last_error = Some(error.into());
        self.updated_at = Utc::now().into();
        if self.is_exhausted() {
            self.status = RetryItemStatus::Failed;
        } else {
            self.next_retry_at = next_retry_at.into();
        }
    }
}
