// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::business::ScrapedBusiness;
use super::provider::LookupStats;

/// 抓取会话实体
///
/// 一次"城镇 × 行业"抓取任务。会话记录输入参数、并发配置、
/// 当前状态、进度百分比、可用于恢复的检查点以及最终汇总。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSession {
    /// 会话唯一标识符
    pub id: Uuid,
    /// 待抓取的城镇
    pub towns: Vec<String>,
    /// 待抓取的行业
    pub industries: Vec<String>,
    /// 并发配置
    pub concurrency: ConcurrencySettings,
    /// 会话状态
    pub status: SessionStatus,
    /// 进度百分比 (0-100)
    pub progress: u8,
    /// 恢复用检查点
    pub state: Option<SessionState>,
    /// 结束后的汇总
    pub summary: Option<SessionSummary>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 最后更新时间
    pub updated_at: DateTime<FixedOffset>,
    /// 进入终态的时间
    pub completed_at: Option<DateTime<FixedOffset>>,
}

/// 会话状态枚举
///
/// 状态转换规则：
/// Running ⇄ Paused，Running/Paused → Stopped/Error，Running → Completed。
/// Stopped/Completed/Error 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// 运行中
    #[default]
    Running,
    /// 已暂停
    Paused,
    /// 被强制停止
    Stopped,
    /// 全部城镇处理完成
    Completed,
    /// 没有任何浏览器能够启动
    Error,
}

impl SessionStatus {
    /// 所有终态
    pub const TERMINAL: [SessionStatus; 3] = [
        SessionStatus::Stopped,
        SessionStatus::Completed,
        SessionStatus::Error,
    ];

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// 是否允许从当前状态转换到 `next`
    pub fn can_transition(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        if *self == next {
            return true;
        }
        match (self, next) {
            (Running, Paused | Stopped | Completed | Error) => true,
            (Paused, Running | Stopped | Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Stopped => write!(f, "stopped"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "paused" => Ok(SessionStatus::Paused),
            "stopped" => Ok(SessionStatus::Stopped),
            "completed" => Ok(SessionStatus::Completed),
            "error" => Ok(SessionStatus::Error),
            other => Err(DomainError::ValidationError(format!(
                "unknown session status: {}",
                other
            ))),
        }
    }
}

/// 并发配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencySettings {
    /// 同时处理的城镇数（即浏览器 worker 数）
    pub simultaneous_towns: u32,
    /// 每个城镇同时打开的行业页面数
    pub simultaneous_industries: u32,
    /// 同时进行的查询批次数
    pub simultaneous_lookups: u32,
}

impl ConcurrencySettings {
    pub fn new(towns: u32, industries: u32, lookups: u32) -> Self {
        Self {
            simultaneous_towns: towns,
            simultaneous_industries: industries,
            simultaneous_lookups: lookups,
        }
    }

    /// 每项至少为 1
    pub fn normalized(self) -> Self {
        Self {
            simultaneous_towns: self.simultaneous_towns.max(1),
            simultaneous_industries: self.simultaneous_industries.max(1),
            simultaneous_lookups: self.simultaneous_lookups.max(1),
        }
    }
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self::new(2, 2, 1)
    }
}

/// 恢复用检查点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// 下一个待领取的城镇下标
    pub current_town_index: usize,
    /// 已处理的城镇数
    pub completed_towns: usize,
    /// 已处理城镇的下标
    pub completed_town_indices: Vec<usize>,
    /// 失败的城镇数
    pub error_count: u32,
    /// 已收集的结果
    pub results: Vec<ScrapedBusiness>,
    /// 之前各次运行累计的耗时（毫秒）
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl SessionState {
    /// 某个城镇是否已处理
    pub fn is_town_done(&self, index: usize) -> bool {
        self.completed_town_indices.contains(&index)
    }
}

/// 会话汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// 结果总数
    pub total_businesses: usize,
    /// 已处理的城镇数
    pub towns_completed: usize,
    /// 城镇总数
    pub total_towns: usize,
    /// 失败的城镇数
    pub error_count: u32,
    /// 耗时（毫秒）
    pub elapsed_ms: u64,
    /// 运营商查询统计
    pub lookups: LookupStats,
}

/// 进度快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub completed_towns: usize,
    pub total_towns: usize,
    pub percentage: u8,
}

impl Progress {
    pub fn new(completed_towns: usize, total_towns: usize) -> Self {
        let percentage = if total_towns == 0 {
            100
        } else {
            ((completed_towns.min(total_towns) * 100) / total_towns) as u8
        };
        Self {
            completed_towns,
            total_towns,
            percentage,
        }
    }
}

/// 领域错误类型
///
/// 表示在领域层可能发生的各种错误情况，包括状态转换错误和验证失败。
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换，当会话状态转换不符合业务规则时发生
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ScrapeSession {
    /// 创建一个新的会话，状态为 Running
    ///
    /// # 参数
    ///
    /// * `towns` - 城镇列表
    /// * `industries` - 行业列表
    /// * `concurrency` - 并发配置
    pub fn new(
        towns: Vec<String>,
        industries: Vec<String>,
        concurrency: ConcurrencySettings,
    ) -> Self {
        let now: DateTime<FixedOffset> = Utc::now().into();
        Self {
            id: Uuid::new_v4(),
            towns,
            industries,
            concurrency: concurrency.normalized(),
            status: SessionStatus::Running,
            progress: 0,
            state: None,
            summary: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// 状态转换
    ///
    /// 转换到当前状态是空操作
    ///
    /// # 返回值
    ///
    /// * `Ok(bool)` - 状态是否真的发生了变化
    /// * `Err(DomainError)` - 状态转换不合法
    pub fn transition(&mut self, next: SessionStatus) -> Result<bool, DomainError> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        let now: DateTime<FixedOffset> = Utc::now().into();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(true)
    }

    /// 更新进度，进度不会倒退
    pub fn set_progress(&mut self, percentage: u8) {
        self.progress = self.progress.max(percentage.min(100));
        self.updated_at = Utc::now().into();
    }

    /// 刷新更新时间
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().into();
    }
}
