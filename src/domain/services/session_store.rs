// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::settings::SessionSettings;
use crate::domain::models::business::ScrapedBusiness;
use crate::domain::models::session::{
    Progress, ScrapeSession, SessionState, SessionStatus,
};
use crate::infrastructure::metrics::SESSIONS_ACTIVE;
use crate::utils::errors::ScrapeError;

/// 运行中会话的控制接口
#[async_trait]
pub trait SessionControl: Send + Sync {
    /// 暂停并返回检查点
    async fn pause(&self) -> Result<SessionState, ScrapeError>;

    /// 从暂停中恢复
    async fn resume(&self) -> Result<(), ScrapeError>;

    /// 强制停止
    async fn stop(&self) -> Result<(), ScrapeError>;

    fn progress(&self) -> Progress;

    fn results(&self) -> Vec<ScrapedBusiness>;

    fn checkpoint(&self) -> SessionState;
}

#[derive(Clone)]
struct SessionEntry {
    session: ScrapeSession,
    control: Option<Arc<dyn SessionControl>>,
}

/// 进程内会话表
///
/// 终态会话在 `completed_ttl` 后被清理，其他会话在 `stale_ttl` 内无更新也会被清理。
pub struct SessionStore {
    sessions: DashMap<Uuid, SessionEntry>,
    completed_ttl: Duration,
    stale_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(&SessionSettings::default())
    }
}

impl SessionStore {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            completed_ttl: Duration::seconds(settings.completed_ttl_secs),
            stale_ttl: Duration::seconds(settings.stale_ttl_secs),
        }
    }

    /// 注册会话（同 ID 会被覆盖）
    pub fn insert(&self, session: ScrapeSession) {
        self.sessions.insert(
            session.id,
            SessionEntry {
                session,
                control: None,
            },
        );
        self.report_active();
    }

    pub fn get(&self, id: Uuid) -> Option<ScrapeSession> {
        self.sessions.get(&id).map(|entry| entry.session.clone())
    }

    /// 运行中会话的控制句柄
    pub fn control(&self, id: Uuid) -> Option<Arc<dyn SessionControl>> {
        self.sessions.get(&id).and_then(|entry| entry.control.clone())
    }

    /// 绑定控制句柄，会话不存在时返回 false
    pub fn attach(&self, id: Uuid, control: Arc<dyn SessionControl>) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut entry) => {
                entry.control = Some(control);
                true
            }
            None => false,
        }
    }

    /// 修改会话
    ///
    /// # 返回值
    ///
    /// 修改后的会话副本，会话不存在时为 `None`
    pub fn update<F>(&self, id: Uuid, f: F) -> Option<ScrapeSession>
    where
        F: FnOnce(&mut ScrapeSession),
    {
        let updated = self.sessions.get_mut(&id).map(|mut entry| {
            f(&mut entry.session);
            entry.session.touch();
            if entry.session.status.is_terminal() {
                entry.control = None;
            }
            entry.session.clone()
        });
        self.report_active();
        updated
    }

    /// 设置状态，非法转换会被忽略
    pub fn set_status(&self, id: Uuid, status: SessionStatus) -> Option<ScrapeSession> {
        self.update(id, |session| {
            if let Err(e) = session.transition(status) {
                debug!(session_id = %session.id, "Ignoring status update: {}", e);
            }
        })
    }

    pub fn remove(&self, id: Uuid) -> Option<ScrapeSession> {
        let removed = self.sessions.remove(&id).map(|(_, entry)| entry.session);
        self.report_active();
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 清理过期会话
    ///
    /// # 返回值
    ///
    /// 被清理的会话 ID
    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let now: DateTime<FixedOffset> = now.into();
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| {
                let session = &entry.session;
                if session.status.is_terminal() {
                    let finished = session.completed_at.unwrap_or(session.updated_at);
                    now - finished > self.completed_ttl
                } else {
                    now - session.updated_at > self.stale_ttl
                }
            })
            .map(|entry| *entry.key())
            .collect();

        for id in &expired {
            self.sessions.remove(id);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Evicted expired sessions");
            self.report_active();
        }
        expired
    }

    pub fn evict_expired(&self) -> Vec<Uuid> {
        self.evict_expired_at(Utc::now())
    }

    fn report_active(&self) {
        let active = self
            .sessions
            .iter()
            .filter(|entry| !entry.session.status.is_terminal())
            .count();
        metrics::gauge!(SESSIONS_ACTIVE).set(active as f64);
    }
}
