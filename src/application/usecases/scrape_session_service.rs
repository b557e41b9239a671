// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::application::dto::start_scrape_request::StartScrapeRequestDto;
use crate::config::settings::ScraperSettings;
use crate::domain::models::business::ScrapedBusiness;
use crate::domain::models::events::ScrapeEvent;
use crate::domain::models::session::{
    Progress, ScrapeSession, SessionState, SessionStatus, SessionSummary,
};
use crate::domain::repositories::business_repository::BusinessRepository;
use crate::domain::repositories::session_repository::SessionRepository;
use crate::domain::services::provider_lookup_service::ProviderLookupService;
use crate::domain::services::session_store::{SessionControl, SessionStore};
use crate::engines::traits::BrowserFactory;
use crate::utils::errors::{RepositoryError, ScrapeError, ServiceError};
use crate::workers::orchestrator::ScrapingOrchestrator;

/// 后台运行的句柄，任务结束时自行移除
struct RunHandle {
    generation: u64,
    handle: JoinHandle<Result<SessionSummary, ScrapeError>>,
}

/// 抓取会话服务
///
/// 创建、控制和查询抓取会话。运行中的会话由编排器控制，
/// 已结束或仅存在于数据库中的会话从持久化数据中读取。
pub struct ScrapeSessionService {
    settings: ScraperSettings,
    factory: Arc<dyn BrowserFactory>,
    store: Arc<SessionStore>,
    lookup: Option<Arc<ProviderLookupService>>,
    sessions: Option<Arc<dyn SessionRepository>>,
    businesses: Option<Arc<dyn BusinessRepository>>,
    runs: Arc<DashMap<Uuid, RunHandle>>,
    generations: AtomicU64,
}

impl ScrapeSessionService {
    pub fn new(
        settings: ScraperSettings,
        factory: Arc<dyn BrowserFactory>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            settings,
            factory,
            store,
            lookup: None,
            sessions: None,
            businesses: None,
            runs: Arc::new(DashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    pub fn with_lookup_service(mut self, lookup: Arc<ProviderLookupService>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_persistence(
        mut self,
        sessions: Arc<dyn SessionRepository>,
        businesses: Arc<dyn BusinessRepository>,
    ) -> Self {
        self.sessions = Some(sessions);
        self.businesses = Some(businesses);
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// 开始一个新的抓取会话
    ///
    /// # 参数
    ///
    /// * `request` - 城镇、行业和并发配置
    ///
    /// # 返回值
    ///
    /// 会话 ID 和事件接收端
    #[instrument(skip_all, fields(towns = request.towns.len(), industries = request.industries.len()))]
    pub async fn start(
        &self,
        request: StartScrapeRequestDto,
    ) -> Result<(Uuid, UnboundedReceiver<ScrapeEvent>), ServiceError> {
        request.validate()?;

        let session = ScrapeSession::new(
            request.clean_towns(),
            request.clean_industries(),
            request.concurrency(&self.settings),
        );
        if let Some(sessions) = &self.sessions {
            sessions.create(&session).await?;
        }

        let id = session.id;
        self.store.insert(session.clone());
        let events = self.launch(&session);
        info!(session_id = %id, "Scrape session started");
        Ok((id, events))
    }

    /// 暂停运行中的会话
    pub async fn pause(&self, id: Uuid) -> Result<SessionState, ServiceError> {
        let control = self.live_control(id, "pause").await?;
        control.pause().await.map_err(|e| self.control_error(id, "pause", e))
    }

    /// 恢复暂停的会话
    ///
    /// 会话仍在内存中时直接继续，原事件通道继续有效，返回 `None`；
    /// 否则从持久化的检查点重建编排器，返回新的事件接收端。
    pub async fn resume(
        &self,
        id: Uuid,
    ) -> Result<Option<UnboundedReceiver<ScrapeEvent>>, ServiceError> {
        if let Some(control) = self.store.control(id) {
            control
                .resume()
                .await
                .map_err(|e| self.control_error(id, "resume", e))?;
            return Ok(None);
        }

        let mut session = self.session(id).await?;
        if session.status != SessionStatus::Paused {
            return Err(invalid_state(&session, "resume"));
        }
        session.transition(SessionStatus::Running).map_err(ScrapeError::from)?;
        if let Some(sessions) = &self.sessions {
            sessions
                .update_status(id, SessionStatus::Running, session.progress)
                .await?;
        }

        self.store.insert(session.clone());
        let events = self.launch(&session);
        info!(session_id = %id, "Scrape session resumed from checkpoint");
        Ok(Some(events))
    }

    /// 停止会话
    pub async fn stop(&self, id: Uuid) -> Result<(), ServiceError> {
        if let Some(control) = self.store.control(id) {
            return control
                .stop()
                .await
                .map_err(|e| self.control_error(id, "stop", e));
        }

        // 只存在于数据库中的暂停会话
        let mut session = self.session(id).await?;
        if session.status != SessionStatus::Paused {
            return Err(invalid_state(&session, "stop"));
        }
        session.transition(SessionStatus::Stopped).map_err(ScrapeError::from)?;
        if let Some(sessions) = &self.sessions {
            sessions
                .update_status(id, SessionStatus::Stopped, session.progress)
                .await?;
        }
        self.store.update(id, |s| {
            let _ = s.transition(SessionStatus::Stopped);
        });
        Ok(())
    }

    pub async fn progress(&self, id: Uuid) -> Result<Progress, ServiceError> {
        if let Some(control) = self.store.control(id) {
            return Ok(control.progress());
        }
        let session = self.session(id).await?;
        let completed = match (&session.summary, &session.state) {
            (Some(summary), _) => summary.towns_completed,
            (None, Some(state)) => state.completed_towns,
            (None, None) => 0,
        };
        Ok(Progress::new(completed, session.towns.len()))
    }

    /// 会话的商家结果
    pub async fn results(&self, id: Uuid) -> Result<Vec<ScrapedBusiness>, ServiceError> {
        if let Some(control) = self.store.control(id) {
            return Ok(control.results());
        }
        let session = self.session(id).await?;

        if let Some(businesses) = &self.businesses {
            let stored = businesses.find_by_session(id).await?;
            if !stored.is_empty() {
                return Ok(stored);
            }
        }
        Ok(session.state.map(|state| state.results).unwrap_or_default())
    }

    /// 查询会话，内存中没有时读取数据库
    pub async fn session(&self, id: Uuid) -> Result<ScrapeSession, ServiceError> {
        if let Some(session) = self.store.get(id) {
            return Ok(session);
        }
        if let Some(sessions) = &self.sessions {
            if let Some(session) = sessions.find_by_id(id).await? {
                return Ok(session);
            }
        }
        Err(ServiceError::SessionNotFound(id))
    }

    /// 删除会话及其商家，运行中的会话会先被停止
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if let Some(control) = self.store.control(id) {
            if let Err(e) = control.stop().await {
                warn!(session_id = %id, "Failed to stop session before delete: {}", e);
            }
        }
        let removed = self.store.remove(id).is_some();

        if let Some(sessions) = &self.sessions {
            match sessions.delete(id).await {
                Ok(()) => {}
                Err(RepositoryError::NotFound) if removed => {}
                Err(RepositoryError::NotFound) => return Err(ServiceError::SessionNotFound(id)),
                Err(e) => return Err(e.into()),
            }
        } else if !removed {
            return Err(ServiceError::SessionNotFound(id));
        }
        info!(session_id = %id, "Scrape session deleted");
        Ok(())
    }

    /// 等待会话的后台运行结束
    ///
    /// 运行已经结束时从会话的终态和汇总得出结果
    pub async fn wait(&self, id: Uuid) -> Option<Result<SessionSummary, ScrapeError>> {
        let Some((_, run)) = self.runs.remove(&id) else {
            return self.finished_outcome(id).await;
        };
        match run.handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(session_id = %id, "Scrape task panicked or was cancelled: {}", e);
                None
            }
        }
    }

    /// 仍在后台运行的会话数
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    async fn finished_outcome(&self, id: Uuid) -> Option<Result<SessionSummary, ScrapeError>> {
        let session = self.session(id).await.ok()?;
        match session.status {
            SessionStatus::Completed | SessionStatus::Stopped => session.summary.map(Ok),
            SessionStatus::Error => Some(Err(ScrapeError::LaunchFailed(
                "Session ended with an error".to_string(),
            ))),
            SessionStatus::Running | SessionStatus::Paused => None,
        }
    }

    fn launch(&self, session: &ScrapeSession) -> UnboundedReceiver<ScrapeEvent> {
        let (orchestrator, events) =
            ScrapingOrchestrator::new(session, self.settings.clone(), self.factory.clone());
        let mut orchestrator = orchestrator.with_session_store(self.store.clone());
        if let Some(lookup) = &self.lookup {
            orchestrator = orchestrator.with_lookup_service(lookup.clone());
        }
        if let (Some(sessions), Some(businesses)) = (&self.sessions, &self.businesses) {
            orchestrator = orchestrator.with_persistence(sessions.clone(), businesses.clone());
        }

        let orchestrator = Arc::new(orchestrator);
        self.store.attach(session.id, orchestrator.clone());

        let id = session.id;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let runs = self.runs.clone();
        // 持有分片锁直到句柄写入，任务结束时的移除不会早于插入
        let entry = self.runs.entry(id);
        let handle = tokio::spawn(async move {
            let result = orchestrator.run().await;
            runs.remove_if(&id, |_, run| run.generation == generation);
            result
        });
        entry.insert(RunHandle { generation, handle });
        events
    }

    async fn live_control(
        &self,
        id: Uuid,
        action: &'static str,
    ) -> Result<Arc<dyn SessionControl>, ServiceError> {
        match self.store.control(id) {
            Some(control) => Ok(control),
            None => {
                let session = self.session(id).await?;
                Err(invalid_state(&session, action))
            }
        }
    }

    fn control_error(&self, id: Uuid, action: &'static str, error: ScrapeError) -> ServiceError {
        match error {
            ScrapeError::Stopped | ScrapeError::Finished => ServiceError::InvalidState {
                id,
                status: self
                    .store
                    .get(id)
                    .map(|s| s.status.to_string())
                    .unwrap_or_else(|| SessionStatus::Stopped.to_string()),
                action,
            },
            other => other.into(),
        }
    }
}

fn invalid_state(session: &ScrapeSession, action: &'static str) -> ServiceError {
    ServiceError::InvalidState {
        id: session.id,
        status: session.status.to_string(),
        action,
    }
}
