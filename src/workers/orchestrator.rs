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
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::ScraperSettings;
use crate::domain::models::business::{ScrapedBusiness, UNKNOWN_PROVIDER};
use crate::domain::models::events::ScrapeEvent;
use crate::domain::models::provider::LookupStats;
use crate::domain::models::session::{
    ConcurrencySettings, Progress, ScrapeSession, SessionState, SessionStatus, SessionSummary,
};
use crate::domain::repositories::business_repository::BusinessRepository;
use crate::domain::repositories::session_repository::SessionRepository;
use crate::domain::services::provider_lookup_service::ProviderLookupService;
use crate::domain::services::scrape_control::ScrapeControl;
use crate::domain::services::session_store::{SessionControl, SessionStore};
use crate::engines::traits::BrowserFactory;
use crate::infrastructure::metrics::TOWNS_TOTAL;
use crate::infrastructure::parsers::listing_parser::ListingParser;
use crate::utils::errors::ScrapeError;
use crate::workers::browser_worker::BrowserWorker;

/// 运行中的进度
#[derive(Debug, Default)]
struct RunProgress {
    pending: VecDeque<usize>,
    completed: Vec<usize>,
    results: Vec<ScrapedBusiness>,
    error_count: u32,
    lookups: LookupStats,
    /// 所有工作者退出后置位，此后不再接受暂停
    finishing: bool,
    started_at: Option<Instant>,
    /// 检查点中已累计的耗时
    prior_elapsed_ms: u64,
}

impl RunProgress {
    fn elapsed_ms(&self) -> u64 {
        let current = self
            .started_at
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.prior_elapsed_ms + current
    }
}

/// 抓取编排器
///
/// 启动 `simultaneous_towns` 个浏览器工作者，从共享队列中领取城镇，
/// 全部城镇完成后统一进行运营商查询。进度和结果通过事件通道推送。
pub struct ScrapingOrchestrator {
    session_id: Uuid,
    towns: Vec<String>,
    industries: Vec<String>,
    concurrency: ConcurrencySettings,
    settings: ScraperSettings,
    factory: Arc<dyn BrowserFactory>,
    parser: Arc<ListingParser>,
    control: ScrapeControl,
    events: mpsc::UnboundedSender<ScrapeEvent>,
    progress: Mutex<RunProgress>,
    workers: Mutex<Vec<Arc<BrowserWorker>>>,
    finished: AtomicBool,
    lookup: Option<Arc<ProviderLookupService>>,
    store: Option<Arc<SessionStore>>,
    sessions: Option<Arc<dyn SessionRepository>>,
    businesses: Option<Arc<dyn BusinessRepository>>,
}

impl ScrapingOrchestrator {
    /// 创建编排器
    ///
    /// 会话中带有检查点时，已完成的城镇不会再次抓取。
    ///
    /// # 返回值
    ///
    /// 编排器和事件接收端
    pub fn new(
        session: &ScrapeSession,
        settings: ScraperSettings,
        factory: Arc<dyn BrowserFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<ScrapeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let parser = Arc::new(ListingParser::new(&settings.maps_base_url));
        let orchestrator = Self {
            session_id: session.id,
            towns: session.towns.clone(),
            industries: session.industries.clone(),
            concurrency: session.concurrency.normalized(),
            settings,
            factory,
            parser,
            control: ScrapeControl::new(),
            events: tx,
            progress: Mutex::new(RunProgress {
                pending: (0..session.towns.len()).collect(),
                ..Default::default()
            }),
            workers: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
            lookup: None,
            store: None,
            sessions: None,
            businesses: None,
        };

        let orchestrator = match &session.state {
            Some(state) => orchestrator.with_checkpoint(state.clone()),
            None => orchestrator,
        };
        (orchestrator, rx)
    }

    pub fn with_lookup_service(mut self, lookup: Arc<ProviderLookupService>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_session_store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
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

    /// 从检查点恢复
    pub fn with_checkpoint(self, state: SessionState) -> Self {
        let total = self.towns.len();
        let mut completed: Vec<usize> = if state.completed_town_indices.is_empty() {
            (0..state.completed_towns.min(total)).collect()
        } else {
            state
                .completed_town_indices
                .iter()
                .copied()
                .filter(|i| *i < total)
                .collect()
        };
        completed.sort_unstable();
        completed.dedup();

        {
            let mut progress = self.progress.lock();
            progress.pending = (0..total).filter(|i| !completed.contains(i)).collect();
            progress.completed = completed;
            progress.results = state.results;
            progress.error_count = state.error_count;
            progress.prior_elapsed_ms = state.elapsed_ms;
        }
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn control(&self) -> &ScrapeControl {
        &self.control
    }

    /// 运行直到完成、失败或被停止
    ///
    /// # 返回值
    ///
    /// * `Ok(SessionSummary)` - 完成或被停止
    /// * `Err(ScrapeError::LaunchFailed)` - 所有浏览器都无法启动
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn run(&self) -> Result<SessionSummary, ScrapeError> {
        let pending = {
            let mut progress = self.progress.lock();
            progress.started_at = Some(Instant::now());
            progress.pending.len()
        };
        let worker_count = (self.concurrency.simultaneous_towns as usize).min(pending);
        info!(
            towns = self.towns.len(),
            pending,
            industries = self.industries.len(),
            workers = worker_count,
            "Starting scrape"
        );
        self.emit(ScrapeEvent::info(format!(
            "Scraping {} towns across {} industries",
            pending,
            self.industries.len()
        )));

        let launched = join_all((0..worker_count).map(|id| self.worker_loop(id)))
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();

        let result = if !self.enter_finishing().await {
            Ok(self.finish_stopped().await)
        } else if !self.progress.lock().pending.is_empty() {
            Err(self.finish_failed(launched).await)
        } else {
            self.finish_completed().await
        };
        self.finished.store(true, Ordering::SeqCst);
        result
    }

    /// 暂停并持久化检查点
    ///
    /// 所有城镇处理完毕、进入收尾阶段后返回 `ScrapeError::Finished`
    pub async fn pause(&self) -> Result<SessionState, ScrapeError> {
        {
            let progress = self.progress.lock();
            self.ensure_controllable(&progress)?;
            self.control.pause();
        }

        let checkpoint = self.checkpoint();
        let percentage = self.progress().percentage;
        if let Some(sessions) = &self.sessions {
            sessions.save_state(self.session_id, &checkpoint).await?;
            sessions
                .update_status(self.session_id, SessionStatus::Paused, percentage)
                .await?;
        }
        if let Some(store) = &self.store {
            store.update(self.session_id, |session| {
                if let Err(e) = session.transition(SessionStatus::Paused) {
                    warn!("Ignoring pause: {}", e);
                }
                session.state = Some(checkpoint.clone());
            });
        }

        info!(
            session_id = %self.session_id,
            completed = checkpoint.completed_towns,
            "Scrape paused"
        );
        self.emit(ScrapeEvent::info("Scrape paused"));
        Ok(checkpoint)
    }

    /// 从暂停中恢复
    pub async fn resume(&self) -> Result<(), ScrapeError> {
        self.ensure_controllable(&self.progress.lock())?;
        if let Some(sessions) = &self.sessions {
            sessions
                .update_status(self.session_id, SessionStatus::Running, self.progress().percentage)
                .await?;
        }
        if let Some(store) = &self.store {
            store.set_status(self.session_id, SessionStatus::Running);
        }
        self.control.resume();

        info!(session_id = %self.session_id, "Scrape resumed");
        self.emit(ScrapeEvent::info("Scrape resumed"));
        Ok(())
    }

    /// 强制停止
    ///
    /// 停止信号发出后不会再有进度事件；所有页面和浏览器会被立即关闭。
    pub async fn stop(&self) -> Result<(), ScrapeError> {
        if self.finished.load(Ordering::SeqCst) {
            return Ok(());
        }
        {
            let _progress = self.progress.lock();
            if !self.control.stop() {
                return Ok(());
            }
        }
        warn!(session_id = %self.session_id, "Stopping scrape");

        let workers: Vec<Arc<BrowserWorker>> = self.workers.lock().clone();
        join_all(workers.iter().map(|worker| worker.force_stop())).await;

        if let Some(store) = &self.store {
            store.set_status(self.session_id, SessionStatus::Stopped);
        }
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        Progress::new(self.progress.lock().completed.len(), self.towns.len())
    }

    pub fn results(&self) -> Vec<ScrapedBusiness> {
        self.progress.lock().results.clone()
    }

    /// 当前检查点
    pub fn checkpoint(&self) -> SessionState {
        let progress = self.progress.lock();
        let mut indices = progress.completed.clone();
        indices.sort_unstable();
        let current_town_index = (0..self.towns.len())
            .find(|i| indices.binary_search(i).is_err())
            .unwrap_or(self.towns.len());

        SessionState {
            current_town_index,
            completed_towns: indices.len(),
            completed_town_indices: indices,
            error_count: progress.error_count,
            results: progress.results.clone(),
            elapsed_ms: progress.elapsed_ms(),
        }
    }

    fn ensure_controllable(&self, progress: &RunProgress) -> Result<(), ScrapeError> {
        if self.control.is_stopped() {
            return Err(ScrapeError::Stopped);
        }
        if progress.finishing {
            return Err(ScrapeError::Finished);
        }
        Ok(())
    }

    /// 等待暂停结束后进入收尾阶段，被停止时返回 false
    ///
    /// 收尾标记和暂停在同一把锁下设置，二者不会同时生效。
    async fn enter_finishing(&self) -> bool {
        loop {
            if self.control.checkpoint().await.is_err() {
                return false;
            }
            let entered = {
                let mut progress = self.progress.lock();
                if self.control.is_paused() {
                    false
                } else {
                    progress.finishing = true;
                    true
                }
            };
            if entered {
                return true;
            }
        }
    }

    /// 单个工作者的循环，返回浏览器是否启动成功
    async fn worker_loop(&self, id: usize) -> bool {
        let worker = Arc::new(BrowserWorker::new(
            id,
            self.factory.clone(),
            self.settings.clone(),
            self.parser.clone(),
            self.control.clone(),
        ));
        self.workers.lock().push(worker.clone());

        let launched = match worker.start().await {
            Ok(()) => true,
            Err(ScrapeError::Stopped) => false,
            Err(e) => {
                error!(worker = id, "Browser launch failed: {}", e);
                self.emit(ScrapeEvent::Error {
                    town: None,
                    message: e.to_string(),
                });
                false
            }
        };

        let simultaneous_industries = self.concurrency.simultaneous_industries as usize;
        while launched {
            if self.control.checkpoint().await.is_err() {
                break;
            }
            let Some(index) = self.claim_town() else {
                break;
            };
            let town = &self.towns[index];

            match worker
                .process_town(town, &self.industries, simultaneous_industries)
                .await
            {
                Ok(found) => {
                    if !self.complete_town(index, found, false).await {
                        break;
                    }
                }
                Err(_) if self.control.is_stopped() => {
                    self.requeue(index);
                    break;
                }
                Err(e @ ScrapeError::LaunchFailed(_)) => {
                    error!(worker = id, town = %town, "Browser relaunch failed: {}", e);
                    self.requeue(index);
                    break;
                }
                Err(e) => {
                    error!(worker = id, town = %town, "Town failed: {}", e);
                    self.emit(ScrapeEvent::Error {
                        town: Some(town.clone()),
                        message: e.to_string(),
                    });
                    if !self.complete_town(index, Vec::new(), true).await {
                        break;
                    }
                }
            }
        }

        worker.shutdown().await;
        launched
    }

    fn claim_town(&self) -> Option<usize> {
        self.progress.lock().pending.pop_front()
    }

    fn requeue(&self, index: usize) {
        self.progress.lock().pending.push_front(index);
    }

    /// 记录城镇结果，已停止时把城镇放回队列并返回 false
    async fn complete_town(
        &self,
        index: usize,
        found: Vec<ScrapedBusiness>,
        failed: bool,
    ) -> bool {
        let progress = {
            let mut progress = self.progress.lock();
            if self.control.is_stopped() {
                progress.pending.push_front(index);
                return false;
            }
            progress.completed.push(index);
            progress.results.extend(found);
            if failed {
                progress.error_count += 1;
            }

            let snapshot = Progress::new(progress.completed.len(), self.towns.len());
            self.emit(ScrapeEvent::Progress(snapshot));
            snapshot
        };
        let outcome = if failed { "failed" } else { "completed" };
        metrics::counter!(TOWNS_TOTAL, "outcome" => outcome).increment(1);

        if let Some(store) = &self.store {
            store.update(self.session_id, |session| {
                session.set_progress(progress.percentage)
            });
        }
        if let Some(sessions) = &self.sessions {
            if let Err(e) = sessions.save_state(self.session_id, &self.checkpoint()).await {
                warn!("Failed to save checkpoint: {}", e);
            }
        }
        true
    }

    async fn finish_completed(&self) -> Result<SessionSummary, ScrapeError> {
        let mut businesses = self.results();
        let mut lookups = LookupStats::default();

        if let Some(lookup) = &self.lookup {
            let phones: Vec<String> = businesses.iter().filter_map(|b| b.phone.clone()).collect();
            if !phones.is_empty() {
                self.emit(ScrapeEvent::info(format!(
                    "Looking up providers for {} numbers",
                    phones.len()
                )));
                let report = lookup
                    .lookup_providers(
                        &phones,
                        Some(self.session_id),
                        self.concurrency.simultaneous_lookups as usize,
                        &self.control,
                    )
                    .await;
                for business in businesses.iter_mut() {
                    if let Some(phone) = &business.phone {
                        business.provider = report.provider_for(phone).to_string();
                    }
                }
                lookups = report.stats;
            }
        }
        for business in businesses.iter_mut() {
            if business.provider.is_empty() {
                business.provider = UNKNOWN_PROVIDER.to_string();
            }
        }

        {
            let mut progress = self.progress.lock();
            progress.results = businesses.clone();
            progress.lookups = lookups;
        }
        if self.control.is_stopped() {
            return Ok(self.finish_stopped().await);
        }

        let summary = self.summary();
        if let Some(repository) = &self.businesses {
            if let Err(e) = repository.insert_batch(self.session_id, &businesses).await {
                error!("Failed to persist businesses: {}", e);
            }
        }
        if let Some(sessions) = &self.sessions {
            if let Err(e) = sessions
                .save_summary(self.session_id, SessionStatus::Completed, &summary)
                .await
            {
                error!("Failed to persist summary: {}", e);
            }
        }
        self.update_store(SessionStatus::Completed, &summary);

        {
            let _progress = self.progress.lock();
            if !self.control.is_stopped() {
                self.emit(ScrapeEvent::Complete {
                    summary: summary.clone(),
                    businesses,
                });
            }
        }
        info!(
            businesses = summary.total_businesses,
            errors = summary.error_count,
            elapsed_ms = summary.elapsed_ms,
            "Scrape completed"
        );
        Ok(summary)
    }

    async fn finish_stopped(&self) -> SessionSummary {
        let summary = self.summary();
        if let Some(sessions) = &self.sessions {
            if let Err(e) = sessions.save_state(self.session_id, &self.checkpoint()).await {
                warn!("Failed to save checkpoint: {}", e);
            }
            if let Err(e) = sessions
                .save_summary(self.session_id, SessionStatus::Stopped, &summary)
                .await
            {
                warn!("Failed to persist summary: {}", e);
            }
        }
        self.update_store(SessionStatus::Stopped, &summary);

        info!(
            towns_completed = summary.towns_completed,
            businesses = summary.total_businesses,
            "Scrape stopped"
        );
        self.emit(ScrapeEvent::Stopped {
            summary: summary.clone(),
        });
        summary
    }

    async fn finish_failed(&self, launched: usize) -> ScrapeError {
        let message = if launched == 0 {
            "No browser could be launched".to_string()
        } else {
            "Browsers exited before all towns were processed".to_string()
        };
        error!(launched, "{}", message);

        let summary = self.summary();
        if let Some(sessions) = &self.sessions {
            if let Err(e) = sessions.save_state(self.session_id, &self.checkpoint()).await {
                warn!("Failed to save checkpoint: {}", e);
            }
            if let Err(e) = sessions
                .save_summary(self.session_id, SessionStatus::Error, &summary)
                .await
            {
                warn!("Failed to persist summary: {}", e);
            }
        }
        self.update_store(SessionStatus::Error, &summary);

        self.emit(ScrapeEvent::Error {
            town: None,
            message: message.clone(),
        });
        ScrapeError::LaunchFailed(message)
    }

    fn update_store(&self, status: SessionStatus, summary: &SessionSummary) {
        if let Some(store) = &self.store {
            let checkpoint = self.checkpoint();
            store.update(self.session_id, |session| {
                if let Err(e) = session.transition(status) {
                    warn!("Ignoring status update: {}", e);
                }
                if status == SessionStatus::Completed {
                    session.set_progress(100);
                }
                session.summary = Some(summary.clone());
                session.state = Some(checkpoint);
            });
        }
    }

    fn summary(&self) -> SessionSummary {
        let progress = self.progress.lock();
        SessionSummary {
            total_businesses: progress.results.len(),
            towns_completed: progress.completed.len(),
            total_towns: self.towns.len(),
            error_count: progress.error_count,
            elapsed_ms: progress.elapsed_ms(),
            lookups: progress.lookups.clone(),
        }
    }

    fn emit(&self, event: ScrapeEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl SessionControl for ScrapingOrchestrator {
    async fn pause(&self) -> Result<SessionState, ScrapeError> {
        ScrapingOrchestrator::pause(self).await
    }

    async fn resume(&self) -> Result<(), ScrapeError> {
        ScrapingOrchestrator::resume(self).await
    }

    async fn stop(&self) -> Result<(), ScrapeError> {
        ScrapingOrchestrator::stop(self).await
    }

    fn progress(&self) -> Progress {
        ScrapingOrchestrator::progress(self)
    }

    fn results(&self) -> Vec<ScrapedBusiness> {
        ScrapingOrchestrator::results(self)
    }

    fn checkpoint(&self) -> SessionState {
        ScrapingOrchestrator::checkpoint(self)
    }
}
