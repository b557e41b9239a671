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

use anyhow::{bail, Context};
use leadscrape::application::dto::start_scrape_request::StartScrapeRequestDto;
use leadscrape::application::usecases::scrape_session_service::ScrapeSessionService;
use leadscrape::config::settings::Settings;
use leadscrape::domain::models::events::{LogLevel, ScrapeEvent};
use leadscrape::domain::repositories::business_repository::BusinessRepository;
use leadscrape::domain::services::provider_lookup_service::ProviderLookupService;
use leadscrape::domain::services::session_store::SessionStore;
use leadscrape::engines::chromium_engine::ChromiumLauncher;
use leadscrape::infrastructure::cache::provider_cache::ProviderCache;
use leadscrape::infrastructure::database::connection;
use leadscrape::infrastructure::repositories::business_repo_impl::BusinessRepositoryImpl;
use leadscrape::infrastructure::repositories::provider_cache_repo_impl::ProviderCacheRepositoryImpl;
use leadscrape::infrastructure::repositories::retry_queue_repo_impl::RetryQueueRepositoryImpl;
use leadscrape::infrastructure::repositories::session_repo_impl::SessionRepositoryImpl;
use leadscrape::workers::retry_queue_worker::{ProviderRetryHandler, RetryQueueWorker};
use leadscrape::workers::session_sweeper::SessionSweeper;
use leadscrape::workers::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use uuid::Uuid;

use leadscrape::utils::telemetry;
use migration::{Migrator, MigratorTrait};

const USAGE: &str = "usage: leadscrape <job.json> | leadscrape resume <session-id>";

/// 主函数
///
/// 加载配置、连接数据库、启动后台任务，然后运行一个抓取会话直到结束
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting leadscrape...");

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    if settings.metrics.enabled {
        leadscrape::infrastructure::metrics::init_metrics(&settings.metrics.listen_addr);
    }

    // 3. Connect to database
    let db = connection::create_pool(&settings.database).await?;
    let db = Arc::new(db);
    info!("Database connection established");

    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Repositories and services
    let session_repo = Arc::new(SessionRepositoryImpl::new(db.clone()));
    let business_repo = Arc::new(BusinessRepositoryImpl::new(db.clone()));
    let retry_repo = Arc::new(RetryQueueRepositoryImpl::new(db.clone()));
    let cache_repo = Arc::new(ProviderCacheRepositoryImpl::new(db.clone()));

    let browsers = Arc::new(ChromiumLauncher::new(settings.browser.clone()));
    let cache = Arc::new(ProviderCache::with_repository(
        cache_repo,
        chrono::Duration::days(settings.lookup.cache_ttl_days),
    ));
    let lookup = Arc::new(
        ProviderLookupService::new(browsers.clone(), cache, settings.lookup.clone())
            .with_retry_queue(retry_repo.clone(), settings.retry_queue.max_attempts),
    );

    let store = Arc::new(SessionStore::new(&settings.sessions));
    let service = ScrapeSessionService::new(settings.scraper.clone(), browsers, store.clone())
        .with_lookup_service(lookup.clone())
        .with_persistence(session_repo, business_repo.clone());

    // 5. Background workers
    let sweeper = SessionSweeper::new(
        store,
        Duration::from_secs(settings.sessions.sweep_interval_secs),
    )
    .start();

    let retry_worker = RetryQueueWorker::new(
        retry_repo,
        Duration::from_secs(settings.retry_queue.sweep_interval_secs),
        settings.retry_queue.batch_limit,
    )
    .with_handler(Arc::new(ProviderRetryHandler::new(
        lookup,
        Some(business_repo as Arc<dyn BusinessRepository>),
    )));
    let retry_handle = tokio::spawn(async move {
        if let Err(e) = retry_worker.run().await {
            error!("{} exited: {}", retry_worker.name(), e);
        }
    });

    // 6. Run the session
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (session_id, events) = match args.as_slice() {
        [command, id] if command == "resume" => {
            let id: Uuid = id.parse().context("invalid session id")?;
            match service.resume(id).await? {
                Some(events) => (id, events),
                None => bail!("session {} is already running", id),
            }
        }
        [path] => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read job file {}", path))?;
            let request: StartScrapeRequestDto =
                serde_json::from_str(&raw).context("invalid job file")?;
            service.start(request).await?
        }
        _ => bail!(USAGE),
    };
    info!(%session_id, "Session running, press Ctrl-C to stop");

    drive(&service, session_id, events).await;

    match service.wait(session_id).await {
        Some(Ok(summary)) => info!(
            businesses = summary.total_businesses,
            towns = summary.towns_completed,
            errors = summary.error_count,
            "Session finished"
        ),
        Some(Err(e)) => error!("Session failed: {}", e),
        None => warn!("Session task did not report a result"),
    }

    let still_running = service.active_runs();
    if still_running > 0 {
        warn!(runs = still_running, "Sessions still running at shutdown");
    }
    sweeper.abort();
    retry_handle.abort();
    info!("Shutdown complete");
    Ok(())
}

/// 转发事件直到会话结束，Ctrl-C 时停止会话
async fn drive(
    service: &ScrapeSessionService,
    session_id: Uuid,
    mut events: UnboundedReceiver<ScrapeEvent>,
) {
    let mut stopping = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                log_event(&event);
                if let ScrapeEvent::Complete { businesses, .. } = &event {
                    match serde_json::to_string_pretty(businesses) {
                        Ok(json) => println!("{}", json),
                        Err(e) => error!("Failed to serialize results: {}", e),
                    }
                }
                if event.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                info!("Received Ctrl+C, stopping session...");
                stopping = true;
                if let Err(e) = service.stop(session_id).await {
                    error!("Failed to stop session: {}", e);
                }
            }
        }
    }
}

fn log_event(event: &ScrapeEvent) {
    match event {
        ScrapeEvent::Progress(progress) => info!(
            completed = progress.completed_towns,
            total = progress.total_towns,
            "Progress {}%",
            progress.percentage
        ),
        ScrapeEvent::Log { level, message } => match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        },
        ScrapeEvent::Error { town, message } => {
            error!(town = town.as_deref().unwrap_or("-"), "{}", message)
        }
        ScrapeEvent::Complete { summary, .. } => info!(
            businesses = summary.total_businesses,
            browsers = summary.lookups.browsers_launched,
            "Scrape complete"
        ),
        ScrapeEvent::Stopped { summary } => info!(
            towns = summary.towns_completed,
            businesses = summary.total_businesses,
            "Scrape stopped"
        ),
    }
}
