// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    collect_events, lookup_settings, repositories, scraper_settings, setup_db, wait_until,
    MockBrowserFactory,
};
use async_trait::async_trait;
use leadscrape::domain::models::business::ScrapedBusiness;
use leadscrape::domain::models::events::ScrapeEvent;
use leadscrape::domain::models::session::{ConcurrencySettings, ScrapeSession, SessionStatus};
use leadscrape::domain::repositories::business_repository::BusinessRepository;
use leadscrape::domain::repositories::session_repository::SessionRepository;
use leadscrape::domain::services::provider_lookup_service::ProviderLookupService;
use leadscrape::domain::services::session_store::SessionStore;
use leadscrape::infrastructure::cache::provider_cache::ProviderCache;
use leadscrape::infrastructure::repositories::business_repo_impl::BusinessRepositoryImpl;
use leadscrape::utils::errors::{RepositoryError, ScrapeError};
use leadscrape::workers::orchestrator::ScrapingOrchestrator;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn session(towns: &[&str], industries: &[&str], concurrency: ConcurrencySettings) -> ScrapeSession {
    ScrapeSession::new(
        towns.iter().map(|t| t.to_string()).collect(),
        industries.iter().map(|i| i.to_string()).collect(),
        concurrency,
    )
}

fn progress_percentages(events: &[ScrapeEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            ScrapeEvent::Progress(p) => Some(p.percentage),
            _ => None,
        })
        .collect()
}

/// 两个城镇、两个行业：完整流程，包括运营商查询
#[tokio::test]
async fn test_two_towns_complete_with_providers() {
    let scraping = MockBrowserFactory::new();
    let lookups = MockBrowserFactory::new().with_carrier("Vodacom");
    let lookup = Arc::new(ProviderLookupService::new(
        Arc::new(lookups.clone()),
        Arc::new(ProviderCache::in_memory(chrono::Duration::days(30))),
        lookup_settings(),
    ));

    let session = session(
        &["Cape Town", "Durban"],
        &["Pharmacy", "Plumber"],
        ConcurrencySettings::new(2, 2, 1),
    );
    let (orchestrator, mut rx) =
        ScrapingOrchestrator::new(&session, scraper_settings(), Arc::new(scraping.clone()));
    let orchestrator = orchestrator.with_lookup_service(lookup);

    let summary = orchestrator.run().await.unwrap();
    let events = collect_events(&mut rx).await;

    assert_eq!(progress_percentages(&events), vec![50, 100]);
    assert_eq!(summary.total_towns, 2);
    assert_eq!(summary.towns_completed, 2);
    assert_eq!(summary.error_count, 0);
    assert_eq!(summary.total_businesses, 12);
    assert_eq!(summary.lookups.requested, 12);
    assert_eq!(summary.lookups.resolved, 12);
    // 12 个号码，每批最多 5 个
    assert_eq!(lookups.launches(), 3);

    match events.last() {
        Some(ScrapeEvent::Complete { businesses, .. }) => {
            assert_eq!(businesses.len(), 12);
            assert!(businesses.iter().all(|b| b.provider == "Vodacom"));
            assert!(businesses.iter().all(|b| b.maps_url.contains("/maps/place/")));
        }
        other => panic!("expected complete event, got {:?}", other),
    }

    assert_eq!(scraping.open_pages(), 0);
    assert_eq!(scraping.closed_browsers(), scraping.launches());
}

/// 每个城镇与行业的组合只抓取一次，页面数不超过并发上限
#[tokio::test]
async fn test_each_combination_scraped_once() {
    let scraping = MockBrowserFactory::new();
    let session = session(
        &["George", "Knysna", "Mossel Bay", "Oudtshoorn"],
        &["Dentist", "Plumber", "Electrician"],
        ConcurrencySettings::new(3, 2, 1),
    );
    let (orchestrator, _rx) =
        ScrapingOrchestrator::new(&session, scraper_settings(), Arc::new(scraping.clone()));

    let summary = orchestrator.run().await.unwrap();
    let results = orchestrator.results();

    assert_eq!(scraping.navigations(), 12);
    assert_eq!(summary.total_businesses, 36);
    let combos: HashSet<(String, String)> = results
        .iter()
        .map(|b| (b.town.clone(), b.industry.clone()))
        .collect();
    assert_eq!(combos.len(), 12);
    assert!(scraping.max_open_pages() <= 6);
    assert!(scraping.launches() <= 3);
    // 没有查询服务时运营商为 Unknown
    assert!(results.iter().all(|b| b.provider == "Unknown"));
}

/// 一个城镇导航超时不影响其他城镇
#[tokio::test]
async fn test_failing_town_is_isolated() {
    let scraping = MockBrowserFactory::new().with_timeout_town("Atlantis");
    let session = session(
        &["Cape Town", "Atlantis", "Durban"],
        &["Pharmacy"],
        ConcurrencySettings::new(1, 1, 1),
    );
    let (orchestrator, mut rx) =
        ScrapingOrchestrator::new(&session, scraper_settings(), Arc::new(scraping.clone()));

    let summary = orchestrator.run().await.unwrap();
    let events = collect_events(&mut rx).await;

    assert_eq!(summary.towns_completed, 3);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.total_businesses, 6);
    assert!(orchestrator.results().iter().all(|b| b.town != "Atlantis"));
    assert!(events.iter().any(|e| matches!(
        e,
        ScrapeEvent::Error { town: Some(town), .. } if town == "Atlantis"
    )));
    // 导航重试 2 次
    let atlantis_navigations = scraping.navigations() - 2;
    assert_eq!(atlantis_navigations, 3);
    assert_eq!(progress_percentages(&events), vec![33, 66, 100]);
}

/// 停止会立即关闭所有页面和浏览器，之后没有进度事件
#[tokio::test]
async fn test_stop_is_forceful() {
    let scraping = MockBrowserFactory::new().with_navigation_delay(Duration::from_secs(30));
    let store = Arc::new(SessionStore::default());
    let session = session(
        &["Pretoria", "Polokwane", "Nelspruit"],
        &["Dentist", "Plumber"],
        ConcurrencySettings::new(2, 2, 1),
    );
    store.insert(session.clone());
    let (orchestrator, mut rx) =
        ScrapingOrchestrator::new(&session, scraper_settings(), Arc::new(scraping.clone()));
    let orchestrator = Arc::new(orchestrator.with_session_store(store.clone()));

    let handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run().await }
    });

    let probe = scraping.clone();
    wait_until(move || probe.navigations() >= 2).await;
    assert!(scraping.open_pages() > 0);

    orchestrator.stop().await.unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("run did not stop in time")
        .unwrap()
        .unwrap();
    let events = collect_events(&mut rx).await;

    assert_eq!(summary.towns_completed, 0);
    assert!(progress_percentages(&events).is_empty());
    assert!(matches!(events.last(), Some(ScrapeEvent::Stopped { .. })));
    assert_eq!(scraping.open_pages(), 0);
    assert_eq!(scraping.closed_browsers(), scraping.launches());
    assert_eq!(store.get(session.id).unwrap().status, SessionStatus::Stopped);
}

/// 所有浏览器都无法启动时会话进入 Error 状态
#[tokio::test]
async fn test_all_launches_failing_marks_error() {
    let scraping = MockBrowserFactory::new().with_failing_launch();
    let store = Arc::new(SessionStore::default());
    let session = session(&["Bloemfontein"], &["Bakery"], ConcurrencySettings::default());
    store.insert(session.clone());
    let (orchestrator, mut rx) =
        ScrapingOrchestrator::new(&session, scraper_settings(), Arc::new(scraping));
    let orchestrator = orchestrator.with_session_store(store.clone());

    let result = orchestrator.run().await;
    assert!(matches!(result, Err(ScrapeError::LaunchFailed(_))));

    drop(orchestrator);
    let events = collect_events(&mut rx).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, ScrapeEvent::Error { town: None, .. })));
    assert!(!events.iter().any(|e| e.is_terminal()));
    assert_eq!(store.get(session.id).unwrap().status, SessionStatus::Error);
}

/// 暂停后持久化检查点，从数据库重建的编排器只处理剩余城镇
#[tokio::test]
async fn test_pause_checkpoint_and_resume_from_database() {
    let db = setup_db().await;
    let repos = repositories(&db);

    let first = MockBrowserFactory::new().with_navigation_delay(Duration::from_millis(30));
    let session = session(
        &["East London", "Port Elizabeth", "Grahamstown"],
        &["Mechanic"],
        ConcurrencySettings::new(1, 1, 1),
    );
    repos.sessions.create(&session).await.unwrap();

    let (orchestrator, mut rx) =
        ScrapingOrchestrator::new(&session, scraper_settings(), Arc::new(first.clone()));
    let orchestrator = Arc::new(
        orchestrator.with_persistence(repos.sessions.clone(), repos.businesses.clone()),
    );
    let handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run().await }
    });

    // 等第一个城镇完成后暂停
    loop {
        match rx.recv().await {
            Some(ScrapeEvent::Progress(_)) => break,
            Some(_) => continue,
            None => panic!("run ended before any progress"),
        }
    }
    let checkpoint = orchestrator.pause().await.unwrap();
    assert!(checkpoint.completed_towns >= 1);
    assert!(checkpoint.is_town_done(0));

    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.abort();

    let stored = repos.sessions.find_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Paused);
    let state = stored.state.clone().unwrap();
    let done = state.completed_towns;
    assert!(done >= 1 && done < 3);
    // 每个城镇的导航至少 30ms
    assert!(state.elapsed_ms >= 30);
    assert_eq!(state.results.len(), done * 3);

    // 重建
    let second = MockBrowserFactory::new();
    let (resumed, mut rx) =
        ScrapingOrchestrator::new(&stored, scraper_settings(), Arc::new(second.clone()));
    let resumed = resumed.with_persistence(repos.sessions.clone(), repos.businesses.clone());
    let summary = resumed.run().await.unwrap();
    let events = collect_events(&mut rx).await;

    assert_eq!(second.navigations(), 3 - done);
    assert_eq!(summary.towns_completed, 3);
    assert_eq!(summary.total_businesses, 9);
    assert!(summary.elapsed_ms >= state.elapsed_ms);
    assert_eq!(progress_percentages(&events).last(), Some(&100));

    let finished = repos.sessions.find_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(finished.status, SessionStatus::Completed);
    assert_eq!(finished.summary.unwrap().total_businesses, 9);
    assert_eq!(repos.businesses.find_by_session(session.id).await.unwrap().len(), 9);
}

/// 写入结果较慢的商家仓储
struct SlowInsertRepository {
    inner: Arc<BusinessRepositoryImpl>,
    delay: Duration,
}

#[async_trait]
impl BusinessRepository for SlowInsertRepository {
    async fn insert_batch(
        &self,
        session_id: Uuid,
        businesses: &[ScrapedBusiness],
    ) -> Result<usize, RepositoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_batch(session_id, businesses).await
    }

    async fn find_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ScrapedBusiness>, RepositoryError> {
        self.inner.find_by_session(session_id).await
    }

    async fn update_provider_by_phones(
        &self,
        session_id: Uuid,
        phones: &[String],
        provider: &str,
    ) -> Result<u64, RepositoryError> {
        self.inner
            .update_provider_by_phones(session_id, phones, provider)
            .await
    }

    async fn delete_by_session(&self, session_id: Uuid) -> Result<u64, RepositoryError> {
        self.inner.delete_by_session(session_id).await
    }
}

/// 所有城镇完成后的收尾阶段拒绝暂停，最终状态保持 Completed
#[tokio::test]
async fn test_pause_rejected_while_finishing() {
    let db = setup_db().await;
    let repos = repositories(&db);
    let store = Arc::new(SessionStore::default());
    let session = session(&["Kuruman"], &["Butchery"], ConcurrencySettings::new(1, 1, 1));
    repos.sessions.create(&session).await.unwrap();
    store.insert(session.clone());

    let slow = Arc::new(SlowInsertRepository {
        inner: repos.businesses.clone(),
        delay: Duration::from_millis(300),
    });
    let factory = Arc::new(MockBrowserFactory::new());
    let (orchestrator, mut rx) = ScrapingOrchestrator::new(&session, scraper_settings(), factory);
    let orchestrator = Arc::new(
        orchestrator
            .with_session_store(store.clone())
            .with_persistence(repos.sessions.clone(), slow),
    );
    let handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run().await }
    });

    loop {
        match rx.recv().await {
            Some(ScrapeEvent::Progress(p)) if p.percentage == 100 => break,
            Some(_) => continue,
            None => panic!("run ended before the last town"),
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(matches!(orchestrator.pause().await, Err(ScrapeError::Finished)));
    assert!(matches!(orchestrator.resume().await, Err(ScrapeError::Finished)));

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.total_businesses, 3);
    assert_eq!(store.get(session.id).unwrap().status, SessionStatus::Completed);
    let stored = repos.sessions.find_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert!(matches!(
        collect_events(&mut rx).await.last(),
        Some(ScrapeEvent::Complete { .. })
    ));
}

/// 城镇结果在停止信号之后返回时不计入结果，城镇回到队列
#[tokio::test]
async fn test_results_after_stop_are_discarded() {
    let scraping = MockBrowserFactory::new();
    let session = session(
        &["Beaufort West", "Laingsburg"],
        &["Garage"],
        ConcurrencySettings::new(1, 1, 1),
    );
    let (orchestrator, mut rx) =
        ScrapingOrchestrator::new(&session, scraper_settings(), Arc::new(scraping.clone()));
    scraping.stop_after_listing(orchestrator.control().clone());

    let summary = orchestrator.run().await.unwrap();
    let events = collect_events(&mut rx).await;

    assert_eq!(scraping.navigations(), 1);
    assert_eq!(summary.towns_completed, 0);
    assert_eq!(summary.total_businesses, 0);
    assert!(orchestrator.results().is_empty());
    assert!(progress_percentages(&events).is_empty());
    assert!(matches!(events.last(), Some(ScrapeEvent::Stopped { .. })));

    let checkpoint = orchestrator.checkpoint();
    assert_eq!(checkpoint.completed_towns, 0);
    assert_eq!(checkpoint.current_town_index, 0);
}
