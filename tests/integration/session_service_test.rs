// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    collect_events, lookup_settings, repositories, scraper_settings, setup_db, wait_until,
    MockBrowserFactory,
};
use leadscrape::application::dto::start_scrape_request::{ConcurrencyDto, StartScrapeRequestDto};
use leadscrape::application::usecases::scrape_session_service::ScrapeSessionService;
use leadscrape::domain::models::events::ScrapeEvent;
use leadscrape::domain::models::session::SessionStatus;
use leadscrape::domain::services::provider_lookup_service::ProviderLookupService;
use leadscrape::domain::services::session_store::SessionStore;
use leadscrape::infrastructure::cache::provider_cache::ProviderCache;
use leadscrape::utils::errors::ServiceError;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn build_service(db: &Arc<DatabaseConnection>, factory: &MockBrowserFactory) -> ScrapeSessionService {
    let repos = repositories(db);
    let lookup = Arc::new(ProviderLookupService::new(
        Arc::new(MockBrowserFactory::new()),
        Arc::new(ProviderCache::in_memory(chrono::Duration::days(30))),
        lookup_settings(),
    ));
    ScrapeSessionService::new(
        scraper_settings(),
        Arc::new(factory.clone()),
        Arc::new(SessionStore::default()),
    )
    .with_lookup_service(lookup)
    .with_persistence(repos.sessions, repos.businesses)
}

fn request(towns: &[&str]) -> StartScrapeRequestDto {
    let mut request = StartScrapeRequestDto::new(
        towns.iter().map(|t| t.to_string()).collect(),
        vec!["Florist".to_string()],
    );
    request.concurrency = Some(ConcurrencyDto {
        simultaneous_towns: Some(1),
        simultaneous_industries: Some(1),
        simultaneous_lookups: Some(1),
    });
    request
}

async fn next_progress(rx: &mut UnboundedReceiver<ScrapeEvent>) {
    loop {
        match rx.recv().await {
            Some(ScrapeEvent::Progress(_)) => return,
            Some(_) => continue,
            None => panic!("events ended before progress"),
        }
    }
}

#[tokio::test]
async fn test_start_runs_to_completion_and_persists() {
    let db = setup_db().await;
    let service = build_service(&db, &MockBrowserFactory::new());

    let (id, mut rx) = service.start(request(&["Kimberley"])).await.unwrap();
    let events = collect_events(&mut rx).await;
    assert!(matches!(events.last(), Some(ScrapeEvent::Complete { .. })));
    service.wait(id).await.unwrap().unwrap();

    let session = service.session(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(service.progress(id).await.unwrap().percentage, 100);

    let results = service.results(id).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|b| b.provider == "Vodacom"));

    // 已结束的会话不能暂停
    assert!(matches!(
        service.pause(id).await,
        Err(ServiceError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let db = setup_db().await;
    let service = build_service(&db, &MockBrowserFactory::new());

    let result = service.start(request(&[])).await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));

    let missing = service.session(uuid::Uuid::new_v4()).await;
    assert!(matches!(missing, Err(ServiceError::SessionNotFound(_))));
}

#[tokio::test]
async fn test_live_pause_and_resume() {
    let db = setup_db().await;
    let factory = MockBrowserFactory::new().with_navigation_delay(Duration::from_millis(20));
    let service = build_service(&db, &factory);

    let (id, mut rx) = service
        .start(request(&["Upington", "Springbok", "Calvinia"]))
        .await
        .unwrap();
    next_progress(&mut rx).await;

    let checkpoint = service.pause(id).await.unwrap();
    assert!(checkpoint.completed_towns >= 1);
    assert_eq!(service.session(id).await.unwrap().status, SessionStatus::Paused);

    assert!(service.resume(id).await.unwrap().is_none());
    let events = collect_events(&mut rx).await;
    match events.last() {
        Some(ScrapeEvent::Complete { summary, .. }) => assert_eq!(summary.towns_completed, 3),
        other => panic!("expected complete event, got {:?}", other),
    }
}

/// 新的服务实例（模拟重启）从数据库中的检查点恢复
#[tokio::test]
async fn test_resume_after_restart() {
    let db = setup_db().await;
    let first_factory = MockBrowserFactory::new().with_navigation_delay(Duration::from_millis(20));
    let first = build_service(&db, &first_factory);

    let (id, mut rx) = first
        .start(request(&["Hermanus", "Swellendam", "Bredasdorp"]))
        .await
        .unwrap();
    next_progress(&mut rx).await;
    first.pause(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second_factory = MockBrowserFactory::new();
    let second = build_service(&db, &second_factory);
    let mut rx = second.resume(id).await.unwrap().expect("new event channel");
    let events = collect_events(&mut rx).await;

    match events.last() {
        Some(ScrapeEvent::Complete { summary, businesses }) => {
            assert_eq!(summary.towns_completed, 3);
            assert_eq!(businesses.len(), 9);
        }
        other => panic!("expected complete event, got {:?}", other),
    }
    assert!(second_factory.navigations() < 3);
    assert_eq!(second.session(id).await.unwrap().status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_stop_then_resume_is_rejected_and_delete_removes() {
    let db = setup_db().await;
    let factory = MockBrowserFactory::new().with_navigation_delay(Duration::from_secs(30));
    let service = build_service(&db, &factory);

    let (id, mut rx) = service.start(request(&["Ladysmith", "Newcastle"])).await.unwrap();
    service.stop(id).await.unwrap();
    let events = collect_events(&mut rx).await;
    assert!(matches!(events.last(), Some(ScrapeEvent::Stopped { .. })));
    service.wait(id).await.unwrap().unwrap();

    assert_eq!(service.session(id).await.unwrap().status, SessionStatus::Stopped);
    assert!(matches!(
        service.resume(id).await,
        Err(ServiceError::InvalidState { .. })
    ));

    service.delete(id).await.unwrap();
    assert!(matches!(
        service.session(id).await,
        Err(ServiceError::SessionNotFound(_))
    ));
    assert!(matches!(
        service.delete(id).await,
        Err(ServiceError::SessionNotFound(_))
    ));
}

/// 运行结束后句柄被移除，会话清理后结果仍可从数据库读取
#[tokio::test]
async fn test_finished_runs_are_released() {
    let db = setup_db().await;
    let service = build_service(&db, &MockBrowserFactory::new());

    let mut ids = Vec::new();
    for town in ["Upington", "Springbok"] {
        let (id, mut rx) = service.start(request(&[town])).await.unwrap();
        collect_events(&mut rx).await;
        ids.push(id);
    }
    wait_until(|| service.active_runs() == 0).await;

    let evicted = service
        .store()
        .evict_expired_at(chrono::Utc::now() + chrono::Duration::days(365));
    assert_eq!(evicted.len(), 2);
    assert!(service.store().is_empty());
    assert_eq!(service.active_runs(), 0);

    for id in ids {
        let summary = service.wait(id).await.unwrap().unwrap();
        assert_eq!(summary.total_businesses, 3);
        assert_eq!(service.session(id).await.unwrap().status, SessionStatus::Completed);
    }
}
