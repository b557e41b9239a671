// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{lookup_settings, repositories, setup_db, MockBrowserFactory, Repositories};
use chrono::{Duration, Utc};
use leadscrape::domain::models::business::ScrapedBusiness;
use leadscrape::domain::models::retry_item::{
    ProviderLookupPayload, RetryItemStatus, RetryQueueItem,
};
use leadscrape::domain::models::session::{ConcurrencySettings, ScrapeSession};
use leadscrape::domain::repositories::business_repository::BusinessRepository;
use leadscrape::domain::repositories::retry_queue_repository::RetryQueueRepository;
use leadscrape::domain::repositories::session_repository::SessionRepository;
use leadscrape::domain::services::provider_lookup_service::ProviderLookupService;
use leadscrape::infrastructure::cache::provider_cache::ProviderCache;
use leadscrape::workers::retry_queue_worker::{
    ProviderRetryHandler, RetryQueueWorker, SweepReport,
};
use std::sync::Arc;
use uuid::Uuid;

async fn seed(repos: &Repositories) -> (Uuid, RetryQueueItem) {
    let session = ScrapeSession::new(
        vec!["Stellenbosch".into()],
        vec!["Winery".into()],
        ConcurrencySettings::default(),
    );
    repos.sessions.create(&session).await.unwrap();
    repos
        .businesses
        .insert_batch(
            session.id,
            &[ScrapedBusiness {
                maps_url: "https://www.google.com/maps/place/estate".into(),
                name: "Estate".into(),
                phone: Some("082 000 0001".into()),
                provider: "Unknown".into(),
                address: None,
                town: "Stellenbosch".into(),
                industry: "Winery".into(),
            }],
        )
        .await
        .unwrap();

    let payload = ProviderLookupPayload {
        phone: "0820000001".into(),
        raw_phones: vec!["082 000 0001".into()],
    };
    let item = RetryQueueItem::provider_lookup(
        &payload,
        Some(session.id),
        2,
        Utc::now() - Duration::seconds(1),
    )
    .unwrap();
    repos.retry_queue.enqueue(&item).await.unwrap();
    (session.id, item)
}

fn worker(repos: &Repositories, factory: &MockBrowserFactory) -> RetryQueueWorker {
    let lookup = Arc::new(ProviderLookupService::new(
        Arc::new(factory.clone()),
        Arc::new(ProviderCache::in_memory(Duration::days(30))),
        lookup_settings(),
    ));
    let businesses: Arc<dyn BusinessRepository> = repos.businesses.clone();
    RetryQueueWorker::new(repos.retry_queue.clone(), std::time::Duration::from_secs(60), 10)
        .with_handler(Arc::new(ProviderRetryHandler::new(lookup, Some(businesses))))
}

/// 成功的条目被删除，商家的运营商被回填
#[tokio::test]
async fn test_successful_retry_deletes_item_and_backfills() {
    let db = setup_db().await;
    let repos = repositories(&db);
    let (session_id, item) = seed(&repos).await;
    let factory = MockBrowserFactory::new().with_carrier("Cell C");

    let report = worker(&repos, &factory).sweep_once().await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert!(repos.retry_queue.find_by_id(item.id).await.unwrap().is_none());
    let stored = repos.businesses.find_by_session(session_id).await.unwrap();
    assert_eq!(stored[0].provider, "Cell C");
}

/// 失败的条目重新排期，次数耗尽后标记为 Failed
#[tokio::test]
async fn test_failed_retry_reschedules_then_fails() {
    let db = setup_db().await;
    let repos = repositories(&db);
    let (_, item) = seed(&repos).await;
    let factory = MockBrowserFactory::new().with_missing_lookup_result();
    let worker = worker(&repos, &factory);

    let first = worker.sweep_once().await.unwrap();
    assert_eq!(first.rescheduled, 1);
    let mut stored = repos.retry_queue.find_by_id(item.id).await.unwrap().unwrap();
    assert_eq!(stored.attempt_count, 1);
    assert_eq!(stored.status, RetryItemStatus::Pending);
    assert!(stored.next_retry_at > Utc::now());

    // 未到期时不会被处理
    assert_eq!(worker.sweep_once().await.unwrap(), SweepReport::default());

    stored.next_retry_at = (Utc::now() - Duration::seconds(1)).into();
    repos.retry_queue.update(&stored).await.unwrap();

    let second = worker.sweep_once().await.unwrap();
    assert_eq!(second.failed, 1);
    let stored = repos.retry_queue.find_by_id(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RetryItemStatus::Failed);
    assert!(stored.last_error.is_some());
}
