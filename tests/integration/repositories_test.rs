// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{repositories, setup_db};
use chrono::{Duration, Utc};
use leadscrape::domain::models::business::ScrapedBusiness;
use leadscrape::domain::models::provider::ProviderCacheEntry;
use leadscrape::domain::models::retry_item::{
    ProviderLookupPayload, RetryItemStatus, RetryQueueItem,
};
use leadscrape::domain::models::session::{
    ConcurrencySettings, ScrapeSession, SessionState, SessionStatus, SessionSummary,
};
use leadscrape::domain::repositories::business_repository::BusinessRepository;
use leadscrape::domain::repositories::provider_cache_repository::ProviderCacheRepository;
use leadscrape::domain::repositories::retry_queue_repository::RetryQueueRepository;
use leadscrape::domain::repositories::session_repository::SessionRepository;
use leadscrape::utils::errors::RepositoryError;
use uuid::Uuid;

fn business(i: usize) -> ScrapedBusiness {
    ScrapedBusiness {
        maps_url: format!("https://www.google.com/maps/place/shop-{}", i),
        name: format!("Shop {}", i),
        phone: Some(format!("082 000 {:04}", i)),
        provider: String::new(),
        address: Some(format!("{} Long Street", i)),
        town: "Cape Town".to_string(),
        industry: "Bakery".to_string(),
    }
}

fn new_session() -> ScrapeSession {
    ScrapeSession::new(
        vec!["Cape Town".into(), "Paarl".into()],
        vec!["Bakery".into()],
        ConcurrencySettings::new(2, 1, 1),
    )
}

#[tokio::test]
async fn test_session_round_trip_with_state() {
    let db = setup_db().await;
    let repos = repositories(&db);
    let session = new_session();
    repos.sessions.create(&session).await.unwrap();

    let state = SessionState {
        current_town_index: 1,
        completed_towns: 1,
        completed_town_indices: vec![0],
        error_count: 0,
        results: vec![business(1)],
        elapsed_ms: 1_200,
    };
    repos.sessions.save_state(session.id, &state).await.unwrap();
    repos
        .sessions
        .update_status(session.id, SessionStatus::Paused, 50)
        .await
        .unwrap();

    let loaded = repos.sessions.find_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, SessionStatus::Paused);
    assert_eq!(loaded.progress, 50);
    assert_eq!(loaded.towns, session.towns);
    assert_eq!(loaded.concurrency, session.concurrency);
    assert_eq!(loaded.state, Some(state));
    assert!(loaded.completed_at.is_none());

    let missing = repos
        .sessions
        .update_status(Uuid::new_v4(), SessionStatus::Running, 0)
        .await;
    assert!(matches!(missing, Err(RepositoryError::NotFound)));
}

/// 超过单批上限的插入会分块写入，删除会话会一并删除商家
#[tokio::test]
async fn test_business_chunking_and_cascade_delete() {
    let db = setup_db().await;
    let repos = repositories(&db);
    let session = new_session();
    repos.sessions.create(&session).await.unwrap();

    let businesses: Vec<ScrapedBusiness> = (0..250).map(business).collect();
    let inserted = repos
        .businesses
        .insert_batch(session.id, &businesses)
        .await
        .unwrap();
    assert_eq!(inserted, 250);
    assert_eq!(
        repos.businesses.find_by_session(session.id).await.unwrap().len(),
        250
    );

    repos.sessions.delete(session.id).await.unwrap();
    assert!(repos.sessions.find_by_id(session.id).await.unwrap().is_none());
    assert!(repos
        .businesses
        .find_by_session(session.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_update_provider_by_phones() {
    let db = setup_db().await;
    let repos = repositories(&db);
    let session = new_session();
    repos.sessions.create(&session).await.unwrap();
    repos
        .businesses
        .insert_batch(session.id, &[business(1), business(2), business(3)])
        .await
        .unwrap();

    let updated = repos
        .businesses
        .update_provider_by_phones(
            session.id,
            &["082 000 0001".to_string(), "082 000 0003".to_string()],
            "Cell C",
        )
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let stored = repos.businesses.find_by_session(session.id).await.unwrap();
    let cell_c: Vec<&str> = stored
        .iter()
        .filter(|b| b.provider == "Cell C")
        .map(|b| b.name.as_str())
        .collect();
    assert_eq!(cell_c.len(), 2);
    assert!(!cell_c.contains(&"Shop 2"));
}

#[tokio::test]
async fn test_provider_cache_upsert_overwrites() {
    let db = setup_db().await;
    let repos = repositories(&db);

    repos
        .provider_cache
        .upsert(&ProviderCacheEntry::new("0820000001", "MTN"))
        .await
        .unwrap();
    repos
        .provider_cache
        .upsert(&ProviderCacheEntry::new("0820000001", "Vodacom"))
        .await
        .unwrap();

    let entry = repos.provider_cache.find("0820000001").await.unwrap().unwrap();
    assert_eq!(entry.provider, "Vodacom");
    assert!(repos.provider_cache.find("0820000002").await.unwrap().is_none());
}

#[tokio::test]
async fn test_retry_queue_due_items_and_update() {
    let db = setup_db().await;
    let repos = repositories(&db);
    let payload = ProviderLookupPayload {
        phone: "0820000001".into(),
        raw_phones: vec!["082 000 0001".into()],
    };

    let due = RetryQueueItem::provider_lookup(&payload, None, 2, Utc::now() - Duration::minutes(1))
        .unwrap();
    let later =
        RetryQueueItem::provider_lookup(&payload, None, 2, Utc::now() + Duration::hours(1)).unwrap();
    repos.retry_queue.enqueue(&due).await.unwrap();
    repos.retry_queue.enqueue(&later).await.unwrap();

    let items = repos.retry_queue.due_items(Utc::now(), 10).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, due.id);

    let mut item = items[0].clone();
    item.record_failure("timeout", Utc::now() + Duration::minutes(5));
    item.record_failure("timeout", Utc::now() + Duration::minutes(5));
    repos.retry_queue.update(&item).await.unwrap();

    let stored = repos.retry_queue.find_by_id(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RetryItemStatus::Failed);
    assert_eq!(stored.attempt_count, 2);
    assert_eq!(stored.last_error.as_deref(), Some("timeout"));
    assert!(repos.retry_queue.due_items(Utc::now(), 10).await.unwrap().is_empty());

    repos.retry_queue.delete(later.id).await.unwrap();
    assert!(repos.retry_queue.find_by_id(later.id).await.unwrap().is_none());
}

/// 终态会话的状态不会被后续的状态更新覆盖
#[tokio::test]
async fn test_update_status_keeps_terminal_status() {
    let db = setup_db().await;
    let repos = repositories(&db);
    let session = new_session();
    repos.sessions.create(&session).await.unwrap();

    let summary = SessionSummary {
        total_businesses: 4,
        towns_completed: 2,
        total_towns: 2,
        ..Default::default()
    };
    repos
        .sessions
        .save_summary(session.id, SessionStatus::Completed, &summary)
        .await
        .unwrap();
    repos
        .sessions
        .update_status(session.id, SessionStatus::Paused, 50)
        .await
        .unwrap();

    let loaded = repos.sessions.find_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, SessionStatus::Completed);
    assert_eq!(loaded.summary, Some(summary));

    let missing = repos
        .sessions
        .update_status(Uuid::new_v4(), SessionStatus::Paused, 0)
        .await;
    assert!(matches!(missing, Err(RepositoryError::NotFound)));
}
