// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{lookup_settings, repositories, setup_db, MockBrowserFactory};
use leadscrape::config::settings::LookupSettings;
use leadscrape::domain::models::retry_item::{ProviderLookupPayload, RetryItemStatus};
use leadscrape::domain::repositories::retry_queue_repository::RetryQueueRepository;
use leadscrape::domain::services::provider_lookup_service::ProviderLookupService;
use leadscrape::domain::services::scrape_control::ScrapeControl;
use leadscrape::infrastructure::cache::provider_cache::ProviderCache;
use std::sync::Arc;
use uuid::Uuid;

fn phones(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("082 555 {:04}", i)).collect()
}

fn service(factory: &MockBrowserFactory, settings: LookupSettings) -> ProviderLookupService {
    ProviderLookupService::new(
        Arc::new(factory.clone()),
        Arc::new(ProviderCache::in_memory(chrono::Duration::days(30))),
        settings,
    )
}

/// N 个号码只启动 ceil(N/5) 个浏览器
#[tokio::test]
async fn test_one_browser_per_batch_of_five() {
    for (count, browsers) in [(1, 1), (5, 1), (6, 2), (11, 3)] {
        let factory = MockBrowserFactory::new().with_carrier("MTN");
        let service = service(&factory, lookup_settings());

        let report = service
            .lookup_providers(&phones(count), None, 1, &ScrapeControl::new())
            .await;

        assert_eq!(factory.launches(), browsers, "{} numbers", count);
        assert_eq!(factory.closed_browsers(), browsers);
        assert_eq!(factory.lookup_navigations(), count);
        assert_eq!(report.stats.resolved, count);
        assert!(report.providers.values().all(|p| p == "MTN"));
    }
}

/// 同一号码的不同写法只查询一次，第二次调用全部命中缓存
#[tokio::test]
async fn test_cache_makes_lookups_idempotent() {
    let factory = MockBrowserFactory::new();
    let service = service(&factory, lookup_settings());
    let control = ScrapeControl::new();
    let input = vec![
        "082 555 0001".to_string(),
        "+27 82 555 0001".to_string(),
        "082-555-0002".to_string(),
    ];

    let first = service.lookup_providers(&input, None, 1, &control).await;
    assert_eq!(first.stats.requested, 2);
    assert_eq!(factory.lookup_navigations(), 2);
    assert_eq!(first.provider_for("+27 82 555 0001"), "Vodacom");

    let second = service.lookup_providers(&input, None, 1, &control).await;
    assert_eq!(second.stats.cache_hits, 2);
    assert_eq!(second.stats.browsers_launched, 0);
    assert_eq!(factory.launches(), 1);
    assert_eq!(first.providers, second.providers);
}

/// 重试耗尽后解析为 Unknown 并写入重试队列
#[tokio::test]
async fn test_failed_lookups_resolve_unknown_and_enqueue() {
    let db = setup_db().await;
    let repos = repositories(&db);
    let factory = MockBrowserFactory::new().with_missing_lookup_result();
    let service = service(&factory, lookup_settings()).with_retry_queue(repos.retry_queue.clone(), 3);
    let session_id = Uuid::new_v4();

    let report = service
        .lookup_providers(&phones(2), Some(session_id), 1, &ScrapeControl::new())
        .await;

    assert_eq!(report.stats.unknown, 2);
    assert_eq!(report.stats.queued, 2);
    assert!(report.providers.values().all(|p| p == "Unknown"));
    // 每个号码尝试 3 次
    assert_eq!(factory.lookup_navigations(), 6);

    let pending = repos
        .retry_queue
        .count_by_status(RetryItemStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending, 2);

    let due = repos
        .retry_queue
        .due_items(chrono::Utc::now() + chrono::Duration::hours(2), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 2);
    assert!(due.iter().all(|item| item.session_id == Some(session_id)));
    let payload: ProviderLookupPayload = serde_json::from_value(due[0].payload.clone()).unwrap();
    assert_eq!(payload.phone.len(), 10);
}

/// 出现人机验证时放弃当前批次剩余号码
#[tokio::test]
async fn test_captcha_aborts_batch() {
    let factory = MockBrowserFactory::new().with_captcha();
    let settings = LookupSettings {
        captcha_detection: true,
        ..lookup_settings()
    };
    let service = service(&factory, settings);

    let report = service
        .lookup_providers(&phones(4), None, 1, &ScrapeControl::new())
        .await;

    assert!(report.stats.captcha_detected);
    assert_eq!(report.stats.unknown, 4);
    assert_eq!(factory.launches(), 1);
    // 第一个号码就遇到验证，不重试，其余号码不再导航
    assert_eq!(factory.lookup_navigations(), 1);
}

/// 过短的号码直接为 Unknown，不占用浏览器
#[tokio::test]
async fn test_short_numbers_skip_browser() {
    let factory = MockBrowserFactory::new();
    let service = service(&factory, lookup_settings());

    let report = service
        .lookup_providers(&["123".to_string()], None, 1, &ScrapeControl::new())
        .await;

    assert_eq!(report.provider_for("123"), "Unknown");
    assert_eq!(report.stats.requested, 0);
    assert_eq!(factory.launches(), 0);
}

/// 停止后不再启动新的批次
#[tokio::test]
async fn test_stopped_control_skips_remaining_batches() {
    let factory = MockBrowserFactory::new();
    let service = service(&factory, lookup_settings());
    let control = ScrapeControl::new();
    control.stop();

    let report = service.lookup_providers(&phones(7), None, 1, &control).await;

    assert_eq!(factory.launches(), 0);
    assert_eq!(report.stats.queued, 0);
    assert_eq!(report.providers.len(), 7);
}

/// 重试队列使用的单号码查询会刷新缓存
#[tokio::test]
async fn test_retry_lookup_refreshes_cache() {
    let factory = MockBrowserFactory::new().with_carrier("Telkom");
    let service = service(&factory, lookup_settings());

    let provider = service.retry_lookup("+27825550009").await.unwrap();
    assert_eq!(provider, "Telkom");
    assert_eq!(service.cache().get("0825550009").await.as_deref(), Some("Telkom"));
    assert!(service.retry_lookup("12").await.is_err());
}
