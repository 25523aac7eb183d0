// Quota state persisted through the JSON file store survives reopening,
// so separate processes see the same usage.

use quota_guard::rate_limit::{
    JsonFileQuotaStore, PlatformQuota, QuotaStore, RateLimitConfig, RateLimitingService,
    TrackerKey,
};
use std::sync::Arc;
use tempfile::TempDir;

fn config() -> RateLimitConfig {
    RateLimitConfig::without_pacing().with_platform("hubspot", PlatformQuota::new(3, 3600))
}

#[tokio::test]
async fn usage_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("quotas.json");
    let key = TrackerKey::new("hubspot", "contacts", "acme");

    {
        let store = Arc::new(JsonFileQuotaStore::open(&path).await.unwrap());
        let service = RateLimitingService::new(store, &config(), key.clone())
            .await
            .unwrap();
        service.execute_request(|| async { Ok(()) }).await.unwrap();
        service.execute_request(|| async { Ok(()) }).await.unwrap();
    }
    assert!(path.exists());

    let store = Arc::new(JsonFileQuotaStore::open(&path).await.unwrap());
    let tracker = store.get(&key).await.unwrap().unwrap();
    assert_eq!(tracker.current_usage, 2);
    assert_eq!(tracker.quota_limit, 3);

    let service = RateLimitingService::new(store.clone(), &config(), key.clone())
        .await
        .unwrap();
    service.execute_request(|| async { Ok(()) }).await.unwrap();
    let err = service
        .execute_request(|| async { Ok(()) })
        .await
        .unwrap_err();
    assert!(err.is_quota_exceeded());

    let reopened = JsonFileQuotaStore::open(&path).await.unwrap();
    assert_eq!(reopened.get(&key).await.unwrap().unwrap().current_usage, 3);
}

#[tokio::test]
async fn failed_requests_do_not_persist_usage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quotas.json");
    let key = TrackerKey::new("hubspot", "deals", "acme");

    let store = Arc::new(JsonFileQuotaStore::open(&path).await.unwrap());
    let service = RateLimitingService::new(store, &config(), key.clone())
        .await
        .unwrap();
    let _ = service
        .execute_request(|| async { Err::<(), _>(anyhow::anyhow!("Too Many Requests")) })
        .await;

    let reopened = JsonFileQuotaStore::open(&path).await.unwrap();
    assert_eq!(reopened.get(&key).await.unwrap().unwrap().current_usage, 0);
}

#[tokio::test]
async fn corrupt_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quotas.json");
    std::fs::write(&path, b"{ not json").unwrap();

    assert!(JsonFileQuotaStore::open(&path).await.is_err());
}

#[tokio::test]
async fn separate_handles_share_one_quota() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quotas.json");
    let key = TrackerKey::new("hubspot", "companies", "acme");

    let first = Arc::new(JsonFileQuotaStore::open(&path).await.unwrap());
    let second = Arc::new(JsonFileQuotaStore::open(&path).await.unwrap());
    first.find_or_create(&key, 1, 3600).await.unwrap();

    let a = first.reserve(&key, 1).await.unwrap();
    let b = second.reserve(&key, 1).await.unwrap();
    assert!(a.is_admitted());
    assert!(!b.is_admitted());

    let reopened = JsonFileQuotaStore::open(&path).await.unwrap();
    assert_eq!(reopened.get(&key).await.unwrap().unwrap().current_usage, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_services_on_separate_handles_never_over_admit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quotas.json");
    let key = TrackerKey::new("hubspot", "tickets", "acme");
    let config = RateLimitConfig::without_pacing()
        .with_platform("hubspot", PlatformQuota::new(5, 3600));

    let mut services = Vec::new();
    for _ in 0..3 {
        let store = Arc::new(JsonFileQuotaStore::open(&path).await.unwrap());
        services.push(Arc::new(
            RateLimitingService::new(store, &config, key.clone())
                .await
                .unwrap(),
        ));
    }

    let mut handles = Vec::new();
    for i in 0..30 {
        let service = services[i % services.len()].clone();
        handles.push(tokio::spawn(async move {
            service.execute_request(|| async { Ok(()) }).await.is_ok()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 5);

    let reopened = JsonFileQuotaStore::open(&path).await.unwrap();
    assert_eq!(reopened.get(&key).await.unwrap().unwrap().current_usage, 5);
}

#[tokio::test]
async fn open_handles_observe_later_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quotas.json");
    let key = TrackerKey::new("hubspot", "notes", "acme");

    let reader = JsonFileQuotaStore::open(&path).await.unwrap();
    assert!(reader.get(&key).await.unwrap().is_none());

    let writer = JsonFileQuotaStore::open(&path).await.unwrap();
    writer.find_or_create(&key, 10, 3600).await.unwrap();
    writer.consume(&key, 7).await.unwrap();

    let trackers = reader.trackers_for_customer("acme").await.unwrap();
    assert_eq!(trackers.len(), 1);
    assert_eq!(trackers[0].current_usage, 7);
}
