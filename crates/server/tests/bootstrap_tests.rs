mod common;

use bomrepo_core::config::AppConfig;
use bomrepo_server::bootstrap::{build_services, start_scheduler};
use bomrepo_server::{SearchQuery, StopOutcome};
use common::{fresh_serial, versioned_bom};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_filesystem_services_end_to_end() {
    let temp = tempfile::tempdir().unwrap();
    let mut config = AppConfig::for_testing(temp.path());
    config.retention.max_versions = 1;

    let cancel = CancellationToken::new();
    let services = build_services(&config, &cancel).await.unwrap();
    let serial = fresh_serial();
    for version in 1..=2 {
        assert!(
            services
                .repo
                .store(versioned_bom(&serial, version), &cancel)
                .await
                .unwrap()
                .is_stored()
        );
    }

    let scheduler = start_scheduler(&config, &services);
    assert_eq!(scheduler.loops().len(), 2);

    let query = SearchQuery::new(Some("org.example"), Some("acme"), None).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let versions = services.repo.list_versions(&serial, &cancel).await.unwrap();
        let found = services.index.search(&query);
        if versions == vec![2] && found.len() == 1 && found[0].version == 2 {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("services did not converge: versions={versions:?} found={found:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    for (_, outcome) in scheduler.shutdown(config.shutdown.grace_period()).await {
        assert_eq!(outcome, StopOutcome::Graceful);
    }
}

#[tokio::test]
async fn test_disabled_loops_are_not_started() {
    let temp = tempfile::tempdir().unwrap();
    let mut config = AppConfig::for_testing(temp.path());
    config.cache.enabled = false;
    config.retention.enabled = false;

    let services = build_services(&config, &CancellationToken::new())
        .await
        .unwrap();
    let scheduler = start_scheduler(&config, &services);

    assert!(scheduler.loops().is_empty());
    assert!(scheduler.shutdown(Duration::from_secs(1)).await.is_empty());
}

#[tokio::test]
async fn test_reinitialization_reuses_existing_layout() {
    let temp = tempfile::tempdir().unwrap();
    let config = AppConfig::for_testing(temp.path());
    let cancel = CancellationToken::new();
    let serial = fresh_serial();

    let services = build_services(&config, &cancel).await.unwrap();
    services
        .repo
        .store(versioned_bom(&serial, 1), &cancel)
        .await
        .unwrap();
    drop(services);

    let services = build_services(&config, &cancel).await.unwrap();
    assert_eq!(
        services.repo.list_versions(&serial, &cancel).await.unwrap(),
        vec![1]
    );
}
