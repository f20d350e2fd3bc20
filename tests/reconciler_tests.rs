//! # Reconciler Tests
//!
//! Drives `curl_config_map` through every path with in-memory collaborators,
//! so no cluster or network is needed.

mod common;

use common::{config_map, data_of, RecordingUpdater, StubFetcher};
use curl_me_that_controller::{curl_config_map, ReconcileOutcome};

#[tokio::test]
async fn test_fetches_and_updates_new_key() {
    let cm = config_map("default", "jokes", Some("foo=http://x/1"), &[]);
    let fetcher = StubFetcher::default().with_page("http://x/1", "hello");
    let updater = RecordingUpdater::default();

    let outcome = curl_config_map(&cm, &fetcher, &updater).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            keys: vec!["foo".to_string()]
        }
    );
    assert_eq!(
        updater.updates(),
        vec![("default/jokes".to_string(), data_of(&[("foo", "hello")]))]
    );
}

#[tokio::test]
async fn test_existing_key_is_not_fetched_again() {
    let cm = config_map(
        "default",
        "jokes",
        Some("foo=http://x/1"),
        &[("foo", "hello")],
    );
    let fetcher = StubFetcher::default().with_page("http://x/1", "changed");
    let updater = RecordingUpdater::default();

    let outcome = curl_config_map(&cm, &fetcher, &updater).await;

    assert_eq!(outcome, ReconcileOutcome::AlreadyProcessed);
    assert!(fetcher.calls().is_empty());
    assert!(updater.updates().is_empty());
}

#[tokio::test]
async fn test_malformed_annotation_skips_fetch_and_update() {
    let cm = config_map("default", "broken", Some("foo"), &[]);
    let fetcher = StubFetcher::default();
    let updater = RecordingUpdater::default();

    let outcome = curl_config_map(&cm, &fetcher, &updater).await;

    assert_eq!(outcome, ReconcileOutcome::InvalidAnnotation);
    assert!(fetcher.calls().is_empty());
    assert!(updater.updates().is_empty());
}

#[tokio::test]
async fn test_partial_fetch_still_updates_reachable_keys() {
    let cm = config_map(
        "default",
        "mixed",
        Some("a=http://x/a,b=http://unreachable/b"),
        &[],
    );
    let fetcher = StubFetcher::default().with_page("http://x/a", "content");
    let updater = RecordingUpdater::default();

    let outcome = curl_config_map(&cm, &fetcher, &updater).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            keys: vec!["a".to_string()]
        }
    );
    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(
        updater.updates(),
        vec![("default/mixed".to_string(), data_of(&[("a", "content")]))]
    );
}

#[tokio::test]
async fn test_all_fetches_failing_issues_no_update() {
    let cm = config_map(
        "default",
        "down",
        Some("a=http://down/a,b=http://down/b"),
        &[],
    );
    let fetcher = StubFetcher::default();
    let updater = RecordingUpdater::default();

    let outcome = curl_config_map(&cm, &fetcher, &updater).await;

    assert_eq!(outcome, ReconcileOutcome::AlreadyProcessed);
    assert_eq!(fetcher.calls().len(), 2);
    assert!(updater.updates().is_empty());
}

#[tokio::test]
async fn test_configmap_without_annotation_is_skipped() {
    let cm = config_map("kube-system", "coredns", None, &[("Corefile", ".:53 {}")]);
    let fetcher = StubFetcher::default();
    let updater = RecordingUpdater::default();

    let outcome = curl_config_map(&cm, &fetcher, &updater).await;

    assert_eq!(outcome, ReconcileOutcome::Skipped);
    assert!(fetcher.calls().is_empty());
    assert!(updater.updates().is_empty());
}

#[tokio::test]
async fn test_other_annotations_do_not_trigger() {
    let mut cm = config_map("default", "other", None, &[]);
    cm.metadata.annotations = Some(
        [(
            "x-k8s.io/curl-me-that-not".to_string(),
            "foo=http://x/1".to_string(),
        )]
        .into_iter()
        .collect(),
    );
    let fetcher = StubFetcher::default().with_page("http://x/1", "hello");
    let updater = RecordingUpdater::default();

    assert_eq!(
        curl_config_map(&cm, &fetcher, &updater).await,
        ReconcileOutcome::Skipped
    );
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_update_failure_is_reported_not_raised() {
    let cm = config_map("default", "gone", Some("foo=http://x/1"), &[]);
    let fetcher = StubFetcher::default().with_page("http://x/1", "hello");
    let updater = RecordingUpdater::failing();

    let outcome = curl_config_map(&cm, &fetcher, &updater).await;

    assert_eq!(outcome, ReconcileOutcome::UpdateFailed);
    assert_eq!(updater.updates().len(), 1);
}

#[tokio::test]
async fn test_second_pass_reaches_fixed_point() {
    let cm = config_map(
        "default",
        "live",
        Some("a=http://x/a,b=http://x/b"),
        &[],
    );
    let fetcher = StubFetcher::default()
        .with_page("http://x/a", "A")
        .with_page("http://x/b", "B");
    let updater = RecordingUpdater::default();

    let first = curl_config_map(&cm, &fetcher, &updater).await;
    assert!(matches!(first, ReconcileOutcome::Updated { .. }));

    // The update produces a new watch event carrying the merged data
    let after_update = updater
        .stored("default", "live")
        .expect("ConfigMap should have been stored");
    let second = curl_config_map(&after_update, &fetcher, &updater).await;

    assert_eq!(second, ReconcileOutcome::AlreadyProcessed);
    assert_eq!(updater.updates().len(), 1);
    assert_eq!(fetcher.calls().len(), 2);
}

#[tokio::test]
async fn test_update_merges_without_touching_existing_keys() {
    let cm = config_map(
        "default",
        "merge",
        Some("keep=http://x/keep,new=http://x/new"),
        &[("keep", "original"), ("unrelated", "value")],
    );
    let fetcher = StubFetcher::default()
        .with_page("http://x/keep", "would-overwrite")
        .with_page("http://x/new", "fresh");
    let updater = RecordingUpdater::default();

    let outcome = curl_config_map(&cm, &fetcher, &updater).await;
    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            keys: vec!["new".to_string()]
        }
    );

    let stored = updater
        .stored("default", "merge")
        .expect("ConfigMap should have been stored");
    assert_eq!(
        stored.data,
        Some(data_of(&[
            ("keep", "original"),
            ("new", "fresh"),
            ("unrelated", "value"),
        ]))
    );
    assert_eq!(fetcher.calls(), vec!["http://x/new".to_string()]);
}

#[tokio::test]
async fn test_binary_data_keys_are_excluded() {
    let mut cm = config_map("default", "binary", Some("logo=http://x/logo"), &[]);
    cm.binary_data = Some(
        [(
            "logo".to_string(),
            k8s_openapi::ByteString(vec![0x89, 0x50, 0x4e, 0x47]),
        )]
        .into_iter()
        .collect(),
    );
    let fetcher = StubFetcher::default().with_page("http://x/logo", "text");
    let updater = RecordingUpdater::default();

    assert_eq!(
        curl_config_map(&cm, &fetcher, &updater).await,
        ReconcileOutcome::AlreadyProcessed
    );
    assert!(fetcher.calls().is_empty());
}

#[test]
fn test_outcome_labels() {
    assert_eq!(ReconcileOutcome::Skipped.as_str(), "skipped");
    assert_eq!(
        ReconcileOutcome::InvalidAnnotation.as_str(),
        "invalid-annotation"
    );
    assert_eq!(
        ReconcileOutcome::AlreadyProcessed.as_str(),
        "already-processed"
    );
    assert_eq!(ReconcileOutcome::UpdateFailed.as_str(), "update-failed");
    assert_eq!(
        ReconcileOutcome::Updated { keys: Vec::new() }.as_str(),
        "updated"
    );
}
