// tests/metrics.rs
// Installs the global recorder, so this binary holds exactly one test.

mod common;

use common::Reply;
use std::time::Duration;

use feed_relay::metrics::Metrics;
use feed_relay::{
    strategies_from_config, Poller, RelayConfig, Shutdown, SourceConfig, StateStore,
    WebhookClient,
};

#[tokio::test]
async fn metrics_endpoint_reports_cycle_counters() {
    let metrics = Metrics::init().expect("install recorder");

    let server = common::spawn(vec![Reply::Ok], Some(&common::fixture("atom.xml"))).await;
    let dir = tempfile::tempdir().unwrap();
    let cfg = RelayConfig {
        max_post_age_days: 0,
        delay_between_posts: 0.0,
        feeds: vec![
            SourceConfig::new(server.feed_url(), server.hook_url()),
            SourceConfig::new(server.broken_url(), server.hook_url()),
        ],
        ..Default::default()
    };
    let store = StateStore::load(dir.path().join("state.json")).await;
    let strategies = strategies_from_config(&cfg);
    let client = WebhookClient::new().with_timeout(Duration::from_secs(2));
    let mut poller = Poller::new(cfg, strategies, client, store, Shutdown::new());
    poller.run_cycle().await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = metrics.router();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let resp = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let text = resp.text().await.unwrap();

    for needle in [
        "relay_entries_delivered_total 2",
        "relay_source_errors_total 1",
        "relay_cycles_total 1",
        "relay_last_cycle_ts",
    ] {
        assert!(text.contains(needle), "missing {needle:?} in:\n{text}");
    }
}
