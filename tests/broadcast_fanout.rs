/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: tests/broadcast_fanout.rs
 *
 * S6: the broadcast hub fans snapshots out to every connected subscriber,
 * and one subscriber that never drains its queue does not stall delivery
 * to the others. Exercised end-to-end over real WebSocket upgrades via
 * `warp::test::ws()`, the WebSocket counterpart of the `warp::test::request()`
 * idiom `kubemon-facade`'s own HTTP tests already use.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use kubemon_alerts::AlertManager;
use kubemon_broadcast::{BroadcastConfig, BroadcastHub};
use kubemon_checks::CheckRegistry;
use kubemon_context::ClusterContextManager;
use kubemon_engine::{EngineConfig, MonitoringEngine};
use kubemon_facade::{routes, AppState};
use kubemon_types::{ClusterHealth, HealthStatus, Score};
use prometheus::Registry;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

async fn unreachable_context() -> Arc<ClusterContextManager> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "clusters:\n  - name: test\n    kubeconfig: /dev/null\n").unwrap();
    Arc::new(ClusterContextManager::load(file.path().to_path_buf(), None).await.unwrap())
}

async fn test_state(broadcast: Arc<BroadcastHub>) -> Arc<AppState> {
    let context = unreachable_context().await;
    let engine = Arc::new(MonitoringEngine::new(
        "test-cluster",
        Arc::new(CheckRegistry::new()),
        context.clone(),
        Arc::new(AlertManager::new(10)),
        None,
        EngineConfig::default(),
    ));

    Arc::new(AppState {
        engine,
        context,
        alerts: Arc::new(AlertManager::new(10)),
        ai: None,
        broadcast,
        metrics_registry: Arc::new(Registry::new()),
        max_subscribers: 500,
        version: "test",
        started_at: Instant::now(),
    })
}

fn snapshot(cluster_name: &str) -> ClusterHealth {
    ClusterHealth {
        cluster_name: cluster_name.to_string(),
        timestamp: chrono::Utc::now(),
        overall: HealthStatus::Healthy,
        score: Score { raw: 1.0, weighted: 1.0, confidence: 1.0 },
        checks: vec![],
        active_alerts: vec![],
        generated_by: "kubemon".to_string(),
    }
}

#[tokio::test]
async fn every_connected_subscriber_receives_the_latest_snapshot() {
    let broadcast = BroadcastHub::new(BroadcastConfig {
        broadcast_cadence: Duration::from_millis(30),
        ..BroadcastConfig::default()
    });
    let state = test_state(broadcast.clone()).await;
    let cancel = CancellationToken::new();
    tokio::spawn(broadcast.clone().run(cancel.clone()));

    let filter = routes(state);
    let mut client_a = warp::test::ws().path("/subscribe").handshake(filter.clone()).await.expect("client a upgrade");
    let mut client_b = warp::test::ws().path("/subscribe").handshake(filter).await.expect("client b upgrade");

    broadcast.set_snapshot(snapshot("prod")).await;

    let msg_a = tokio::time::timeout(Duration::from_secs(2), client_a.recv())
        .await
        .expect("client a should receive a snapshot before the timeout")
        .expect("ws recv should not error");
    let msg_b = tokio::time::timeout(Duration::from_secs(2), client_b.recv())
        .await
        .expect("client b should receive a snapshot before the timeout")
        .expect("ws recv should not error");

    assert!(msg_a.to_str().unwrap().contains("\"prod\""));
    assert!(msg_b.to_str().unwrap().contains("\"prod\""));

    cancel.cancel();
}

#[tokio::test]
async fn a_subscriber_that_never_drains_its_queue_does_not_stall_delivery_to_others() {
    let broadcast = BroadcastHub::new(BroadcastConfig {
        broadcast_cadence: Duration::from_millis(30),
        write_deadline: Duration::from_millis(200),
        ..BroadcastConfig::default()
    });
    let state = test_state(broadcast.clone()).await;
    let cancel = CancellationToken::new();
    tokio::spawn(broadcast.clone().run(cancel.clone()));

    let filter = routes(state);
    // Connected but deliberately never polled for incoming messages below,
    // standing in for a stalled client whose TCP window never drains.
    let _slow_client =
        warp::test::ws().path("/subscribe").handshake(filter.clone()).await.expect("slow client upgrade");
    let mut fast_client = warp::test::ws().path("/subscribe").handshake(filter).await.expect("fast client upgrade");

    for i in 0..3 {
        broadcast.set_snapshot(snapshot(&format!("tick-{i}"))).await;
        let msg = tokio::time::timeout(Duration::from_secs(2), fast_client.recv())
            .await
            .unwrap_or_else(|_| panic!("fast client stalled behind the slow one on tick {i}"))
            .expect("ws recv should not error");
        assert!(msg.to_str().unwrap().contains(&format!("tick-{i}")));
        tokio::time::sleep(Duration::from_millis(40)).await;
    }

    cancel.cancel();
}
