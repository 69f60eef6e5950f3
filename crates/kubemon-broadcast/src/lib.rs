/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-broadcast/src/lib.rs
 *
 * Broadcast hub crate (C6, spec §4.5). Fans out cluster-health snapshots to
 * WebSocket subscribers on a fixed cadence, heartbeats idle connections, and
 * reaps ones that stop answering. Each subscriber is split into a reader
 * task (enforces the read deadline, observes pongs and close frames) and a
 * writer task (enforces the write deadline around the real socket send) the
 * same way the teacher splits webhook admission from reconciliation in
 * `autoheal_controller`: one task per concern, coordinated through shared
 * state rather than a single monolithic loop.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use futures::{SinkExt, StreamExt};
use kubemon_types::{ClusterHealth, SubscriberState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warp::filters::ws::{Message, WebSocket};

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("subscriber capacity ({0}) reached")]
    Overload(usize),
}

struct Subscriber {
    tx: mpsc::UnboundedSender<Message>,
    last_seen: Mutex<Instant>,
    state: Mutex<SubscriberState>,
}

impl Subscriber {
    fn touch(&self) {
        *self.last_seen.lock().expect("last_seen lock poisoned") = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen.lock().expect("last_seen lock poisoned").elapsed()
    }
}

/// Tuning knobs for the hub; defaults match spec §4.5 / §6.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub max_subscribers: usize,
    pub broadcast_cadence: Duration,
    pub heartbeat_interval: Duration,
    pub read_deadline: Duration,
    pub write_deadline: Duration,
    pub reaper_interval: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_subscribers: 1024,
            broadcast_cadence: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            read_deadline: Duration::from_secs(60),
            write_deadline: Duration::from_secs(10),
            reaper_interval: Duration::from_secs(300),
        }
    }
}

/// Fans out cluster-health snapshots to subscribed WebSocket clients.
/// Subscriber bookkeeping mirrors the read-mostly `RwLock<HashMap<..>>>`
/// split the teacher uses for `autoheal_controller`'s rules cache: a read
/// lock for fan-out, a write lock only for admission and removal.
pub struct BroadcastHub {
    subscribers: RwLock<HashMap<Uuid, Arc<Subscriber>>>,
    latest: RwLock<Option<ClusterHealth>>,
    config: BroadcastConfig,
}

impl BroadcastHub {
    pub fn new(config: BroadcastConfig) -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(HashMap::new()),
            latest: RwLock::new(None),
            config,
        })
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Called by the monitoring engine whenever a fresh cluster-health
    /// snapshot is available; the next broadcast tick sends it.
    pub async fn set_snapshot(&self, health: ClusterHealth) {
        *self.latest.write().await = Some(health);
    }

    /// Admits a newly-upgraded WebSocket connection. Spawns a writer task
    /// (applies the per-send write deadline to the real socket send) and a
    /// reader task (applies the read deadline, observes pongs and close
    /// frames). Returns the new subscriber id, or `Overload` if the hub is
    /// already at `max_subscribers`.
    pub async fn admit(self: &Arc<Self>, ws: WebSocket) -> Result<Uuid, BroadcastError> {
        if self.subscribers.read().await.len() >= self.config.max_subscribers {
            return Err(BroadcastError::Overload(self.config.max_subscribers));
        }

        let id = Uuid::new_v4();
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let write_deadline = self.config.write_deadline;
        let writer_hub = self.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match timeout(write_deadline, ws_tx.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(subscriber = %id, error = %e, "subscriber write failed");
                        break;
                    }
                    Err(_) => {
                        warn!(subscriber = %id, "subscriber write deadline elapsed");
                        break;
                    }
                }
            }
            let _ = ws_tx.close().await;
            writer_hub.remove(id).await;
        });

        let subscriber = Arc::new(Subscriber {
            tx,
            last_seen: Mutex::new(Instant::now()),
            state: Mutex::new(SubscriberState::Alive),
        });
        self.subscribers.write().await.insert(id, subscriber.clone());
        info!(subscriber = %id, "subscriber admitted");

        let read_deadline = self.config.read_deadline;
        let reader_hub = self.clone();
        tokio::spawn(async move {
            loop {
                match timeout(read_deadline, ws_rx.next()).await {
                    Ok(Some(Ok(message))) => {
                        subscriber.touch();
                        if message.is_close() {
                            break;
                        }
                        // Pong frames only need to reset the deadline above;
                        // any other inbound frame is outside this protocol
                        // and is ignored rather than rejected.
                    }
                    Ok(Some(Err(e))) => {
                        debug!(subscriber = %id, error = %e, "subscriber read error");
                        break;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        debug!(subscriber = %id, "subscriber read deadline elapsed");
                        break;
                    }
                }
            }
            reader_hub.remove(id).await;
        });

        Ok(id)
    }

    async fn remove(&self, id: Uuid) {
        if self.subscribers.write().await.remove(&id).is_some() {
            debug!(subscriber = %id, "subscriber removed");
        }
    }

    async fn heartbeat_tick(&self) {
        let subscribers = self.subscribers.read().await;
        for subscriber in subscribers.values() {
            let _ = subscriber.tx.send(Message::ping(Vec::new()));
        }
    }

    /// Sends the latest snapshot to every subscriber. A subscriber whose
    /// channel is gone (writer task already exited) is collected and
    /// removed only after the fan-out loop finishes, so one dead
    /// subscriber can't perturb iteration over the rest (spec §4.5).
    async fn broadcast_tick(&self) {
        let Some(snapshot) = self.latest.read().await.clone() else {
            return;
        };
        let text = match serde_json::to_string(&snapshot) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to serialize cluster health snapshot");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                if subscriber.tx.send(Message::text(text.clone())).is_err() {
                    dead.push(*id);
                }
            }
        }
        self.remove_all(&dead).await;
    }

    /// Safety net behind the per-connection read deadline: sweeps anything
    /// that has gone quiet for more than twice the read deadline without
    /// its reader task noticing.
    async fn reap_tick(&self) {
        let stale_after = self.config.read_deadline * 2;
        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                if subscriber.idle_for() > stale_after {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            warn!(count = dead.len(), "reaping stale subscribers");
            self.remove_all(&dead).await;
        }
    }

    async fn remove_all(&self, ids: &[Uuid]) {
        if ids.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.write().await;
        for id in ids {
            subscribers.remove(id);
        }
    }

    /// Drives the broadcast/heartbeat/reaper loops until `cancel` fires,
    /// then closes every subscriber with a close frame.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut broadcast_interval = interval(self.config.broadcast_cadence);
        let mut heartbeat_interval = interval(self.config.heartbeat_interval);
        let mut reaper_interval = interval(self.config.reaper_interval);

        loop {
            tokio::select! {
                _ = broadcast_interval.tick() => self.broadcast_tick().await,
                _ = heartbeat_interval.tick() => self.heartbeat_tick().await,
                _ = reaper_interval.tick() => self.reap_tick().await,
                _ = cancel.cancelled() => {
                    self.shutdown().await;
                    break;
                }
            }
        }
    }

    async fn shutdown(&self) {
        let mut subscribers = self.subscribers.write().await;
        for (id, subscriber) in subscribers.drain() {
            let _ = subscriber
                .tx
                .send(Message::close_with(1001u16, "server shutting down"));
            *subscriber.state.lock().expect("state lock poisoned") = SubscriberState::Closed;
            debug!(subscriber = %id, "subscriber closed for shutdown");
        }
        info!("broadcast hub shut down");
    }
}
