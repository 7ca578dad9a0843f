//! Turns client state changes into dashboard events.
//!
//! Every mutation goes to `ClientState` first, then a serialized
//! `EventFrame` is published to the hub. Frames carry a monotonically
//! increasing `seq` so the browser can spot gaps left by dropped events.
//!
//! The state change, the `seq` assignment and the publish happen under one
//! lock, so frames reach each browser in `seq` order and the last frame
//! for a field matches the stored state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use burrow_core::status::{ClientState, ConnectionStatus, StatusSource, TunnelInfo};
use burrow_protocol::frames::{events, EventFrame};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ws::broadcast::{Event, Hub};

pub struct StatusPublisher {
    state: Arc<ClientState>,
    hub: Hub,
    seq: Mutex<u64>,
}

impl StatusPublisher {
    pub fn new(state: Arc<ClientState>, hub: Hub) -> Self {
        Self {
            state,
            hub,
            seq: Mutex::new(0),
        }
    }

    pub fn state(&self) -> &Arc<ClientState> {
        &self.state
    }

    fn lock_seq(&self) -> MutexGuard<'_, u64> {
        self.seq.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller holds the `seq` lock from the state change through this call.
    fn emit(&self, seq: &mut u64, event: &str, payload: impl Serialize) {
        let frame = EventFrame::new(event, payload).with_seq(*seq);
        match frame.to_bytes() {
            Ok(bytes) => {
                *seq += 1;
                self.hub.publish(Event::from(bytes));
            }
            Err(e) => warn!(event, error = %e, "event serialization failed"),
        }
    }

    pub fn set_connection_status(&self, status: ConnectionStatus) {
        let mut seq = self.lock_seq();
        if self.state.set_connection_status(status) != status {
            self.emit(&mut seq, events::STATUS, json!({ "connection_status": status }));
        }
    }

    pub fn set_server_version(&self, version: impl Into<String>) {
        let version = version.into();
        let mut seq = self.lock_seq();
        self.state.set_server_version(version.clone());
        self.emit(&mut seq, events::STATUS, json!({ "server_version": version }));
    }

    pub fn set_tunnels(&self, tunnels: Vec<TunnelInfo>) {
        let mut seq = self.lock_seq();
        self.state.set_tunnels(tunnels.clone());
        self.emit(&mut seq, events::TUNNELS, json!({ "tunnels": tunnels }));
    }

    /// Account for one proxied connection and push it to every open dashboard.
    pub fn record_connection(&self, bytes_in: u64, bytes_out: u64) {
        let mut seq = self.lock_seq();
        self.state.record_connection(bytes_in, bytes_out);
        self.emit(
            &mut seq,
            events::TRAFFIC,
            json!({ "bytes_in": bytes_in, "bytes_out": bytes_out }),
        );
    }

    /// Publish a `tick` every `interval` until `cancel` fires.
    pub async fn run_heartbeat(&self, interval: Duration, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // first tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let mut seq = self.lock_seq();
                    self.emit(&mut seq, events::TICK, json!({
                        "ts": chrono::Utc::now().timestamp_millis(),
                        "connection_status": self.state.connection_status(),
                    }));
                }
            }
        }
        debug!("heartbeat stopped");
    }
}
