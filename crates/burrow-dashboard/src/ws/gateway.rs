//! Per-connection drain loop: hub subscription in, socket writes out.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ws::broadcast::{Event, Subscription};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("write failed: {0}")]
    Write(#[from] axum::Error),

    #[error("connection closed")]
    Closed,

    #[error("write timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Downstream half of a streaming connection.
#[async_trait]
pub trait EventSink: Send {
    async fn write_event(&mut self, event: &Event) -> Result<(), GatewayError>;
}

/// Why a gateway stopped pumping.
#[derive(Debug, PartialEq, Eq)]
pub enum PumpExit {
    /// The hub closed the subscription (shutdown).
    HubClosed,
    /// The peer went away or the read side failed.
    PeerClosed,
    /// A write failed or timed out; the connection is considered dead.
    WriteFailed,
}

/// Write every event delivered to `subscription` onto `sink` until the hub
/// closes it, a write fails, or `peer_closed` resolves.
///
/// The subscription is consumed: it is dropped (and therefore unregistered)
/// on every exit path, exactly once.
pub async fn pump<S, F>(
    mut subscription: Subscription,
    sink: &mut S,
    write_timeout: Duration,
    peer_closed: F,
) -> PumpExit
where
    S: EventSink + ?Sized,
    F: Future<Output = ()>,
{
    let id = subscription.id();
    tokio::pin!(peer_closed);

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!(subscriber = %id, "hub closed subscription");
                    return PumpExit::HubClosed;
                };
                let result = match tokio::time::timeout(write_timeout, sink.write_event(&event)).await {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Timeout { secs: write_timeout.as_secs() }),
                };
                if let Err(e) = result {
                    warn!(subscriber = %id, error = %e, "dropping streaming connection");
                    return PumpExit::WriteFailed;
                }
            }

            _ = &mut peer_closed => {
                debug!(subscriber = %id, "peer closed streaming connection");
                return PumpExit::PeerClosed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::broadcast::Hub;
    use burrow_core::config::DashboardConfig;
    use std::sync::{Arc, Mutex};

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Records every write; fails once `fail_after` writes have succeeded.
    #[derive(Clone, Default)]
    struct RecordingSink {
        written: Arc<Mutex<Vec<Event>>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn write_event(&mut self, event: &Event) -> Result<(), GatewayError> {
            let mut written = self.written.lock().unwrap();
            if self.fail_after.is_some_and(|n| written.len() >= n) {
                return Err(GatewayError::Closed);
            }
            written.push(event.clone());
            Ok(())
        }
    }

    /// Never completes a write.
    struct StuckSink;

    #[async_trait]
    impl EventSink for StuckSink {
        async fn write_event(&mut self, _event: &Event) -> Result<(), GatewayError> {
            std::future::pending().await
        }
    }

    /// Needs one extra poll before each write lands.
    struct YieldingSink(Vec<Event>);

    #[async_trait]
    impl EventSink for YieldingSink {
        async fn write_event(&mut self, event: &Event) -> Result<(), GatewayError> {
            tokio::task::yield_now().await;
            self.0.push(event.clone());
            Ok(())
        }
    }

    async fn wait_for_subscribers(hub: &Hub, n: usize) {
        while hub.subscriber_count() != n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn hub_close_ends_pump_and_unregisters() {
        let hub = Hub::new(16);
        let sink = RecordingSink::default();
        let written = sink.written.clone();

        let sub = hub.register();
        let task = tokio::spawn(async move {
            let mut sink = sink;
            pump(sub, &mut sink, TIMEOUT, std::future::pending()).await
        });

        hub.publish(Event::from("one"));
        hub.publish(Event::from("two"));
        hub.close();

        assert_eq!(task.await.unwrap(), PumpExit::HubClosed);
        assert_eq!(*written.lock().unwrap(), vec![Event::from("one"), Event::from("two")]);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn write_failure_is_local() {
        let hub = Hub::new(16);
        let mut broken = RecordingSink {
            fail_after: Some(1),
            ..Default::default()
        };
        let healthy = RecordingSink::default();
        let healthy_written = healthy.written.clone();

        let broken_sub = hub.register();
        let healthy_sub = hub.register();
        let healthy_task = tokio::spawn(async move {
            let mut sink = healthy;
            pump(healthy_sub, &mut sink, TIMEOUT, std::future::pending()).await
        });

        for msg in ["a", "b", "c"] {
            hub.publish(Event::from(msg));
        }
        let exit = pump(broken_sub, &mut broken, TIMEOUT, std::future::pending()).await;
        assert_eq!(exit, PumpExit::WriteFailed);
        assert_eq!(hub.subscriber_count(), 1);

        hub.publish(Event::from("d"));
        hub.close();
        assert_eq!(healthy_task.await.unwrap(), PumpExit::HubClosed);
        assert_eq!(
            *healthy_written.lock().unwrap(),
            vec![Event::from("a"), Event::from("b"), Event::from("c"), Event::from("d")]
        );
    }

    #[tokio::test]
    async fn peer_close_unregisters() {
        let hub = Hub::new(16);
        let (closed_tx, closed_rx) = tokio::sync::oneshot::channel::<()>();
        let sub = hub.register();
        let task = tokio::spawn(async move {
            let mut sink = RecordingSink::default();
            pump(sub, &mut sink, TIMEOUT, async {
                let _ = closed_rx.await;
            })
            .await
        });

        wait_for_subscribers(&hub, 1).await;
        closed_tx.send(()).unwrap();

        assert_eq!(task.await.unwrap(), PumpExit::PeerClosed);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_write_times_out() {
        let hub = Hub::new(16);
        let sub = hub.register();
        hub.publish(Event::from("never lands"));

        let exit = pump(sub, &mut StuckSink, Duration::from_secs(10), std::future::pending()).await;

        assert_eq!(exit, PumpExit::WriteFailed);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn zero_configured_timeout_still_allows_pending_writes() {
        let config = DashboardConfig {
            write_timeout_secs: 0,
            ..Default::default()
        };
        let hub = Hub::new(16);
        let sub = hub.register();
        hub.publish(Event::from("a"));
        hub.publish(Event::from("b"));
        hub.close();

        let mut sink = YieldingSink(Vec::new());
        let exit = pump(sub, &mut sink, config.write_timeout(), std::future::pending()).await;

        assert_eq!(exit, PumpExit::HubClosed);
        assert_eq!(sink.0, vec![Event::from("a"), Event::from("b")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_gateways_receive_in_order() {
        let hub = Hub::new(256);
        let mut tasks = Vec::new();
        let mut logs = Vec::new();
        for _ in 0..10 {
            let sink = RecordingSink::default();
            logs.push(sink.written.clone());
            let sub = hub.register();
            tasks.push(tokio::spawn(async move {
                let mut sink = sink;
                pump(sub, &mut sink, TIMEOUT, std::future::pending()).await
            }));
        }

        for i in 0..100u32 {
            hub.publish(Event::from(i.to_string()));
        }
        hub.close();

        for task in tasks {
            assert_eq!(task.await.unwrap(), PumpExit::HubClosed);
        }
        let expected: Vec<Event> = (0..100u32).map(|i| Event::from(i.to_string())).collect();
        for log in logs {
            assert_eq!(*log.lock().unwrap(), expected);
        }
    }
}
