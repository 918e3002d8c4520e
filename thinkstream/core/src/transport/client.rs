//! Push Transport Client
//!
//! Client-side supervisor for the push channel. [`PushTransport::start`] spawns
//! one supervisor task that owns the physical connection, drives the
//! reconnect state machine and broadcasts decoded envelopes to the
//! [`SubscriberRegistry`]. The returned handle is cheap to clone and is what
//! callers hold instead of a global accessor.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};

use crate::envelope::Envelope;

use super::config::TransportConfig;
use super::registry::{SubscriberId, SubscriberRegistry, Subscription};
use super::traits::{Connector, InboundFrame, PushConnection};

/// Connection state of the push channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// A connection attempt is in progress
    Connecting,
    /// The connection is open and envelopes are flowing
    Open,
    /// The connection is closed; a reconnect may be scheduled
    Closed,
    /// Reconnect attempts are exhausted; only `reconnect()` resumes
    GaveUp,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::GaveUp => write!(f, "gave up"),
        }
    }
}

/// Shared state between the handle and the supervisor task
struct Shared {
    config: TransportConfig,
    subscribers: SubscriberRegistry,
    state_tx: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    /// Writer for the open connection, if any
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    reconnect: Notify,
    shutdown_tx: watch::Sender<bool>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }
}

/// Handle to the push channel
///
/// Construction opens the connection immediately. All clones share one
/// physical connection and one subscriber list.
#[derive(Clone)]
pub struct PushTransport {
    shared: Arc<Shared>,
}

impl PushTransport {
    /// Start the transport and begin connecting
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: TransportConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            subscribers: SubscriberRegistry::new(config.subscriber_capacity),
            config,
            state_tx,
            attempts: AtomicU32::new(0),
            outbound: Mutex::new(None),
            reconnect: Notify::new(),
            shutdown_tx,
        });

        tokio::spawn(supervise(Arc::clone(&shared), connector));

        Self { shared }
    }

    /// Register a subscriber that receives every decoded envelope
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.shared.subscribers.subscribe()
    }

    /// Remove a subscriber
    ///
    /// Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.shared.subscribers.unsubscribe(id)
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.count()
    }

    /// Send an envelope to the server
    ///
    /// Best effort: when the connection is not open the envelope is dropped
    /// and a warning is logged. Returns true if the envelope was handed to the
    /// connection writer.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let writer = self.shared.outbound.lock().clone();
        let Some(writer) = writer.filter(|_| self.shared.state() == ConnectionState::Open) else {
            tracing::warn!(
                kind = %envelope.kind,
                state = %self.state(),
                "Push channel not open, dropping outbound envelope"
            );
            return false;
        };

        let text = match envelope.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode outbound envelope");
                return false;
            }
        };

        match writer.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Push channel writer unavailable, dropping envelope");
                false
            }
        }
    }

    /// Resume connecting after the transport gave up
    ///
    /// The retry counter is not reset here; it resets once a connection opens.
    /// Returns false (and does nothing) unless the transport is in
    /// [`ConnectionState::GaveUp`].
    pub fn reconnect(&self) -> bool {
        if self.shared.state() != ConnectionState::GaveUp {
            tracing::debug!(state = %self.state(), "Ignoring manual reconnect");
            return false;
        }
        tracing::info!("Manual reconnect requested");
        self.shared.reconnect.notify_one();
        true
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch connection state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Reconnect attempts made since the last successful open
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// The configuration this transport was started with
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    /// Stop the supervisor, close the connection and end all subscriptions
    pub fn shutdown(&self) {
        self.shared.shutdown_tx.send_replace(true);
        self.shared.subscribers.clear();
    }
}

impl fmt::Debug for PushTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushTransport")
            .field("endpoint", &self.shared.config.endpoint)
            .field("state", &self.state())
            .field("attempts", &self.reconnect_attempts())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Resolves once shutdown has been requested
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Why the pump loop returned
enum PumpExit {
    Closed,
    Shutdown,
}

/// Connection supervisor: connect, pump, back off, repeat
async fn supervise(shared: Arc<Shared>, connector: Arc<dyn Connector>) {
    let mut shutdown = shared.shutdown_tx.subscribe();
    let endpoint = shared.config.endpoint.clone();
    let max_attempts = shared.config.max_reconnect_attempts;
    let delay = shared.config.reconnect_delay();

    loop {
        shared.set_state(ConnectionState::Connecting);
        tracing::debug!(
            endpoint = %endpoint,
            attempt = shared.attempts.load(Ordering::SeqCst),
            "Connecting to push channel"
        );

        let result = tokio::select! {
            result = connector.connect(&endpoint) => result,
            () = shutdown_requested(&mut shutdown) => break,
        };

        match result {
            Ok(connection) => {
                shared.attempts.store(0, Ordering::SeqCst);
                let exit = run_connection(&shared, connection, &mut shutdown).await;
                shared.set_state(ConnectionState::Closed);
                if matches!(exit, PumpExit::Shutdown) {
                    break;
                }
                tracing::info!(endpoint = %endpoint, "Push channel closed");
            }
            Err(e) => {
                shared.set_state(ConnectionState::Closed);
                tracing::warn!(endpoint = %endpoint, error = %e, "Push channel connection failed");
            }
        }

        let attempts = shared.attempts.load(Ordering::SeqCst);
        if attempts >= max_attempts {
            tracing::warn!(
                endpoint = %endpoint,
                max_attempts,
                "Reconnect attempts exhausted, waiting for manual reconnect"
            );
            shared.set_state(ConnectionState::GaveUp);
            tokio::select! {
                () = shared.reconnect.notified() => continue,
                () = shutdown_requested(&mut shutdown) => break,
            }
        }

        shared.attempts.store(attempts + 1, Ordering::SeqCst);
        tracing::info!(
            attempt = attempts + 1,
            max_attempts,
            delay_ms = shared.config.reconnect_delay_ms,
            "Scheduling reconnect"
        );

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shutdown_requested(&mut shutdown) => break,
        }
    }

    *shared.outbound.lock() = None;
    shared.set_state(ConnectionState::Closed);
    tracing::info!(endpoint = %endpoint, "Push transport stopped");
}

/// Pump one open connection until the peer goes away or shutdown
async fn run_connection(
    shared: &Shared,
    connection: PushConnection,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpExit {
    let PushConnection {
        mut inbound,
        outbound,
    } = connection;

    *shared.outbound.lock() = Some(outbound);
    shared.set_state(ConnectionState::Open);
    tracing::info!(endpoint = %shared.config.endpoint, "Push channel open");

    let exit = loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(InboundFrame::Text(text)) => dispatch(shared, &text),
                Some(InboundFrame::Binary(bytes)) => {
                    tracing::warn!(len = bytes.len(), "Dropping unexpected binary frame");
                }
                None => break PumpExit::Closed,
            },
            () = shutdown_requested(shutdown) => break PumpExit::Shutdown,
        }
    };

    // Dropping the writer closes the connection
    *shared.outbound.lock() = None;
    exit
}

/// Decode one text frame and hand it to every subscriber
fn dispatch(shared: &Shared, text: &str) {
    match Envelope::decode(text) {
        Ok(Some(envelope)) => {
            let result = shared.subscribers.broadcast(&envelope);
            tracing::trace!(
                kind = %envelope.kind,
                delivered = result.delivered,
                full = result.full.len(),
                "Envelope dispatched"
            );
        }
        Ok(None) => {
            tracing::debug!("Ignoring envelope with unknown type");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed envelope");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::transport::in_process::InProcessConnector;

    fn fast_config(max_reconnect_attempts: u32) -> TransportConfig {
        TransportConfig {
            endpoint: "ws://test.invalid:3001".to_string(),
            max_reconnect_attempts,
            reconnect_delay_ms: 5,
            subscriber_capacity: 16,
        }
    }

    async fn wait_for_state(transport: &PushTransport, target: ConnectionState) {
        let mut rx = transport.watch_state();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == target))
            .await
            .expect("timed out waiting for transport state")
            .expect("transport state channel closed");
    }

    #[tokio::test]
    async fn test_open_and_deliver_envelopes_in_order() {
        let connector = InProcessConnector::new();
        let peer = connector.accept_next();
        let transport = PushTransport::start(fast_config(5), Arc::new(connector.clone()));
        let mut sub = transport.subscribe();

        wait_for_state(&transport, ConnectionState::Open).await;
        assert!(peer.push_envelope(&Envelope::thinking("one")).await);
        assert!(peer.push_envelope(&Envelope::answer("two")).await);

        assert_eq!(sub.recv().await.unwrap(), Envelope::thinking("one"));
        assert_eq!(sub.recv().await.unwrap(), Envelope::answer("two"));
        assert_eq!(transport.reconnect_attempts(), 0);

        transport.shutdown();
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_every_envelope() {
        let connector = InProcessConnector::new();
        let peer = connector.accept_next();
        let transport = PushTransport::start(fast_config(5), Arc::new(connector));
        let mut first = transport.subscribe();
        let mut second = transport.subscribe();

        wait_for_state(&transport, ConnectionState::Open).await;
        peer.push_envelope(&Envelope::status("ready")).await;

        assert_eq!(first.recv().await.unwrap().payload, "ready");
        assert_eq!(second.recv().await.unwrap().payload, "ready");
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_stalled_subscriber_neither_starves_others_nor_blocks_shutdown() {
        let connector = InProcessConnector::new();
        let peer = connector.accept_next();
        let config = TransportConfig {
            subscriber_capacity: 2,
            ..fast_config(5)
        };
        let transport = PushTransport::start(config, Arc::new(connector));
        let _stalled = transport.subscribe();
        let mut reader = transport.subscribe();

        wait_for_state(&transport, ConnectionState::Open).await;
        let mut received = 0;
        for i in 0..6 {
            assert!(peer.push_envelope(&Envelope::thinking(format!("step {i}"))).await);
            let envelope = tokio::time::timeout(Duration::from_secs(2), reader.recv())
                .await
                .expect("reader starved by stalled subscriber")
                .unwrap();
            assert_eq!(envelope.payload, format!("step {i}"));
            received += 1;
        }
        assert_eq!(received, 6);

        transport.shutdown();
        wait_for_state(&transport, ConnectionState::Closed).await;
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped_without_reconnect() {
        let connector = InProcessConnector::new();
        let peer = connector.accept_next();
        let transport = PushTransport::start(fast_config(5), Arc::new(connector.clone()));
        let mut sub = transport.subscribe();

        wait_for_state(&transport, ConnectionState::Open).await;
        peer.push_text("{not json").await;
        peer.push_text(r#"{"type":"mystery","content":"?"}"#).await;
        peer.push_frame(InboundFrame::Binary(vec![1, 2, 3])).await;
        peer.push_envelope(&Envelope::thinking("valid")).await;

        assert_eq!(sub.recv().await.unwrap().payload, "valid");
        assert!(sub.try_recv().is_none());
        assert_eq!(transport.state(), ConnectionState::Open);
        assert_eq!(connector.connect_attempts(), 1);
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_send_requires_open_connection() {
        let connector = InProcessConnector::new();
        let transport = PushTransport::start(fast_config(0), Arc::new(connector));

        wait_for_state(&transport, ConnectionState::GaveUp).await;
        assert!(!transport.send(&Envelope::status("hello?")));
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_send_while_open_reaches_peer() {
        let connector = InProcessConnector::new();
        let mut peer = connector.accept_next();
        let transport = PushTransport::start(fast_config(5), Arc::new(connector));

        wait_for_state(&transport, ConnectionState::Open).await;
        assert!(transport.send(&Envelope::status("hello")));

        let frame = peer.next_outbound().await.unwrap();
        assert_eq!(Envelope::decode(&frame).unwrap(), Some(Envelope::status("hello")));
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_reconnects_after_peer_closes() {
        let connector = InProcessConnector::new();
        let first = connector.accept_next();
        let second = connector.accept_next();
        let transport = PushTransport::start(fast_config(5), Arc::new(connector.clone()));
        let mut sub = transport.subscribe();

        wait_for_state(&transport, ConnectionState::Open).await;
        drop(first);

        // The second queued connection is picked up after one back-off
        second.push_envelope(&Envelope::thinking("after reconnect")).await;
        assert_eq!(sub.recv().await.unwrap().payload, "after reconnect");
        assert_eq!(connector.connect_attempts(), 2);
        assert_eq!(transport.reconnect_attempts(), 0);
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts_then_manual_reconnect_resets() {
        let connector = InProcessConnector::new();
        let transport = PushTransport::start(fast_config(5), Arc::new(connector.clone()));

        wait_for_state(&transport, ConnectionState::GaveUp).await;
        // Initial attempt plus five retries
        assert_eq!(connector.connect_attempts(), 6);
        assert_eq!(transport.reconnect_attempts(), 5);

        // Stays given up
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(connector.connect_attempts(), 6);
        assert_eq!(transport.state(), ConnectionState::GaveUp);

        let _peer = connector.accept_next();
        assert!(transport.reconnect());
        wait_for_state(&transport, ConnectionState::Open).await;
        assert_eq!(transport.reconnect_attempts(), 0);
        assert_eq!(connector.connect_attempts(), 7);
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_manual_reconnect_ignored_unless_given_up() {
        let connector = InProcessConnector::new();
        let _peer = connector.accept_next();
        let transport = PushTransport::start(fast_config(5), Arc::new(connector));

        wait_for_state(&transport, ConnectionState::Open).await;
        assert!(!transport.reconnect());
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_ends_subscriptions() {
        let connector = InProcessConnector::new();
        let peer = connector.accept_next();
        let transport = PushTransport::start(fast_config(5), Arc::new(connector));
        let mut sub = transport.subscribe();

        wait_for_state(&transport, ConnectionState::Open).await;
        transport.shutdown();

        assert!(sub.recv().await.is_none());
        wait_for_state(&transport, ConnectionState::Closed).await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while !peer.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("peer never saw the connection close");
    }
}
