//! Reconnecting push channel.
//!
//! A [`StreamChannel`] owns at most one socket at a time. The connection loop
//! authenticates every fresh socket, forwards decoded `update` events, and
//! after any loss waits out the current backoff delay before trying again.
//! Nothing in the loop surfaces errors to callers: failures show up as
//! [`ConnectionState::Disconnected`] and dropped frames.

use crate::backoff::{Backoff, DEFAULT_CEILING, DEFAULT_FLOOR};
use crate::error::{ChannelError, Result};
use crate::event::{InboundEvent, auth_frame, parse_frame};
use crate::pending::PendingTaskRegistry;
use crate::transport::{Frame, StreamConnector, StreamTransport, TungsteniteConnector};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub token: String,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    pub connect_timeout: Duration,
    /// Events buffered per subscriber before the slowest one starts lagging.
    pub event_buffer: usize,
}

impl ChannelConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            backoff_floor: DEFAULT_FLOOR,
            backoff_ceiling: DEFAULT_CEILING,
            connect_timeout: Duration::from_secs(10),
            event_buffer: 256,
        }
    }
}

struct ChannelShared {
    url: Url,
    token: String,
    backoff_floor: Duration,
    backoff_ceiling: Duration,
    state: watch::Sender<ConnectionState>,
    last_event: watch::Sender<Option<InboundEvent>>,
    events: broadcast::Sender<InboundEvent>,
    pending: PendingTaskRegistry,
}

impl ChannelShared {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(url = %self.url, state = next.as_str(), "channel state changed");
        }
    }

    fn on_frame(&self, text: &str) {
        match parse_frame(text) {
            Ok(Some(event)) => {
                debug!(kind = event.kind().as_str(), task_id = ?event.task_id(), "event received");
                self.last_event.send_replace(Some(event.clone()));
                // No subscribers is fine; `last_event` still holds it.
                let _ = self.events.send(event);
            }
            Ok(None) => {}
            Err(error) => {
                debug!(url = %self.url, "dropping malformed frame: {}", error);
            }
        }
    }
}

struct RunningLoop {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Owner of the push connection.
///
/// `connect` on mount, `teardown` on unmount. Dropping the channel aborts the
/// loop without waiting for it.
pub struct StreamChannel {
    shared: Arc<ChannelShared>,
    connector: Arc<dyn StreamConnector>,
    running: Mutex<Option<RunningLoop>>,
}

impl StreamChannel {
    /// Create a channel backed by a real WebSocket connector.
    pub fn new(config: ChannelConfig) -> Result<Self> {
        let connector = TungsteniteConnector {
            connect_timeout: config.connect_timeout,
        };
        Self::with_connector(config, Arc::new(connector))
    }

    /// Create a channel that opens sockets through `connector`.
    pub fn with_connector(
        config: ChannelConfig,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self> {
        let url = Url::parse(config.url.as_str())?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ChannelError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                url.scheme()
            )));
        }

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (last_event, _) = watch::channel(None);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        Ok(Self {
            shared: Arc::new(ChannelShared {
                url,
                token: config.token,
                backoff_floor: config.backoff_floor,
                backoff_ceiling: config.backoff_ceiling,
                state,
                last_event,
                events,
                pending: PendingTaskRegistry::new(),
            }),
            connector,
            running: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        self.shared.url.as_str()
    }

    /// Cloneable read/subscribe view for other components.
    #[must_use]
    pub fn handle(&self) -> StreamHandle {
        StreamHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start the connection loop. A no-op while a loop is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut running = self.lock_running();
        if let Some(current) = running.as_ref()
            && !current.task.is_finished()
        {
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.connector),
            shutdown_rx,
        ));
        *running = Some(RunningLoop { task, shutdown });
    }

    /// Stop the loop, cancel any scheduled reconnect, and close the socket.
    pub async fn teardown(&self) {
        let running = self.lock_running().take();
        if let Some(running) = running {
            running.shutdown.send_replace(true);
            if let Err(error) = running.task.await
                && error.is_panic()
            {
                warn!(url = %self.shared.url, "channel loop panicked");
            }
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            running.task.abort();
        }
    }
}

/// Read side of a [`StreamChannel`].
#[derive(Clone)]
pub struct StreamHandle {
    shared: Arc<ChannelShared>,
}

impl StreamHandle {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Most recent decoded event, if any arrived since construction.
    #[must_use]
    pub fn last_event(&self) -> Option<InboundEvent> {
        self.shared.last_event.borrow().clone()
    }

    pub fn watch_last_event(&self) -> watch::Receiver<Option<InboundEvent>> {
        self.shared.last_event.subscribe()
    }

    /// Every event decoded after this call, in arrival order.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.shared.events.subscribe()
    }

    pub fn register_pending_task(&self, task_id: &str) -> bool {
        self.shared.pending.register(task_id)
    }

    pub fn remove_pending_task(&self, task_id: &str) -> bool {
        self.shared.pending.remove(task_id)
    }

    #[must_use]
    pub fn has_pending_task(&self, task_id: &str) -> bool {
        self.shared.pending.contains(task_id)
    }

    #[must_use]
    pub fn pending_tasks(&self) -> Vec<String> {
        self.shared.pending.snapshot()
    }
}

enum PumpExit {
    Closed,
    Shutdown,
}

async fn run_loop(
    shared: Arc<ChannelShared>,
    connector: Arc<dyn StreamConnector>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(shared.backoff_floor, shared.backoff_ceiling);

    loop {
        if *shutdown.borrow() {
            break;
        }
        shared.set_state(ConnectionState::Connecting);

        let opened = tokio::select! {
            opened = connector.open(&shared.url) => opened,
            _ = shutdown.changed() => break,
        };

        match opened {
            Ok(mut transport) => {
                if let Err(error) = transport.send_text(auth_frame(&shared.token)).await {
                    warn!(url = %shared.url, "auth frame failed: {}", error);
                    transport.close().await;
                } else {
                    backoff.reset();
                    shared.set_state(ConnectionState::Connected);
                    info!(url = %shared.url, "stream connected");

                    let exit = pump(&shared, transport.as_mut(), &mut shutdown).await;
                    if matches!(exit, PumpExit::Shutdown) {
                        transport.close().await;
                        break;
                    }
                }
            }
            Err(error) => {
                debug!(url = %shared.url, "connect failed: {}", error);
            }
        }

        shared.set_state(ConnectionState::Disconnected);
        let delay = backoff.next_delay();
        debug!(url = %shared.url, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}

async fn pump(
    shared: &ChannelShared,
    transport: &mut dyn StreamTransport,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpExit {
    loop {
        let frame = tokio::select! {
            frame = transport.next_frame() => frame,
            _ = shutdown.changed() => return PumpExit::Shutdown,
        };

        match frame {
            Some(Ok(Frame::Text(text))) => shared.on_frame(&text),
            Some(Ok(Frame::Other)) => {}
            Some(Ok(Frame::Close)) | None => {
                info!(url = %shared.url, "stream closed");
                return PumpExit::Closed;
            }
            Some(Err(error)) => {
                warn!(url = %shared.url, "stream error: {}", error);
                transport.close().await;
                return PumpExit::Closed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::testing::ScriptedConnector;
    use tokio::time::{Instant, sleep};

    const EVENT_FRAME: &str =
        r#"{"event":"update","data":{"type":"task.completed","task_id":"t1","result":"done"}}"#;

    fn channel(connector: &ScriptedConnector) -> Result<StreamChannel> {
        StreamChannel::with_connector(
            ChannelConfig::new("ws://localhost:8000/ws/stream", "test-token"),
            Arc::new(connector.clone()),
        )
    }

    async fn wait_for_attempts(connector: &ScriptedConnector, count: usize) {
        while connector.attempts().len() < count {
            sleep(Duration::from_millis(50)).await;
        }
    }

    fn gaps_ms(attempts: &[Instant]) -> Vec<u128> {
        attempts
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis())
            .collect()
    }

    #[test]
    fn rejects_non_websocket_urls() {
        let result = StreamChannel::with_connector(
            ChannelConfig::new("http://localhost:8000/ws/stream", "t"),
            Arc::new(ScriptedConnector::new()),
        );
        assert!(matches!(result, Err(ChannelError::InvalidUrl(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delays_double_up_to_ceiling() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        let channel = channel(&connector)?;
        channel.connect();

        wait_for_attempts(&connector, 8).await;
        channel.teardown().await;

        let gaps = gaps_ms(&connector.attempts()[..8]);
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_backoff() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        connector.refuse_next();
        connector.refuse_next();
        // Accept the third attempt and close it straight away.
        drop(connector.accept_next());

        let channel = channel(&connector)?;
        channel.connect();
        wait_for_attempts(&connector, 5).await;
        channel.teardown().await;

        let gaps = gaps_ms(&connector.attempts()[..5]);
        assert_eq!(gaps, vec![1000, 2000, 1000, 2000]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn sends_exactly_one_auth_frame_then_forwards_events() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        let frames = connector.accept_next();
        let channel = channel(&connector)?;
        let handle = channel.handle();
        let mut events = handle.subscribe();

        channel.connect();
        handle
            .watch_state()
            .wait_for(|state| *state == ConnectionState::Connected)
            .await?;

        frames.send(Ok(Frame::Text(EVENT_FRAME.to_string())))?;
        let event = events.recv().await?;
        assert_eq!(event.kind(), EventKind::TaskCompleted);
        assert_eq!(event.task_id(), Some("t1"));
        assert_eq!(handle.last_event(), Some(event));
        assert_eq!(
            connector.sent_frames(),
            vec![r#"{"type":"auth","token":"test-token"}"#.to_string()]
        );

        channel.teardown().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_leave_last_event_unchanged() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        let frames = connector.accept_next();
        let channel = channel(&connector)?;
        let handle = channel.handle();
        let mut events = handle.subscribe();

        channel.connect();
        handle
            .watch_state()
            .wait_for(|state| *state == ConnectionState::Connected)
            .await?;

        for garbage in [
            "not json",
            "{\"event\":\"update\",\"data\":{\"type\":\"nope\"}}",
            "[1,2,3]",
            "{\"event\":\"ping\"}",
        ] {
            frames.send(Ok(Frame::Text(garbage.to_string())))?;
        }
        frames.send(Ok(Frame::Other))?;
        sleep(Duration::from_millis(10)).await;

        assert_eq!(handle.last_event(), None);
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts().len(), 1);

        frames.send(Ok(Frame::Text(EVENT_FRAME.to_string())))?;
        let event = events.recv().await?;
        assert_eq!(event.task_id(), Some("t1"));

        channel.teardown().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_scheduled_reconnect() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        let channel = channel(&connector)?;
        let handle = channel.handle();
        channel.connect();

        wait_for_attempts(&connector, 2).await;
        channel.teardown().await;
        let attempts = connector.attempts().len();

        sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempts().len(), attempts);
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_while_running() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        let _frames = connector.accept_next();
        let channel = channel(&connector)?;
        let handle = channel.handle();

        channel.connect();
        channel.connect();
        handle
            .watch_state()
            .wait_for(|state| *state == ConnectionState::Connected)
            .await?;
        channel.connect();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(connector.attempts().len(), 1);
        assert_eq!(connector.sent_frames().len(), 1);
        channel.teardown().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_goes_through_close_path() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        let frames = connector.accept_next();
        let channel = channel(&connector)?;
        let handle = channel.handle();

        channel.connect();
        handle
            .watch_state()
            .wait_for(|state| *state == ConnectionState::Connected)
            .await?;
        frames.send(Err(ChannelError::WebSocket("connection reset".to_string())))?;

        handle
            .watch_state()
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await?;
        wait_for_attempts(&connector, 2).await;
        assert_eq!(gaps_ms(&connector.attempts()[..2]), vec![1000]);

        channel.teardown().await;
        Ok(())
    }

    #[test]
    fn pending_tasks_are_shared_through_handles() -> Result<()> {
        let connector = ScriptedConnector::new();
        let channel = channel(&connector)?;
        let first = channel.handle();
        let second = channel.handle();

        assert!(first.register_pending_task("t1"));
        assert!(!first.register_pending_task("t1"));
        assert!(second.has_pending_task("t1"));
        assert!(second.remove_pending_task("t1"));
        assert!(!second.remove_pending_task("t1"));
        assert!(first.pending_tasks().is_empty());
        Ok(())
    }
}
