//! Realtime connection supervisor.
//!
//! Owns at most one live transport, forwards its traffic to a single ordered
//! listener, and reconnects with exponential backoff when the link drops.
//!
//! All mutable state sits in one `std::sync::Mutex<Shared>`. Transport tasks
//! and reconnect timers capture the generation current when they were
//! spawned; every callback re-checks it under the lock, so work belonging to
//! a retired transport or a cancelled timer is discarded even if it has
//! already woken up.

use crate::connector::{Connector, Transport, WebSocketConnector};
use crate::{
    realtime_url, BackoffPolicy, ConnectionEvent, ConnectionState, Payload, RelayError,
    RelayResult,
};
use classhopper_core::RealtimeConfig;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, Interval};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};
use url::Url;

/// Listener end handed to [`ConnectionSupervisor::connect`].
pub type EventSender = mpsc::UnboundedSender<ConnectionEvent>;

/// Status code reported when the peer's close frame carried none.
const NO_STATUS_RECEIVED: u16 = 1005;

struct Shared {
    state: ConnectionState,
    generation: u64,
    attempt: u32,
    manual_close: bool,
    auto_reconnect: bool,
    token: Option<String>,
    listener: Option<EventSender>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    pending_timer: Option<JoinHandle<()>>,
    session_task: Option<JoinHandle<()>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            generation: 0,
            attempt: 0,
            manual_close: false,
            auto_reconnect: true,
            token: None,
            listener: None,
            outbound: None,
            pending_timer: None,
            session_task: None,
        }
    }

    fn emit(&mut self, event: ConnectionEvent) {
        if let Some(listener) = &self.listener {
            if listener.send(event).is_err() {
                debug!("Listener dropped, detaching");
                self.listener = None;
            }
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.pending_timer.take() {
            timer.abort();
        }
    }

    /// Tear down the current transport without reporting anything for it.
    fn retire_transport(&mut self, reason: &'static str) {
        self.generation += 1;

        match self.outbound.take() {
            Some(outbound) => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: reason.into(),
                };
                let _ = outbound.send(Message::Close(Some(frame)));
                // The task flushes the close frame and exits on its own.
                self.session_task = None;
            }
            None => {
                if let Some(task) = self.session_task.take() {
                    task.abort();
                }
            }
        }
    }

    fn reconnect_eligible(&self) -> bool {
        !self.manual_close
            && self.auto_reconnect
            && self.token.is_some()
            && self.listener.as_ref().is_some_and(|l| !l.is_closed())
            && self.state == ConnectionState::Disconnected
    }
}

struct Inner {
    config: RealtimeConfig,
    backoff: BackoffPolicy,
    connector: Arc<dyn Connector>,
    handle: Handle,
    shared: Mutex<Shared>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a transport task for the stored token. Does not touch `attempt`.
    fn start_session(self: &Arc<Self>, shared: &mut Shared) {
        let Some(token) = shared.token.clone() else {
            return;
        };

        shared.generation += 1;
        let generation = shared.generation;

        let url = match realtime_url(&self.config.url, &token) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Realtime endpoint is not a valid URL");
                shared.state = ConnectionState::Disconnected;
                shared.emit(ConnectionEvent::Failed { error: Arc::new(e) });
                return;
            }
        };

        shared.state = ConnectionState::Connecting;
        info!(
            endpoint = %self.config.url,
            attempt = shared.attempt,
            generation,
            "Connecting realtime channel"
        );

        let inner = Arc::clone(self);
        shared.session_task = Some(self.handle.spawn(run_session(inner, generation, url)));
    }

    fn on_open(&self, generation: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let mut shared = self.lock();
        if shared.generation != generation {
            debug!(generation, "Discarding superseded transport");
            return false;
        }

        shared.state = ConnectionState::Connected;
        shared.attempt = 0;
        shared.outbound = Some(outbound);
        info!(generation, "Realtime channel open");
        shared.emit(ConnectionEvent::Opened);
        true
    }

    fn on_message(&self, generation: u64, payload: Payload) {
        let mut shared = self.lock();
        if shared.generation == generation {
            shared.emit(ConnectionEvent::Message(payload));
        }
    }

    fn on_closing(&self, generation: u64, code: u16, reason: &str) {
        let mut shared = self.lock();
        if shared.generation != generation {
            return;
        }

        info!(code, reason, "Peer is closing realtime channel");
        shared.state = ConnectionState::Disconnected;
        shared.emit(ConnectionEvent::Closing {
            code,
            reason: reason.to_string(),
        });
    }

    /// Closed or failed: the only place reconnects are scheduled from.
    fn on_terminal(self: &Arc<Self>, generation: u64, event: ConnectionEvent) {
        let mut shared = self.lock();
        if shared.generation != generation {
            debug!(generation, "Ignoring terminal event from retired transport");
            return;
        }

        match &event {
            ConnectionEvent::Failed { error } => warn!(error = %error, "Realtime channel failed"),
            _ => info!("Realtime channel closed"),
        }

        shared.state = ConnectionState::Disconnected;
        shared.outbound = None;
        shared.session_task = None;
        shared.emit(event);
        self.maybe_schedule_reconnect(&mut shared);
    }

    fn maybe_schedule_reconnect(self: &Arc<Self>, shared: &mut Shared) {
        if !shared.reconnect_eligible() {
            debug!(
                manual_close = shared.manual_close,
                auto_reconnect = shared.auto_reconnect,
                "Not scheduling reconnect"
            );
            return;
        }

        shared.attempt += 1;
        let attempt = shared.attempt;
        let delay = self.backoff.delay_for_attempt(attempt);

        info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        shared.emit(ConnectionEvent::ReconnectScheduled { attempt, delay });

        shared.cancel_timer();
        let generation = shared.generation;
        let inner = Arc::clone(self);
        shared.pending_timer = Some(self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.on_timer(generation);
        }));
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let mut shared = self.lock();
        if shared.generation != generation {
            return;
        }
        shared.pending_timer = None;

        if !shared.reconnect_eligible() {
            debug!("Reconnect no longer wanted");
            return;
        }
        self.start_session(&mut shared);
    }
}

enum SessionEnd {
    Closed { code: u16, reason: String },
    Failed(RelayError),
    Retired,
}

async fn run_session(inner: Arc<Inner>, generation: u64, url: Url) {
    let transport = match timeout(inner.config.connect_timeout, inner.connector.connect(&url)).await
    {
        Ok(Ok(transport)) => transport,
        Ok(Err(e)) => {
            inner.on_terminal(generation, failed(e));
            return;
        }
        Err(_) => {
            inner.on_terminal(generation, failed(RelayError::Timeout));
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    if !inner.on_open(generation, outbound_tx) {
        return;
    }

    match pump(&inner, generation, transport, outbound_rx).await {
        SessionEnd::Closed { code, reason } => {
            inner.on_terminal(generation, ConnectionEvent::Closed { code, reason })
        }
        SessionEnd::Failed(e) => inner.on_terminal(generation, failed(e)),
        SessionEnd::Retired => debug!(generation, "Transport retired"),
    }
}

fn failed(error: RelayError) -> ConnectionEvent {
    ConnectionEvent::Failed {
        error: Arc::new(error),
    }
}

async fn keepalive_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn pump(
    inner: &Inner,
    generation: u64,
    transport: Transport,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) -> SessionEnd {
    let Transport {
        mut sink,
        mut stream,
    } = transport;
    let config = &inner.config;

    let mut keepalive = config
        .ping_interval
        .map(|period| interval_at(Instant::now() + period, period));
    let dead_after = config
        .ping_interval
        .map(|period| period + config.read_timeout);

    let mut last_seen = Instant::now();
    let mut peer_close: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some(message) = queued else {
                    let _ = timeout(config.write_timeout, sink.close()).await;
                    return SessionEnd::Retired;
                };

                let closing = matches!(message, Message::Close(_));
                match timeout(config.write_timeout, sink.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) if closing => return SessionEnd::Retired,
                    Ok(Err(e)) => return SessionEnd::Failed(e.into()),
                    Err(_) => return SessionEnd::Failed(RelayError::Timeout),
                }
                if closing {
                    let _ = timeout(config.write_timeout, sink.close()).await;
                    return SessionEnd::Retired;
                }
            }

            incoming = stream.next() => {
                last_seen = Instant::now();
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        inner.on_message(generation, Payload::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        inner.on_message(generation, Payload::Binary(bytes.to_vec()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                            .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                        inner.on_closing(generation, code, &reason);
                        peer_close = Some((code, reason));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed))
                        if peer_close.is_some() =>
                    {
                        let (code, reason) = peer_close.take().unwrap_or_default();
                        return SessionEnd::Closed { code, reason };
                    }
                    Some(Err(e)) => return SessionEnd::Failed(e.into()),
                    None => {
                        return match peer_close.take() {
                            Some((code, reason)) => SessionEnd::Closed { code, reason },
                            None => SessionEnd::Failed(RelayError::Connection(
                                "connection lost without close frame".to_string(),
                            )),
                        };
                    }
                }
            }

            _ = keepalive_tick(&mut keepalive) => {
                if dead_after.is_some_and(|limit| last_seen.elapsed() > limit) {
                    warn!(silent_ms = last_seen.elapsed().as_millis() as u64, "Peer stopped responding");
                    return SessionEnd::Failed(RelayError::Timeout);
                }
                let ping = Message::Ping(Vec::<u8>::new().into());
                match timeout(config.write_timeout, sink.send(ping)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return SessionEnd::Failed(e.into()),
                    Err(_) => return SessionEnd::Failed(RelayError::Timeout),
                }
            }
        }
    }
}

/// Supervises one logical realtime session.
///
/// Every method is synchronous and safe to call from any thread; network work
/// runs on the Tokio runtime captured at construction.
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
}

impl ConnectionSupervisor {
    /// Create a supervisor on the current Tokio runtime.
    pub fn new(config: RealtimeConfig, connector: Arc<dyn Connector>) -> RelayResult<Self> {
        let handle = Handle::try_current().map_err(|e| RelayError::Runtime(e.to_string()))?;
        Ok(Self::with_handle(config, connector, handle))
    }

    pub fn with_handle(
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        handle: Handle,
    ) -> Self {
        let backoff = BackoffPolicy::from_config(&config);
        Self {
            inner: Arc::new(Inner {
                config,
                backoff,
                connector,
                handle,
                shared: Mutex::new(Shared::new()),
            }),
        }
    }

    /// Supervisor over real WebSockets.
    pub fn websocket(config: RealtimeConfig, insecure_tls: bool) -> RelayResult<Self> {
        let connector = WebSocketConnector::from_config(insecure_tls)?;
        Self::new(config, Arc::new(connector))
    }

    /// Open (or replace) the session for `token`, delivering events to
    /// `listener`. Resets backoff.
    pub fn connect(&self, token: impl Into<String>, listener: EventSender) {
        let mut shared = self.inner.lock();

        shared.cancel_timer();
        shared.retire_transport("Reconnect");
        shared.attempt = 0;
        shared.manual_close = false;
        shared.state = ConnectionState::Disconnected;
        shared.token = Some(token.into());
        shared.listener = Some(listener);

        self.inner.start_session(&mut shared);
    }

    /// Queue a frame on the open transport. `false` if nothing is open.
    pub fn send(&self, payload: impl Into<Payload>) -> bool {
        let shared = self.inner.lock();
        if shared.state != ConnectionState::Connected {
            return false;
        }
        shared
            .outbound
            .as_ref()
            .is_some_and(|outbound| outbound.send(payload.into().into_message()).is_ok())
    }

    /// Close the session. Nothing reconnects until the next `connect`.
    pub fn close(&self) {
        let mut shared = self.inner.lock();

        shared.manual_close = true;
        shared.cancel_timer();
        shared.retire_transport("Normal Closure");
        shared.token = None;
        shared.listener = None;
        shared.attempt = 0;
        shared.state = ConnectionState::Disconnected;

        info!("Realtime channel closed by client");
    }

    pub fn set_auto_reconnect_enabled(&self, enabled: bool) {
        let mut shared = self.inner.lock();
        shared.auto_reconnect = enabled;
        if !enabled {
            shared.cancel_timer();
        }
        debug!(enabled, "Auto reconnect toggled");
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.lock().attempt
    }

    pub fn auto_reconnect_enabled(&self) -> bool {
        self.inner.lock().auto_reconnect
    }

    /// Delay the supervisor would use for reconnect attempt `attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.inner.backoff.delay_for_attempt(attempt)
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.close();
    }
}
