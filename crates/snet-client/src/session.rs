//! ---
//! snet_section: "04-client-session"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Connection session, receive loop and worker pool."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
//! One broker connection: registration, receive loop and outbound sends.
//!
//! ```text
//! Disconnected -> Connecting -> Registered -> Running -> Closed
//!        \             \             \           \
//!         +-------------+-------------+-----------+--> Failed
//! ```
//!
//! `Closed` and `Failed` are terminal. A session is single use: reconnecting
//! means building a new one.

use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use snet_common::{time, AppConfig, SessionKind};
use snet_state::{history_key, HistoryAggregator, StateCache};
use snet_wire::{
    log_message, peek_type, read_frame_limited, write_frame, ActuatorCommand, Message,
    MessageDirection, SensorData, WireError,
};
use strum::{Display, IntoStaticStr};
use tracing::{debug, error, info, warn};

use crate::metrics::{Counters, SessionMetrics};
use crate::pool::WorkerPool;
use crate::{ClientError, Result};

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// Not yet opened.
    Disconnected,
    /// Dialling the broker.
    Connecting,
    /// Registration sent.
    Registered,
    /// Receive thread running.
    Running,
    /// Closed by the owner.
    Closed,
    /// Connection lost or refused.
    Failed,
}

impl SessionState {
    /// `Closed` and `Failed` never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    fn can_send(&self) -> bool {
        matches!(self, SessionState::Registered | SessionState::Running)
    }
}

/// Callbacks for session activity.
///
/// Invoked synchronously: `on_message` on the receive thread, errors and state
/// changes on whichever thread caused them. Keep them short.
pub trait SessionObserver: Send + Sync {
    /// A routable message arrived and has been applied to the cache.
    fn on_message(&self, _message: &Message) {}

    /// The session moved from `previous` to `current`.
    fn on_state_change(&self, _previous: SessionState, _current: SessionState) {}

    /// The connection failed with `error`, on a receive or a send. Fires at
    /// most once per session.
    fn on_error(&self, _error: &ClientError) {}
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound for the TCP connect.
    pub connect_timeout: Duration,
    /// Inbound frames above this size fail the session.
    pub max_frame_bytes: usize,
    /// Retention window of the history created for the session.
    pub retention: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SessionOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            connect_timeout: config.session.connect_timeout,
            max_frame_bytes: config.session.max_frame_bytes,
            retention: config.history.retention,
        }
    }
}

/// A registered connection to a broker.
///
/// All methods take `&self`; a session can be shared across threads behind an
/// `Arc`. Dropping it closes it.
pub struct Session {
    inner: Arc<Inner>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    kind: SessionKind,
    options: SessionOptions,
    state: Mutex<SessionState>,
    self_id: RwLock<Option<String>>,
    protocol_version: RwLock<Option<String>>,
    writer: Mutex<Option<TcpStream>>,
    // separate handle so close() never waits on a writer blocked in send
    control: Mutex<Option<TcpStream>>,
    stopping: AtomicBool,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
    cache: Arc<StateCache>,
    history: Arc<HistoryAggregator>,
    counters: Counters,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("kind", &self.inner.kind)
            .field("state", &self.state())
            .field("self_id", &self.self_id())
            .finish()
    }
}

impl Session {
    /// Session with default options and its own cache and history.
    pub fn new(kind: SessionKind) -> Self {
        Self::with_options(kind, SessionOptions::default())
    }

    /// Session with explicit options and its own cache and history.
    pub fn with_options(kind: SessionKind, options: SessionOptions) -> Self {
        let history = Arc::new(HistoryAggregator::with_retention(options.retention));
        Self::with_state(kind, options, Arc::new(StateCache::new()), history)
    }

    /// Session feeding an existing cache and history.
    pub fn with_state(
        kind: SessionKind,
        options: SessionOptions,
        cache: Arc<StateCache>,
        history: Arc<HistoryAggregator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                options,
                state: Mutex::new(SessionState::Disconnected),
                self_id: RwLock::new(None),
                protocol_version: RwLock::new(None),
                writer: Mutex::new(None),
                control: Mutex::new(None),
                stopping: AtomicBool::new(false),
                observers: RwLock::new(Vec::new()),
                cache,
                history,
                counters: Counters::default(),
            }),
            receiver: Mutex::new(None),
        }
    }

    /// Session shaped by the `[session]` and `[history]` sections.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_options(config.session.kind, SessionOptions::from(config))
    }

    /// Connect, register as `self_id` and start the receive thread.
    pub fn open(&self, host: &str, port: u16, self_id: &str) -> Result<()> {
        let inner = &self.inner;
        inner.begin_open()?;
        *inner.self_id.write() = Some(self_id.to_owned());

        let addr = format!("{host}:{port}");
        let stream = match connect(host, port, inner.options.connect_timeout) {
            Ok(stream) => stream,
            Err(source) => {
                let err = ClientError::Connection { addr, source };
                warn!(error = %err, "broker connect failed");
                inner.fail(&err);
                return Err(err);
            }
        };
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "could not disable nagle");
        }
        let (reader, control) = match (stream.try_clone(), stream.try_clone()) {
            (Ok(reader), Ok(control)) => (reader, control),
            (Err(source), _) | (_, Err(source)) => {
                let err = ClientError::Connection { addr, source };
                inner.fail(&err);
                return Err(err);
            }
        };
        *inner.writer.lock() = Some(stream);
        *inner.control.lock() = Some(control);
        // a close() that ran before the sockets were stored could not shut them
        if inner.stopping.load(Ordering::SeqCst) {
            inner.release_socket();
            return Err(ClientError::Closed);
        }

        let registration = match inner.kind {
            SessionKind::Node => Message::register_node(inner.kind.role(), self_id),
            SessionKind::ControlPanel => {
                Message::register_control_panel(inner.kind.role(), self_id)
            }
        };
        if let Err(err) = inner.write_message(&registration) {
            if inner.stopping.load(Ordering::SeqCst) {
                return Err(ClientError::Closed);
            }
            let err = ClientError::from(err);
            inner.fail(&err);
            inner.release_socket();
            return Err(err);
        }
        inner.transition(SessionState::Registered);
        info!(addr = %addr, node = self_id, role = inner.kind.role(), "registered with broker");

        let loop_inner = Arc::clone(inner);
        let spawned = thread::Builder::new()
            .name(format!("snet-recv-{self_id}"))
            .spawn(move || loop_inner.receive_loop(reader));
        match spawned {
            Ok(handle) => *self.receiver.lock() = Some(handle),
            Err(source) => {
                let err = ClientError::Spawn(source);
                inner.fail(&err);
                inner.release_socket();
                return Err(err);
            }
        }

        if inner.stopping.load(Ordering::SeqCst) {
            inner.release_socket();
            self.join_receiver();
            return Err(ClientError::Closed);
        }
        inner.transition(SessionState::Running);
        Ok(())
    }

    /// Write one message; serialised with every other send on this session.
    pub fn send(&self, message: &Message) -> Result<()> {
        self.inner.send(message)
    }

    /// Hand a send to `pool`; failures are logged by the worker.
    pub fn send_via(&self, pool: &WorkerPool, message: Message) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        pool.execute(move || {
            if let Err(err) = inner.send(&message) {
                warn!(kind = message.kind(), error = %err, "queued send failed");
            }
        })?;
        Ok(())
    }

    /// Send an `ACTUATOR_COMMAND`.
    pub fn send_command(
        &self,
        target_node: Option<&str>,
        actuator: &str,
        action: &str,
        value: Option<&str>,
    ) -> Result<()> {
        self.send(&Message::actuator_command(
            target_node.map(str::to_owned),
            actuator,
            action,
            value.map(str::to_owned),
        ))
    }

    /// Publish a `SENSOR_DATA` reading stamped with this session's id and the
    /// current time.
    pub fn publish_sensor(&self, sensor_key: &str, value: f64, unit: Option<&str>) -> Result<()> {
        let node_id = self.self_id().ok_or(ClientError::InvalidState {
            operation: "publish",
            state: self.state(),
        })?;
        self.send(&Message::SensorData(SensorData {
            node_id: Some(node_id),
            sensor_key: Some(sensor_key.to_owned()),
            value: Some(value.to_string()),
            unit: unit.map(str::to_owned),
            timestamp: Some(time::to_epoch_millis(&time::now()).to_string()),
        }))
    }

    /// Stop the receive thread and release the socket.
    ///
    /// Idempotent. No observer callback runs after this returns, except when
    /// it is called from an observer on the receive thread, in which case the
    /// thread finishes on its own once the callback returns.
    pub fn close(&self) {
        let inner = &self.inner;
        let first = !inner.stopping.swap(true, Ordering::SeqCst);
        inner.release_socket();
        self.join_receiver();
        inner.transition(SessionState::Closed);
        if first {
            debug!(node = ?self.self_id(), state = %self.state(), "session closed");
        }
    }

    fn join_receiver(&self) {
        let handle = self.receiver.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!(node = ?self.self_id(), "receive thread panicked");
            }
        }
    }

    /// Register an observer; adding the same `Arc` twice is a no-op.
    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        let mut observers = self.inner.observers.write();
        if !observers.iter().any(|existing| same_observer(existing, &observer)) {
            observers.push(observer);
        }
    }

    /// Remove an observer by identity; `false` when it was not registered.
    pub fn remove_observer(&self, observer: &Arc<dyn SessionObserver>) -> bool {
        let mut observers = self.inner.observers.write();
        let before = observers.len();
        observers.retain(|existing| !same_observer(existing, observer));
        observers.len() != before
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Registration role of this session.
    pub fn kind(&self) -> SessionKind {
        self.inner.kind
    }

    /// Identifier used at registration, once `open` has been called.
    pub fn self_id(&self) -> Option<String> {
        self.inner.self_id.read().clone()
    }

    /// Protocol version from the broker's `REGISTER_ACK`, if one arrived.
    pub fn protocol_version(&self) -> Option<String> {
        self.inner.protocol_version.read().clone()
    }

    /// Traffic counters.
    pub fn metrics(&self) -> SessionMetrics {
        self.inner.counters.snapshot()
    }

    /// Latest-value cache fed by this session.
    pub fn cache(&self) -> &Arc<StateCache> {
        &self.inner.cache
    }

    /// Sensor history fed by this session.
    pub fn history(&self) -> &Arc<HistoryAggregator> {
        &self.inner.history
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn begin_open(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Disconnected {
                return Err(ClientError::InvalidState {
                    operation: "open",
                    state: *state,
                });
            }
            *state = SessionState::Connecting;
        }
        self.notify_state(SessionState::Disconnected, SessionState::Connecting);
        Ok(())
    }

    /// Move to `next` unless already there or terminal.
    fn transition(&self, next: SessionState) -> bool {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if previous == next || previous.is_terminal() {
                return false;
            }
            *state = next;
            previous
        };
        debug!(from = %previous, to = %next, "session state changed");
        self.notify_state(previous, next);
        true
    }

    fn fail(&self, err: &ClientError) {
        if self.transition(SessionState::Failed) {
            self.notify(|observer| observer.on_error(err));
        }
    }

    /// Closing, closed or failed: nothing more is dispatched.
    fn halted(&self) -> bool {
        self.stopping.load(Ordering::SeqCst) || self.state.lock().is_terminal()
    }

    fn release_socket(&self) {
        if let Some(stream) = self.control.lock().take() {
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                debug!(error = %err, "socket shutdown");
            }
        }
        self.writer.lock().take();
    }

    fn write_message(&self, message: &Message) -> std::result::Result<(), WireError> {
        let payload = message.to_payload();
        let mut writer = self.writer.lock();
        let stream = writer
            .as_mut()
            .ok_or_else(|| WireError::Io(std::io::ErrorKind::NotConnected.into()))?;
        write_frame(stream, &payload)?;
        drop(writer);
        self.counters.sent();
        log_message(MessageDirection::Outbound, message);
        Ok(())
    }

    fn send(&self, message: &Message) -> Result<()> {
        let state = *self.state.lock();
        if state == SessionState::Closed {
            return Err(ClientError::Closed);
        }
        if !state.can_send() {
            return Err(ClientError::InvalidState {
                operation: "send",
                state,
            });
        }
        match self.write_message(message) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.counters.dropped();
                if self.stopping.load(Ordering::SeqCst) {
                    return Err(ClientError::Closed);
                }
                warn!(kind = message.kind(), error = %err, "send failed");
                let err = ClientError::from(err);
                self.fail(&err);
                self.release_socket();
                Err(err)
            }
        }
    }

    fn receive_loop(&self, stream: TcpStream) {
        let mut reader = BufReader::new(stream);
        loop {
            let frame = read_frame_limited(&mut reader, self.options.max_frame_bytes);
            if self.halted() {
                debug!("receive loop stopped");
                break;
            }
            match frame {
                Ok(payload) => self.dispatch(&payload),
                Err(err) => {
                    self.finish(err);
                    break;
                }
            }
        }
    }

    fn finish(&self, err: WireError) {
        if err.is_disconnect() {
            info!(error = %err, "broker closed the connection");
        } else {
            warn!(error = %err, "receive loop failed");
        }
        self.fail(&ClientError::Wire(err));
        self.release_socket();
    }

    fn dispatch(&self, payload: &[u8]) {
        self.counters.received();
        let Some(message) = Message::from_payload(payload) else {
            self.counters.unroutable();
            let text = String::from_utf8_lossy(payload);
            debug!(
                kind = peek_type(&text).as_deref().unwrap_or("<none>"),
                bytes = payload.len(),
                "skipping unroutable payload"
            );
            return;
        };
        log_message(MessageDirection::Inbound, &message);

        let applied = match &message {
            Message::SensorData(data) => self.apply_sensor_data(data),
            Message::ActuatorCommand(command) => self.apply_actuator_command(command),
            Message::RegisterAck(ack) => {
                if let Some(version) = &ack.protocol_version {
                    info!(version = %version, "broker acknowledged registration");
                    *self.protocol_version.write() = Some(version.clone());
                }
                true
            }
            Message::Heartbeat(_)
            | Message::RegisterNode(_)
            | Message::RegisterControlPanel(_) => true,
        };
        if !applied {
            self.counters.dropped();
            return;
        }
        if self.halted() {
            return;
        }
        self.notify(|observer| observer.on_message(&message));
    }

    fn apply_sensor_data(&self, data: &SensorData) -> bool {
        let (Some(node), Some(sensor), Some(raw)) = (
            data.node_id.as_deref(),
            data.sensor_key.as_deref(),
            data.value.as_deref(),
        ) else {
            warn!(?data, "sensor data missing node, sensor or value");
            return false;
        };
        let value = match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            _ => {
                warn!(node, sensor, value = raw, "sensor value is not numeric");
                return false;
            }
        };
        let timestamp = data
            .timestamp
            .as_deref()
            .and_then(time::parse_timestamp)
            .unwrap_or_else(time::now);
        self.cache
            .apply_sensor(node, sensor, value, data.unit.as_deref(), timestamp);
        self.history
            .add_reading(&history_key(node, sensor), value, timestamp);
        true
    }

    fn apply_actuator_command(&self, command: &ActuatorCommand) -> bool {
        let Some(actuator) = command.actuator.as_deref() else {
            warn!(?command, "actuator command without actuator");
            return false;
        };
        let Some(state) = command.value.as_deref().or(command.action.as_deref()) else {
            warn!(actuator, "actuator command without action or value");
            return false;
        };
        let node = command.target_node.as_deref().unwrap_or("");
        self.cache.apply_actuator(node, actuator, state, time::now());
        true
    }

    fn notify_state(&self, previous: SessionState, current: SessionState) {
        self.notify(|observer| observer.on_state_change(previous, current));
    }

    fn notify<F>(&self, call: F)
    where
        F: Fn(&dyn SessionObserver),
    {
        let observers = self.observers.read().clone();
        for observer in &observers {
            if panic::catch_unwind(AssertUnwindSafe(|| call(&**observer))).is_err() {
                error!("session observer panicked");
            }
        }
    }
}

fn same_observer(a: &Arc<dyn SessionObserver>, b: &Arc<dyn SessionObserver>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn connect(host: &str, port: u16, timeout: Duration) -> std::io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("{host} did not resolve to any address"),
        )
    }))
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[derive(Default)]
    struct Transitions(Mutex<Vec<(SessionState, SessionState)>>);

    impl SessionObserver for Transitions {
        fn on_state_change(&self, previous: SessionState, current: SessionState) {
            self.0.lock().push((previous, current));
        }
    }

    fn refused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    }

    #[test]
    fn states_render_in_snake_case() {
        assert_eq!(SessionState::Running.to_string(), "running");
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Registered.is_terminal());
    }

    #[test]
    fn send_before_open_is_rejected() {
        let session = Session::new(SessionKind::ControlPanel);
        let err = session
            .send(&Message::heartbeat("PING"))
            .expect_err("not open");
        assert!(matches!(
            err,
            ClientError::InvalidState {
                operation: "send",
                state: SessionState::Disconnected
            }
        ));
    }

    #[test]
    fn refused_connect_fails_the_session() {
        let session = Session::new(SessionKind::Node);
        let observer = Arc::new(Transitions::default());
        session.add_observer(observer.clone());

        let err = session
            .open("127.0.0.1", refused_port(), "7")
            .expect_err("nothing listening");
        assert!(matches!(err, ClientError::Connection { .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(
            *observer.0.lock(),
            vec![
                (SessionState::Disconnected, SessionState::Connecting),
                (SessionState::Connecting, SessionState::Failed),
            ]
        );

        let again = session.open("127.0.0.1", refused_port(), "7");
        assert!(matches!(again, Err(ClientError::InvalidState { .. })));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let session = Session::new(SessionKind::ControlPanel);
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.send(&Message::heartbeat("PING")),
            Err(ClientError::Closed)
        ));
        assert!(matches!(
            session.open("127.0.0.1", 1, "panel-1"),
            Err(ClientError::InvalidState { .. })
        ));
    }

    #[test]
    fn observers_register_by_identity() {
        let session = Session::new(SessionKind::ControlPanel);
        let observer: Arc<dyn SessionObserver> = Arc::new(Transitions::default());
        session.add_observer(observer.clone());
        session.add_observer(observer.clone());
        assert!(session.remove_observer(&observer));
        assert!(!session.remove_observer(&observer));
    }

    #[test]
    fn options_follow_config() {
        let mut config = AppConfig::default();
        config.session.max_frame_bytes = 512;
        config.history.retention = Duration::from_secs(60);
        let session = Session::from_config(&config);
        assert_eq!(session.kind(), SessionKind::ControlPanel);
        assert_eq!(session.history().retention(), Duration::from_secs(60));
        assert!(session.self_id().is_none());
    }
}
