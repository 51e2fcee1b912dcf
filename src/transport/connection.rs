//! Gateway connection and event loop.
//!
//! This module owns the TCP session to the LCN-PCK/IP gateway: login,
//! session setup, keepalive, the single-slot command queue and
//! reconnection.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming lines from the gateway (prompts, replies, unsolicited data)
//! - Outgoing commands from the Rust API, one in flight at a time
//! - Handshake, reply and keepalive deadlines
//! - Event handler callbacks
//!
//! The task idles until [`Connection::connect`] and keeps reconnecting
//! after fatal errors until [`Connection::shutdown`].

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::gateway::{
    self, AUTH_FAILED, AUTH_OK, BUS_CONNECTED, LICENSE_ERROR, PING_MODULUS, PROMPT_PASSWORD,
    PROMPT_USERNAME, SessionLine, SetupCommand,
};
use crate::protocol::{AnalogMode, Detector};

use super::framing::LineFramer;
use super::queue::{CommandQueue, Completion, PendingCommand};
use super::state::ConnectionState;

// ============================================================================
// Constants
// ============================================================================

/// Size of the socket read buffer.
const READ_BUFFER: usize = 4096;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
///
/// Called from the connection task for each [`ConnectionEvent`]. The
/// handler must not block.
pub type EventHandler = Box<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Notification from the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Session set up; commands are accepted.
    Connected,
    /// A session that was announced as connected ended.
    Disconnected,
    /// Line no pending command claimed.
    Data(String),
    /// Connection-level failure.
    Error(String),
}

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Settings of a gateway connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Gateway host name or IP.
    pub host: String,
    /// Gateway TCP port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Delay before reconnecting after a fatal error.
    pub reconnect_timeout: Duration,
    /// Reply timeout of commands that do not set their own.
    pub default_timeout: Duration,
    /// Idle time before a keepalive is sent.
    pub ping_interval: Duration,
    /// Reply timeout of a keepalive.
    pub ping_timeout: Duration,
    /// Deadline of TCP connect and of each handshake state.
    pub connect_timeout: Duration,
    /// Output mode selected during session setup.
    pub analog_mode: AnalogMode,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4114,
            user: String::new(),
            password: String::new(),
            reconnect_timeout: Duration::from_secs(10),
            default_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_secs(300),
            ping_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(6),
            analog_mode: AnalogMode::default(),
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Queue a command.
    Enqueue(PendingCommand),
    /// Start connecting.
    Connect,
    /// Close the session and stop reconnecting.
    Shutdown { done: oneshot::Sender<()> },
}

/// Why a session ended.
enum SessionEnd {
    /// Fatal error; reconnect unless shut down.
    Failed(Error),
    /// Shutdown requested.
    Shutdown(oneshot::Sender<()>),
    /// Every handle was dropped.
    Closed,
}

// ============================================================================
// Connection
// ============================================================================

/// Connection to an LCN-PCK/IP gateway.
///
/// Cheap to clone; all clones drive the same connection task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
/// All operations are non-blocking.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Current state (written by the event loop).
    state: Arc<RwLock<ConnectionState>>,
    /// Event handler (shared with event loop).
    event_handler: Arc<Mutex<Option<EventHandler>>>,
    /// Session setup finished and `Connected` was emitted.
    announced: Arc<AtomicBool>,
    /// Reply timeout of commands that do not set their own.
    default_timeout: Duration,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            state: Arc::clone(&self.state),
            event_handler: Arc::clone(&self.event_handler),
            announced: Arc::clone(&self.announced),
            default_timeout: self.default_timeout,
        }
    }
}

impl Connection {
    /// Spawns the connection task on the current tokio runtime.
    ///
    /// The task stays idle until [`connect`](Self::connect) is called, so
    /// an event handler can be installed first.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(config: ConnectionConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let event_handler: Arc<Mutex<Option<EventHandler>>> = Arc::new(Mutex::new(None));
        let announced = Arc::new(AtomicBool::new(false));
        let default_timeout = config.default_timeout;

        let event_loop = EventLoop::new(
            config,
            Arc::clone(&state),
            Arc::clone(&event_handler),
            Arc::clone(&announced),
        );
        tokio::spawn(event_loop.run(command_rx));

        Self {
            command_tx,
            state,
            event_handler,
            announced,
            default_timeout,
        }
    }

    /// Sets the event handler callback.
    pub fn set_event_handler(&self, handler: EventHandler) {
        let mut guard = self.event_handler.lock();
        *guard = Some(handler);
    }

    /// Clears the event handler.
    pub fn clear_event_handler(&self) {
        let mut guard = self.event_handler.lock();
        *guard = None;
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Returns `true` once session setup finished and `Connected` was emitted.
    ///
    /// The state is already [`ConnectionState::Ready`] while the setup
    /// commands run, so this can be `false` in a session state.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.announced.load(Ordering::Acquire)
    }

    /// Returns the reply timeout used when a command sets none.
    #[inline]
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Starts connecting, or reconnects at once if a retry is scheduled.
    pub fn connect(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Connect);
    }

    /// Queues a command and waits for its reply.
    ///
    /// The reply deadline starts when the command is transmitted. Returns
    /// the accepted line, or `None` if the deadline passed with
    /// `ignore_timeout` set.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandTimeout`] if no acceptable reply arrived in time
    /// - [`Error::CommandRejected`] if the gateway answered `(c-error)`
    /// - [`Error::InvalidParameter`] if the gateway answered `(XX:p-error)`
    /// - [`Error::BusDisconnected`] if the bus detached meanwhile
    /// - [`Error::ConnectionClosed`] if the session ended meanwhile
    pub async fn command(
        &self,
        wire: impl Into<String>,
        acceptance: Detector,
        command_timeout: Option<Duration>,
        ignore_timeout: bool,
    ) -> Result<Option<String>> {
        self.submit(wire, acceptance, command_timeout, ignore_timeout)?
            .await
    }

    /// Queues a command without waiting.
    ///
    /// Commands submitted back to back keep their order on the wire; await
    /// the returned [`PendingReply`] for the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop is gone.
    pub fn submit(
        &self,
        wire: impl Into<String>,
        acceptance: Detector,
        command_timeout: Option<Duration>,
        ignore_timeout: bool,
    ) -> Result<PendingReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = PendingCommand::caller(
            wire.into(),
            acceptance,
            command_timeout.unwrap_or(self.default_timeout),
            ignore_timeout,
            reply_tx,
        );

        self.command_tx
            .send(ConnectionCommand::Enqueue(command))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(PendingReply { reply_rx })
    }

    /// Closes the session and stops reconnecting.
    ///
    /// Rejects every queued command with [`Error::ConnectionClosed`] and
    /// returns once the socket is closed.
    pub async fn shutdown(&self) {
        let (done, done_rx) = oneshot::channel();
        if self
            .command_tx
            .send(ConnectionCommand::Shutdown { done })
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }
}

// ============================================================================
// PendingReply
// ============================================================================

/// Outcome of a submitted command, resolved by the event loop.
#[derive(Debug)]
pub struct PendingReply {
    reply_rx: oneshot::Receiver<Result<Option<String>>>,
}

impl Future for PendingReply {
    type Output = Result<Option<String>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.reply_rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::ConnectionClosed)))
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// State owned by the connection task.
struct EventLoop {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    event_handler: Arc<Mutex<Option<EventHandler>>>,
    queue: CommandQueue,
    framer: LineFramer,
    /// `Connected` was emitted for the current session.
    announced: Arc<AtomicBool>,
    /// Legacy first data line, replayed once setup completes.
    legacy_line: Option<String>,
    ping_counter: u8,
    ping_in_flight: bool,
    ping_at: Option<Instant>,
    state_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
    /// Connecting was requested and not shut down since.
    active: bool,
}

impl EventLoop {
    fn new(
        config: ConnectionConfig,
        state: Arc<RwLock<ConnectionState>>,
        event_handler: Arc<Mutex<Option<EventHandler>>>,
        announced: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            state,
            event_handler,
            queue: CommandQueue::new(),
            framer: LineFramer::new(),
            announced,
            legacy_line: None,
            ping_counter: 0,
            ping_in_flight: false,
            ping_at: None,
            state_deadline: None,
            reconnect_at: None,
            active: false,
        }
    }

    /// Event loop: idle, connect, run the session, repeat.
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>) {
        loop {
            if !self.wait_for_start(&mut command_rx).await {
                break;
            }

            match self.run_session(&mut command_rx).await {
                SessionEnd::Failed(err) => self.on_fatal(err),
                SessionEnd::Shutdown(done) => {
                    self.stop();
                    let _ = done.send(());
                }
                SessionEnd::Closed => break,
            }
        }

        self.stop();
        debug!("Event loop terminated");
    }

    /// Waits until a connect is requested or a retry is due.
    ///
    /// Returns `false` when every handle is gone.
    async fn wait_for_start(
        &mut self,
        command_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> bool {
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Connect) => {
                            self.active = true;
                            self.reconnect_at = None;
                            return true;
                        }

                        Some(ConnectionCommand::Enqueue(command)) => self.enqueue_idle(command),

                        Some(ConnectionCommand::Shutdown { done }) => {
                            self.stop();
                            let _ = done.send(());
                        }

                        None => return false,
                    }
                }

                () = sleep_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    return true;
                }
            }
        }
    }

    /// Queues a command while no session runs.
    ///
    /// Commands survive a reconnect but are refused once shut down.
    fn enqueue_idle(&mut self, command: PendingCommand) {
        if self.active {
            self.queue.push(command);
        } else if let Completion::Caller(reply) = command.completion {
            let _ = reply.send(Err(Error::ConnectionClosed));
        }
    }

    /// Opens the socket, bounded by the connect timeout.
    async fn open(
        &mut self,
        command_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> std::result::Result<TcpStream, SessionEnd> {
        self.set_state(ConnectionState::Connecting);

        let host = self.config.host.clone();
        let port = self.config.port;
        let connect_timeout = self.config.connect_timeout;
        info!(%host, port, "Connecting to gateway");

        let connect = timeout(connect_timeout, TcpStream::connect((host.as_str(), port)));
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(Ok(stream)) => Ok(stream),
                        Ok(Err(e)) => Err(SessionEnd::Failed(Error::connection(e.to_string()))),
                        Err(_) => Err(SessionEnd::Failed(Error::connection_timeout(
                            millis(connect_timeout),
                        ))),
                    };
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Enqueue(command)) => self.queue.push(command),
                        Some(ConnectionCommand::Connect) => {}
                        Some(ConnectionCommand::Shutdown { done }) => {
                            return Err(SessionEnd::Shutdown(done));
                        }
                        None => return Err(SessionEnd::Closed),
                    }
                }
            }
        }
    }

    /// Runs one TCP session until it ends.
    async fn run_session(
        &mut self,
        command_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> SessionEnd {
        let stream = match self.open(command_rx).await {
            Ok(stream) => stream,
            Err(end) => return end,
        };
        let _ = stream.set_nodelay(true);
        let (mut reader, mut writer) = stream.into_split();

        debug!("TCP connected, waiting for prompt");
        self.enter_handshake(ConnectionState::WaitPrompt);

        let mut buf = [0u8; READ_BUFFER];

        loop {
            if let Err(err) = self.send_next(&mut writer).await {
                return SessionEnd::Failed(err);
            }

            tokio::select! {
                // Incoming bytes from the gateway
                read = reader.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            debug!("Socket closed by gateway");
                            return SessionEnd::Failed(Error::ConnectionClosed);
                        }

                        Ok(n) => {
                            for line in self.framer.push(&buf[..n]) {
                                if let Err(err) = self.handle_line(line, &mut writer).await {
                                    return SessionEnd::Failed(err);
                                }
                            }
                        }

                        Err(e) => return SessionEnd::Failed(e.into()),
                    }
                }

                // Commands from Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Enqueue(command)) => self.queue.push(command),
                        Some(ConnectionCommand::Connect) => {}
                        Some(ConnectionCommand::Shutdown { done }) => {
                            debug!("Shutdown command received");
                            let _ = writer.shutdown().await;
                            return SessionEnd::Shutdown(done);
                        }
                        None => {
                            debug!("Command channel closed");
                            return SessionEnd::Closed;
                        }
                    }
                }

                // Handshake state deadline
                () = sleep_opt(self.state_deadline) => {
                    warn!(state = %self.current_state(), "Handshake state timed out");
                    return SessionEnd::Failed(Error::connection_timeout(
                        millis(self.config.connect_timeout),
                    ));
                }

                // Reply deadline of the command in flight
                () = sleep_opt(self.queue.deadline()) => {
                    if let Err(err) = self.on_command_timeout() {
                        return SessionEnd::Failed(err);
                    }
                }

                // Keepalive
                () = sleep_opt(self.ping_at) => self.queue_ping(),
            }
        }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Transmits the next queued command if the session is idle.
    async fn send_next(&mut self, writer: &mut OwnedWriteHalf) -> Result<()> {
        if self.current_state() != ConnectionState::Ready {
            return Ok(());
        }

        let Some(command) = self.queue.start_next(Instant::now()) else {
            return Ok(());
        };
        let wire = command.wire.clone();
        let queued_ms = millis(command.enqueued_at.elapsed());

        self.set_state(ConnectionState::WaitResponse);
        self.write_line(writer, &wire).await?;
        debug!(command = %wire, queued_ms, "Command sent");
        Ok(())
    }

    /// Writes one line and re-arms the keepalive.
    async fn write_line(&mut self, writer: &mut OwnedWriteHalf, text: &str) -> Result<()> {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        if self.current_state().is_session() && !self.ping_in_flight {
            self.ping_at = Some(Instant::now() + self.config.ping_interval);
        }
        Ok(())
    }

    // ========================================================================
    // Line Handling
    // ========================================================================

    /// Dispatches one line according to the current state.
    async fn handle_line(&mut self, line: String, writer: &mut OwnedWriteHalf) -> Result<()> {
        let state = self.current_state();
        trace!(%state, %line, "Received line");

        match state {
            ConnectionState::WaitPrompt => {
                if !gateway::is_banner(&line) {
                    return Err(Error::handshake(state, line));
                }
                debug!(banner = %line, "Gateway banner received");
                self.enter_handshake(ConnectionState::WaitUser);
            }

            ConnectionState::WaitUser => {
                if line != PROMPT_USERNAME {
                    return Err(Error::handshake(state, line));
                }
                self.enter_handshake(ConnectionState::WaitPass);
                let user = self.config.user.clone();
                self.write_line(writer, &user).await?;
            }

            ConnectionState::WaitPass => {
                if line != PROMPT_PASSWORD {
                    return Err(Error::handshake(state, line));
                }
                self.enter_handshake(ConnectionState::WaitAuthOk);
                let password = self.config.password.clone();
                self.write_line(writer, &password).await?;
            }

            ConnectionState::WaitAuthOk => {
                if line == AUTH_FAILED {
                    return Err(Error::AuthenticationFailed);
                }
                if line != AUTH_OK {
                    return Err(Error::handshake(state, line));
                }
                debug!("Authenticated");
                self.enter_handshake(ConnectionState::WaitConnected);
            }

            ConnectionState::WaitConnected => self.on_wait_connected(line)?,

            ConnectionState::Ready | ConnectionState::WaitResponse => self.on_session_line(line)?,

            ConnectionState::Connecting | ConnectionState::Disconnect => {
                warn!(%state, %line, "Line received without session");
            }
        }

        Ok(())
    }

    /// Waits for the bus to attach.
    fn on_wait_connected(&mut self, line: String) -> Result<()> {
        if line == LICENSE_ERROR {
            return Err(Error::License);
        }

        let legacy = gateway::is_legacy_data(&line);
        if line != BUS_CONNECTED && !legacy {
            return Err(Error::handshake(ConnectionState::WaitConnected, line));
        }

        if legacy {
            self.legacy_line = Some(line);
        }

        self.state_deadline = None;
        self.set_state(ConnectionState::Ready);

        let setup_timeout = self.config.default_timeout;
        self.queue.push_front(PendingCommand::setup(
            SetupCommand::DecimalMode,
            setup_timeout,
        ));
        self.queue.push_front(PendingCommand::setup(
            SetupCommand::OutputMode(self.config.analog_mode),
            setup_timeout,
        ));

        if !self.ping_in_flight {
            self.ping_at = Some(Instant::now() + self.config.ping_interval);
        }
        debug!("Bus attached, setting up session");
        Ok(())
    }

    /// Handles a line while the session is up.
    fn on_session_line(&mut self, line: String) -> Result<()> {
        match SessionLine::classify(&line) {
            SessionLine::BusDisconnected => {
                warn!("Bus disconnected");
                if let Some(command) = self.queue.finish()
                    && let Completion::Caller(reply) = command.completion
                {
                    let _ = reply.send(Err(Error::BusDisconnected));
                }
                // Setup and keepalive start over once the bus is back.
                self.queue
                    .retain_waiting(|command| command.completion.is_caller());
                self.set_state(ConnectionState::WaitConnected);
                self.ping_in_flight = false;
                self.ping_at = None;
                self.withdraw();
                return Ok(());
            }

            SessionLine::License => return Err(Error::License),

            SessionLine::CommandError => {
                if let Some(command) = self.queue.finish() {
                    let err = Error::CommandRejected {
                        command: command.wire.clone(),
                    };
                    return self.complete(command, Err(err));
                }
            }

            SessionLine::ParameterError(code) => {
                if let Some(command) = self.queue.finish() {
                    let err = Error::InvalidParameter {
                        command: command.wire.clone(),
                        code: code.to_string(),
                    };
                    return self.complete(command, Err(err));
                }
            }

            SessionLine::Other => {
                if self
                    .queue
                    .in_flight()
                    .is_some_and(|command| command.acceptance.accepts(&line))
                    && let Some(command) = self.queue.finish()
                {
                    return self.complete(command, Ok(Some(line)));
                }
            }
        }

        self.emit(ConnectionEvent::Data(line));
        Ok(())
    }

    /// Handles an expired reply deadline.
    fn on_command_timeout(&mut self) -> Result<()> {
        let Some(command) = self.queue.finish() else {
            return Ok(());
        };

        let result = if command.ignore_timeout {
            Ok(None)
        } else {
            warn!(command = %command.wire, "Command timed out");
            Err(Error::command_timeout(
                command.wire.clone(),
                millis(command.timeout),
            ))
        };
        self.complete(command, result)
    }

    /// Delivers the outcome of the command that just left the slot.
    ///
    /// Returns an error if the outcome ends the session.
    fn complete(&mut self, command: PendingCommand, result: Result<Option<String>>) -> Result<()> {
        if self.current_state() == ConnectionState::WaitResponse {
            self.set_state(ConnectionState::Ready);
        }

        match command.completion {
            Completion::Caller(reply) => {
                if reply.send(result).is_err() {
                    trace!(command = %command.wire, "Caller gone before completion");
                }
                Ok(())
            }

            Completion::Setup(setup) => {
                match result {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        return Err(Error::connection_timeout(millis(command.timeout)));
                    }
                    Err(err) if err.is_timeout() => {
                        return Err(Error::connection_timeout(millis(command.timeout)));
                    }
                    Err(err) => return Err(err),
                }

                if setup == SetupCommand::DecimalMode {
                    self.announced.store(true, Ordering::Release);
                    info!("Connected to gateway");
                    self.emit(ConnectionEvent::Connected);
                    if let Some(line) = self.legacy_line.take() {
                        self.emit(ConnectionEvent::Data(line));
                    }
                }
                Ok(())
            }

            Completion::Ping(counter) => {
                self.ping_in_flight = false;
                let line = match result {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => {
                        return Err(Error::connection_timeout(millis(self.config.ping_timeout)));
                    }
                };

                if gateway::ping_echo(&line) != Some(u32::from(counter)) {
                    return Err(Error::PingMismatch {
                        expected: counter,
                        received: line,
                    });
                }

                trace!(counter, "Ping answered");
                self.ping_at = Some(Instant::now() + self.config.ping_interval);
                Ok(())
            }
        }
    }

    /// Queues the next keepalive.
    fn queue_ping(&mut self) {
        self.ping_counter = (self.ping_counter + 1) % PING_MODULUS;
        self.ping_in_flight = true;
        self.ping_at = None;
        trace!(counter = self.ping_counter, "Queueing ping");
        self.queue.push(PendingCommand::ping(
            self.ping_counter,
            self.config.ping_timeout,
        ));
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Tears the session down after a fatal error and schedules a retry.
    fn on_fatal(&mut self, err: Error) {
        error!(error = %err, "Connection failed, reconnecting");
        self.emit(ConnectionEvent::Error(err.to_string()));

        if let Some(command) = self.queue.finish()
            && let Completion::Caller(reply) = command.completion
        {
            let _ = reply.send(Err(Error::ConnectionClosed));
        }
        self.queue
            .retain_waiting(|command| command.completion.is_caller());

        self.reset_session();
        self.set_state(ConnectionState::Connecting);

        if self.active {
            self.reconnect_at = Some(Instant::now() + self.config.reconnect_timeout);
        }
    }

    /// Ends the session on request and rejects everything queued.
    fn stop(&mut self) {
        self.active = false;
        self.reconnect_at = None;

        let mut rejected = 0usize;
        let in_flight = self.queue.finish();
        for command in in_flight.into_iter().chain(self.queue.drain_waiting()) {
            if let Completion::Caller(reply) = command.completion {
                let _ = reply.send(Err(Error::ConnectionClosed));
                rejected += 1;
            }
        }
        if rejected > 0 {
            debug!(count = rejected, "Rejected queued commands on shutdown");
        }

        self.reset_session();
        self.set_state(ConnectionState::Disconnect);
    }

    /// Clears per-session state, announcing the loss if needed.
    fn reset_session(&mut self) {
        self.withdraw();
        self.framer.clear();
        self.legacy_line = None;
        self.ping_in_flight = false;
        self.ping_at = None;
        self.state_deadline = None;
    }

    /// Emits `Disconnected` if the session had been announced.
    fn withdraw(&self) {
        if self.announced.swap(false, Ordering::AcqRel) {
            self.emit(ConnectionEvent::Disconnected);
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    #[inline]
    fn current_state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&mut self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            debug!(from = %previous, to = %next, "State changed");
        }
    }

    /// Enters a handshake state with a fresh deadline.
    fn enter_handshake(&mut self, next: ConnectionState) {
        self.set_state(next);
        self.state_deadline = Some(Instant::now() + self.config.connect_timeout);
    }

    fn emit(&self, event: ConnectionEvent) {
        let handler = self.event_handler.lock();
        if let Some(ref handler) = *handler {
            handler(event);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Sleeps until `deadline`, or forever if there is none.
async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[inline]
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
