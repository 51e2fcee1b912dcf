//! LCN driver facade.
//!
//! The [`Lcn`] struct binds the gateway [`Connection`] to the protocol
//! [`Codec`]: it encodes typed requests, decodes unsolicited module
//! reports into `Update` events and owns the scan slot.
//!
//! # Example
//!
//! ```no_run
//! use lcn_pck::{CommandKind, Event, Lcn};
//!
//! # async fn example() -> lcn_pck::Result<()> {
//! let lcn = Lcn::builder()
//!     .host("192.168.1.20")
//!     .credentials("lcn", "lcn")
//!     .build()?;
//!
//! let mut events = lcn.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if event == Event::Connected {
//!         break;
//!     }
//! }
//!
//! lcn.control(0, 12, CommandKind::RelayOut, 3u8, true).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::Address;
use crate::protocol::{
    AckStatus, Codec, CommandKind, ControlValue, Event, Output, Request, StateRecord, StateValue,
};
use crate::scanner::ScanSession;
use crate::transport::{Connection, ConnectionEvent, ConnectionState, PendingReply};

use super::builder::LcnBuilder;
use super::options::LcnOptions;
use super::read::{ModuleReadPlan, ReadOperation};

// ============================================================================
// Constants
// ============================================================================

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

/// Reply wait per display text frame.
const DISPLAY_FRAME_TIMEOUT: Duration = Duration::from_millis(200);

/// Pause between modules in [`Lcn::read_modules`].
const READ_MODULES_PACING: Duration = Duration::from_millis(1200);

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the driver.
pub(crate) struct LcnInner {
    /// Validated options.
    pub options: LcnOptions,

    /// Encoder/decoder for the configured analog mode.
    pub codec: Codec,

    /// Gateway connection.
    pub connection: Connection,

    /// Event fan-out.
    pub events: broadcast::Sender<Event>,

    /// `true` between `Connected` and `Disconnected`.
    pub connected: watch::Sender<bool>,

    /// The running scan, if any.
    pub scan: Mutex<Option<ScanSession>>,
}

// ============================================================================
// Lcn
// ============================================================================

/// Driver for one LCN-PCK/IP gateway.
///
/// Cheap to clone; all clones share the connection. The driver connects
/// on creation and reconnects on its own until [`destroy`](Self::destroy).
#[derive(Clone)]
pub struct Lcn {
    /// Shared inner state.
    pub(crate) inner: Arc<LcnInner>,
}

// ============================================================================
// Lcn - Display
// ============================================================================

impl fmt::Debug for Lcn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lcn")
            .field("host", &self.inner.options.host)
            .field("port", &self.inner.options.port)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Lcn - Public API
// ============================================================================

impl Lcn {
    /// Creates a configuration builder for the driver.
    #[inline]
    #[must_use]
    pub fn builder() -> LcnBuilder {
        LcnBuilder::new()
    }

    /// Creates the driver and starts connecting.
    ///
    /// Options must already be validated and a tokio runtime must be
    /// running; [`LcnBuilder::build`] checks both.
    pub(crate) fn new(options: LcnOptions) -> Self {
        let connection = Connection::spawn(options.connection_config());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (connected, _) = watch::channel(false);

        let inner = Arc::new(LcnInner {
            codec: Codec::new(options.analog_mode),
            options,
            connection,
            events,
            connected,
            scan: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        inner.connection.set_event_handler(Box::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_connection_event(event);
            }
        }));
        inner.connection.connect();

        Self { inner }
    }

    /// Subscribes to driver events.
    ///
    /// Events sent before subscribing are not replayed.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Returns `true` while the session is set up.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Returns `true` while a scan runs.
    #[inline]
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scan_segment_active().is_some()
    }

    /// Returns the driver options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &LcnOptions {
        &self.inner.options
    }

    /// Returns the codec in use.
    #[inline]
    #[must_use]
    pub fn codec(&self) -> Codec {
        self.inner.codec
    }

    /// Sets an output and returns the decoded reply.
    ///
    /// `output` is an output number, or `A1`..`D8` for buttons; for
    /// [`CommandKind::DisplayOut`] it is the display line. Display text is
    /// written in frames of twelve characters; an empty text clears the
    /// line.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the session is not set up
    /// - [`Error::NotControllable`] if `kind` has no encoder
    /// - [`Error::InvalidArgument`] / [`Error::InvalidAddress`] if the
    ///   target or value cannot be encoded
    /// - [`Error::Nak`] if the module refused the command
    /// - any command error of [`Lcn::command`]
    pub async fn control(
        &self,
        segment: u16,
        module: u16,
        kind: CommandKind,
        output: impl Into<Output>,
        value: impl Into<ControlValue>,
    ) -> Result<Vec<StateRecord>> {
        self.ensure_connected()?;

        let address = Address::module(segment, module);
        let output = output.into();
        let value = value.into();

        if kind == CommandKind::DisplayOut {
            return self.write_display(address, &output, &value).await;
        }

        let request = Request::control(kind, &output, &value)?;
        debug!(%address, kind = %kind, %output, "Control");

        let line = self.command(address, &request, None, false).await?;
        match line {
            Some(line) => decode_reply(&request, &line),
            None => Ok(Vec::new()),
        }
    }

    /// Like [`control`](Self::control), resolving kind and output from
    /// their text form.
    ///
    /// A kind name without a registry entry falls back to `{name}_OUT`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCommand`] if `kind` is not registered
    /// - [`Error::InvalidArgument`] if `output` is malformed
    /// - any error of [`control`](Self::control)
    pub async fn control_named(
        &self,
        segment: u16,
        module: u16,
        kind: &str,
        output: &str,
        value: impl Into<ControlValue>,
    ) -> Result<Vec<StateRecord>> {
        let kind = CommandKind::resolve(kind)?;
        let output: Output = output.parse()?;
        self.control(segment, module, kind, output, value).await
    }

    /// Asks a module to report state.
    ///
    /// Replies are dispatched as `Update` events; unanswered queries are
    /// skipped silently.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the session is not set up
    /// - the first command error, after all queries completed
    pub async fn read(&self, segment: u16, module: u16, operation: ReadOperation) -> Result<()> {
        self.ensure_connected()?;
        let address = Address::module(segment, module);
        debug!(%address, %operation, "Read");

        let pending = self.submit_all(address, &operation.requests())?;
        self.collect(pending).await
    }

    /// Refreshes several modules, pacing them 1.2 s apart.
    ///
    /// # Errors
    ///
    /// - [`Error::ScanActive`] while a scan runs
    /// - [`Error::NotConnected`] if the session is not set up
    /// - the first command error, after all queries completed
    pub async fn read_modules(&self, plans: &[ModuleReadPlan]) -> Result<()> {
        let mut first_error = None;

        for (index, plan) in plans.iter().enumerate() {
            if let Some(segment) = self.scan_segment_active() {
                warn!(segment, "Read stopped, because scan is active");
                return Err(Error::ScanActive { segment });
            }
            self.ensure_connected()?;

            let started = Instant::now();
            let address = Address::module(plan.segment, plan.module);
            debug!(%address, "Reading module");

            let pending = self.submit_all(address, &plan.requests())?;
            if let Err(err) = self.collect(pending).await {
                first_error.get_or_insert(err);
            }

            if index + 1 < plans.len() {
                sleep_until(started + READ_MODULES_PACING).await;
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Sends one request and waits for its reply line.
    ///
    /// `timeout` defaults to the configured default timeout. With
    /// `ignore_timeout` an unanswered request returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the session is not set up
    /// - [`Error::InvalidAddress`] / [`Error::InvalidArgument`] if the
    ///   request cannot be encoded
    /// - [`Error::CommandTimeout`] if no reply arrived in time
    /// - [`Error::CommandRejected`] / [`Error::InvalidParameter`] if the
    ///   gateway refused the frame
    /// - [`Error::BusDisconnected`] / [`Error::ConnectionClosed`] if the
    ///   session broke meanwhile
    pub async fn command(
        &self,
        address: Address,
        request: &Request,
        timeout: Option<Duration>,
        ignore_timeout: bool,
    ) -> Result<Option<String>> {
        self.ensure_connected()?;
        self.submit(address, request, timeout, ignore_timeout)?.await
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// Pending commands fail with [`Error::ConnectionClosed`].
    pub async fn destroy(&self) {
        info!("Destroying LCN driver");
        self.inner.connection.shutdown().await;
        self.inner.connection.clear_event_handler();
        self.inner.connected.send_replace(false);
    }
}

// ============================================================================
// Lcn - Internal
// ============================================================================

impl Lcn {
    /// Fails with [`Error::NotConnected`] unless the session is set up.
    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Encodes and queues one request without waiting.
    pub(crate) fn submit(
        &self,
        address: Address,
        request: &Request,
        timeout: Option<Duration>,
        ignore_timeout: bool,
    ) -> Result<PendingReply> {
        let wire = self.inner.codec.encode(&address, request)?;
        self.inner
            .connection
            .submit(wire, request.acceptance(), timeout, ignore_timeout)
    }

    /// Queues read requests back to back.
    fn submit_all(&self, address: Address, requests: &[Request]) -> Result<Vec<PendingReply>> {
        requests
            .iter()
            .map(|request| self.submit(address, request, None, true))
            .collect()
    }

    /// Awaits read replies and dispatches them.
    async fn collect(&self, pending: Vec<PendingReply>) -> Result<()> {
        let mut first_error = None;
        for reply in pending {
            match reply.await {
                Ok(Some(line)) => self.inner.dispatch_line(&line),
                Ok(None) => {}
                Err(err) => {
                    debug!(error = %err, "Read query failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Writes display text frame by frame.
    async fn write_display(
        &self,
        address: Address,
        output: &Output,
        value: &ControlValue,
    ) -> Result<Vec<StateRecord>> {
        let line = output.index()?;
        let text = value.to_text();
        debug!(%address, line, text = %text, "Writing display");

        let mut last = Vec::new();
        for request in Request::display(line, &text) {
            let reply = self
                .command(address, &request, Some(DISPLAY_FRAME_TIMEOUT), true)
                .await?;
            if let Some(reply) = reply {
                last = decode_reply(&request, &reply)?;
            }
        }
        Ok(last)
    }

    /// Awaits `future`, failing with [`Error::NotConnected`] as soon as the
    /// session drops.
    pub(crate) async fn until_disconnected<T>(
        &self,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let mut connected = self.inner.connected.subscribe();
        tokio::select! {
            biased;
            result = future => result,
            _ = connected.wait_for(|connected| !*connected) => Err(Error::NotConnected),
        }
    }

    /// Segment of the running scan, if any.
    pub(crate) fn scan_segment_active(&self) -> Option<u16> {
        self.inner.scan.lock().as_ref().map(|scan| scan.segment)
    }

    /// Broadcasts an event to all subscribers.
    pub(crate) fn emit(&self, event: Event) {
        self.inner.emit(event);
    }
}

// ============================================================================
// LcnInner - Dispatch
// ============================================================================

impl LcnInner {
    /// Handles a notification from the connection task.
    fn on_connection_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                if !self.connected.send_replace(true) {
                    self.emit(Event::Connected);
                }
            }

            ConnectionEvent::Disconnected => {
                if self.connected.send_replace(false) {
                    if let Some(scan) = self.scan.lock().as_ref() {
                        error!(segment = scan.segment, "Scan interrupted, because disconnection");
                    }
                    self.emit(Event::Disconnected);
                }
            }

            ConnectionEvent::Data(line) => self.dispatch_line(&line),

            ConnectionEvent::Error(message) => self.emit(Event::Error(message)),
        }
    }

    /// Decodes an unsolicited line and routes its records.
    ///
    /// Records of modules a running scan already found are filed with the
    /// scan instead of being broadcast.
    pub(crate) fn dispatch_line(&self, line: &str) {
        let Some((kind, decoded)) = self.codec.decode(line) else {
            warn!(%line, "Unknown data received");
            self.emit(Event::Data(line.to_string()));
            return;
        };

        let records = match decoded {
            Ok(records) => records,
            Err(err) => {
                warn!(%line, error = %err, "Cannot parse data");
                return;
            }
        };

        for record in records {
            debug!(
                segment = record.segment,
                module = record.module,
                kind = %kind,
                "Received state"
            );

            if record.is_ack() {
                warn!(%line, "Received ack, but no command for it");
                continue;
            }

            let record = match self.scan.lock().as_mut() {
                Some(scan) => scan.absorb(record),
                None => Some(record),
            };
            if let Some(record) = record {
                self.emit(Event::Update(record));
            }
        }
    }

    /// Broadcasts an event; having no subscribers is fine.
    pub(crate) fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Decodes the reply to `request`, turning a negative ack into an error.
fn decode_reply(request: &Request, line: &str) -> Result<Vec<StateRecord>> {
    let records = request.acceptance().decode(line)?;

    if let Some(record) = records.iter().find(|record| record.is_ack())
        && let StateValue::Ack(AckStatus::Error(ack)) = record.status
    {
        return Err(Error::Nak {
            segment: record.segment,
            module: record.module,
            ack,
        });
    }

    Ok(records)
}

// ============================================================================
// Tests
// ============================================================================
