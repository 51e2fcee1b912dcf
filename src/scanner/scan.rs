//! Two-phase module discovery.
//!
//! Phase one probes every address of the range for its first name part;
//! any answer marks a module present. Phase two walks the discovered
//! modules and reads name, comment, serial and state, each request with
//! ignore-timeout so silent modules do not stall the walk.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::driver::Lcn;
use crate::error::{Error, Result};
use crate::identifiers::{Address, MAX_ADDRESS};
use crate::protocol::{
    Event, Request, ScanProgress, ScanStep, StateRecord, StatusScope, TextField,
};
use crate::transport::PendingReply;

use super::session::{PartialDevice, ScanSession};

// ============================================================================
// Constants
// ============================================================================

/// First module probed when no range is given.
pub const DEFAULT_MODULE_LOW: u16 = 3;

/// Last module probed when no range is given.
pub const DEFAULT_MODULE_HIGH: u16 = 250;

/// Pause between probes and between silent modules.
const STEP_PACING: Duration = Duration::from_millis(100);

/// Minimum pause after a module answered a status request.
const STATUS_SETTLE: Duration = Duration::from_millis(1200);

/// Added to the response timeout for the status pause.
const STATUS_SETTLE_MARGIN: Duration = Duration::from_millis(200);

/// Pause after the last module, for trailing replies.
const FINAL_SETTLE: Duration = Duration::from_secs(2);

/// Variables read per module.
const SCAN_VARIABLES: u8 = 12;

/// Regulators read per module.
const SCAN_REGULATORS: u8 = 2;

// ============================================================================
// Lcn - Scan API
// ============================================================================

impl Lcn {
    /// Discovers the modules of a segment.
    ///
    /// Probes `module_low..=module_high` (default `3..=250`) in `segment`
    /// (default: the configured segment), then reads identity and state of
    /// every module that answered. Progress is broadcast as
    /// [`Event::Scan`]. A lost connection ends the scan with what was found
    /// so far.
    ///
    /// # Errors
    ///
    /// - [`Error::ScanActive`] if another scan is running
    /// - [`Error::NotConnected`] if the session is not set up
    /// - [`Error::InvalidAddress`] if the range or segment exceed 255
    /// - [`Error::InvalidArgument`] if `module_low > module_high`
    pub async fn scan_segment(
        &self,
        module_low: Option<u16>,
        module_high: Option<u16>,
        segment: Option<u16>,
    ) -> Result<BTreeMap<u16, PartialDevice>> {
        let module_low = module_low.unwrap_or(DEFAULT_MODULE_LOW);
        let module_high = module_high.unwrap_or(DEFAULT_MODULE_HIGH);
        let segment = segment.unwrap_or(self.inner.options.segment);

        for value in [module_low, module_high, segment] {
            if value > MAX_ADDRESS {
                return Err(Error::invalid_address(value.into()));
            }
        }
        if module_low > module_high {
            return Err(Error::invalid_argument(format!(
                "scan range {module_low}..{module_high} is empty"
            )));
        }

        {
            let mut slot = self.inner.scan.lock();
            if let Some(scan) = slot.as_ref() {
                return Err(Error::ScanActive {
                    segment: scan.segment,
                });
            }
            self.ensure_connected()?;
            *slot = Some(ScanSession::new(segment, module_low, module_high));
        }
        let _guard = ScanGuard { lcn: self };

        info!(segment, module_low, module_high, "Scan started");
        let scanner = Scanner {
            lcn: self,
            segment,
            timeout: self.inner.options.scan_response_timeout,
        };

        if scanner.probe_range(module_low, module_high).await {
            if scanner.found() == 0 {
                info!(segment, "Scan stopped, no module found");
            } else {
                scanner.read_discovered().await;
            }
        }

        let discovered = self
            .inner
            .scan
            .lock()
            .take()
            .map(|scan| scan.discovered)
            .unwrap_or_default();

        self.emit(Event::Scan(ScanProgress {
            step: ScanStep::Inactive,
            progress: module_high,
            found: discovered.len(),
        }));
        info!(segment, found = discovered.len(), "Scan finished");

        Ok(discovered)
    }
}

// ============================================================================
// ScanGuard
// ============================================================================

/// Frees the scan slot, also when the scan future is dropped.
struct ScanGuard<'a> {
    lcn: &'a Lcn,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.lcn.inner.scan.lock().take();
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// Why reading one module stopped early.
#[derive(Debug)]
enum ReadAbort {
    /// A reply described another module.
    Mismatch { received: u16 },
    /// A request failed.
    Failed(Error),
}

impl From<Error> for ReadAbort {
    fn from(err: Error) -> Self {
        Self::Failed(err)
    }
}

/// One running scan.
struct Scanner<'a> {
    lcn: &'a Lcn,
    segment: u16,
    timeout: Duration,
}

impl Scanner<'_> {
    // ========================================================================
    // Phase 1
    // ========================================================================

    /// Probes every address of the range.
    ///
    /// Returns `false` if a failure other than a timeout ended the phase.
    async fn probe_range(&self, module_low: u16, module_high: u16) -> bool {
        for module in module_low..=module_high {
            self.progress(ScanStep::Scanning, module);

            if let Err(err) = self.probe(module).await {
                error!(segment = self.segment, module, error = %err, "Scan interrupted");
                return false;
            }

            if let Err(err) = self.pause(STEP_PACING).await {
                error!(segment = self.segment, error = %err, "Scan interrupted");
                return false;
            }
        }
        true
    }

    /// Asks one address for its first name part.
    async fn probe(&self, module: u16) -> Result<()> {
        debug!(segment = self.segment, module, "Probing module");
        let request = Request::GetText {
            field: TextField::Name,
            part: 1,
        };

        let line = match self.send(module, &request, false).await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(err) if err.is_timeout() => {
                debug!(segment = self.segment, module, "Module not detected");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let records = match request.acceptance().decode(&line) {
            Ok(records) => records,
            Err(err) => {
                warn!(%line, error = %err, "Cannot parse probe answer");
                return Ok(());
            }
        };
        let Some(record) = records.first() else {
            return Ok(());
        };

        if record.segment != self.segment {
            warn!(
                expected = self.segment,
                received = record.segment,
                %line,
                "Answer from other segment ignored"
            );
            return Ok(());
        }
        if record.module != module {
            warn!(
                expected = module,
                received = record.module,
                "Late answer for scan, increase the scan response timeout"
            );
        }

        let name = record.status.as_str().unwrap_or_default();
        debug!(segment = self.segment, module = record.module, name, "Module detected");
        if let Some(scan) = self.lcn.inner.scan.lock().as_mut() {
            scan.discover(record.module, name);
        }
        Ok(())
    }

    // ========================================================================
    // Phase 2
    // ========================================================================

    /// Reads every discovered module, in ascending order.
    async fn read_discovered(&self) {
        let modules: Vec<u16> = match self.lcn.inner.scan.lock().as_ref() {
            Some(scan) => scan.discovered.keys().copied().collect(),
            None => return,
        };

        for module in modules {
            self.progress(ScanStep::Reading, module);
            debug!(segment = self.segment, module, "Reading module");

            let delay = match self.read_module(module).await {
                Ok(true) => status_settle(self.timeout),
                Ok(false) => STEP_PACING,
                Err(ReadAbort::Mismatch { received }) => {
                    warn!(
                        expected = module,
                        received,
                        "Answer for other module ignored, increase the scan response timeout"
                    );
                    STEP_PACING
                }
                Err(ReadAbort::Failed(err)) if is_disconnect(&err) => {
                    error!(segment = self.segment, error = %err, "Scan interrupted");
                    return;
                }
                Err(ReadAbort::Failed(err)) => {
                    error!(module, error = %err, "Cannot read module");
                    STEP_PACING
                }
            };

            if self.pause(delay).await.is_err() {
                error!(segment = self.segment, "Scan interrupted, because disconnection");
                return;
            }
        }

        let _ = self.pause(FINAL_SETTLE).await;
    }

    /// Reads one module.
    ///
    /// Returns `true` if it answered the final status request.
    async fn read_module(&self, module: u16) -> std::result::Result<bool, ReadAbort> {
        if let Some(text) = self.text(module, TextField::Name, 2).await? {
            self.with_device(module, |device| {
                device.name.push_str(&text);
                device.name = device.name.trim().to_string();
            });
        }

        if let Some(text) = self.text(module, TextField::Comment, 1).await? {
            self.with_device(module, |device| device.comment = text);
        }
        for part in 2..=3 {
            if let Some(text) = self.text(module, TextField::Comment, part).await? {
                self.with_device(module, |device| device.comment.push_str(&text));
            }
        }
        self.with_device(module, |device| device.comment = device.comment.trim().to_string());

        if let Some(records) = self.fetch(module, &Request::GetSerial).await?
            && let Some(record) = records.first()
        {
            self.with_device(module, |device| {
                device.apply_serial(record);
            });
        }

        let variables: Vec<Request> = (1..=SCAN_VARIABLES).map(Request::GetVariable).collect();
        let pending = variables
            .iter()
            .map(|request| self.submit(module, request, true))
            .collect::<Result<Vec<_>>>()?;
        for (request, reply) in variables.iter().zip(pending) {
            if let Some(line) = self.lcn.until_disconnected(reply).await? {
                let records = self.check(module, request, &line)?;
                self.push_states(module, records);
            }
        }

        for regulator in 1..=SCAN_REGULATORS {
            if let Some(records) = self.fetch(module, &Request::GetSetValue(regulator)).await? {
                self.push_states(module, records);
            }
        }

        let answered = if self.status(module, &Request::GetLeds).await? {
            self.status(module, &Request::GetStatus(StatusScope::Relay))
                .await?;
            self.status(module, &Request::GetStatus(StatusScope::Analog))
                .await?
        } else {
            self.status(module, &Request::GetStatus(StatusScope::All))
                .await?
        };

        Ok(answered)
    }

    /// Reads a name or comment part.
    async fn text(
        &self,
        module: u16,
        field: TextField,
        part: u8,
    ) -> std::result::Result<Option<String>, ReadAbort> {
        let request = Request::GetText { field, part };
        let Some(records) = self.fetch(module, &request).await? else {
            debug!(module, ?field, part, "Text timeout");
            return Ok(None);
        };

        Ok(records
            .first()
            .and_then(|record| record.status.as_str())
            .map(str::to_string))
    }

    /// Sends a request whose reply must come from `module`.
    async fn fetch(
        &self,
        module: u16,
        request: &Request,
    ) -> std::result::Result<Option<Vec<StateRecord>>, ReadAbort> {
        match self.send(module, request, true).await? {
            Some(line) => self.check(module, request, &line).map(Some),
            None => Ok(None),
        }
    }

    /// Sends a status request.
    ///
    /// Modules report status on their own, so a reply from another module
    /// is routed like any unsolicited report instead of aborting.
    async fn status(&self, module: u16, request: &Request) -> std::result::Result<bool, ReadAbort> {
        let Some(line) = self.send(module, request, true).await? else {
            debug!(module, kind = %request.kind(), "Status timeout");
            return Ok(false);
        };

        let records = request.acceptance().decode(&line)?;
        if records
            .first()
            .is_some_and(|record| record.segment != self.segment || record.module != module)
        {
            self.lcn.inner.dispatch_line(&line);
        } else {
            self.push_states(module, records);
        }
        Ok(true)
    }

    /// Decodes a reply and verifies it describes `module`.
    fn check(
        &self,
        module: u16,
        request: &Request,
        line: &str,
    ) -> std::result::Result<Vec<StateRecord>, ReadAbort> {
        let records = request.acceptance().decode(line)?;
        match records.first() {
            Some(record) if record.segment != self.segment || record.module != module => {
                Err(ReadAbort::Mismatch {
                    received: record.module,
                })
            }
            _ => Ok(records),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Queues a request for `module` with the scan response timeout.
    fn submit(&self, module: u16, request: &Request, ignore_timeout: bool) -> Result<PendingReply> {
        self.lcn.ensure_connected()?;
        self.lcn.submit(
            Address::module(self.segment, module),
            request,
            Some(self.timeout),
            ignore_timeout,
        )
    }

    /// Sends a request and waits for its reply or a disconnect.
    async fn send(
        &self,
        module: u16,
        request: &Request,
        ignore_timeout: bool,
    ) -> Result<Option<String>> {
        let reply = self.submit(module, request, ignore_timeout)?;
        self.lcn.until_disconnected(reply).await
    }

    /// Sleeps unless the connection drops first.
    async fn pause(&self, delay: Duration) -> Result<()> {
        self.lcn.until_disconnected(async {
            sleep(delay).await;
            Ok(())
        })
        .await
    }

    fn found(&self) -> usize {
        self.lcn.inner.scan.lock().as_ref().map_or(0, ScanSession::found)
    }

    fn with_device(&self, module: u16, update: impl FnOnce(&mut PartialDevice)) {
        if let Some(scan) = self.lcn.inner.scan.lock().as_mut()
            && let Some(device) = scan.device_mut(module)
        {
            update(device);
        }
    }

    fn push_states(&self, module: u16, records: Vec<StateRecord>) {
        self.with_device(module, |device| device.states.extend(records));
    }

    /// Updates the session and broadcasts progress.
    fn progress(&self, step: ScanStep, module: u16) {
        let found = match self.lcn.inner.scan.lock().as_mut() {
            Some(scan) => {
                scan.phase = step;
                scan.current_probe = module;
                scan.found()
            }
            None => 0,
        };

        self.lcn.emit(Event::Scan(ScanProgress {
            step,
            progress: module,
            found,
        }));
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Pause after a module answered a status request.
fn status_settle(scan_timeout: Duration) -> Duration {
    STATUS_SETTLE.max(scan_timeout + STATUS_SETTLE_MARGIN)
}

/// Returns `true` if the error means the session is gone.
fn is_disconnect(err: &Error) -> bool {
    matches!(
        err,
        Error::NotConnected | Error::ConnectionClosed | Error::BusDisconnected
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_settle() {
        assert_eq!(status_settle(Duration::from_secs(1)), Duration::from_millis(1200));
        assert_eq!(status_settle(Duration::from_secs(2)), Duration::from_millis(2200));
    }

    #[test]
    fn test_disconnect_errors() {
        assert!(is_disconnect(&Error::ConnectionClosed));
        assert!(is_disconnect(&Error::NotConnected));
        assert!(!is_disconnect(&Error::CommandRejected {
            command: ">M000005!NMN1".into()
        }));
    }

    #[tokio::test]
    async fn test_scan_requires_connection() {
        let lcn = Lcn::new(crate::LcnOptions {
            port: 1,
            ..crate::LcnOptions::default()
        });

        let result = lcn.scan_segment(Some(3), Some(10), None).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(!lcn.is_scanning());

        let result = lcn.scan_segment(Some(10), Some(3), None).await;
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));

        let result = lcn.scan_segment(Some(3), Some(300), None).await;
        assert!(matches!(result, Err(Error::InvalidAddress { value: 300 })));

        lcn.destroy().await;
    }
}
