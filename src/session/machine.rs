//! # Print Session
//!
//! Drives one print job from connect to disconnect.
//!
//! ## States
//!
//! ```text
//! Idle ─► Connecting ─► Negotiating ─► Configuring ─► Printing ─► AwaitingCompletion
//!              │             │              │             │               │
//!              └─────────────┴──────────────┴──────┬──────┴───────────────┘
//!                                                  ▼                      ▼
//!                                               Failed                Completed
//!                                                  └──────► Disconnected ◄┘
//! ```
//!
//! | State | Commands |
//! |-------|----------|
//! | Connecting | transport connect, `CONNECT` |
//! | Negotiating | `GET_INFO` × n, `GET_RFID` (both optional) |
//! | Configuring | `SET_DENSITY`, `SET_LABEL_TYPE` |
//! | Printing | `START_PRINT`, `START_PAGE`, `SET_PAGE_SIZE`, `SET_QUANTITY`, rows, `END_PAGE` |
//! | AwaitingCompletion | `PRINT_STATUS` every poll interval |
//! | Completed | `END_PRINT` |
//!
//! ## Failure Handling
//!
//! Any error moves the session to `Failed`. Whatever happened, a transport
//! that was connected is disconnected exactly once. `END_PRINT` follows a
//! failure only when the printer stopped reporting completion in time; a
//! dead link or a cancelled job gets nothing further.
//!
//! ## Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use niimbot::printer::DeviceProfile;
//! use niimbot::render::encoder::GrayRaster;
//! use niimbot::session::{ManualClock, PrintSession, SessionConfig, SessionState};
//! use niimbot::transport::MockTransport;
//!
//! let d11 = DeviceProfile::get("D11").unwrap();
//! let session = PrintSession::with_clock(
//!     MockTransport::printer(),
//!     ManualClock::new(),
//!     d11,
//!     SessionConfig::default(),
//! );
//!
//! let report = session.print(&GrayRaster::new(240, 96, 255)).await;
//! assert_eq!(report.final_state(), SessionState::Disconnected);
//! assert!(report.is_success());
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::clock::{Clock, TokioClock};
use super::config::SessionConfig;
use super::link::Link;
use crate::error::{NiimbotError, ProtocolError};
use crate::printer::{DetectionResult, DeviceProfile, ProfileDetector, RfidReading};
use crate::protocol::commands::{self, InfoKey};
use crate::protocol::response::{InfoValue, PrintStatus, RfidTag};
use crate::render::encoder::{self, EncodedImage, Raster};
use crate::transport::Transport;

/// Properties read while negotiating
pub const NEGOTIATION_KEYS: [InfoKey; 4] = [
    InfoKey::DeviceType,
    InfoKey::SoftwareVersion,
    InfoKey::HardwareVersion,
    InfoKey::DeviceSerial,
];

/// Reply timeout for the best-effort `END_PRINT` after a failure
const CLEANUP_TIMEOUT: Duration = Duration::from_millis(1000);

/// Gap medium, used when neither the config nor the roll says otherwise
const DEFAULT_LABEL_TYPE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Negotiating,
    Configuring,
    Printing,
    AwaitingCompletion,
    Completed,
    Failed,
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Disconnected)
    }
}

/// What happened during a session.
#[derive(Debug)]
pub struct PrintReport {
    pub model: &'static str,
    /// Every state entered, in order, starting with `Idle`
    pub states: Vec<SessionState>,
    /// The error that failed the session
    pub error: Option<NiimbotError>,
    pub device_info: Vec<(InfoKey, InfoValue)>,
    pub rfid: Option<RfidTag>,
    pub detection: Option<DetectionResult>,
    /// Density actually sent, after clamping
    pub density: Option<u8>,
    pub label_type: Option<u8>,
    /// Declared page size (rows, cols)
    pub page: Option<(u16, u16)>,
    pub rows_sent: usize,
    pub status_polls: usize,
    pub last_status: Option<PrintStatus>,
    /// Session time on the session clock
    pub elapsed: Duration,
}

impl PrintReport {
    fn new(model: &'static str) -> Self {
        Self {
            model,
            states: vec![SessionState::Idle],
            error: None,
            device_info: Vec::new(),
            rfid: None,
            detection: None,
            density: None,
            label_type: None,
            page: None,
            rows_sent: 0,
            status_polls: 0,
            last_status: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn final_state(&self) -> SessionState {
        self.states.last().copied().unwrap_or(SessionState::Idle)
    }

    /// The session reached `Completed`.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.states.contains(&SessionState::Completed)
    }

    /// Split off the failure, if any.
    pub fn into_result(mut self) -> Result<Self, NiimbotError> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// Run `fut` unless the token fires first.
async fn guarded<F, O>(cancel: &CancellationToken, fut: F) -> Result<O, NiimbotError>
where
    F: Future<Output = Result<O, NiimbotError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(NiimbotError::Cancelled),
        result = fut => result,
    }
}

pub struct PrintSession<T: Transport, C: Clock = TokioClock> {
    link: Link<T, C>,
    device: &'static DeviceProfile,
    config: SessionConfig,
    cancel: CancellationToken,
    report: PrintReport,
}

impl<T: Transport> PrintSession<T> {
    /// A session on real time.
    pub fn new(transport: T, device: &'static DeviceProfile, config: SessionConfig) -> Self {
        Self::with_clock(transport, TokioClock::default(), device, config)
    }
}

impl<T: Transport, C: Clock> PrintSession<T, C> {
    pub fn with_clock(
        transport: T,
        clock: C,
        device: &'static DeviceProfile,
        config: SessionConfig,
    ) -> Self {
        let link = Link::new(transport, clock, config.request_timeout());
        Self {
            link,
            device,
            config,
            cancel: CancellationToken::new(),
            report: PrintReport::new(device.model),
        }
    }

    /// Tie the session to an external token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts this session when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.report.final_state()
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state();
        tracing::info!(from = ?from, to = ?to, "session state");
        self.report.states.push(to);
    }

    /// Encode `raster` and print it. Always returns a report; check
    /// [`PrintReport::is_success`] or use [`PrintReport::into_result`].
    pub async fn print<R>(self, raster: &R) -> PrintReport
    where
        R: Raster + Sync + ?Sized,
    {
        let span = tracing::info_span!(
            "print",
            model = self.device.model,
            transport = %self.link.name()
        );
        self.print_inner(raster).instrument(span).await
    }

    async fn print_inner<R>(mut self, raster: &R) -> PrintReport
    where
        R: Raster + Sync + ?Sized,
    {
        let started = self.link.clock().now();

        let page = match encoder::encode(raster, self.device, &self.config.encode_options()) {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(error = %e, "encoding failed");
                self.transition(SessionState::Failed);
                self.report.error = Some(e);
                return self.report;
            }
        };
        tracing::debug!(rows = page.rows(), cols = page.cols(), "page encoded");

        let cancel = self.cancel.clone();
        let outcome = self.run(&page, &cancel).await;

        match outcome {
            Ok(()) => {
                self.transition(SessionState::Completed);
                match self.link.acknowledge(&commands::end_print()).await {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!("end print not acknowledged"),
                    Err(e) => tracing::warn!(error = %e, "end print failed after completion"),
                }
            }
            Err(e) => {
                tracing::error!(kind = e.kind(), error = %e, "print failed");
                let failed_in = self.state();
                self.transition(SessionState::Failed);
                // Only a job that reached completion polling has one to close
                if failed_in == SessionState::AwaitingCompletion
                    && e.wants_end_print()
                    && self.link.is_connected()
                {
                    let sent = self
                        .link
                        .request_within(&commands::end_print(), CLEANUP_TIMEOUT)
                        .await;
                    if let Err(end) = sent {
                        tracing::warn!(error = %end, "best-effort end print failed");
                    }
                }
                self.report.error = Some(e);
            }
        }

        // Reached Connecting means the transport was asked to connect
        if self.report.states.contains(&SessionState::Connecting) {
            if let Err(e) = self.link.disconnect().await {
                tracing::warn!(error = %e, "disconnect failed");
            }
            self.transition(SessionState::Disconnected);
        }

        self.report.elapsed = self.link.clock().now().saturating_sub(started);
        self.report
    }

    async fn run(&mut self, page: &EncodedImage, cancel: &CancellationToken) -> Result<(), NiimbotError> {
        if cancel.is_cancelled() {
            return Err(NiimbotError::Cancelled);
        }

        self.transition(SessionState::Connecting);
        guarded(cancel, self.link.connect()).await?;
        guarded(cancel, self.link.handshake()).await?;

        self.transition(SessionState::Negotiating);
        self.negotiate(cancel).await?;

        self.transition(SessionState::Configuring);
        self.configure(cancel).await?;

        self.transition(SessionState::Printing);
        self.send_page(page, cancel).await?;

        self.transition(SessionState::AwaitingCompletion);
        self.await_completion(cancel).await
    }

    async fn negotiate(&mut self, cancel: &CancellationToken) -> Result<(), NiimbotError> {
        if self.config.query_info {
            self.report.device_info = guarded(cancel, self.link.device_info(&NEGOTIATION_KEYS)).await?;
            for (key, value) in &self.report.device_info {
                tracing::debug!(?key, %value, "device info");
            }
        }

        if self.config.query_rfid {
            match guarded(cancel, self.link.read_rfid()).await {
                Ok(tag) => {
                    let reading = tag
                        .as_ref()
                        .map(|t| RfidReading::from_tag(t, &self.config.roll_catalog));
                    let detection = ProfileDetector::default()
                        .for_model(self.device.model)
                        .detect_result(reading.as_ref());
                    match &detection.detected_profile {
                        Some(profile) => tracing::info!(
                            label = profile.name,
                            confidence = detection.confidence,
                            "label detected"
                        ),
                        None => tracing::info!(
                            reason = detection.error.as_deref().unwrap_or(""),
                            "label not detected"
                        ),
                    }
                    self.report.rfid = tag;
                    self.report.detection = Some(detection);
                }
                Err(NiimbotError::Protocol(
                    e @ (ProtocolError::Unsupported(_) | ProtocolError::DeviceError { .. }),
                )) => {
                    tracing::warn!(error = %e, "RFID query rejected, continuing without");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn configure(&mut self, cancel: &CancellationToken) -> Result<(), NiimbotError> {
        let requested = self.config.density.unwrap_or(self.device.density_default);
        let density = self.device.clamp_density(requested);
        if density != requested {
            tracing::warn!(
                requested,
                density,
                min = self.device.density_min,
                max = self.device.density_max,
                "density clamped to model range"
            );
        }
        if !guarded(cancel, self.link.acknowledge(&commands::set_density(density))).await? {
            tracing::warn!(density, "density not acknowledged");
        }
        self.report.density = Some(density);

        let from_roll = self
            .report
            .rfid
            .as_ref()
            .map(|t| t.label_type)
            .filter(|t| (1..=3).contains(t));
        let label_type = self
            .config
            .label_type
            .or(from_roll)
            .unwrap_or(DEFAULT_LABEL_TYPE);
        if !guarded(cancel, self.link.acknowledge(&commands::set_label_type(label_type))).await? {
            tracing::warn!(label_type, "label type not acknowledged");
        }
        self.report.label_type = Some(label_type);
        Ok(())
    }

    async fn send_page(&mut self, page: &EncodedImage, cancel: &CancellationToken) -> Result<(), NiimbotError> {
        let start = commands::start_print();
        if !guarded(cancel, self.link.acknowledge(&start)).await? {
            return Err(ProtocolError::DeviceError {
                command: start.command,
                payload: vec![0],
            }
            .into());
        }
        guarded(cancel, self.link.acknowledge(&commands::start_page())).await?;

        if let Err(e) = page.verify() {
            tracing::error!(error = %e, "refusing to send inconsistent page");
            return Err(e);
        }
        guarded(cancel, self.link.acknowledge(&page.page_size())).await?;
        guarded(cancel, self.link.acknowledge(&commands::set_quantity(self.config.quantity))).await?;
        self.report.page = Some((page.rows(), page.cols()));

        let pacing = self.config.row_pacing();
        let compact = self.config.compact_empty_rows;
        for row in page {
            if cancel.is_cancelled() {
                return Err(NiimbotError::Cancelled);
            }
            guarded(cancel, self.link.send(&row.to_packet(compact))).await?;
            self.report.rows_sent += 1;
            if !pacing.is_zero() {
                let clock = self.link.clock();
                guarded(cancel, async {
                    clock.sleep(pacing).await;
                    Ok(())
                })
                .await?;
            }
        }
        tracing::debug!(rows = self.report.rows_sent, "rows sent");

        guarded(cancel, self.link.acknowledge(&commands::end_page())).await?;
        Ok(())
    }

    async fn await_completion(&mut self, cancel: &CancellationToken) -> Result<(), NiimbotError> {
        let started = self.link.clock().now();
        let limit = self.config.completion_timeout();
        let interval = self.config.poll_interval();

        loop {
            let status = guarded(cancel, self.link.print_status()).await?;
            self.report.status_polls += 1;
            self.report.last_status = Some(status);
            tracing::debug!(
                page = status.page,
                print = status.print_progress,
                feed = status.feed_progress,
                "print status"
            );
            if status.is_complete() {
                return Ok(());
            }

            let waited = self.link.clock().now().saturating_sub(started);
            if waited >= limit {
                return Err(NiimbotError::Timeout(format!(
                    "page not finished after {} ms (print {}%, feed {}%)",
                    waited.as_millis(),
                    status.print_progress,
                    status.feed_progress
                )));
            }

            let clock = self.link.clock();
            guarded(cancel, async {
                clock.sleep(interval).await;
                Ok(())
            })
            .await?;
        }
    }
}
