//! Periodic progress reporting for an upload.
//!
//! [`ProgressReporter`] polls the transfer monitor on a fixed interval from its
//! own task and renders one status line per tick into a [`StatusSink`]. It is
//! single-use: `NotStarted -> Running -> Stopped`, never restarted.

use std::io::{self, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::constants::{DEFAULT_REPORT_INTERVAL, MIN_REPORT_INTERVAL};
use super::monitor::{MonitorHandle, TransferStatus};

/// Bytes per second at which the display switches from kbps to Mbps.
const MBPS_THRESHOLD: f64 = 125_000.0;

/// Destination for rendered status lines.
pub trait StatusSink: Send {
    /// Replaces the currently displayed status with `line`.
    ///
    /// # Errors
    ///
    /// Returns the underlying output error; the reporter logs and ignores it.
    fn render(&mut self, line: &str) -> io::Result<()>;

    /// Called once after the last line has been rendered.
    ///
    /// # Errors
    ///
    /// Returns the underlying output error; the reporter logs and ignores it.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink that refreshes one line in place on any writer using `\r`.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    last_len: usize,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wraps `writer`.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            last_len: 0,
        }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> StatusSink for WriterSink<W> {
    fn render(&mut self, line: &str) -> io::Result<()> {
        let pad = self.last_len.saturating_sub(line.len());
        write!(self.writer, "\r{line}{:pad$}", "")?;
        self.writer.flush()?;
        self.last_len = line.len();
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.last_len > 0 {
            writeln!(self.writer)?;
            self.writer.flush()?;
        }
        Ok(())
    }
}

/// Sink backed by an indicatif bar drawing on stdout.
#[derive(Debug)]
pub struct TerminalSink {
    bar: ProgressBar,
}

impl TerminalSink {
    /// Creates a message-only bar drawn on stdout.
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        bar.set_style(
            ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for TerminalSink {
    fn render(&mut self, line: &str) -> io::Result<()> {
        self.bar.set_message(line.to_string());
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.bar.finish();
        Ok(())
    }
}

/// Lifecycle of a [`ProgressReporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    /// Created, task not spawned.
    NotStarted,
    /// Task spawned and ticking.
    Running,
    /// Stop requested; terminal.
    Stopped,
}

/// Cancellable periodic task rendering transfer progress.
///
/// # Example
///
/// ```no_run
/// use uploader_core::transfer::{MonitorHandle, ProgressReporter, WriterSink};
///
/// # async fn example(handle: MonitorHandle) {
/// let mut reporter = ProgressReporter::new(handle, WriterSink::new(std::io::stdout()));
/// reporter.start();
/// // ... upload ...
/// reporter.finish().await;
/// # }
/// ```
pub struct ProgressReporter {
    handle: MonitorHandle,
    interval: Duration,
    sink: Option<Box<dyn StatusSink>>,
    cancel: CancellationToken,
    state: ReporterState,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("interval", &self.interval)
            .field("state", &self.state)
            .field("attached", &self.handle.is_attached())
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    /// Creates a reporter ticking once per second.
    #[must_use]
    pub fn new(handle: MonitorHandle, sink: impl StatusSink + 'static) -> Self {
        Self {
            handle,
            interval: DEFAULT_REPORT_INTERVAL,
            sink: Some(Box::new(sink)),
            cancel: CancellationToken::new(),
            state: ReporterState::NotStarted,
            task: None,
        }
    }

    /// Overrides the polling interval, raised to at least 10 ms.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_REPORT_INTERVAL);
        self
    }

    /// Ties the reporter to a caller shutdown token; cancelling `shutdown`
    /// stops the reporter too.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: &CancellationToken) -> Self {
        self.cancel = shutdown.child_token();
        self
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReporterState {
        if self.state == ReporterState::Running && self.cancel.is_cancelled() {
            return ReporterState::Stopped;
        }
        self.state
    }

    /// Spawns the reporting task. Must be called inside a tokio runtime.
    ///
    /// Does nothing if already running or already stopped.
    pub fn start(&mut self) {
        match self.state() {
            ReporterState::NotStarted => {}
            ReporterState::Running => return,
            ReporterState::Stopped => {
                warn!("progress reporter already stopped; not restarting");
                return;
            }
        }
        let Some(sink) = self.sink.take() else {
            return;
        };
        debug!(interval_ms = self.interval.as_millis(), "starting progress reporter");
        self.task = Some(tokio::spawn(report_loop(
            self.handle.clone(),
            sink,
            self.interval,
            self.cancel.clone(),
        )));
        self.state = ReporterState::Running;
    }

    /// Signals the task to stop. Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.state = ReporterState::Stopped;
    }

    /// Stops the reporter and waits for its final render.
    pub async fn finish(mut self) {
        self.stop();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            debug!(error = %e, "progress reporter task ended abnormally");
        }
    }
}

async fn report_loop(
    handle: MonitorHandle,
    mut sink: Box<dyn StatusSink>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => render_once(&handle, sink.as_mut()),
        }
    }

    render_once(&handle, sink.as_mut());
    if let Err(e) = sink.finish() {
        debug!(error = %e, "failed to finish progress output");
    }
    debug!("progress reporter stopped");
}

fn render_once(handle: &MonitorHandle, sink: &mut dyn StatusSink) {
    let Some(monitor) = handle.get() else {
        trace!("no transfer monitor attached yet");
        return;
    };
    let line = format_status_line(&monitor.status());
    if let Err(e) = sink.render(&line) {
        debug!(error = %e, "failed to render progress line");
    }
}

/// Renders one human-readable status line.
///
/// ```
/// use std::time::Duration;
/// use uploader_core::transfer::{TransferStatus, format_status_line};
///
/// let status = TransferStatus {
///     bytes: 500_000,
///     total_bytes: 1_000_000,
///     current_rate: 250_000.0,
///     elapsed: Duration::from_secs(2),
/// };
/// assert_eq!(
///     format_status_line(&status),
///     "Progress:     2.00 Mbps, 500000 / 1000000 (50.0%) ETA          2s"
/// );
/// ```
#[must_use]
pub fn format_status_line(status: &TransferStatus) -> String {
    let (rate, unit) = if status.current_rate >= MBPS_THRESHOLD {
        (status.current_rate / MBPS_THRESHOLD, "Mbps")
    } else {
        (status.current_rate / 125.0, "kbps")
    };
    format!(
        "Progress: {rate:>8.2} {unit}, {} / {} ({}) ETA {:>11}",
        status.bytes,
        status.total_bytes,
        status.percent_string(),
        format_eta(status.time_remaining()),
    )
}

fn format_eta(remaining: Option<Duration>) -> String {
    let Some(remaining) = remaining else {
        return "?".to_string();
    };
    let secs = remaining.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}
