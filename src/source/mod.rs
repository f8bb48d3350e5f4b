//! Stream acquisition.
//!
//! This module abstracts the video source behind a uniform "next frame"
//! operation with reconnect semantics:
//! - `StreamSource`: one open transport, selected from the locator scheme
//!   (`http(s)://` MJPEG/snapshot, `stub://` scripted synthetic).
//! - `SupervisedSource`: wraps `StreamSource` with the recovery loop. A
//!   mid-stream drop closes the transport, backs off with capped exponential
//!   delay, and reopens; a flaky wireless camera is the normal case here,
//!   not an edge case. Downstream components only ever see a pause in frame
//!   arrival.
//!
//! The acquisition layer is responsible for:
//! - Assigning monotonic frame sequence numbers (continued across reconnects)
//! - Applying the optional mirror flip at capture time
//! - Emitting connected/disconnected health transitions to the log
//!
//! No business logic may depend on health transitions; they exist for
//! operators.

pub mod mjpeg;
pub mod stub;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbImage;
use rand::Rng;
use url::Url;

use crate::frame::Frame;
use crate::{is_stream_interrupted, PipelineError};

pub use mjpeg::MjpegSource;
pub use stub::StubSource;

/// Stream acquisition settings.
#[derive(Clone, Debug)]
pub struct StreamSettings {
    /// Source locator. Supported schemes: http(s):// for MJPEG/JPEG, stub://
    /// for the scripted synthetic source.
    pub locator: String,
    /// Per-read timeout guarding against a connection that is open but silent.
    pub read_timeout: Duration,
    /// Flip frames horizontally at capture (some cameras deliver a mirrored image).
    pub mirror: bool,
    /// First reconnect delay; doubles per consecutive failure.
    pub backoff_start: Duration,
    /// Reconnect delay ceiling.
    pub backoff_cap: Duration,
    /// Consecutive failed reopen attempts before giving up fatally. 0 retries forever.
    pub max_reconnects: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            locator: "stub://front_gate".to_string(),
            read_timeout: Duration::from_secs(5),
            mirror: false,
            backoff_start: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(4),
            max_reconnects: 0,
        }
    }
}

/// One open transport to a video source.
pub enum StreamSource {
    Mjpeg(MjpegSource),
    Stub(StubSource),
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mjpeg(_) => f.write_str("StreamSource::Mjpeg"),
            Self::Stub(_) => f.write_str("StreamSource::Stub"),
        }
    }
}

impl StreamSource {
    /// Open a transport for the configured locator.
    ///
    /// Fails with `PipelineError::Connection` when the locator is unusable or
    /// the transport cannot be established.
    pub fn open(settings: &StreamSettings) -> Result<Self> {
        let url = Url::parse(&settings.locator).map_err(|e| {
            PipelineError::Connection(format!("invalid stream locator {}: {}", settings.locator, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(Self::Mjpeg(MjpegSource::open(settings)?)),
            "stub" => Ok(Self::Stub(StubSource::open(&url)?)),
            other => Err(PipelineError::Connection(format!(
                "unsupported stream scheme '{}'; expected http(s) or stub",
                other
            ))
            .into()),
        }
    }

    /// Read the next decoded frame image.
    ///
    /// Fails with `PipelineError::StreamInterrupted` on any mid-stream drop;
    /// the supervisor handles reopening.
    pub fn read_frame(&mut self) -> Result<RgbImage> {
        match self {
            Self::Mjpeg(source) => source.read_frame(),
            Self::Stub(source) => source.read_frame(),
        }
    }
}

/// Acquisition statistics, for health logging.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_read: u64,
    pub reconnects: u64,
    pub connected: bool,
}

/// Supervised acquisition loop over a `StreamSource`.
pub struct SupervisedSource {
    settings: StreamSettings,
    inner: Option<StreamSource>,
    next_seq: u64,
    frames_read: u64,
    reconnects: u64,
    /// Set after the first successful open, so the first connect is logged as
    /// a transition too.
    was_connected: bool,
}

impl SupervisedSource {
    pub fn new(settings: StreamSettings) -> Self {
        Self {
            settings,
            inner: None,
            next_seq: 0,
            frames_read: 0,
            reconnects: 0,
            was_connected: false,
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frames_read,
            reconnects: self.reconnects,
            connected: self.inner.is_some(),
        }
    }

    /// Produce the next frame, reconnecting through interruptions.
    ///
    /// Returns `Ok(None)` when the stop flag is raised. Returns an error only
    /// when the reopen retry ceiling is exhausted; mid-stream drops are never
    /// surfaced to the caller.
    pub fn next_frame(&mut self, stop: &AtomicBool) -> Result<Option<Frame>> {
        loop {
            if stop.load(Ordering::Relaxed) {
                self.inner = None;
                return Ok(None);
            }

            if self.inner.is_none() && !self.reopen(stop)? {
                return Ok(None);
            }

            let Some(source) = self.inner.as_mut() else {
                continue;
            };
            match source.read_frame() {
                Ok(mut image) => {
                    if self.settings.mirror {
                        image = image::imageops::flip_horizontal(&image);
                    }
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    self.frames_read += 1;
                    return Ok(Some(Frame::new(seq, Instant::now(), image)));
                }
                Err(err) => {
                    if is_stream_interrupted(&err) {
                        log::warn!("stream disconnected: {}", err);
                    } else {
                        // Unclassified read failures get the same treatment:
                        // close and reopen rather than kill the run.
                        log::warn!("stream read failed, treating as interruption: {:#}", err);
                    }
                    self.inner = None;
                }
            }
        }
    }

    /// Open the transport, retrying with capped exponential backoff.
    ///
    /// Returns `Ok(false)` if the stop flag was raised while waiting.
    fn reopen(&mut self, stop: &AtomicBool) -> Result<bool> {
        let mut attempt: u32 = 0;
        loop {
            if stop.load(Ordering::Relaxed) {
                return Ok(false);
            }
            match StreamSource::open(&self.settings) {
                Ok(source) => {
                    if self.was_connected {
                        self.reconnects += 1;
                        log::info!(
                            "stream reconnected to {} (reconnect #{})",
                            self.settings.locator,
                            self.reconnects
                        );
                    } else {
                        log::info!("stream connected to {}", self.settings.locator);
                        self.was_connected = true;
                    }
                    self.inner = Some(source);
                    return Ok(true);
                }
                Err(err) => {
                    attempt += 1;
                    if self.settings.max_reconnects > 0 && attempt > self.settings.max_reconnects {
                        return Err(err).with_context(|| {
                            format!(
                                "stream retry ceiling exhausted after {} attempts",
                                self.settings.max_reconnects
                            )
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    log::warn!(
                        "stream open failed (attempt {}): {:#}; retrying in {:?}",
                        attempt,
                        err,
                        delay
                    );
                    if !sleep_interruptible(delay, stop) {
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self
            .settings
            .backoff_start
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
            .min(self.settings.backoff_cap);
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis().max(1) as u64 / 4);
        (base + Duration::from_millis(jitter_ms)).min(self.settings.backoff_cap)
    }
}

/// Sleep in short slices so the stop flag stays responsive. Returns false if
/// stopped mid-sleep.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) -> bool {
    let slice = Duration::from_millis(50);
    let mut remaining = total;
    while !remaining.is_zero() {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining -= step;
    }
    !stop.load(Ordering::Relaxed)
}
