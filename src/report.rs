//! Best-effort event reporting.
//!
//! Confirmed events are handed to a dedicated delivery thread through a
//! bounded queue. The recognition path never blocks on the network: when
//! the queue is full the event is dropped and logged, and a sink that is
//! slow, down, or rejecting loses events rather than stalling the frame
//! loop. Delivery is attempted a capped number of times per event.
//!
//! The HTTP sink speaks the collection server's detect endpoint: a JSON
//! body with the plate, the window counts, and the representative image
//! base64-encoded; the server acknowledges with `{"success": true, "id"}`.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

use crate::aggregate::DetectionEvent;
use crate::PipelineError;

/// Reporting knobs. Validated once by the config layer.
#[derive(Clone, Debug)]
pub struct ReporterConfig {
    /// Detect endpoint URL. `None` disables reporting (events are logged
    /// and discarded).
    pub endpoint: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Bounded delivery queue depth; overflow drops the event.
    pub queue_capacity: usize,
    /// Delivery attempts per event before giving up.
    pub max_attempts: u32,
}

#[derive(Serialize)]
struct DetectPayload<'a> {
    plate_number: &'a str,
    detection_count: u32,
    total_detections: u32,
    image: String,
}

/// Delivery backend for confirmed events.
pub trait ReportSink: Send {
    fn name(&self) -> &'static str;

    fn deliver(&mut self, event: &DetectionEvent) -> Result<()>;
}

/// POSTs events to the collection server's detect endpoint.
pub struct HttpSink {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            agent,
            endpoint: endpoint.to_string(),
        }
    }
}

impl ReportSink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    fn deliver(&mut self, event: &DetectionEvent) -> Result<()> {
        let payload = DetectPayload {
            plate_number: &event.plate_number,
            detection_count: event.detection_count,
            total_detections: event.total_detections,
            image: BASE64.encode(&event.image),
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| PipelineError::Delivery(format!("encode detect payload: {}", e)))?;

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| PipelineError::Delivery(format!("post {}: {}", self.endpoint, e)))?;

        let body = response
            .into_string()
            .map_err(|e| PipelineError::Delivery(format!("read detect response: {}", e)))?;
        let ack: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| PipelineError::Delivery(format!("malformed detect response: {}", e)))?;
        if ack.get("success").and_then(|v| v.as_bool()) != Some(true) {
            return Err(
                PipelineError::Delivery(format!("server refused detection: {}", body)).into(),
            );
        }
        if let Some(id) = ack.get("id") {
            log::debug!("detection {} stored as record {}", event.plate_number, id);
        }
        Ok(())
    }
}

/// Logs confirmed events and discards them. Used when no endpoint is
/// configured.
pub struct LogSink;

impl ReportSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&mut self, event: &DetectionEvent) -> Result<()> {
        log::info!(
            "confirmed {} (count {}, window total {}, image {} bytes); no endpoint configured",
            event.plate_number,
            event.detection_count,
            event.total_detections,
            event.image.len()
        );
        Ok(())
    }
}

/// Owns the delivery thread and the bounded hand-off queue.
pub struct Reporter {
    sender: Option<SyncSender<DetectionEvent>>,
    worker: Option<JoinHandle<ReporterStats>>,
    dropped: u64,
}

/// Delivery-thread counters, returned at shutdown.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReporterStats {
    pub delivered: u64,
    pub failed: u64,
}

impl Reporter {
    /// Spawn the delivery thread around a sink.
    pub fn spawn(mut sink: Box<dyn ReportSink>, cfg: &ReporterConfig) -> Self {
        let (sender, receiver) = mpsc::sync_channel(cfg.queue_capacity.max(1));
        let max_attempts = cfg.max_attempts.max(1);
        let worker = thread::Builder::new()
            .name("report-delivery".into())
            .spawn(move || delivery_loop(&mut *sink, receiver, max_attempts));
        match worker {
            Ok(handle) => Self {
                sender: Some(sender),
                worker: Some(handle),
                dropped: 0,
            },
            Err(e) => {
                // Without a delivery thread every submit is a drop; the
                // pipeline itself stays up.
                log::error!("failed to spawn delivery thread: {}", e);
                Self {
                    sender: None,
                    worker: None,
                    dropped: 0,
                }
            }
        }
    }

    /// Hand an event to the delivery thread without blocking.
    ///
    /// A full queue drops the event; reporting is best effort by contract.
    pub fn submit(&mut self, event: DetectionEvent) {
        let Some(sender) = &self.sender else {
            self.dropped += 1;
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped += 1;
                log::warn!(
                    "delivery queue full; dropping event for {}",
                    event.plate_number
                );
            }
            Err(TrySendError::Disconnected(event)) => {
                self.dropped += 1;
                log::warn!(
                    "delivery thread gone; dropping event for {}",
                    event.plate_number
                );
            }
        }
    }

    /// Events dropped before reaching the delivery thread.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Close the queue, drain in-flight deliveries, and join the thread.
    /// Idempotent; subsequent submits are drops.
    pub fn shutdown(&mut self) -> ReporterStats {
        self.sender.take();
        match self.worker.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => ReporterStats::default(),
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn delivery_loop(
    sink: &mut dyn ReportSink,
    receiver: Receiver<DetectionEvent>,
    max_attempts: u32,
) -> ReporterStats {
    let mut stats = ReporterStats::default();
    while let Ok(event) = receiver.recv() {
        let mut delivered = false;
        for attempt in 1..=max_attempts {
            match sink.deliver(&event) {
                Ok(()) => {
                    log::info!(
                        "reported {} (count {}, window total {})",
                        event.plate_number,
                        event.detection_count,
                        event.total_detections
                    );
                    delivered = true;
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "delivery of {} via '{}' failed (attempt {}/{}): {:#}",
                        event.plate_number,
                        sink.name(),
                        attempt,
                        max_attempts,
                        e
                    );
                }
            }
        }
        if delivered {
            stats.delivered += 1;
        } else {
            stats.failed += 1;
        }
    }
    stats
}
