//! Event aggregation.
//!
//! Single normalized observations are noise; this stage turns them into
//! confirmed detection events. Per plate it keeps a sliding-window tally:
//! the count resets when the window lapses, increments at most once per
//! frame, and a plate that reaches the confirmation threshold emits one
//! event and enters a cooldown during which it is suppressed entirely.
//! When the cooldown lapses the tally restarts from zero; there is no
//! carry-over.
//!
//! The aggregator never reads the wall clock. Every observation carries its
//! own `Instant`, so tests drive time explicitly and the window arithmetic
//! is deterministic.
//!
//! All state lives in one owned map mutated from a single thread; entries
//! idle past the eviction horizon are dropped to bound memory on busy
//! roads.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use anyhow::Result;
use image::RgbImage;

use crate::frame::encode_jpeg;

/// Aggregation knobs. Validated once by the config layer.
#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    /// Corroborating observations within one window required to confirm.
    pub confirm_threshold: u32,
    /// Sliding corroboration window.
    pub window: Duration,
    /// Suppression period after a confirmed event, per plate.
    pub cooldown: Duration,
    /// Idle horizon after which a plate's state is evicted.
    pub idle_evict: Duration,
}

/// A confirmed detection, ready for reporting.
#[derive(Clone, Debug)]
pub struct DetectionEvent {
    /// Canonical plate string.
    pub plate_number: String,
    /// Corroborating observations of this plate inside the window.
    pub detection_count: u32,
    /// All counted observations (any plate) inside the trailing window.
    pub total_detections: u32,
    /// JPEG-encoded representative image from the confirming observation.
    pub image: Vec<u8>,
}

struct PlateWindow {
    count: u32,
    window_start: Instant,
    /// Frame that last incremented the count; the same plate recognized
    /// twice in one frame corroborates once.
    last_counted_seq: Option<u64>,
    cooldown_until: Option<Instant>,
    last_seen: Instant,
}

pub struct EventAggregator {
    cfg: AggregatorConfig,
    windows: HashMap<String, PlateWindow>,
    /// Timestamps of counted observations across all plates, pruned to the
    /// trailing window. Backs `total_detections`.
    tally: VecDeque<Instant>,
}

impl EventAggregator {
    pub fn new(cfg: AggregatorConfig) -> Self {
        Self {
            cfg,
            windows: HashMap::new(),
            tally: VecDeque::new(),
        }
    }

    /// Number of plates currently tracked.
    pub fn tracked_plates(&self) -> usize {
        self.windows.len()
    }

    /// Record one normalized observation at `now`.
    ///
    /// Returns a `DetectionEvent` exactly when this observation pushes the
    /// plate's windowed count to the confirmation threshold.
    pub fn observe(
        &mut self,
        plate: &str,
        frame_seq: u64,
        image: &RgbImage,
        now: Instant,
    ) -> Result<Option<DetectionEvent>> {
        self.evict_idle(now);

        let entry = self
            .windows
            .entry(plate.to_string())
            .or_insert_with(|| PlateWindow {
                count: 0,
                window_start: now,
                last_counted_seq: None,
                cooldown_until: None,
                last_seen: now,
            });
        entry.last_seen = now;

        if entry.last_counted_seq == Some(frame_seq) {
            return Ok(None);
        }

        if let Some(until) = entry.cooldown_until {
            if now < until {
                return Ok(None);
            }
            entry.cooldown_until = None;
            entry.count = 0;
            entry.window_start = now;
        }

        if now.duration_since(entry.window_start) > self.cfg.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        entry.last_counted_seq = Some(frame_seq);
        self.tally.push_back(now);
        while let Some(&front) = self.tally.front() {
            if now.duration_since(front) > self.cfg.window {
                self.tally.pop_front();
            } else {
                break;
            }
        }

        if entry.count < self.cfg.confirm_threshold {
            return Ok(None);
        }

        let event = DetectionEvent {
            plate_number: plate.to_string(),
            detection_count: entry.count,
            total_detections: self.tally.len() as u32,
            image: encode_jpeg(image)?,
        };
        entry.count = 0;
        entry.cooldown_until = Some(now + self.cfg.cooldown);
        Ok(Some(event))
    }

    fn evict_idle(&mut self, now: Instant) {
        let horizon = self.cfg.idle_evict;
        self.windows.retain(|_, w| {
            // An entry in cooldown must outlive the idle horizon: evicting
            // it would forget the suppression and let the plate re-confirm
            // inside its cooldown.
            if w.cooldown_until.is_some_and(|until| now < until) {
                return true;
            }
            now.duration_since(w.last_seen) <= horizon
        });
    }
}
