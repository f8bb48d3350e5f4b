//! plate-sentinel
//!
//! This crate implements a real-time license-plate detection pipeline that
//! turns an unreliable camera feed into stable, deduplicated detection events.
//!
//! # Architecture
//!
//! Data flows strictly downstream through six stages:
//!
//! 1. **Stream source** (`source`): acquires frames from an HTTP MJPEG camera
//!    (or a scripted stub), with transparent reconnection on stream drops.
//! 2. **Frame scheduler** (`sched`): admits every Nth frame; frames that
//!    arrive while recognition is busy are dropped, never queued.
//! 3. **Recognition pipeline** (`recognize`): calls the external plate
//!    detector and OCR collaborators, crops/pads/upscales candidate regions,
//!    and filters OCR output by character set and structure.
//! 4. **Plate normalizer** (`normalize`): rebuilds raw OCR text into a
//!    canonical plate string from a locale rule table.
//! 5. **Event aggregator** (`aggregate`): sliding-window corroboration per
//!    plate, confirmation threshold, cooldown suppression, idle eviction.
//! 6. **Reporting client** (`report`): best-effort delivery of confirmed
//!    events to the HTTP sink; a slow or dead sink never stalls recognition.
//!
//! Only the stream source and the reporting client touch the outside world.
//! The aggregator's window map is mutated from exactly one thread (the
//! recognition worker in `pipeline`), so it needs no locking.

use std::fmt;

pub mod aggregate;
pub mod config;
pub mod frame;
pub mod normalize;
pub mod pipeline;
pub mod recognize;
pub mod report;
pub mod sched;
pub mod source;

pub use aggregate::{AggregatorConfig, DetectionEvent, EventAggregator};
pub use config::SentinelConfig;
pub use frame::Frame;
pub use normalize::{CharClass, PlateFormat, PlateNormalizer};
pub use pipeline::{Pipeline, PipelineStats};
pub use recognize::{
    PlateBox, PlateDetector, RawRecognition, RecognitionConfig, RecognitionPipeline, TextReader,
};
pub use report::{HttpSink, LogSink, ReportSink, Reporter, ReporterConfig};
pub use sched::FrameScheduler;
pub use source::{StreamSettings, StreamSource, SupervisedSource};

// -------------------- Error Taxonomy --------------------

/// Failure classes the pipeline distinguishes.
///
/// - `Connection`: the stream cannot be established. Retried with backoff by
///   the supervisor; fatal once the retry ceiling is exhausted.
/// - `StreamInterrupted`: a mid-stream drop. Recovered transparently; never
///   surfaced past the source supervisor.
/// - `Recognition`: a detector or OCR call failed or blew its budget. Logged,
///   the region is skipped, the frame loop continues.
/// - `Delivery`: the reporting sink rejected or never answered. Logged, the
///   event is dropped.
///
/// Rejected normalizations are not errors; they are expected steady-state
/// occurrences and are silently discarded before aggregation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineError {
    Connection(String),
    StreamInterrupted(String),
    Recognition(String),
    Delivery(String),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Connection(_) => "CONNECTION",
            PipelineError::StreamInterrupted(_) => "STREAM_INTERRUPTED",
            PipelineError::Recognition(_) => "RECOGNITION",
            PipelineError::Delivery(_) => "DELIVERY",
        }
    }

    fn message(&self) -> &str {
        match self {
            PipelineError::Connection(m)
            | PipelineError::StreamInterrupted(m)
            | PipelineError::Recognition(m)
            | PipelineError::Delivery(m) => m,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for PipelineError {}

/// Classify an error chain: true when it carries a mid-stream interruption
/// that the supervisor should absorb by reconnecting.
pub(crate) fn is_stream_interrupted(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::StreamInterrupted(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_code_and_message() {
        let err = PipelineError::StreamInterrupted("socket reset".to_string());
        assert_eq!(err.to_string(), "STREAM_INTERRUPTED: socket reset");
        assert_eq!(err.code(), "STREAM_INTERRUPTED");
    }

    #[test]
    fn interruption_is_classified_through_anyhow() {
        let err: anyhow::Error = PipelineError::StreamInterrupted("drop".into()).into();
        assert!(is_stream_interrupted(&err));

        let err: anyhow::Error = PipelineError::Connection("refused".into()).into();
        assert!(!is_stream_interrupted(&err));
    }
}
