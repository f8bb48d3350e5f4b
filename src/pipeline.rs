//! Pipeline orchestration.
//!
//! Two threads, one moving part between them:
//!
//! - The acquisition loop (caller's thread) owns the supervised source and
//!   the frame scheduler. It reads frames, applies the cadence policy, and
//!   offers admitted frames to the recognition worker over a rendezvous
//!   channel. The offer never blocks: if the worker is mid-frame, the offer
//!   fails and the frame is dropped. At most one frame is ever in flight.
//! - The recognition worker owns the recognition pipeline, the normalizer,
//!   the aggregator, and the reporter hand-off. All mutable pipeline state
//!   lives on this thread; nothing here is shared or locked.
//!
//! Shutdown is cooperative: the stop flag unwinds acquisition, dropping the
//! channel sender unblocks the worker, and the worker drains the reporter
//! before returning its counters.

use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver, TrySendError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::aggregate::EventAggregator;
use crate::config::SentinelConfig;
use crate::frame::Frame;
use crate::normalize::{PlateFormat, PlateNormalizer};
use crate::recognize::{PlateDetector, RecognitionPipeline, TextReader};
use crate::report::{Reporter, ReportSink, ReporterStats};
use crate::sched::FrameScheduler;
use crate::source::SupervisedSource;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// End-of-run counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub frames_read: u64,
    pub frames_admitted: u64,
    /// Frames skipped by the every-Nth cadence.
    pub frames_dropped_cadence: u64,
    /// Admitted frames dropped because recognition was mid-frame.
    pub frames_dropped_busy: u64,
    pub reconnects: u64,
    pub candidates_seen: u64,
    pub events_confirmed: u64,
    pub events_delivered: u64,
    pub events_failed: u64,
    pub events_dropped_queue: u64,
}

#[derive(Default)]
struct WorkerStats {
    candidates_seen: u64,
    events_confirmed: u64,
    report: ReporterStats,
    dropped_queue: u64,
}

pub struct Pipeline {
    source: SupervisedSource,
    scheduler: FrameScheduler,
    recognizer: RecognitionPipeline,
    normalizer: PlateNormalizer,
    aggregator: EventAggregator,
    reporter: Reporter,
}

impl Pipeline {
    /// Assemble the pipeline from a validated config and the external
    /// collaborators.
    pub fn new(
        cfg: &SentinelConfig,
        detector: Box<dyn PlateDetector>,
        reader: Box<dyn TextReader>,
        sink: Box<dyn ReportSink>,
    ) -> Self {
        Self {
            source: SupervisedSource::new(cfg.stream.clone()),
            scheduler: FrameScheduler::new(cfg.frame_skip),
            recognizer: RecognitionPipeline::new(detector, reader, cfg.recognition.clone()),
            normalizer: PlateNormalizer::new(PlateFormat::standard(cfg.keep_prefix)),
            aggregator: EventAggregator::new(cfg.aggregator.clone()),
            reporter: Reporter::spawn(sink, &cfg.reporting),
        }
    }

    /// Run until the stop flag is raised or the stream is fatally lost.
    pub fn run(self, stop: &AtomicBool) -> Result<PipelineStats> {
        let Pipeline {
            mut source,
            scheduler,
            mut recognizer,
            normalizer,
            mut aggregator,
            mut reporter,
        } = self;

        // Rendezvous: an offer succeeds only while the worker is parked in
        // recv(), which is exactly the "recognition idle" condition.
        let (sender, receiver) = mpsc::sync_channel::<Frame>(0);
        let worker = thread::Builder::new()
            .name("recognition".into())
            .spawn(move || {
                recognition_loop(
                    receiver,
                    &mut recognizer,
                    &normalizer,
                    &mut aggregator,
                    &mut reporter,
                )
            })
            .map_err(|e| anyhow!("failed to spawn recognition worker: {}", e))?;

        let mut stats = PipelineStats::default();
        let mut last_health = Instant::now();
        let run_result = loop {
            let frame = match source.next_frame(stop) {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            stats.frames_read += 1;

            if !scheduler.admit(frame.seq) {
                stats.frames_dropped_cadence += 1;
            } else {
                match sender.try_send(frame) {
                    Ok(()) => stats.frames_admitted += 1,
                    Err(TrySendError::Full(_)) => stats.frames_dropped_busy += 1,
                    Err(TrySendError::Disconnected(_)) => {
                        break Err(anyhow!("recognition worker exited unexpectedly"));
                    }
                }
            }

            if last_health.elapsed() >= HEALTH_LOG_INTERVAL {
                let source_stats = source.stats();
                log::info!(
                    "health: frames read {} admitted {} dropped (cadence {} busy {}) reconnects {} connected {}",
                    stats.frames_read,
                    stats.frames_admitted,
                    stats.frames_dropped_cadence,
                    stats.frames_dropped_busy,
                    source_stats.reconnects,
                    source_stats.connected,
                );
                last_health = Instant::now();
            }
        };

        stats.reconnects = source.stats().reconnects;
        drop(sender);
        let worker_stats = worker
            .join()
            .map_err(|_| anyhow!("recognition worker panicked"))?;
        stats.candidates_seen = worker_stats.candidates_seen;
        stats.events_confirmed = worker_stats.events_confirmed;
        stats.events_delivered = worker_stats.report.delivered;
        stats.events_failed = worker_stats.report.failed;
        stats.events_dropped_queue = worker_stats.dropped_queue;

        run_result.map(|()| stats)
    }
}

fn recognition_loop(
    receiver: Receiver<Frame>,
    recognizer: &mut RecognitionPipeline,
    normalizer: &PlateNormalizer,
    aggregator: &mut EventAggregator,
    reporter: &mut Reporter,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    while let Ok(frame) = receiver.recv() {
        for candidate in recognizer.recognize(&frame) {
            stats.candidates_seen += 1;
            let Some(plate) = normalizer.normalize(&candidate.text) else {
                continue;
            };
            match aggregator.observe(&plate, frame.seq, &candidate.crop, Instant::now()) {
                Ok(Some(event)) => {
                    log::info!(
                        "confirmed {} ({} corroborations)",
                        event.plate_number,
                        event.detection_count
                    );
                    stats.events_confirmed += 1;
                    reporter.submit(event);
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("aggregation failed for {}: {:#}", plate, e);
                }
            }
        }
    }
    stats.dropped_queue = reporter.dropped();
    stats.report = reporter.shutdown();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::aggregate::DetectionEvent;
    use crate::recognize::{StubDetector, StubReader};
    use crate::report::ReportSink;

    struct CapturingSink {
        plates: Arc<Mutex<Vec<String>>>,
    }

    impl ReportSink for CapturingSink {
        fn name(&self) -> &'static str {
            "capturing"
        }

        fn deliver(&mut self, event: &DetectionEvent) -> Result<()> {
            self.plates.lock().unwrap().push(event.plate_number.clone());
            Ok(())
        }
    }

    fn fast_config() -> SentinelConfig {
        let mut cfg = SentinelConfig::default();
        cfg.stream.locator = "stub://cam?width=96&height=64&fps=0".to_string();
        cfg.frame_skip = 1;
        cfg.aggregator.confirm_threshold = 3;
        cfg.aggregator.window = Duration::from_secs(60);
        cfg
    }

    #[test]
    fn stub_end_to_end_confirms_and_reports() {
        let plates = Arc::new(Mutex::new(Vec::new()));
        let cfg = fast_config();
        let pipeline = Pipeline::new(
            &cfg,
            Box::new(StubDetector::new()),
            Box::new(StubReader::fixed("ABC1234")),
            Box::new(CapturingSink {
                plates: plates.clone(),
            }),
        );

        let stop = Arc::new(AtomicBool::new(false));
        let stopper = stop.clone();
        let ticker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(500));
            stopper.store(true, Ordering::Relaxed);
        });

        let stats = pipeline.run(&stop).expect("run");
        ticker.join().unwrap();

        assert!(stats.frames_read > 0);
        assert!(stats.events_confirmed >= 1);
        let reported = plates.lock().unwrap();
        assert!(reported.iter().all(|p| p == "ABC1234"));
    }
}
