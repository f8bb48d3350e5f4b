//! Reporting must never stall the recognition path: submitting events
//! against a dead or slow sink drops them instead of blocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use plate_sentinel::aggregate::DetectionEvent;
use plate_sentinel::report::{Reporter, ReporterConfig, ReportSink};

struct DeadSink {
    attempts: Arc<AtomicU64>,
    stall: Duration,
}

impl ReportSink for DeadSink {
    fn name(&self) -> &'static str {
        "dead"
    }

    fn deliver(&mut self, _event: &DetectionEvent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.stall);
        anyhow::bail!("endpoint unreachable");
    }
}

fn event(n: u64) -> DetectionEvent {
    DetectionEvent {
        plate_number: format!("ABC{:04}", n),
        detection_count: 3,
        total_detections: 3,
        image: vec![0xFF, 0xD8, 0xFF, 0xD9],
    }
}

fn config() -> ReporterConfig {
    ReporterConfig {
        endpoint: None,
        timeout: Duration::from_millis(50),
        queue_capacity: 8,
        max_attempts: 2,
    }
}

#[test]
fn submitting_against_a_dead_sink_never_blocks() {
    let attempts = Arc::new(AtomicU64::new(0));
    let sink = DeadSink {
        attempts: attempts.clone(),
        stall: Duration::from_millis(20),
    };
    let mut reporter = Reporter::spawn(Box::new(sink), &config());

    let started = Instant::now();
    for n in 0..1000 {
        reporter.submit(event(n));
    }
    // 1000 submits against a sink that takes 40ms per event would take
    // ~40 seconds if anything blocked; the bounded queue must shed instead.
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "submission path blocked for {:?}",
        started.elapsed()
    );
    assert!(reporter.dropped() > 0, "overflow must drop, not queue");

    let stats = reporter.shutdown();
    assert_eq!(stats.delivered, 0);
    assert!(stats.failed > 0);
    assert!(attempts.load(Ordering::SeqCst) >= stats.failed);
}

#[test]
fn queued_events_are_drained_at_shutdown() {
    let attempts = Arc::new(AtomicU64::new(0));
    let sink = DeadSink {
        attempts: attempts.clone(),
        stall: Duration::ZERO,
    };
    let mut reporter = Reporter::spawn(Box::new(sink), &config());

    for n in 0..4 {
        reporter.submit(event(n));
    }
    let stats = reporter.shutdown();

    // Every accepted event got its capped attempts before the thread exited.
    assert_eq!(stats.failed + reporter.dropped(), 4);
    assert_eq!(attempts.load(Ordering::SeqCst), stats.failed * 2);
}
