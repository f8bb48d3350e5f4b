//! sentineld: the plate detection daemon.
//!
//! Wires the pipeline from environment-driven configuration and runs it
//! until SIGINT/SIGTERM. The detection and OCR engines are external
//! collaborators; this daemon ships with the scripted stubs, which is
//! enough to exercise the full path end to end (stream, cadence, windowed
//! confirmation, reporting). Real engines integrate through the
//! `PlateDetector`/`TextReader` traits via the library API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use plate_sentinel::recognize::{StubDetector, StubReader};
use plate_sentinel::report::{HttpSink, LogSink, ReportSink};
use plate_sentinel::{Pipeline, SentinelConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SentinelConfig::load().context("load configuration")?;
    log::info!(
        "sentineld starting: stream {} skip {} threshold {} window {:?} cooldown {:?}",
        cfg.stream.locator,
        cfg.frame_skip,
        cfg.aggregator.confirm_threshold,
        cfg.aggregator.window,
        cfg.aggregator.cooldown,
    );

    let sink: Box<dyn ReportSink> = match &cfg.reporting.endpoint {
        Some(endpoint) => {
            log::info!("reporting detections to {}", endpoint);
            Box::new(HttpSink::new(endpoint, cfg.reporting.timeout))
        }
        None => {
            log::warn!("no report endpoint configured; detections will only be logged");
            Box::new(LogSink)
        }
    };

    let stub_plate =
        std::env::var("SENTINEL_STUB_PLATE").unwrap_or_else(|_| "ABC1234".to_string());
    let pipeline = Pipeline::new(
        &cfg,
        Box::new(StubDetector::new()),
        Box::new(StubReader::fixed(&stub_plate)),
        sink,
    );

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        handler_stop.store(true, Ordering::Relaxed);
    })
    .context("install signal handler")?;

    let stats = pipeline.run(&stop).context("pipeline run")?;
    log::info!(
        "sentineld stopped: {} frames read, {} admitted, {} dropped busy, {} reconnects, \
         {} events confirmed ({} delivered, {} failed, {} dropped at queue)",
        stats.frames_read,
        stats.frames_admitted,
        stats.frames_dropped_busy,
        stats.reconnects,
        stats.events_confirmed,
        stats.events_delivered,
        stats.events_failed,
        stats.events_dropped_queue,
    );
    Ok(())
}
