//! stream_probe: camera connectivity check.
//!
//! Reads frames from a stream locator for a few seconds and reports the
//! achieved frame rate, dimensions, and reconnect count. Useful when
//! bringing up a camera before pointing the daemon at it:
//!
//! ```text
//! stream_probe http://192.168.1.27/stream
//! ```
//!
//! The locator may also come from `SENTINEL_STREAM_URL`; probe duration
//! from `SENTINEL_PROBE_SECS` (default 10).

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use plate_sentinel::source::{StreamSettings, SupervisedSource};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let locator = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SENTINEL_STREAM_URL").ok())
        .ok_or_else(|| anyhow!("usage: stream_probe <locator> (or set SENTINEL_STREAM_URL)"))?;
    let probe_secs: u64 = match std::env::var("SENTINEL_PROBE_SECS") {
        Ok(raw) => raw
            .parse()
            .context("SENTINEL_PROBE_SECS must be an integer number of seconds")?,
        Err(_) => 10,
    };

    let settings = StreamSettings {
        locator: locator.clone(),
        max_reconnects: 3,
        ..StreamSettings::default()
    };
    let mut source = SupervisedSource::new(settings);
    let stop = AtomicBool::new(false);

    log::info!("probing {} for {}s", locator, probe_secs);
    let deadline = Instant::now() + Duration::from_secs(probe_secs);
    let started = Instant::now();
    let mut frames = 0u64;
    let mut dimensions = None;

    while Instant::now() < deadline {
        match source.next_frame(&stop)? {
            Some(frame) => {
                frames += 1;
                if dimensions.is_none() {
                    dimensions = Some((frame.width(), frame.height()));
                    log::info!("first frame: {}x{}", frame.width(), frame.height());
                }
            }
            None => break,
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let stats = source.stats();
    if frames == 0 {
        return Err(anyhow!("no frames received from {}", locator));
    }
    log::info!(
        "{} frames in {:.1}s ({:.1} fps), {} reconnects, dimensions {:?}",
        frames,
        elapsed,
        frames as f64 / elapsed.max(0.001),
        stats.reconnects,
        dimensions,
    );
    Ok(())
}
