//! Scripted synthetic source.
//!
//! `stub://` locators produce deterministic synthetic frames with no camera
//! attached, for tests and for bring-up before hardware exists. Query
//! parameters script the behavior:
//!
//! - `width`, `height`: frame dimensions (default 640x480)
//! - `fps`: pacing of frame production (default 20; 0 = unpaced)
//! - `fail_every`: interrupt the stream after this many reads per
//!   connection, simulating a wireless drop (default: never)
//!
//! Reopening a stub source resets its per-connection state, so a supervised
//! stub stream with `fail_every` exercises the full disconnect/reconnect
//! path.

use std::time::Duration;

use anyhow::Result;
use image::{Rgb, RgbImage};
use url::Url;

use crate::PipelineError;

pub struct StubSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    fail_every: Option<u64>,
    reads: u64,
}

impl StubSource {
    pub fn open(url: &Url) -> Result<Self> {
        let mut width = 640u32;
        let mut height = 480u32;
        let mut fps = 20u32;
        let mut fail_every = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "width" => width = parse_param(&key, &value)?,
                "height" => height = parse_param(&key, &value)?,
                "fps" => fps = parse_param(&key, &value)?,
                "fail_every" => fail_every = Some(parse_param(&key, &value)?),
                other => {
                    return Err(PipelineError::Connection(format!(
                        "unknown stub parameter '{}'",
                        other
                    ))
                    .into())
                }
            }
        }
        if width == 0 || height == 0 {
            return Err(
                PipelineError::Connection("stub dimensions must be non-zero".into()).into(),
            );
        }
        let frame_interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis((1000 / fps).max(1) as u64)
        };
        Ok(Self {
            width,
            height,
            frame_interval,
            fail_every,
            reads: 0,
        })
    }

    pub fn read_frame(&mut self) -> Result<RgbImage> {
        if let Some(fail_every) = self.fail_every {
            if self.reads >= fail_every {
                return Err(PipelineError::StreamInterrupted(
                    "scripted stub interruption".into(),
                )
                .into());
            }
        }
        self.reads += 1;
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }
        Ok(self.generate_pixels())
    }

    /// Deterministic gradient pattern that drifts with the read counter, so
    /// consecutive frames differ and the image is asymmetric in x.
    fn generate_pixels(&self) -> RgbImage {
        let reads = self.reads;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let r = (x * 3 + reads as u32) as u8;
            let g = (y * 5) as u8;
            let b = (x ^ y) as u8;
            Rgb([r, g, b])
        })
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        PipelineError::Connection(format!("invalid stub parameter {}={}", key, value)).into()
    })
}
