//! HTTP MJPEG transport.
//!
//! Streams `multipart/x-mixed-replace` JPEG from camera firmware such as the
//! ESP32-CAM's `/stream` endpoint. When the endpoint serves a single JPEG
//! instead, the source falls back to snapshot polling.
//!
//! Frame boundaries are found by scanning for JPEG SOI/EOI markers rather
//! than trusting multipart part headers; cheap camera firmware gets those
//! wrong often enough that the markers are the reliable signal.

use std::io::Read;
use std::time::Duration;

use anyhow::Result;
use image::RgbImage;

use super::StreamSettings;
use crate::frame::decode_jpeg;
use crate::PipelineError;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const READ_CHUNK_BYTES: usize = 8192;

/// HTTP MJPEG/snapshot source.
pub struct MjpegSource {
    agent: ureq::Agent,
    url: String,
    mode: HttpMode,
}

enum HttpMode {
    Multipart(MjpegStream),
    Snapshot,
}

impl MjpegSource {
    /// Establish the HTTP connection and sniff the response mode.
    pub fn open(settings: &StreamSettings) -> Result<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(settings.read_timeout)
            .build();
        let response = agent.get(&settings.locator).call().map_err(|e| {
            PipelineError::Connection(format!("open mjpeg stream {}: {}", settings.locator, e))
        })?;

        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        let mode = if content_type.contains("multipart") {
            HttpMode::Multipart(MjpegStream::new(response.into_reader()))
        } else {
            HttpMode::Snapshot
        };
        Ok(Self {
            agent,
            url: settings.locator.clone(),
            mode,
        })
    }

    pub fn read_frame(&mut self) -> Result<RgbImage> {
        let jpeg = match &mut self.mode {
            HttpMode::Multipart(stream) => stream.read_next_jpeg()?,
            HttpMode::Snapshot => self.fetch_snapshot()?,
        };
        decode_jpeg(&jpeg)
            .map_err(|e| PipelineError::StreamInterrupted(format!("undecodable frame: {}", e)).into())
    }

    fn fetch_snapshot(&self) -> Result<Vec<u8>> {
        let response = self.agent.get(&self.url).call().map_err(|e| {
            PipelineError::StreamInterrupted(format!("fetch jpeg snapshot: {}", e))
        })?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES as u64)
            .read_to_end(&mut bytes)
            .map_err(|e| PipelineError::StreamInterrupted(format!("read jpeg snapshot: {}", e)))?;
        if bytes.is_empty() {
            return Err(PipelineError::StreamInterrupted("empty jpeg snapshot".into()).into());
        }
        Ok(bytes)
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send + Sync + 'static>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send + Sync + 'static>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).map_err(|e| {
                PipelineError::StreamInterrupted(format!("read mjpeg chunk: {}", e))
            })?;
            if read == 0 {
                return Err(PipelineError::StreamInterrupted("mjpeg stream ended".into()).into());
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            // A buffer that grows past any plausible frame means we lost the
            // marker sync; keep only the tail and resync.
            if self.buffer.len() > MAX_JPEG_BYTES {
                let drain_len = self.buffer.len() - 2;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Locate one complete JPEG (SOI..EOI inclusive) in the buffer.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer
        .windows(2)
        .position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])
        .map(|p| start + 2 + p + 2)?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn bounds_found_across_multipart_noise() {
        let mut buffer = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        let jpeg = fake_jpeg(b"pixels");
        buffer.extend_from_slice(&jpeg);
        buffer.extend_from_slice(b"\r\n--frame");

        let (start, end) = find_jpeg_bounds(&buffer).expect("bounds");
        assert_eq!(&buffer[start..end], jpeg.as_slice());
    }

    #[test]
    fn bounds_require_complete_frame() {
        let mut buffer = vec![0xFF, 0xD8];
        buffer.extend_from_slice(b"truncated");
        assert!(find_jpeg_bounds(&buffer).is_none());
    }

    #[test]
    fn stream_yields_frames_in_order() -> Result<()> {
        let mut bytes = Vec::new();
        for payload in [b"one" as &[u8], b"two", b"three"] {
            bytes.extend_from_slice(b"--frame\r\n\r\n");
            bytes.extend_from_slice(&fake_jpeg(payload));
        }
        let mut stream = MjpegStream::new(Box::new(Cursor::new(bytes)));

        assert_eq!(stream.read_next_jpeg()?, fake_jpeg(b"one"));
        assert_eq!(stream.read_next_jpeg()?, fake_jpeg(b"two"));
        assert_eq!(stream.read_next_jpeg()?, fake_jpeg(b"three"));
        Ok(())
    }

    #[test]
    fn exhausted_stream_is_an_interruption() {
        let mut stream = MjpegStream::new(Box::new(Cursor::new(Vec::new())));
        let err = stream.read_next_jpeg().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::StreamInterrupted(_))
        ));
    }
}
