//! Two-stage recognition: plate localization, then text extraction.
//!
//! Both stages are external collaborators behind traits; this module owns
//! only the orchestration contract:
//! - keep at most K highest-confidence regions above the confidence floor
//! - pad each region by a fixed fraction clipped to frame bounds, crop, and
//!   upscale with quality-preserving interpolation (OCR accuracy on small
//!   plate crops is padding/scale sensitive)
//! - hand the reader the restricted character allowlist, and reject any
//!   output that still carries characters outside it
//! - reject outputs shorter than the minimum length or lacking a letter or
//!   a digit
//!
//! A detector or reader call that errors or overruns its budget is logged
//! and that region is skipped; it never aborts the remaining regions or the
//! frame loop.

pub mod stub;

use std::time::{Duration, Instant};

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::frame::Frame;

pub use stub::{StubDetector, StubReader};

/// A detector-produced plate locator: pixel-space bounding box plus score.
#[derive(Clone, Copy, Debug)]
pub struct PlateBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

/// Raw OCR output for one cropped region.
#[derive(Clone, Debug)]
pub struct RawRecognition {
    pub text: String,
    pub confidence: f32,
}

/// External plate localization collaborator.
///
/// Implementations are assumed synchronous with bounded latency. The image
/// slice is read-only and ephemeral; implementations must not retain it.
pub trait PlateDetector: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<PlateBox>>;
}

/// External OCR collaborator.
///
/// `allowlist` restricts the recognizable character set at the engine, not
/// as an after-the-fact filter; engines that cannot restrict must expect
/// their out-of-set output to be rejected wholesale by the pipeline.
pub trait TextReader: Send {
    fn name(&self) -> &'static str;

    fn read_text(&mut self, image: &RgbImage, allowlist: &str) -> Result<RawRecognition>;
}

/// Recognition stage knobs. Validated once by the config layer.
#[derive(Clone, Debug)]
pub struct RecognitionConfig {
    /// Minimum detector confidence for a region to be considered.
    pub confidence_floor: f32,
    /// Keep at most this many highest-confidence regions per frame.
    pub max_candidates: usize,
    /// Fractional bounding-box padding, clipped to frame bounds.
    pub padding_frac: f32,
    /// Integer crop upscale factor before OCR.
    pub upscale_factor: u32,
    /// Characters the OCR stage may emit.
    pub allowlist: String,
    /// Minimum raw text length to survive filtering.
    pub min_text_len: usize,
    /// Minimum OCR confidence for a reading to survive filtering.
    pub ocr_confidence_floor: f32,
    /// Elapsed-time budget per detector/OCR invocation.
    pub stage_budget: Duration,
}

/// A filtered recognition candidate: allowlisted text, reader confidence,
/// and the upscaled crop it was read from.
pub struct Candidate {
    pub text: String,
    pub confidence: f32,
    pub crop: RgbImage,
}

/// Orchestrates one frame through detection and OCR.
pub struct RecognitionPipeline {
    detector: Box<dyn PlateDetector>,
    reader: Box<dyn TextReader>,
    cfg: RecognitionConfig,
}

impl RecognitionPipeline {
    pub fn new(
        detector: Box<dyn PlateDetector>,
        reader: Box<dyn TextReader>,
        cfg: RecognitionConfig,
    ) -> Self {
        Self {
            detector,
            reader,
            cfg,
        }
    }

    /// Run both stages on one frame.
    ///
    /// Never fails: stage failures are logged and shed at region granularity.
    pub fn recognize(&mut self, frame: &Frame) -> Vec<Candidate> {
        let started = Instant::now();
        let mut boxes = match self.detector.detect(&frame.image) {
            Ok(boxes) => boxes,
            Err(e) => {
                log::warn!(
                    "detector '{}' failed on frame {}: {:#}",
                    self.detector.name(),
                    frame.seq,
                    e
                );
                return Vec::new();
            }
        };
        if started.elapsed() > self.cfg.stage_budget {
            log::warn!(
                "detector '{}' overran its budget on frame {} ({:?} > {:?}); frame skipped",
                self.detector.name(),
                frame.seq,
                started.elapsed(),
                self.cfg.stage_budget
            );
            return Vec::new();
        }

        boxes.retain(|b| b.confidence >= self.cfg.confidence_floor);
        boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        boxes.truncate(self.cfg.max_candidates);

        let mut candidates = Vec::new();
        for plate_box in boxes {
            let Some(crop) = self.crop_region(&frame.image, &plate_box) else {
                continue;
            };

            let started = Instant::now();
            let reading = match self.reader.read_text(&crop, &self.cfg.allowlist) {
                Ok(reading) => reading,
                Err(e) => {
                    log::warn!(
                        "reader '{}' failed on frame {}: {:#}; region skipped",
                        self.reader.name(),
                        frame.seq,
                        e
                    );
                    continue;
                }
            };
            if started.elapsed() > self.cfg.stage_budget {
                log::warn!(
                    "reader '{}' overran its budget on frame {}; region skipped",
                    self.reader.name(),
                    frame.seq
                );
                continue;
            }

            let text = reading.text.trim().to_string();
            if !self.accept_reading(&text, reading.confidence) {
                continue;
            }
            candidates.push(Candidate {
                text,
                confidence: reading.confidence,
                crop,
            });
        }
        candidates
    }

    /// Pad, clip, crop, and upscale one detected region.
    fn crop_region(&self, image: &RgbImage, plate_box: &PlateBox) -> Option<RgbImage> {
        let pad_x = (plate_box.width as f32 * self.cfg.padding_frac) as u32;
        let pad_y = (plate_box.height as f32 * self.cfg.padding_frac) as u32;

        // Saturating on both edges: the box comes from an external detector
        // and may not even intersect the frame.
        let x1 = plate_box.x.saturating_sub(pad_x);
        let y1 = plate_box.y.saturating_sub(pad_y);
        let x2 = plate_box
            .x
            .saturating_add(plate_box.width)
            .saturating_add(pad_x)
            .min(image.width());
        let y2 = plate_box
            .y
            .saturating_add(plate_box.height)
            .saturating_add(pad_y)
            .min(image.height());
        if x1 >= x2 || y1 >= y2 {
            return None;
        }

        let crop = imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
        let scale = self.cfg.upscale_factor.max(1);
        if scale == 1 {
            return Some(crop);
        }
        Some(imageops::resize(
            &crop,
            crop.width() * scale,
            crop.height() * scale,
            FilterType::CatmullRom,
        ))
    }

    /// Structural filter: allowlist membership, length, letter+digit presence.
    fn accept_reading(&self, text: &str, confidence: f32) -> bool {
        if confidence < self.cfg.ocr_confidence_floor {
            return false;
        }
        if text.len() < self.cfg.min_text_len {
            return false;
        }
        // Out-of-set characters reject the reading wholesale; filtering them
        // out here would cascade false positives downstream.
        if !text
            .chars()
            .all(|c| self.cfg.allowlist.contains(c.to_ascii_uppercase()))
        {
            return false;
        }
        let has_letter = text.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = text.chars().any(|c| c.is_ascii_digit());
        has_letter && has_digit
    }
}
