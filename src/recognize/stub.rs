//! Stub recognition collaborators.
//!
//! Deterministic stand-ins for the external detector and OCR engines, used
//! by the daemon's stub mode and by integration tests. The detector reports
//! one centered region per frame; the reader cycles through a scripted list
//! of plate texts.

use anyhow::Result;
use image::RgbImage;

use super::{PlateBox, PlateDetector, RawRecognition, TextReader};

/// Reports one high-confidence region in the middle third of every frame.
pub struct StubDetector {
    confidence: f32,
}

impl StubDetector {
    pub fn new() -> Self {
        Self { confidence: 0.9 }
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PlateDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<PlateBox>> {
        let width = (image.width() / 3).max(1);
        let height = (image.height() / 3).max(1);
        Ok(vec![PlateBox {
            x: width,
            y: height,
            width,
            height,
            confidence: self.confidence,
        }])
    }
}

/// Emits scripted plate texts in rotation, all at a fixed confidence.
pub struct StubReader {
    texts: Vec<String>,
    confidence: f32,
    cursor: usize,
}

impl StubReader {
    pub fn new(texts: Vec<String>, confidence: f32) -> Self {
        Self {
            texts,
            confidence,
            cursor: 0,
        }
    }

    /// Single fixed plate at high confidence, for bring-up.
    pub fn fixed(text: &str) -> Self {
        Self::new(vec![text.to_string()], 0.9)
    }
}

impl TextReader for StubReader {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn read_text(&mut self, _image: &RgbImage, _allowlist: &str) -> Result<RawRecognition> {
        if self.texts.is_empty() {
            return Ok(RawRecognition {
                text: String::new(),
                confidence: 0.0,
            });
        }
        let text = self.texts[self.cursor % self.texts.len()].clone();
        self.cursor += 1;
        Ok(RawRecognition {
            text,
            confidence: self.confidence,
        })
    }
}
