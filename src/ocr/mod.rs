// src/ocr/mod.rs
pub mod tesseract;

use crate::utils::error::OcrError;
use image::DynamicImage;

pub use tesseract::TesseractEngine;

/// Optical character recognition over a decoded image.
pub trait OcrEngine {
    /// Recognized text for the whole image (may be empty).
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;

    /// Whether the engine can run at all on this machine.
    fn is_available(&self) -> bool {
        true
    }

    /// Short name used in logs.
    fn name(&self) -> &str;
}
