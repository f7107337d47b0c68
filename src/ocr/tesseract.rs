// src/ocr/tesseract.rs
use std::io::ErrorKind;
use std::process::{Command, Stdio};

use super::OcrEngine;
use crate::utils::error::OcrError;
use image::{DynamicImage, ImageFormat};

/// Runs the external `tesseract` executable on a temporary PNG.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: String,
    language: String,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self { command: command.into(), language: language.into() }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        // Removed when `scratch` drops, on every path out of this function.
        let scratch = tempfile::Builder::new()
            .prefix("report-ocr-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(scratch.path(), ImageFormat::Png)?;

        tracing::trace!("Running {} on {}", self.command, scratch.path().display());
        let output = Command::new(&self.command)
            .arg(scratch.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => OcrError::EngineUnavailable(self.command.clone()),
                _ => OcrError::Io(e),
            })?;

        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn is_available(&self) -> bool {
        Command::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        &self.command
    }
}
