// src/extractors/mod.rs
pub mod images;
pub mod lists;
pub mod metadata;
pub mod section;
pub mod tables;

use std::fmt;

use serde::Serialize;

// Re-export key extraction types for convenience
pub use images::{ImageRecord, ImageStageOutput};
pub use section::{DuplicatePolicy, FallbackMode, SectionSegmenter, SegmenterConfig};
pub use tables::Table;

/// Stage that produced a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Tables,
    Images,
    Ocr,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Tables => write!(f, "tables"),
            Stage::Images => write!(f, "images"),
            Stage::Ocr => write!(f, "ocr"),
        }
    }
}

/// One unit of work (a page's tables, an image) that failed without
/// aborting the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub stage: Stage,
    pub item: String,
    pub message: String,
}

impl ItemFailure {
    pub fn new(stage: Stage, item: &str, message: impl Into<String>) -> Self {
        Self { stage, item: item.to_string(), message: message.into() }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.item, self.message)
    }
}
