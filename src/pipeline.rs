// src/pipeline.rs
use std::path::Path;

use crate::document::PdfDocument;
use crate::extractors::{
    images, lists, metadata, tables, ImageRecord, ImageStageOutput, ItemFailure, SectionSegmenter, SegmenterConfig,
    Table,
};
use crate::ocr::OcrEngine;
use crate::utils::error::{AppError, ExtractError};
use indexmap::IndexMap;
use serde::Serialize;

/// Everything extracted from one report. Assembled once by the pipeline from
/// each stage's own output.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub full_text: String,
    pub metadata: IndexMap<String, String>,
    pub sections: IndexMap<String, String>,
    pub lists: IndexMap<String, Vec<String>>,
    pub tables: Vec<Table>,
    pub images: IndexMap<String, ImageRecord>,
    pub failures: Vec<ItemFailure>,
}

pub struct Pipeline {
    segmenter: SectionSegmenter,
    ocr: Option<Box<dyn OcrEngine>>,
}

impl Pipeline {
    /// `ocr: None` skips the image stage entirely.
    pub fn new(config: &SegmenterConfig, ocr: Option<Box<dyn OcrEngine>>) -> Result<Self, ExtractError> {
        Ok(Self { segmenter: SectionSegmenter::new(config)?, ocr })
    }

    pub fn segmenter(&self) -> &SectionSegmenter {
        &self.segmenter
    }

    /// Runs all stages over the PDF at `path`. Only a document that cannot be
    /// opened or read fails the run; table and image problems end up in
    /// `failures`.
    pub fn run<P: AsRef<Path>>(&self, path: P) -> Result<ExtractionResult, AppError> {
        let path = path.as_ref();
        tracing::info!("Processing {}", path.display());

        // 1-2. Text and tables share one handle, dropped at the end of the block.
        let (full_text, table_output) = {
            let doc = PdfDocument::open(path)?;
            let full_text = doc.extract_full_text()?;
            let table_output = tables::extract_tables(&doc);
            (full_text, table_output)
        };

        // 3-5. Pure text stages.
        let metadata = metadata::extract_metadata(&full_text);
        let sections = self.segmenter.segment(&full_text);
        let lists = lists::extract_lists(&sections);

        // 6. Images read the document through their own handle.
        let image_output = match &self.ocr {
            Some(engine) => {
                if !engine.is_available() {
                    tracing::warn!("OCR engine '{}' is not available; images will have no recognized text", engine.name());
                }
                let doc = PdfDocument::open(path)?;
                images::extract_images(&doc, engine.as_ref())
            }
            None => {
                tracing::info!("Image/OCR stage disabled");
                ImageStageOutput::default()
            }
        };

        let mut failures = table_output.failures;
        failures.extend(image_output.failures);
        if !failures.is_empty() {
            tracing::warn!("{} items failed during extraction", failures.len());
        }

        Ok(ExtractionResult {
            full_text,
            metadata,
            sections,
            lists,
            tables: table_output.tables,
            images: image_output.images,
            failures,
        })
    }
}
