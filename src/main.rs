// src/main.rs
mod document;
mod extractors;
mod ocr;
mod pipeline;
mod storage;
mod utils;

use std::path::PathBuf;

use clap::Parser;
use extractors::{DuplicatePolicy, FallbackMode, SegmenterConfig};
use ocr::{OcrEngine, TesseractEngine};
use pipeline::{ExtractionResult, Pipeline};
use storage::StorageManager;
use utils::AppError;

/// Command Line Interface for the engineering report extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the PDF report
    input: PathBuf,

    /// Output directory for extracted tables and reports
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Heading vocabulary file (one heading per line, '#' comments allowed)
    #[arg(long)]
    headings: Option<PathBuf>,

    /// How repeated headings are stored
    #[arg(long, value_enum, default_value_t = DuplicatePolicy::Overwrite)]
    duplicate_headings: DuplicatePolicy,

    /// When the uppercase-line heading fallback applies
    #[arg(long, value_enum, default_value_t = FallbackMode::Document)]
    fallback: FallbackMode,

    /// Skip image extraction and OCR
    #[arg(long)]
    no_ocr: bool,

    /// OCR executable
    #[arg(long, default_value = "tesseract")]
    tesseract: String,

    /// OCR language
    #[arg(long, default_value = "eng")]
    ocr_lang: String,

    /// Also write the result as JSON (relative paths resolve against the output directory)
    #[arg(long)]
    json: Option<PathBuf>,

    /// Number of recognized-text characters shown per image
    #[arg(long, default_value_t = 100)]
    preview_chars: usize,

    /// Debug mode - save the full text and a heading-annotated copy
    #[arg(short, long)]
    debug: bool,

    /// Verbose logging (debug level unless RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments and setup logging (RUST_LOG overrides --verbose)
    let args = Args::parse();
    utils::logging::setup_logging(args.verbose);
    tracing::info!("Starting processing for args: {:?}", args);

    // 2. Segmenter configuration
    let mut config = SegmenterConfig { duplicates: args.duplicate_headings, fallback: args.fallback, ..Default::default() };
    if let Some(path) = &args.headings {
        config.headings = SegmenterConfig::load_headings(path)?;
    }

    // 3. OCR engine
    let ocr: Option<Box<dyn OcrEngine>> = if args.no_ocr {
        None
    } else {
        Some(Box::new(TesseractEngine::new(&args.tesseract, &args.ocr_lang)))
    };

    // 4. Initialize storage and run
    let storage = StorageManager::new(&args.output_dir)?;
    let pipeline = Pipeline::new(&config, ocr)?;
    let result = pipeline.run(&args.input)?;

    if args.debug {
        let debug_dir = storage.base_dir().join("debug");
        match utils::text_debug::write_debug_dump(&debug_dir, &result.full_text, pipeline.segmenter()) {
            Ok(path) => tracing::info!("Created annotated debug text: {}", path.display()),
            Err(e) => tracing::warn!("Failed to write debug output: {}", e),
        }
    }

    // 5. Console report, saving tables as they are listed
    print_text_report(&result);

    let mut saved_count = 0;
    let mut failed_count = 0;
    for (i, table) in result.tables.iter().enumerate() {
        match storage.save_table(i, table) {
            Ok(path) => {
                println!("\nTable {} saved to '{}'", i + 1, path.display());
                saved_count += 1;
            }
            Err(e) => {
                tracing::error!("Failed to save table {}: {}", i + 1, e);
                failed_count += 1;
            }
        }
    }

    print_image_report(&result, args.preview_chars);

    if let Some(json_path) = &args.json {
        storage.save_report_json(&result, &args.input, json_path)?;
    }

    tracing::info!(
        "Processing finished. Tables saved: {}, table save failures: {}, item failures: {}",
        saved_count,
        failed_count,
        result.failures.len()
    );

    Ok(())
}

fn print_text_report(result: &ExtractionResult) {
    println!("Metadata:");
    for (key, value) in &result.metadata {
        println!("{}: {}", key, value);
    }

    println!("\nSections Found:");
    for section in result.sections.keys() {
        println!("- {}", section);
    }

    println!("\nLists (Table of Contents, List of Figures, List of Tables):");
    for (list_name, items) in &result.lists {
        println!("{}:", list_name);
        for item in items {
            println!("  {}", item);
        }
    }
}

fn print_image_report(result: &ExtractionResult, preview_chars: usize) {
    println!("\nExtracted Images and OCR Text:");
    for (key, record) in &result.images {
        println!("{} - OCR Text: {}...", key, preview(&record.recognized_text, preview_chars));
    }

    if !result.failures.is_empty() {
        println!("\nFailures:");
        for failure in &result.failures {
            println!("{}", failure);
        }
    }
}

/// First `max_chars` characters of `text`, never splitting a character.
fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundaries() {
        assert_eq!(preview("Figure 1", 100), "Figure 1");
        assert_eq!(preview("Figure 1", 6), "Figure");
        assert_eq!(preview("µm scale", 2), "µm");
        assert_eq!(preview("", 5), "");
    }

    #[test]
    fn test_cli_defaults() {
        let args = Args::try_parse_from(["report_extractor", "report.pdf"]).unwrap();
        assert_eq!(args.input, PathBuf::from("report.pdf"));
        assert_eq!(args.output_dir, PathBuf::from("."));
        assert_eq!(args.duplicate_headings, DuplicatePolicy::Overwrite);
        assert_eq!(args.fallback, FallbackMode::Document);
        assert_eq!(args.preview_chars, 100);
        assert!(!args.no_ocr && !args.debug && !args.verbose);
    }

    #[test]
    fn test_cli_policy_flags() {
        let args = Args::try_parse_from([
            "report_extractor",
            "r.pdf",
            "--duplicate-headings",
            "number",
            "--fallback",
            "per-gap",
            "--no-ocr",
        ])
        .unwrap();
        assert_eq!(args.duplicate_headings, DuplicatePolicy::Number);
        assert_eq!(args.fallback, FallbackMode::PerGap);
        assert!(args.no_ocr);
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Args::try_parse_from(["report_extractor"]).is_err());
    }
}
