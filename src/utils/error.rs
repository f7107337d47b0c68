// src/utils/error.rs
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to open PDF '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: lopdf::Error,
    },

    #[error("Failed to parse PDF: {0}")]
    Parse(#[from] lopdf::Error), // Automatically convert lopdf errors

    #[error("Document is encrypted and cannot be read without a password")]
    Encrypted,

    #[error("Page {0} does not exist")]
    PageNotFound(u32),

    #[error("Malformed content on page {page}: {message}")]
    Content { page: u32, message: String },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Regular expression error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Heading vocabulary is empty")]
    EmptyVocabulary,

    #[error("Unsupported image encoding: {0}")]
    UnsupportedImage(String),

    #[error("Image decoding error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Malformed image object: {0}")]
    MalformedImage(String),
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine '{0}' is not available")]
    EngineUnavailable(String),

    #[error("I/O error while running OCR: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode image for OCR: {0}")]
    Encode(#[from] image::ImageError),

    #[error("OCR engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Table with {rows} rows and {columns} columns exceeds spreadsheet limits")]
    TableTooLarge { rows: usize, columns: usize },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
