// src/document/mod.rs
pub mod content;
pub mod models;
pub mod text;

use std::path::Path;

use crate::utils::error::DocumentError;
use lopdf::{Dictionary, Object, ObjectId};

pub use models::{Edge, ImagePlacement, Orientation, PageContent, TextRun};

/// Owned handle on a loaded PDF. Dropping it releases the parsed object graph.
pub struct PdfDocument {
    inner: lopdf::Document,
    // (1-based page number, page object id) in page order
    pages: Vec<(u32, ObjectId)>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("page_count", &self.pages.len())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Opens and parses the PDF at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        tracing::debug!("Opening PDF: {}", path.display());
        let inner = lopdf::Document::load(path).map_err(|source| DocumentError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_lopdf(inner)
    }

    /// Parses a PDF held in memory.
    #[cfg(test)]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        let inner = lopdf::Document::load_mem(bytes)?;
        Self::from_lopdf(inner)
    }

    fn from_lopdf(mut inner: lopdf::Document) -> Result<Self, DocumentError> {
        if inner.is_encrypted() {
            // Most "encrypted" reports only carry an owner password.
            if inner.decrypt("").is_err() {
                return Err(DocumentError::Encrypted);
            }
            tracing::debug!("Decrypted document with empty user password");
        }

        let pages = inner.get_pages().into_iter().collect::<Vec<_>>();
        tracing::debug!("Document has {} pages", pages.len());
        Ok(Self { inner, pages })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page numbers (1-based) in document order.
    pub fn page_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().map(|(number, _)| *number)
    }

    pub fn inner(&self) -> &lopdf::Document {
        &self.inner
    }

    fn page_id(&self, page_number: u32) -> Result<ObjectId, DocumentError> {
        self.pages
            .iter()
            .find(|(number, _)| *number == page_number)
            .map(|(_, id)| *id)
            .ok_or(DocumentError::PageNotFound(page_number))
    }

    /// Plain-text rendering of a single page: shown text grouped into lines
    /// in content-stream order, each line followed by a line break.
    pub fn page_text(&self, page_number: u32) -> Result<String, DocumentError> {
        let content = self.page_content(page_number)?;
        Ok(text::page_text(&content.runs))
    }

    /// Concatenation of every page's text, each page followed by a line break.
    pub fn extract_full_text(&self) -> Result<String, DocumentError> {
        let mut text = String::new();
        for page_number in self.page_numbers() {
            let page_text = self.page_text(page_number)?;
            tracing::trace!("Page {}: {} chars of text", page_number, page_text.len());
            text.push_str(&page_text);
            text.push('\n');
        }
        tracing::info!("Extracted {} chars of text from {} pages", text.len(), self.page_count());
        Ok(text)
    }

    /// Scans the page's content stream for positioned text, rulings and image placements.
    pub fn page_content(&self, page_number: u32) -> Result<PageContent, DocumentError> {
        let page_id = self.page_id(page_number)?;
        let bytes = self.inner.get_page_content(page_id).map_err(|e| DocumentError::Content {
            page: page_number,
            message: format!("failed to read content stream: {}", e),
        })?;
        let resources = self.page_resources(page_id)?;
        content::scan_page(&self.inner, page_number, &bytes, resources)
    }

    /// The page's resource dictionary, following inheritance through /Parent.
    pub fn page_resources(&self, page_id: ObjectId) -> Result<Option<&Dictionary>, DocumentError> {
        match resolve_inherited(&self.inner, page_id, b"Resources")? {
            Some(obj) => Ok(Some(resolve(&self.inner, obj)?.as_dict()?)),
            None => Ok(None),
        }
    }

    /// Image XObjects listed in the page resources, in dictionary order.
    pub fn page_image_resources(&self, page_number: u32) -> Result<Vec<ImagePlacement>, DocumentError> {
        let page_id = self.page_id(page_number)?;
        let Some(resources) = self.page_resources(page_id)? else {
            return Ok(Vec::new());
        };
        Ok(content::image_xobjects(&self.inner, resources))
    }
}

/// Follows a reference to the object it points at; direct objects pass through.
pub(crate) fn resolve<'a>(doc: &'a lopdf::Document, obj: &'a Object) -> Result<&'a Object, lopdf::Error> {
    match obj {
        Object::Reference(id) => doc.get_object(*id),
        other => Ok(other),
    }
}

/// Looks up `key` on the page dictionary, walking up /Parent until found.
fn resolve_inherited<'a>(
    doc: &'a lopdf::Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, DocumentError> {
    let mut current = Some(page_id);
    // Page trees are shallow; the bound only guards against /Parent cycles.
    for _ in 0..64 {
        let Some(id) = current else { break };
        let dict = doc.get_object(id)?.as_dict()?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    Ok(None)
}
