// src/document/content.rs
//! Minimal content-stream interpreter: tracks the graphics and text state
//! just far enough to place text runs, ruling lines and images on the page.

use std::collections::BTreeMap;

use super::models::{Edge, ImagePlacement, PageContent, TextRun};
use super::resolve;
use crate::utils::error::DocumentError;
use lopdf::content::Content;
use lopdf::Encoding;
use lopdf::{Dictionary, Object};

// --- Constants ---
// Segments this far off axis still count as horizontal/vertical rulings.
const AXIS_TOLERANCE: f32 = 1.0;
// Nested form XObjects deeper than this are not entered.
const MAX_FORM_DEPTH: usize = 4;
// Rough glyph advance as a fraction of font size, used when a run is not
// explicitly repositioned before the next one.
const AVG_GLYPH_WIDTH: f32 = 0.5;
// TJ adjustments (thousandths of an em) more negative than this read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -250.0;

/// Affine transform `[a b c d e f]` as used throughout PDF.
type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

fn translation(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, obj) in out.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(out)
}

/// Decodes a PDF string operand with no usable font encoding: UTF-16BE when
/// BOM-prefixed, otherwise Latin-1.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
}

#[derive(Debug, Clone)]
struct TextState {
    matrix: Matrix,
    line_matrix: Matrix,
    font: Option<Vec<u8>>,
    font_size: f32,
    leading: f32,
}

impl TextState {
    fn new() -> Self {
        Self { matrix: IDENTITY, line_matrix: IDENTITY, font: None, font_size: 0.0, leading: 0.0 }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translation(tx, ty), &self.line_matrix);
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }
}

/// Path segments collected since the last painting operator.
#[derive(Debug, Default)]
struct PathBuilder {
    segments: Vec<((f32, f32), (f32, f32))>,
    current: Option<(f32, f32)>,
    subpath_start: Option<(f32, f32)>,
}

impl PathBuilder {
    fn move_to(&mut self, p: (f32, f32)) {
        self.current = Some(p);
        self.subpath_start = Some(p);
    }

    fn line_to(&mut self, p: (f32, f32)) {
        if let Some(from) = self.current {
            self.segments.push((from, p));
        }
        self.current = Some(p);
    }

    fn close(&mut self) {
        if let (Some(current), Some(start)) = (self.current, self.subpath_start) {
            if current != start {
                self.segments.push((current, start));
            }
            self.current = Some(start);
        }
    }

    fn take_edges(&mut self) -> Vec<Edge> {
        let edges = self
            .segments
            .drain(..)
            .filter_map(|((x0, y0), (x1, y1))| {
                if (y0 - y1).abs() <= AXIS_TOLERANCE && (x0 - x1).abs() > AXIS_TOLERANCE {
                    Some(Edge::horizontal((y0 + y1) / 2.0, x0, x1))
                } else if (x0 - x1).abs() <= AXIS_TOLERANCE && (y0 - y1).abs() > AXIS_TOLERANCE {
                    Some(Edge::vertical((x0 + x1) / 2.0, y0, y1))
                } else {
                    None
                }
            })
            .collect();
        self.discard();
        edges
    }

    fn discard(&mut self) {
        self.segments.clear();
        self.current = None;
        self.subpath_start = None;
    }
}

/// Image XObjects named in a resource dictionary, in dictionary order.
pub fn image_xobjects(doc: &lopdf::Document, resources: &Dictionary) -> Vec<ImagePlacement> {
    let Some(xobjects) = xobject_dict(doc, resources) else {
        return Vec::new();
    };
    xobjects
        .iter()
        .filter_map(|(name, obj)| {
            let id = obj.as_reference().ok()?;
            let stream = doc.get_object(id).ok()?.as_stream().ok()?;
            is_subtype(&stream.dict, b"Image").then(|| ImagePlacement {
                name: String::from_utf8_lossy(name).into_owned(),
                object_id: id,
            })
        })
        .collect()
}

fn xobject_dict<'a>(doc: &'a lopdf::Document, resources: &'a Dictionary) -> Option<&'a Dictionary> {
    let obj = resources.get(b"XObject").ok()?;
    resolve(doc, obj).ok()?.as_dict().ok()
}

/// Encodings of the fonts named in a resource dictionary, keyed by resource name.
/// Fonts whose encoding lopdf cannot resolve are left out.
fn font_encodings<'a>(doc: &'a lopdf::Document, resources: Option<&'a Dictionary>) -> BTreeMap<Vec<u8>, Encoding<'a>> {
    let mut encodings = BTreeMap::new();
    let Some(fonts) = resources
        .and_then(|r| r.get(b"Font").ok())
        .and_then(|obj| resolve(doc, obj).ok())
        .and_then(|obj| obj.as_dict().ok())
    else {
        return encodings;
    };

    for (name, obj) in fonts.iter() {
        let Some(font) = resolve(doc, obj).ok().and_then(|f| f.as_dict().ok()) else {
            continue;
        };
        match font.get_font_encoding(doc) {
            Ok(encoding) => {
                encodings.insert(name.clone(), encoding);
            }
            Err(e) => tracing::debug!("Font {}: no usable encoding ({})", String::from_utf8_lossy(name), e),
        }
    }
    encodings
}

/// Decodes a string operand through the current font's encoding, falling back
/// to `decode_pdf_string` when the font is unknown or decoding fails.
fn decode_with_font(encodings: &BTreeMap<Vec<u8>, Encoding<'_>>, font: Option<&[u8]>, bytes: &[u8]) -> String {
    font.and_then(|name| encodings.get(name))
        .and_then(|encoding| lopdf::Document::decode_text(encoding, bytes).ok())
        .unwrap_or_else(|| decode_pdf_string(bytes))
}

fn is_subtype(dict: &Dictionary, subtype: &[u8]) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name.as_slice() == subtype)
}

/// Interprets a page content stream.
pub fn scan_page<'a>(
    doc: &'a lopdf::Document,
    page_number: u32,
    bytes: &[u8],
    resources: Option<&'a Dictionary>,
) -> Result<PageContent, DocumentError> {
    let mut scanner = Scanner {
        doc,
        page_number,
        out: PageContent { page_number, ..Default::default() },
    };
    scanner.run(bytes, resources, IDENTITY, 0)?;
    tracing::trace!(
        "Page {}: {} text runs, {} edges, {} image placements",
        page_number,
        scanner.out.runs.len(),
        scanner.out.edges.len(),
        scanner.out.images.len()
    );
    Ok(scanner.out)
}

struct Scanner<'a> {
    doc: &'a lopdf::Document,
    page_number: u32,
    out: PageContent,
}

impl<'a> Scanner<'a> {
    fn run(
        &mut self,
        bytes: &[u8],
        resources: Option<&'a Dictionary>,
        base_ctm: Matrix,
        depth: usize,
    ) -> Result<(), DocumentError> {
        let content = Content::decode(bytes).map_err(|e| DocumentError::Content {
            page: self.page_number,
            message: format!("failed to decode content stream: {}", e),
        })?;

        let encodings = font_encodings(self.doc, resources);
        let decode = |font: &Option<Vec<u8>>, bytes: &[u8]| decode_with_font(&encodings, font.as_deref(), bytes);

        let mut gstate = GraphicsState { ctm: base_ctm };
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut text = TextState::new();
        let mut path = PathBuilder::default();

        for op in &content.operations {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                // --- Graphics state ---
                "q" => stack.push(gstate.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        gstate = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = numbers::<6>(operands) {
                        gstate.ctm = multiply(&m, &gstate.ctm);
                    }
                }

                // --- Path construction & painting ---
                "m" => {
                    if let Some([x, y]) = numbers::<2>(operands) {
                        path.move_to(apply(&gstate.ctm, x, y));
                    }
                }
                "l" => {
                    if let Some([x, y]) = numbers::<2>(operands) {
                        path.line_to(apply(&gstate.ctm, x, y));
                    }
                }
                "c" | "v" | "y" => {
                    // Curves never form rulings; only the end point matters.
                    if let Some(last) = operands.len().checked_sub(2) {
                        if let Some([x, y]) = numbers::<2>(&operands[last..]) {
                            let p = apply(&gstate.ctm, x, y);
                            path.current = Some(p);
                        }
                    }
                }
                "h" => path.close(),
                "re" => {
                    if let Some([x, y, w, h]) = numbers::<4>(operands) {
                        let ctm = &gstate.ctm;
                        path.move_to(apply(ctm, x, y));
                        path.line_to(apply(ctm, x + w, y));
                        path.line_to(apply(ctm, x + w, y + h));
                        path.line_to(apply(ctm, x, y + h));
                        path.close();
                    }
                }
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    if matches!(op.operator.as_str(), "s" | "b" | "b*") {
                        path.close();
                    }
                    self.out.edges.extend(path.take_edges());
                }
                "n" => path.discard(),

                // --- Text ---
                "BT" => {
                    text = TextState {
                        font: text.font.take(),
                        font_size: text.font_size,
                        leading: text.leading,
                        ..TextState::new()
                    }
                }
                "ET" => {}
                "Tf" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        text.font = Some(name.clone());
                    }
                    if let Some(size) = operands.get(1).and_then(number) {
                        text.font_size = size;
                    }
                }
                "TL" => {
                    if let Some([leading]) = numbers::<1>(operands) {
                        text.leading = leading;
                    }
                }
                "Tm" => {
                    if let Some(m) = numbers::<6>(operands) {
                        text.matrix = m;
                        text.line_matrix = m;
                    }
                }
                "Td" => {
                    if let Some([tx, ty]) = numbers::<2>(operands) {
                        text.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if let Some([tx, ty]) = numbers::<2>(operands) {
                        text.leading = -ty;
                        text.move_line(tx, ty);
                    }
                }
                "T*" => text.next_line(),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        let shown = decode(&text.font, bytes);
                        self.show_text(&mut text, &gstate, shown, 0.0);
                    }
                }
                "'" => {
                    text.next_line();
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        let shown = decode(&text.font, bytes);
                        self.show_text(&mut text, &gstate, shown, 0.0);
                    }
                }
                "\"" => {
                    text.next_line();
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        let shown = decode(&text.font, bytes);
                        self.show_text(&mut text, &gstate, shown, 0.0);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        let mut shown = String::new();
                        let mut adjust = 0.0;
                        for item in items {
                            match item {
                                Object::String(bytes, _) => shown.push_str(&decode(&text.font, bytes)),
                                other => {
                                    if let Some(n) = number(other) {
                                        adjust += n;
                                        if n < TJ_SPACE_THRESHOLD && !shown.ends_with(' ') {
                                            shown.push(' ');
                                        }
                                    }
                                }
                            }
                        }
                        self.show_text(&mut text, &gstate, shown, adjust);
                    }
                }

                // --- XObjects ---
                "Do" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        self.invoke_xobject(name, resources, &gstate, depth)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn show_text(&mut self, text: &mut TextState, gstate: &GraphicsState, shown: String, tj_adjust: f32) {
        let rendering = multiply(&text.matrix, &gstate.ctm);
        let (x, y) = apply(&rendering, 0.0, 0.0);
        let scale = (rendering[2] * rendering[2] + rendering[3] * rendering[3]).sqrt();
        let x_scale = (rendering[0] * rendering[0] + rendering[1] * rendering[1]).sqrt();
        let advance = shown.chars().count() as f32 * text.font_size * AVG_GLYPH_WIDTH
            - tj_adjust / 1000.0 * text.font_size;
        text.matrix = multiply(&translation(advance, 0.0), &text.matrix);

        if shown.trim().is_empty() {
            return;
        }
        self.out.runs.push(TextRun { x, y, width: advance * x_scale, font_size: text.font_size * scale, text: shown });
    }

    fn invoke_xobject(
        &mut self,
        name: &[u8],
        resources: Option<&'a Dictionary>,
        gstate: &GraphicsState,
        depth: usize,
    ) -> Result<(), DocumentError> {
        let doc = self.doc;
        let Some(xobjects) = resources.and_then(|r| xobject_dict(doc, r)) else {
            return Ok(());
        };
        let Ok(obj) = xobjects.get(name) else {
            tracing::debug!("Page {}: Do references unknown XObject {:?}", self.page_number, String::from_utf8_lossy(name));
            return Ok(());
        };
        let Ok(id) = obj.as_reference() else {
            return Ok(());
        };
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            return Ok(());
        };

        if is_subtype(&stream.dict, b"Image") {
            self.out.images.push(ImagePlacement {
                name: String::from_utf8_lossy(name).into_owned(),
                object_id: id,
            });
        } else if is_subtype(&stream.dict, b"Form") {
            if depth >= MAX_FORM_DEPTH {
                tracing::debug!("Page {}: skipping form XObject nested too deep", self.page_number);
                return Ok(());
            }
            let form_matrix = stream
                .dict
                .get(b"Matrix")
                .and_then(Object::as_array)
                .ok()
                .and_then(|arr| numbers::<6>(arr))
                .unwrap_or(IDENTITY);
            let form_resources = stream
                .dict
                .get(b"Resources")
                .ok()
                .and_then(|r| resolve(doc, r).ok())
                .and_then(|r| r.as_dict().ok())
                .or(resources);
            let bytes = stream.decompressed_content().unwrap_or_else(|_| stream.content.clone());
            self.run(&bytes, form_resources, multiply(&form_matrix, &gstate.ctm), depth + 1)?;
        }
        Ok(())
    }
}
