// src/document/models.rs
use lopdf::ObjectId;

/// A run of text shown by one text-showing operator, positioned at its
/// origin in page user space (PDF coordinates, y grows upwards).
/// `width` is the estimated horizontal advance of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub font_size: f32,
    pub text: String,
}

impl TextRun {
    pub fn end_x(&self) -> f32 {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned ruling segment painted on the page.
/// `position` is the y coordinate of a horizontal edge (x of a vertical one),
/// `start..end` its extent along the other axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub orientation: Orientation,
    pub position: f32,
    pub start: f32,
    pub end: f32,
}

impl Edge {
    pub fn horizontal(y: f32, x0: f32, x1: f32) -> Self {
        Self { orientation: Orientation::Horizontal, position: y, start: x0.min(x1), end: x0.max(x1) }
    }

    pub fn vertical(x: f32, y0: f32, y1: f32) -> Self {
        Self { orientation: Orientation::Vertical, position: x, start: y0.min(y1), end: y0.max(y1) }
    }

    pub fn length(&self) -> f32 {
        self.end - self.start
    }
}

/// An image XObject drawn with `Do`, in drawing order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    pub name: String,
    pub object_id: ObjectId,
}

/// Everything the content scanner collects for one page.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub page_number: u32,
    pub runs: Vec<TextRun>,
    pub edges: Vec<Edge>,
    pub images: Vec<ImagePlacement>,
}
