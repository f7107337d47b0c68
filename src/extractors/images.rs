// src/extractors/images.rs
use std::collections::HashSet;

use super::{ItemFailure, Stage};
use crate::document::{ImagePlacement, PdfDocument};
use crate::ocr::OcrEngine;
use crate::utils::error::ExtractError;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use indexmap::IndexMap;
use lopdf::{Dictionary, Object, ObjectId, Stream};
use serde::Serialize;

// --- Data Structures ---
/// An embedded image with its recognized text. Pixel data stays in memory only.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub recognized_text: String,
    #[serde(skip)]
    pub image: DynamicImage,
}

#[derive(Debug, Default)]
pub struct ImageStageOutput {
    pub images: IndexMap<String, ImageRecord>,
    pub failures: Vec<ItemFailure>,
}

/// `page_<p>_img_<i>`, both 1-indexed.
pub fn image_key(page_number: u32, index: usize) -> String {
    format!("page_{}_img_{}", page_number, index)
}

// --- Stage ---
/// Decodes every embedded image and runs OCR over it. A failing image is
/// recorded in `failures` and never stops the remaining ones.
pub fn extract_images(doc: &PdfDocument, ocr: &dyn OcrEngine) -> ImageStageOutput {
    let mut output = ImageStageOutput::default();

    for page_number in doc.page_numbers() {
        let placements = page_images(doc, page_number);
        if !placements.is_empty() {
            tracing::debug!("Page {}: {} embedded images", page_number, placements.len());
        }

        for (i, placement) in placements.iter().enumerate() {
            let key = image_key(page_number, i + 1);
            let (format, image) = match decode_image(doc.inner(), placement.object_id) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!("Failed to decode image {} ({}): {}", key, placement.name, e);
                    output.failures.push(ItemFailure::new(Stage::Images, &key, e.to_string()));
                    continue;
                }
            };

            let recognized_text = match ocr.recognize(&image) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("OCR failed for image {}: {}", key, e);
                    output.failures.push(ItemFailure::new(Stage::Ocr, &key, e.to_string()));
                    String::new()
                }
            };
            tracing::debug!("Image {}: {} {}x{}, {} chars recognized", key, format, image.width(), image.height(), recognized_text.len());

            output.images.insert(
                key,
                ImageRecord { format, width: image.width(), height: image.height(), recognized_text, image },
            );
        }
    }

    tracing::info!("Extracted {} images ({} failures)", output.images.len(), output.failures.len());
    output
}

/// Images in drawing order, then any listed in the resources but never drawn.
/// Each image object appears once per page.
fn page_images(doc: &PdfDocument, page_number: u32) -> Vec<ImagePlacement> {
    let drawn = match doc.page_content(page_number) {
        Ok(content) => content.images,
        Err(e) => {
            tracing::warn!("Page {}: could not scan content for image order: {}", page_number, e);
            Vec::new()
        }
    };
    let listed = doc.page_image_resources(page_number).unwrap_or_else(|e| {
        tracing::warn!("Page {}: could not read image resources: {}", page_number, e);
        Vec::new()
    });

    let mut seen: HashSet<ObjectId> = HashSet::new();
    drawn
        .into_iter()
        .chain(listed)
        .filter(|placement| seen.insert(placement.object_id))
        .collect()
}

// --- Decoding ---
fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// File extension the image would be saved under.
fn format_for(filters: &[Vec<u8>]) -> &'static str {
    match filters.last().map(Vec::as_slice) {
        Some(b"DCTDecode") => "jpeg",
        Some(b"JPXDecode") => "jpx",
        Some(b"CCITTFaxDecode") => "tiff",
        _ => "png",
    }
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key).ok()?.as_i64().ok().and_then(|v| u32::try_from(v).ok())
}

/// Decodes an image XObject into pixels, returning it with its format extension.
pub fn decode_image(doc: &lopdf::Document, id: ObjectId) -> Result<(String, DynamicImage), ExtractError> {
    let stream = doc
        .get_object(id)
        .and_then(Object::as_stream)
        .map_err(|e| ExtractError::MalformedImage(format!("object {:?}: {}", id, e)))?;

    let filters = filter_names(&stream.dict);
    let format = format_for(&filters).to_string();

    let image = match filters.last().map(Vec::as_slice) {
        Some(b"DCTDecode") if filters.len() == 1 => image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)?,
        Some(b"DCTDecode") | Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
            let names: Vec<String> = filters.iter().map(|f| String::from_utf8_lossy(f).into_owned()).collect();
            return Err(ExtractError::UnsupportedImage(names.join(" + ")));
        }
        _ => decode_raw_samples(doc, stream, &filters)?,
    };
    Ok((format, image))
}

fn color_components(doc: &lopdf::Document, dict: &Dictionary) -> Result<usize, ExtractError> {
    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return Ok(1);
    }
    let Ok(obj) = dict.get(b"ColorSpace") else {
        return Err(ExtractError::MalformedImage("missing /ColorSpace".to_string()));
    };
    let obj = crate::document::resolve(doc, obj).map_err(|e| ExtractError::MalformedImage(e.to_string()))?;
    let (family, param) = match obj {
        Object::Name(name) => (name.as_slice(), None),
        Object::Array(items) => match items.first() {
            Some(Object::Name(name)) => (name.as_slice(), items.get(1)),
            _ => return Err(ExtractError::MalformedImage("empty /ColorSpace array".to_string())),
        },
        _ => return Err(ExtractError::MalformedImage("unexpected /ColorSpace object".to_string())),
    };

    match family {
        b"DeviceGray" | b"CalGray" | b"G" => Ok(1),
        b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(3),
        b"DeviceCMYK" | b"CMYK" => Ok(4),
        b"ICCBased" => param
            .and_then(|p| crate::document::resolve(doc, p).ok())
            .and_then(|p| p.as_stream().ok())
            .and_then(|profile| dict_u32(&profile.dict, b"N"))
            .map(|n| n as usize)
            .ok_or_else(|| ExtractError::MalformedImage("ICCBased color space without /N".to_string())),
        other => Err(ExtractError::UnsupportedImage(format!(
            "color space {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn decode_raw_samples(doc: &lopdf::Document, stream: &Stream, filters: &[Vec<u8>]) -> Result<DynamicImage, ExtractError> {
    let dict = &stream.dict;
    let width = dict_u32(dict, b"Width").ok_or_else(|| ExtractError::MalformedImage("missing /Width".to_string()))?;
    let height = dict_u32(dict, b"Height").ok_or_else(|| ExtractError::MalformedImage("missing /Height".to_string()))?;
    let components = color_components(doc, dict)?;
    let bits = if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        1
    } else {
        dict_u32(dict, b"BitsPerComponent").unwrap_or(8)
    };

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| ExtractError::MalformedImage(format!("failed to decompress samples: {}", e)))?
    };

    samples_to_image(&data, width, height, components, bits)
}

/// Byte count of a sample buffer, rejecting dimensions that overflow `usize`.
fn sample_len(factors: &[usize]) -> Result<usize, ExtractError> {
    factors
        .iter()
        .try_fold(1usize, |acc, &f| acc.checked_mul(f))
        .ok_or_else(|| ExtractError::MalformedImage(format!("image dimensions {:?} overflow", factors)))
}

fn samples_to_image(data: &[u8], width: u32, height: u32, components: usize, bits: u32) -> Result<DynamicImage, ExtractError> {
    let (w, h) = (width as usize, height as usize);
    let short = |expected: usize| {
        ExtractError::MalformedImage(format!("expected {} bytes of samples, found {}", expected, data.len()))
    };

    match (components, bits) {
        (1, 8) => {
            let expected = sample_len(&[w, h])?;
            let pixels = data.get(..expected).ok_or_else(|| short(expected))?.to_vec();
            GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8).ok_or_else(|| short(expected))
        }
        (3, 8) => {
            let expected = sample_len(&[w, h, 3])?;
            let pixels = data.get(..expected).ok_or_else(|| short(expected))?.to_vec();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8).ok_or_else(|| short(expected))
        }
        (4, 8) => {
            let expected = sample_len(&[w, h, 4])?;
            let cmyk = data.get(..expected).ok_or_else(|| short(expected))?;
            let pixels: Vec<u8> = cmyk
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = 255 - p[3] as u32;
                    [p[0], p[1], p[2]].map(|c| ((255 - c as u32) * k / 255) as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8).ok_or_else(|| short(expected))
        }
        (1, 1) => {
            let row_bytes = w / 8 + usize::from(w % 8 != 0);
            let expected = sample_len(&[row_bytes, h])?;
            let packed = data.get(..expected).ok_or_else(|| short(expected))?;
            let pixels: Vec<u8> = packed
                .chunks_exact(row_bytes.max(1))
                .flat_map(|row| (0..w).map(move |x| if row[x / 8] & (0x80 >> (x % 8)) != 0 { 255 } else { 0 }))
                .collect();
            GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8).ok_or_else(|| short(expected))
        }
        (c, b) => Err(ExtractError::UnsupportedImage(format!("{} components at {} bits", c, b))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fixtures::{build_pdf, rgb_image, FixturePage};
    use crate::utils::error::OcrError;
    use lopdf::dictionary;

    /// Reports the image size as its "recognized" text.
    struct SizeOcr;

    impl OcrEngine for SizeOcr {
        fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
            Ok(format!("{}x{} caption", image.width(), image.height()))
        }

        fn name(&self) -> &str {
            "size"
        }
    }

    struct BrokenOcr;

    impl OcrEngine for BrokenOcr {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            Err(OcrError::EngineFailed { status: "exit status: 1".to_string(), stderr: "bad input".to_string() })
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn jpeg_image() -> Stream {
        let mut bytes = std::io::Cursor::new(Vec::new());
        DynamicImage::new_rgb8(3, 2)
            .write_to(&mut bytes, image::ImageOutputFormat::Jpeg(90))
            .unwrap();
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 3,
                "Height" => 2,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            bytes.into_inner(),
        )
    }

    fn jpx_image() -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "Filter" => "JPXDecode",
            },
            vec![0, 0, 0, 12],
        )
    }

    fn doc_with(pages: Vec<FixturePage>) -> PdfDocument {
        PdfDocument::from_bytes(&build_pdf(pages)).unwrap()
    }

    #[test]
    fn test_images_are_keyed_by_page_and_index() {
        let doc = doc_with(vec![
            FixturePage::text("BT /F1 12 Tf 72 700 Td (No images) Tj ET"),
            FixturePage {
                content: b"q 30 0 0 20 0 0 cm /Im1 Do Q q 30 0 0 20 50 0 cm /Im2 Do Q".to_vec(),
                images: vec![("Im1", rgb_image(2, 1, vec![255, 0, 0, 0, 0, 255])), ("Im2", jpeg_image())],
            },
        ]);
        let output = extract_images(&doc, &SizeOcr);

        assert!(output.failures.is_empty(), "unexpected failures: {:?}", output.failures);
        let keys: Vec<&str> = output.images.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["page_2_img_1", "page_2_img_2"]);

        let raw = &output.images["page_2_img_1"];
        assert_eq!((raw.format.as_str(), raw.width, raw.height), ("png", 2, 1));
        assert_eq!(raw.recognized_text, "2x1 caption");
        assert_eq!(raw.image.to_rgb8().get_pixel(1, 0).0, [0, 0, 255]);

        let jpeg = &output.images["page_2_img_2"];
        assert_eq!((jpeg.format.as_str(), jpeg.width, jpeg.height), ("jpeg", 3, 2));
    }

    #[test]
    fn test_undecodable_image_is_isolated() {
        let doc = doc_with(vec![FixturePage {
            content: b"q 10 0 0 10 0 0 cm /Bad Do Q q 10 0 0 10 20 0 cm /Good Do Q".to_vec(),
            images: vec![("Bad", jpx_image()), ("Good", rgb_image(1, 1, vec![9, 9, 9]))],
        }]);
        let output = extract_images(&doc, &SizeOcr);

        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].stage, Stage::Images);
        assert_eq!(output.failures[0].item, "page_1_img_1");
        assert!(output.images.contains_key("page_1_img_2"));
        assert!(!output.images.contains_key("page_1_img_1"));
    }

    #[test]
    fn test_ocr_failure_keeps_image_with_empty_text() {
        let doc = doc_with(vec![FixturePage {
            content: b"q 10 0 0 10 0 0 cm /Im0 Do Q".to_vec(),
            images: vec![("Im0", rgb_image(1, 1, vec![1, 2, 3]))],
        }]);
        let output = extract_images(&doc, &BrokenOcr);

        assert_eq!(output.images["page_1_img_1"].recognized_text, "");
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].stage, Stage::Ocr);
    }

    #[test]
    fn test_undrawn_resource_images_are_still_extracted_once() {
        let doc = doc_with(vec![FixturePage {
            content: b"q 10 0 0 10 0 0 cm /Im0 Do Q q 10 0 0 10 0 20 cm /Im0 Do Q".to_vec(),
            images: vec![("Im0", rgb_image(1, 1, vec![0, 0, 0])), ("Spare", rgb_image(1, 2, vec![0; 6]))],
        }]);
        let output = extract_images(&doc, &SizeOcr);
        let keys: Vec<&str> = output.images.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["page_1_img_1", "page_1_img_2"]);
        assert_eq!(output.images["page_1_img_2"].height, 2);
    }

    #[test]
    fn test_cmyk_and_bilevel_samples() {
        let cmyk = samples_to_image(&[0, 255, 255, 0], 1, 1, 4, 8).unwrap();
        assert_eq!(cmyk.to_rgb8().get_pixel(0, 0).0, [255, 0, 0]);

        let bilevel = samples_to_image(&[0b1010_0000], 3, 1, 1, 1).unwrap();
        let gray = bilevel.to_luma8();
        assert_eq!([gray.get_pixel(0, 0).0[0], gray.get_pixel(1, 0).0[0], gray.get_pixel(2, 0).0[0]], [255, 0, 255]);
    }

    #[test]
    fn test_oversized_dimensions_are_rejected_not_overflowed() {
        for components in [1, 3, 4] {
            let result = samples_to_image(&[0; 3], u32::MAX, u32::MAX, components, 8);
            assert!(matches!(result, Err(ExtractError::MalformedImage(_))), "{} components", components);
        }
        assert!(matches!(samples_to_image(&[0; 3], u32::MAX, u32::MAX, 1, 1), Err(ExtractError::MalformedImage(_))));
    }

    #[test]
    fn test_oversized_image_does_not_stop_later_images() {
        let doc = doc_with(vec![FixturePage {
            content: b"q 10 0 0 10 0 0 cm /Huge Do Q q 10 0 0 10 20 0 cm /Good Do Q".to_vec(),
            images: vec![("Huge", rgb_image(4294967295, 4294967295, vec![0; 3])), ("Good", rgb_image(1, 1, vec![9, 9, 9]))],
        }]);
        let output = extract_images(&doc, &SizeOcr);

        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].item, "page_1_img_1");
        assert_eq!(output.images["page_1_img_2"].recognized_text, "1x1 caption");
    }

    #[test]
    fn test_truncated_samples_are_rejected() {
        assert!(matches!(samples_to_image(&[1, 2], 2, 2, 1, 8), Err(ExtractError::MalformedImage(_))));
        assert!(matches!(samples_to_image(&[0; 8], 1, 1, 2, 8), Err(ExtractError::UnsupportedImage(_))));
    }
}
