// src/utils/text_debug.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::extractors::SectionSegmenter;
use crate::utils::error::AppError;

/// Saves `text` with each highlighted span wrapped in `[[label>>` ... `<<]]` markers.
/// Overlapping spans after the first are skipped.
pub fn save_debug_text(text: &str, path: &Path, highlights: &[(usize, usize, String)]) -> Result<(), AppError> {
    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| h.0);

    let mut annotated = String::with_capacity(text.len() + highlights.len() * 32);
    let mut last_pos = 0;

    for (start, end, label) in sorted_highlights {
        if start < last_pos || end > text.len() {
            tracing::debug!("Skipping highlight {}-{} ({})", start, end, label);
            continue;
        }
        annotated.push_str(&text[last_pos..start]);
        annotated.push_str(&format!("[[{}>>", label));
        annotated.push_str(&text[start..end]);
        annotated.push_str("<<]]");
        last_pos = end;
    }
    annotated.push_str(&text[last_pos..]);

    fs::write(path, annotated)?;

    tracing::info!("Saved debug text to {}", path.display());
    Ok(())
}

/// Writes `full_text.txt` and `headings_annotated.txt` into `dir`, marking every
/// heading occurrence the segmenter finds with its source and section name.
pub fn write_debug_dump(dir: &Path, text: &str, segmenter: &SectionSegmenter) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("full_text.txt"), text)?;

    let highlights: Vec<(usize, usize, String)> = segmenter
        .find_headings(text)
        .into_iter()
        .map(|h| {
            // Keep the line break that ends a heading outside the marker.
            let end = if text[h.start..h.end].ends_with('\n') { h.end - 1 } else { h.end };
            (h.start, end, format!("{} {}", h.source, h.name))
        })
        .collect();
    tracing::debug!("Annotating {} heading matches", highlights.len());

    let annotated_path = dir.join("headings_annotated.txt");
    save_debug_text(text, &annotated_path, &highlights)?;
    Ok(annotated_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::SegmenterConfig;

    #[test]
    fn test_debug_dump_marks_headings() {
        let dir = tempfile::tempdir().unwrap();
        let debug_dir = dir.path().join("debug");
        let text = "Preamble\nIntroduction:\nHello\nConclusion\nBye\n";
        let segmenter = SectionSegmenter::new(&SegmenterConfig::default()).unwrap();

        let path = write_debug_dump(&debug_dir, text, &segmenter).unwrap();

        assert_eq!(fs::read_to_string(debug_dir.join("full_text.txt")).unwrap(), text);
        let annotated = fs::read_to_string(path).unwrap();
        assert_eq!(
            annotated,
            "Preamble\n[[vocabulary Introduction>>Introduction:<<]]\nHello\n[[vocabulary Conclusion>>Conclusion<<]]\nBye\n"
        );
    }

    #[test]
    fn test_overlapping_highlights_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let highlights = vec![(0, 5, "a".to_string()), (2, 4, "b".to_string())];

        save_debug_text("abcdefg", &path, &highlights).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "[[a>>abcde<<]]fg");
    }
}
