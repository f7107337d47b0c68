// src/extractors/metadata.rs
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

// --- Label Definitions ---
// (result label, text searched for). Order is the order of the output map.
const METADATA_LABELS: &[(&str, &str)] = &[
    ("Report Date", "Report Date"),
    ("Date Submitted", "Date Submitted"),
    ("MEE Project", "MEE Project"),
    ("Sample ID", "Sample ID"),
    ("P.O. No.", "P.O. No."),
    ("Project Title", "PROJECT TITLE"),
    ("Client", "Client"),
    ("Transmittal Letter", "Transmittal Letter"),
];

// `<label><optional colon/dash><rest of line>`, case-insensitive.
static METADATA_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    METADATA_LABELS
        .iter()
        .filter_map(|(label, search)| {
            let pattern = format!(r"(?i){}\s*[:\-]?\s*(.+)", regex::escape(search));
            Regex::new(&pattern).ok().map(|re| (*label, re))
        })
        .collect()
});

/// First match per label, trimmed. Labels without a match are left out.
pub fn extract_metadata(full_text: &str) -> IndexMap<String, String> {
    let mut metadata = IndexMap::new();
    for (label, re) in METADATA_PATTERNS.iter() {
        let Some(value) = re.captures(full_text).and_then(|caps| caps.get(1)) else {
            tracing::trace!("Metadata label '{}' not found", label);
            continue;
        };
        let value = value.as_str().trim();
        if value.is_empty() {
            continue;
        }
        tracing::debug!("Metadata '{}' = '{}'", label, value);
        metadata.insert(label.to_string(), value.to_string());
    }
    tracing::info!("Extracted {} metadata fields", metadata.len());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_is_extracted_from_labeled_line() {
        let metadata = extract_metadata("Client: Acme Corp\nIntroduction:\nHello world\n");
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata["Client"], "Acme Corp");
    }

    #[test]
    fn test_all_template_labels_and_separators() {
        let text = "\
Report Date: March 3, 2021
Date Submitted - February 20, 2021
MEE Project: 21-0042
Sample ID 7781-A
P.O. No.: 4500123
Project Title: Failed Boiler Tube
Client: Northside Power
";
        let metadata = extract_metadata(text);
        let pairs: Vec<(&str, &str)> = metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("Report Date", "March 3, 2021"),
                ("Date Submitted", "February 20, 2021"),
                ("MEE Project", "21-0042"),
                ("Sample ID", "7781-A"),
                ("P.O. No.", "4500123"),
                ("Project Title", "Failed Boiler Tube"),
                ("Client", "Northside Power"),
            ]
        );
    }

    #[test]
    fn test_first_occurrence_wins() {
        let text = "Client: Acme Corp\n...\nReferences:\nClient: Someone Else\n";
        assert_eq!(extract_metadata(text)["Client"], "Acme Corp");
    }

    #[test]
    fn test_labels_are_case_insensitive() {
        let metadata = extract_metadata("SAMPLE ID: x-1\nproject title: Bridge\n");
        assert_eq!(metadata["Sample ID"], "x-1");
        assert_eq!(metadata["Project Title"], "Bridge");
    }

    #[test]
    fn test_missing_labels_are_absent() {
        let metadata = extract_metadata("nothing labeled here");
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_extraction_is_repeatable() {
        let text = "Report Date: today\nClient: A\nClient: B\n";
        assert_eq!(extract_metadata(text), extract_metadata(text));
    }
}
