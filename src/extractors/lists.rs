// src/extractors/lists.rs
use indexmap::IndexMap;

/// Sections whose bodies are line-item listings.
pub const LIST_SECTIONS: [&str; 3] = ["Table of Contents", "List of Figures", "List of Tables"];

/// Splits each listing section present in `sections` into trimmed, non-blank lines.
/// Section keys are matched case-insensitively; output uses the canonical names.
pub fn extract_lists(sections: &IndexMap<String, String>) -> IndexMap<String, Vec<String>> {
    let mut lists = IndexMap::new();
    for list_name in LIST_SECTIONS {
        let Some((key, body)) = sections.iter().find(|(key, _)| key.eq_ignore_ascii_case(list_name)) else {
            continue;
        };
        let items = split_items(body);
        tracing::debug!("List '{}' (section '{}'): {} items", list_name, key, items.len());
        lists.insert(list_name.to_string(), items);
    }
    lists
}

fn split_items(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
