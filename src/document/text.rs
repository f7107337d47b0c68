// src/document/text.rs
//! Assembles positioned text runs into lines of plain text.

use super::models::TextRun;

// Gap (as a fraction of font size) between two runs on a line that reads as a space.
const WORD_GAP: f32 = 0.2;

/// Groups runs into lines in the order given. A run starts a new line when its
/// baseline moves by more than half its font size.
pub fn group_lines<'r>(runs: impl IntoIterator<Item = &'r TextRun>) -> Vec<String> {
    let mut lines: Vec<(f32, String, &'r TextRun)> = Vec::new();

    for run in runs {
        let tolerance = (run.font_size * 0.5).max(1.0);
        match lines.last_mut() {
            Some((y, line, last)) if (*y - run.y).abs() <= tolerance => {
                let gap = run.x - last.end_x();
                if gap > run.font_size.max(1.0) * WORD_GAP && !line.ends_with(' ') && !run.text.starts_with(' ') {
                    line.push(' ');
                }
                line.push_str(&run.text);
                *last = run;
            }
            _ => lines.push((run.y, run.text.clone(), run)),
        }
    }

    lines.into_iter().map(|(_, line, _)| line.trim().to_string()).collect()
}

/// Page text with one line break after every line, in content-stream order.
pub fn page_text(runs: &[TextRun]) -> String {
    let mut text = String::new();
    for line in group_lines(runs) {
        text.push_str(&line);
        text.push('\n');
    }
    text
}
