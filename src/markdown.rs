//! Plain-text cleanup of assistant replies.
//!
//! The steps run in a fixed order and each one is a global, non-overlapping
//! substitution, so text unwrapped by an earlier step can still be matched by
//! a later one.

use regex::Regex;
use std::sync::OnceLock;

// (pattern, replacement) in application order
const RULES: &[(&str, &str)] = &[
    // bold
    (r"\*\*(.+?)\*\*", "${1}"),
    (r"__(.+?)__", "${1}"),
    // italic; content may not contain the marker, so `***` rules survive
    (r"\*([^*\n]+)\*", "${1}"),
    (r"_([^_\n]+)_", "${1}"),
    // inline code; likewise leaves ``` fences for the next rule
    (r"`([^`\n]+)`", "${1}"),
    // fenced blocks are dropped with their contents
    (r"```[\s\S]*?```", ""),
    // headings
    (r"(?m)^#{1,6}[ \t]+", ""),
    // links keep their text
    (r"\[(.*?)\]\(.*?\)", "${1}"),
    // strikethrough
    (r"~~(.+?)~~", "${1}"),
    // blockquotes
    (r"(?m)^>[ \t]?", ""),
    // horizontal rules
    (r"(?m)^[ \t]*[-*]{3,}[ \t]*$", ""),
    (r"\n{3,}", "\n\n"),
];

fn compiled_rules() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
                Ok(re) => Some((re, *replacement)),
                Err(e) => {
                    log::error!("Skipping invalid markdown rule {}: {}", pattern, e);
                    None
                }
            })
            .collect()
    })
}

/// Strips lightweight markdown from `text` and trims the result.
pub fn strip_markdown(text: &str) -> String {
    let mut cleaned = text.to_string();
    for (re, replacement) in compiled_rules() {
        cleaned = re.replace_all(&cleaned, *replacement).into_owned();
    }
    cleaned.trim().to_string()
}
