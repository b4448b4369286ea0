use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

fn clean_text(s: &str) -> String {
    // Unicode NFC normalization + BOM strip + CRLF -> LF + trim
    let mut t = s.nfc().collect::<String>();
    if t.starts_with('\u{FEFF}') {
        t.remove(0);
    }
    if t.contains("\r\n") {
        t = t.replace("\r\n", "\n");
    }
    t.trim().to_string()
}

/// Normalize user input. Returns `None` when nothing is left to send.
pub fn normalize_input(raw: &str) -> Option<String> {
    let t = clean_text(raw);
    (!t.is_empty()).then_some(t)
}

/// Trim hints, drop empty ones and keep the first occurrence of each.
pub fn normalize_hints<S: AsRef<str>>(hints: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    hints
        .iter()
        .map(|h| h.as_ref().trim().to_string())
        .filter(|h| !h.is_empty())
        .filter(|h| seen.insert(h.clone()))
        .collect()
}
