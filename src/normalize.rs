use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strip combining diacritical marks after NFKD decomposition ("café" → "cafe").
pub fn strip_diacritics(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Fold free text into the canonical token form every matcher works on:
/// diacritics stripped, lowercased, anything outside `[a-z0-9]` mapped to a
/// space (hyphen and underscore runs fold too, so "post-secondary" becomes
/// "post secondary"), whitespace collapsed to single spaces, trimmed.
///
/// Idempotent; empty input yields an empty string.
pub fn normalize(text: &str) -> String {
    let lowered = strip_diacritics(text).to_lowercase();
    let folded: String = lowered
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' => c,
            _ => ' ',
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
