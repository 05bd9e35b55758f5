use std::collections::BTreeMap;

use crate::dictionary::DomainDictionary;
use crate::filters::Filters;

fn is_year_token(token: &str) -> bool {
    token.len() == 4 && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_numeric_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Tokens dropped everywhere: short fragments, stop words, bare years and
/// other pure-digit runs.
fn is_filtered_token(token: &str, filters: &Filters) -> bool {
    token.len() < 4
        || filters.stop_words.contains(token)
        || is_year_token(token)
        || is_numeric_token(token)
}

/// Split free text into filtered single tokens. Unlike [`DomainDictionary::canonicalize`]
/// this performs no phrase rewriting and keeps hyphenated words intact
/// ("post-secondary" stays one token).
pub fn tokenize(text: &str, filters: &Filters) -> Vec<String> {
    let lowered = text.to_lowercase();
    let folded: String = lowered
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            c if c.is_whitespace() => c,
            _ => ' ',
        })
        .collect();
    folded
        .split_whitespace()
        .filter(|t| !is_filtered_token(t, filters))
        .map(str::to_string)
        .collect()
}

/// Denylist heuristics for phrases that survived token filtering but are
/// unlikely to name a genuine concept: sentence fragments, discourse glue,
/// and truncated institutional names. The literal "columbia"/"mcfd" rules are
/// corpus-specific tuning.
pub fn is_low_signal_phrase(phrase: &str, filters: &Filters) -> bool {
    let tokens: Vec<&str> = phrase.split_whitespace().collect();
    if tokens.len() < 2 {
        return true;
    }
    if tokens.iter().any(|t| filters.low_signal_anywhere.contains(*t)) {
        return true;
    }
    let head = tokens[tokens.len() - 1];
    if filters.low_signal_head.contains(head) {
        return true;
    }
    if tokens[0] == "columbia" {
        return true;
    }
    if tokens[0] == "mcfd" && (head == "furthermore" || head == "however") {
        return true;
    }
    false
}

/// Slide a window of `n` tokens over the canonicalized text, skipping any
/// window with a filtered token and any low-signal phrase. Duplicates are
/// emitted in order; frequency matters downstream.
pub fn extract_ngrams(
    text: &str,
    n: usize,
    dict: &DomainDictionary,
    filters: &Filters,
) -> Vec<String> {
    let canonical = dict.canonicalize(text);
    let words: Vec<&str> = canonical.split_whitespace().collect();
    let mut out = Vec::new();
    if n == 0 || words.len() < n {
        return out;
    }
    for window in words.windows(n) {
        if window.iter().any(|w| is_filtered_token(w, filters)) {
            continue;
        }
        let phrase = window.join(" ");
        if is_low_signal_phrase(&phrase, filters) {
            continue;
        }
        out.push(phrase);
    }
    out
}

/// Most frequent single tokens in `text`, count descending, term ascending on
/// ties.
pub fn top_terms(text: &str, limit: usize, filters: &Filters) -> Vec<String> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for token in tokenize(text, filters) {
        *counts.entry(token).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked.into_iter().map(|(term, _)| term).collect()
}

fn contains_subsequence(longer: &[String], shorter: &[String]) -> bool {
    longer.len() > shorter.len() && longer.windows(shorter.len()).any(|w| w == shorter)
}

/// Free-form phrases for one document's n-gram cloud: 2-, 3- and 4-grams are
/// counted, then any phrase that is a contiguous sub-sequence of a longer kept
/// phrase is suppressed (evaluated longest-first, so "education policy" loses
/// to a surviving "indigenous education policy"). Phrases longer than three
/// tokens only serve as suppressors and are not emitted themselves.
pub fn document_phrases(
    text: &str,
    dict: &DomainDictionary,
    filters: &Filters,
) -> Vec<(String, u32)> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for n in [2, 3, 4] {
        for phrase in extract_ngrams(text, n, dict, filters) {
            *counts.entry(phrase).or_insert(0) += 1;
        }
    }

    struct Entry {
        term: String,
        count: u32,
        tokens: Vec<String>,
    }
    let mut entries: Vec<Entry> = counts
        .into_iter()
        .map(|(term, count)| Entry {
            tokens: term.split(' ').map(str::to_string).collect(),
            term,
            count,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.tokens
            .len()
            .cmp(&a.tokens.len())
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.term.cmp(&b.term))
    });

    let mut kept: Vec<Entry> = Vec::new();
    for entry in entries {
        let is_subphrase = kept.iter().any(|longer| contains_subsequence(&longer.tokens, &entry.tokens));
        if !is_subphrase {
            kept.push(entry);
        }
    }

    kept.into_iter()
        .filter(|e| e.tokens.len() <= 3 && !is_low_signal_phrase(&e.term, filters))
        .map(|e| (e.term, e.count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_filters() -> Filters {
        // generic stop list only, so domain words like "education" survive
        let mut f = Filters::default();
        f.stop_words = ["that", "with", "from", "this"]
            .iter()
            .map(|w| w.to_string())
            .collect();
        f
    }

    #[test]
    fn tokenize_drops_short_stop_and_numeric_tokens() {
        let filters = Filters::default();
        let tokens = tokenize("The 2021 cohort of 12 explored decolonization within schools", &filters);
        assert_eq!(tokens, vec!["cohort", "explored", "decolonization", "schools"]);
    }

    #[test]
    fn tokenize_keeps_hyphenated_words() {
        let filters = Filters::default();
        let tokens = tokenize("post-secondary pathways", &filters);
        assert_eq!(tokens, vec!["post-secondary", "pathways"]);
    }

    #[test]
    fn ngrams_never_contain_filtered_tokens() {
        let dict = DomainDictionary::new();
        let filters = open_filters();
        let ngrams = extract_ngrams(
            "learning outcomes in 2019 shaped classroom practice",
            2,
            &dict,
            &filters,
        );
        for phrase in &ngrams {
            for token in phrase.split(' ') {
                assert!(token.len() >= 4, "short token in {:?}", phrase);
                assert!(!is_year_token(token), "year token in {:?}", phrase);
            }
        }
        assert!(ngrams.contains(&"learning outcomes".to_string()));
        assert!(ngrams.contains(&"classroom practice".to_string()));
    }

    #[test]
    fn low_signal_phrases_are_rejected() {
        let filters = Filters::default();
        assert!(is_low_signal_phrase("single", &filters));
        assert!(is_low_signal_phrase("policy presents", &filters));
        assert!(is_low_signal_phrase("however classrooms", &filters));
        assert!(is_low_signal_phrase("columbia schools", &filters));
        assert!(!is_low_signal_phrase("classroom practice", &filters));
    }

    #[test]
    fn ngram_extraction_applies_canonicalization_first() {
        let dict = DomainDictionary::new();
        let filters = open_filters();
        let ngrams = extract_ngrams("post-secondary education policy", 2, &dict, &filters);
        // "post-secondary education" was rewritten to "higher education" before windowing
        assert_eq!(ngrams, vec!["higher education", "education policy"]);
    }

    #[test]
    fn top_terms_ranks_by_frequency_then_term() {
        let filters = open_filters();
        let terms = top_terms("alpha beta beta gamma gamma", 2, &filters);
        assert_eq!(terms, vec!["beta", "gamma"]);
    }

    #[test]
    fn document_phrases_suppress_contiguous_subphrases() {
        let dict = DomainDictionary::new();
        let filters = open_filters();
        // "with" is filtered, so no 4-gram window survives to suppress the 3-gram
        let text = "with classroom assessment practice with classroom assessment practice";
        let phrases = document_phrases(text, &dict, &filters);
        let terms: Vec<&str> = phrases.iter().map(|(t, _)| t.as_str()).collect();
        assert!(terms.contains(&"classroom assessment practice"));
        assert!(!terms.contains(&"classroom assessment"));
        assert!(!terms.contains(&"assessment practice"));
    }

    #[test]
    fn document_phrases_cap_emitted_length_at_three_tokens() {
        let dict = DomainDictionary::new();
        let filters = open_filters();
        let text = "community health worker training community health worker training";
        for (term, _) in document_phrases(text, &dict, &filters) {
            assert!(term.split(' ').count() <= 3, "too long: {:?}", term);
        }
    }
}
