use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

/// Generic function words plus corpus-ubiquitous terms ("thesis", "education",
/// ...) that would otherwise dominate every cloud and n-gram.
const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "against", "among", "also", "been", "before", "being", "between",
    "both", "can", "could", "did", "does", "doing", "during", "each", "from", "have", "having",
    "here", "into", "itself", "just", "more", "most", "much", "must", "only", "other", "over",
    "same", "should", "some", "such", "than", "that", "their", "theirs", "them", "then", "there",
    "these", "they", "this", "those", "through", "under", "until", "very", "were", "what", "when",
    "where", "which", "while", "with", "within", "without", "would", "your", "yours", "study",
    "research", "thesis", "dissertation", "ubc", "university", "doctoral", "doctor", "education",
];

/// A phrase ending in one of these usually swallowed a sentence boundary
/// ("policy presents", "factors influencing understanding").
const LOW_SIGNAL_HEAD_TOKENS: &[&str] = &[
    "higher", "economic", "understand", "understanding", "experience", "experiences",
    "influenced", "influence", "presents", "presented", "furthermore", "year", "years",
    "post", "types", "type", "want", "wants",
    "explores", "examined", "governed", "ensures", "requires", "played",
    "included", "completed", "witnessed", "takes", "suggests", "indicates",
    "ensuring", "involving",
];

/// Discourse connectives and vague qualifiers rejected anywhere in a phrase.
const LOW_SIGNAL_ANYWHERE_TOKENS: &[&str] = &[
    "better", "furthermore", "moreover", "therefore", "thus", "however", "year", "years",
    "different", "british", "columbia", "unspecified", "rather", "even", "although",
    "already", "often", "particularly",
];

/// Hand-tuned denylists that decide which tokens and phrases count as noise.
///
/// The defaults reflect observed noise in the source corpus; they are data,
/// not logic, and can be replaced wholesale from a JSON file without touching
/// the extraction code.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Filters {
    pub stop_words: BTreeSet<String>,
    pub low_signal_head: BTreeSet<String>,
    pub low_signal_anywhere: BTreeSet<String>,
}

impl Default for Filters {
    fn default() -> Self {
        let to_set = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Filters {
            stop_words: to_set(STOP_WORDS),
            low_signal_head: to_set(LOW_SIGNAL_HEAD_TOKENS),
            low_signal_anywhere: to_set(LOW_SIGNAL_ANYWHERE_TOKENS),
        }
    }
}

impl Filters {
    fn try_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("decode {:?}", path))
    }

    /// Load a filter override file, falling back to the compiled-in defaults
    /// when the file is missing or malformed.
    pub fn from_path(path: &Path) -> Self {
        match Self::try_from_path(path) {
            Ok(filters) => {
                debug!("Loaded filter overrides - path={:?}", path);
                filters
            }
            Err(err) => {
                warn!("Filter override unavailable, using defaults - err={:#}", err);
                Filters::default()
            }
        }
    }
}
