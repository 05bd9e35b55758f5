use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::normalize::normalize;

/// How often the dynamic overlay file is polled for changes.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Compiled-in phrase table: canonical spelling plus the variant spellings
/// that should rewrite to it. Each canonical is also registered as a variant
/// of itself, which makes canonicalization idempotent.
const STATIC_ENTRIES: &[(&str, &[&str])] = &[
    ("higher education", &["post-secondary education", "postsecondary education", "tertiary education", "university education"]),
    ("doctoral education", &["doctor of education", "edd", "doctoral studies"]),
    ("teacher education", &["preservice teacher education", "pre-service teacher education", "initial teacher education"]),
    ("educational leadership", &["school leadership", "leadership in education", "education leadership"]),
    ("educational policy", &["education policy", "policy in education", "educational policymaking"]),
    ("indigenous education", &["first nations education", "aboriginal education", "indigenous pedagogy"]),
    ("decolonization", &["decolonisation", "decolonizing", "decolonising"]),
    ("equity diversity inclusion", &["edi", "equity, diversity, and inclusion", "diversity equity inclusion"]),
    ("inclusive education", &["inclusion in education", "inclusive pedagogy", "inclusive schooling"]),
    ("curriculum", &["curriculum development", "curricular design", "curricular"]),
    ("assessment", &["student assessment", "learning assessment", "evaluation"]),
    ("professional learning", &["professional development", "teacher professional development", "continuing professional learning"]),
    ("online learning", &["e-learning", "elearning", "digital learning", "remote learning"]),
    ("international students", &["foreign students", "overseas students"]),
    ("mental health", &["mental illness", "psychological wellbeing", "psychological well-being"]),
    ("british columbia", &["bc", "b.c.", "province of british columbia"]),
    ("university of british columbia", &["ubc", "the university of british columbia"]),
    ("doctor of education", &["edd", "ed.d."]),
];

/// One variant spelling and the canonical phrase it rewrites to, both held as
/// normalized token sequences. `variant_tokens` is never empty.
#[derive(Debug, Clone)]
pub struct PhraseRule {
    pub variant_tokens: Vec<String>,
    pub canonical_tokens: Vec<String>,
}

impl PhraseRule {
    fn new(variant: &str, canonical: &str) -> Option<Self> {
        let variant = normalize(variant);
        let canonical = normalize(canonical);
        if variant.is_empty() || canonical.is_empty() {
            return None;
        }
        Some(PhraseRule {
            variant_tokens: variant.split(' ').map(str::to_string).collect(),
            canonical_tokens: canonical.split(' ').map(str::to_string).collect(),
        })
    }

    fn matches_at(&self, words: &[&str], pos: usize) -> bool {
        let variant = &self.variant_tokens;
        pos + variant.len() <= words.len()
            && variant
                .iter()
                .zip(&words[pos..])
                .all(|(a, b)| a.as_str() == *b)
    }
}

/// Rules grouped by their first token so a scan position only ever consults
/// its own bucket instead of the whole table.
pub type RuleTable = HashMap<String, Vec<PhraseRule>>;

fn bucket_rules(rules: Vec<PhraseRule>) -> RuleTable {
    let mut table: RuleTable = HashMap::new();
    for rule in rules {
        table
            .entry(rule.variant_tokens[0].clone())
            .or_default()
            .push(rule);
    }
    for bucket in table.values_mut() {
        // longest variant first; the stable sort keeps table order on ties
        bucket.sort_by(|a, b| b.variant_tokens.len().cmp(&a.variant_tokens.len()));
    }
    table
}

fn static_table() -> RuleTable {
    let mut rules = Vec::new();
    for (canonical, variants) in STATIC_ENTRIES {
        if normalize(canonical).is_empty() {
            continue;
        }
        for variant in std::iter::once(canonical).chain(variants.iter()) {
            if let Some(rule) = PhraseRule::new(variant, canonical) {
                rules.push(rule);
            }
        }
    }
    bucket_rules(rules)
}

#[derive(Deserialize)]
struct OverlayFile {
    #[serde(default, rename = "variantToCanonical")]
    variant_to_canonical: BTreeMap<String, String>,
}

/// Time-gated reload of the variant→canonical overlay file. A replacement
/// table is built completely off to the side and published with a single
/// write-lock swap, so readers never observe a half-built table.
struct DynamicOverlay {
    path: PathBuf,
    interval: Duration,
    state: RwLock<OverlayState>,
}

struct OverlayState {
    checked_at: Option<Instant>,
    table: Arc<RuleTable>,
}

impl DynamicOverlay {
    fn new(path: PathBuf, interval: Duration) -> Self {
        DynamicOverlay {
            path,
            interval,
            state: RwLock::new(OverlayState {
                checked_at: None,
                table: Arc::new(RuleTable::new()),
            }),
        }
    }

    fn active(&self) -> Arc<RuleTable> {
        {
            let state = self.state.read();
            if let Some(at) = state.checked_at {
                if at.elapsed() < self.interval {
                    return Arc::clone(&state.table);
                }
            }
        }
        let mut state = self.state.write();
        // another caller may have refreshed while we waited for the write lock
        if let Some(at) = state.checked_at {
            if at.elapsed() < self.interval {
                return Arc::clone(&state.table);
            }
        }
        state.checked_at = Some(Instant::now());
        match self.load() {
            Ok(table) => {
                info!(
                    "Dynamic dictionary reloaded - path={:?}, buckets={}",
                    self.path,
                    table.len()
                );
                state.table = Arc::new(table);
            }
            Err(err) if is_not_found(&err) => {
                // absence is not an error; keep whatever was last published
                debug!("Dynamic dictionary absent - path={:?}", self.path);
            }
            Err(err) => {
                warn!(
                    "Dynamic dictionary reload failed, keeping previous table - path={:?}, err={:#}",
                    self.path, err
                );
            }
        }
        Arc::clone(&state.table)
    }

    fn load(&self) -> Result<RuleTable> {
        let raw =
            std::fs::read_to_string(&self.path).with_context(|| format!("read {:?}", self.path))?;
        let parsed: OverlayFile =
            serde_json::from_str(&raw).with_context(|| format!("decode {:?}", self.path))?;
        let rules = parsed
            .variant_to_canonical
            .iter()
            .filter_map(|(variant, canonical)| PhraseRule::new(variant, canonical))
            .collect();
        Ok(bucket_rules(rules))
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

/// Longest-match-first phrase rewrite engine over the static table plus the
/// optional dynamic overlay. The overlay is the only mutable state; the
/// static table is read-only after construction.
pub struct DomainDictionary {
    static_table: RuleTable,
    overlay: Option<DynamicOverlay>,
}

impl Default for DomainDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainDictionary {
    /// Static rules only.
    pub fn new() -> Self {
        DomainDictionary {
            static_table: static_table(),
            overlay: None,
        }
    }

    /// Static rules plus a dynamic overlay polled from `path` at most once per
    /// `interval` of wall-clock time.
    pub fn with_overlay(path: impl Into<PathBuf>, interval: Duration) -> Self {
        DomainDictionary {
            static_table: static_table(),
            overlay: Some(DynamicOverlay::new(path.into(), interval)),
        }
    }

    /// Rewrite every known variant phrase in `text` to its canonical phrase.
    ///
    /// Greedy longest-match, left to right: at each position the dynamic
    /// bucket is consulted before the static one, the first full-sequence
    /// match wins and the scan jumps past the consumed tokens; unmatched
    /// tokens pass through unchanged.
    pub fn canonicalize(&self, text: &str) -> String {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return String::new();
        }
        let overlay = self.overlay.as_ref().map(|o| o.active());
        let words: Vec<&str> = normalized.split(' ').collect();

        let mut out: Vec<&str> = Vec::with_capacity(words.len());
        let mut i = 0;
        while i < words.len() {
            let dynamic = overlay
                .as_deref()
                .and_then(|table| table.get(words[i]))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let statics = self
                .static_table
                .get(words[i])
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            match dynamic
                .iter()
                .chain(statics)
                .find(|rule| rule.matches_at(&words, i))
            {
                Some(rule) => {
                    out.extend(rule.canonical_tokens.iter().map(String::as_str));
                    i += rule.variant_tokens.len();
                }
                None => {
                    out.push(words[i]);
                    i += 1;
                }
            }
        }
        out.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rewrites_known_variants() {
        let dict = DomainDictionary::new();
        assert_eq!(
            dict.canonicalize("Post-Secondary Education policy"),
            "higher education policy"
        );
        assert_eq!(dict.canonicalize("e-learning platforms"), "online learning platforms");
    }

    #[test]
    fn idempotent_on_canonical_phrases() {
        let dict = DomainDictionary::new();
        for phrase in ["higher education", "indigenous education", "mental health"] {
            assert_eq!(dict.canonicalize(phrase), phrase);
            let once = dict.canonicalize(phrase);
            assert_eq!(dict.canonicalize(&once), once);
        }
    }

    #[test]
    fn longest_match_wins_over_shorter_rules() {
        let dict = DomainDictionary::new();
        // "ed.d." normalizes to the two-token variant of "doctor of education";
        // it must not fall through to any shorter rule at the same position.
        assert_eq!(dict.canonicalize("an Ed.D. candidate"), "an doctor of education candidate");
        // the one-token variant still resolves on its own
        assert_eq!(dict.canonicalize("the edd cohort"), "the doctoral education cohort");
    }

    #[test]
    fn passes_unknown_tokens_through() {
        let dict = DomainDictionary::new();
        assert_eq!(dict.canonicalize("quantum basket weaving"), "quantum basket weaving");
        assert_eq!(dict.canonicalize(""), "");
    }

    #[test]
    fn overlay_takes_priority_and_survives_bad_reload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"variantToCanonical": {{"machine learning": "artificial intelligence"}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let dict = DomainDictionary::with_overlay(file.path(), Duration::ZERO);
        assert_eq!(
            dict.canonicalize("machine learning methods"),
            "artificial intelligence methods"
        );

        // corrupt the file; with a zero interval the next call re-reads it and
        // must keep the previously published table
        std::fs::write(file.path(), "{ not json").unwrap();
        assert_eq!(
            dict.canonicalize("machine learning methods"),
            "artificial intelligence methods"
        );
    }

    #[test]
    fn missing_overlay_file_is_not_an_error() {
        let dict = DomainDictionary::with_overlay("/nonexistent/latest.json", Duration::ZERO);
        assert_eq!(dict.canonicalize("higher education"), "higher education");
    }

    #[test]
    fn overlay_rules_prefer_longer_variants_too() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"variantToCanonical": {{
                "deep learning": "machine learning",
                "deep learning theory": "learning theory"
            }}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let dict = DomainDictionary::with_overlay(file.path(), Duration::ZERO);
        assert_eq!(dict.canonicalize("deep learning theory"), "learning theory");
        assert_eq!(dict.canonicalize("deep learning models"), "machine learning models");
    }
}
