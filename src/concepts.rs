use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::dictionary::DomainDictionary;
use crate::filters::Filters;
use crate::ngram::extract_ngrams;

/// Concepts a single document may carry.
pub const DEFAULT_CONCEPT_LIMIT: usize = 12;

/// The controlled concept vocabulary: the set of known canonical terms plus a
/// variant→canonical folding map, both loaded from an external JSON resource.
#[derive(Debug, Clone, Default)]
pub struct ConceptDictionary {
    pub canonical_set: BTreeSet<String>,
    pub variant_to_canonical: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ConceptFile {
    #[serde(default)]
    concepts: Vec<ConceptEntry>,
    #[serde(default, rename = "variantToCanonical")]
    variant_to_canonical: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ConceptEntry {
    canonical: String,
}

impl ConceptDictionary {
    fn try_load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        let parsed: ConceptFile =
            serde_json::from_str(&raw).with_context(|| format!("decode {:?}", path))?;
        Ok(ConceptDictionary {
            canonical_set: parsed.concepts.into_iter().map(|c| c.canonical).collect(),
            variant_to_canonical: parsed.variant_to_canonical,
        })
    }

    /// Load the vocabulary, degrading to an empty dictionary when the file is
    /// missing or malformed. Degraded analytics beat a hard failure here.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(dict) => {
                debug!(
                    "Concept dictionary loaded - path={:?}, canonical={}, variants={}",
                    path,
                    dict.canonical_set.len(),
                    dict.variant_to_canonical.len()
                );
                dict
            }
            Err(err) => {
                warn!(
                    "Concept dictionary unavailable, proceeding empty - path={:?}, err={:#}",
                    path, err
                );
                ConceptDictionary::default()
            }
        }
    }

    /// Map a candidate phrase to its canonical concept: a registered variant
    /// folds to its canonical; a known canonical resolves to itself.
    pub fn resolve(&self, term: &str) -> Option<&str> {
        self.variant_to_canonical
            .get(term)
            .map(String::as_str)
            .or_else(|| self.canonical_set.get(term).map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.canonical_set.is_empty() && self.variant_to_canonical.is_empty()
    }
}

/// Extract up to `limit` unique canonical concepts from a document's
/// searchable text (title + abstract + subject terms).
///
/// All 2-gram candidates are consumed before any 3-gram, biasing toward
/// shorter, higher-frequency concepts when both would fit under the cap. Each
/// n-gram gets one more pass through the domain dictionary to fold variants
/// the windowing step could not see; candidates the vocabulary does not know
/// are dropped silently.
pub fn concept_terms(
    title: &str,
    abstract_text: &str,
    subjects: &[String],
    limit: usize,
    concepts: &ConceptDictionary,
    dict: &DomainDictionary,
    filters: &Filters,
) -> Vec<String> {
    let text = format!("{} {} {}", title, abstract_text, subjects.join(" "));
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut out = Vec::new();
    for n in [2, 3] {
        for ngram in extract_ngrams(&text, n, dict, filters) {
            let term = dict.canonicalize(&ngram);
            if term.is_empty() {
                continue;
            }
            let Some(canonical) = concepts.resolve(&term) else {
                continue;
            };
            if !seen.insert(canonical.to_string()) {
                continue;
            }
            out.push(canonical.to_string());
            if out.len() >= limit {
                return out;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> ConceptDictionary {
        ConceptDictionary {
            canonical_set: [
                "higher education",
                "indigenous education",
                "educational policy",
                "classroom practice",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            variant_to_canonical: [("education policy", "educational policy")]
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        }
    }

    fn open_filters() -> Filters {
        let mut f = Filters::default();
        f.stop_words = ["that", "with", "from", "this"]
            .iter()
            .map(|w| w.to_string())
            .collect();
        f
    }

    #[test]
    fn resolves_variants_and_canonicals_only() {
        let dict = DomainDictionary::new();
        let vocab = vocabulary();
        let filters = open_filters();
        let terms = concept_terms(
            "Indigenous education and classroom practice",
            "An unrelated phrase garden furniture appears here",
            &[],
            10,
            &vocab,
            &dict,
            &filters,
        );
        for term in &terms {
            assert!(
                vocab.canonical_set.contains(term)
                    || vocab.variant_to_canonical.values().any(|v| v == term),
                "unknown term {:?}",
                term
            );
        }
        assert!(terms.contains(&"indigenous education".to_string()));
        assert!(terms.contains(&"classroom practice".to_string()));
        assert!(!terms.iter().any(|t| t.contains("garden")));
    }

    #[test]
    fn respects_limit_and_never_duplicates() {
        let dict = DomainDictionary::new();
        let vocab = vocabulary();
        let filters = open_filters();
        let terms = concept_terms(
            "Indigenous education and indigenous education and classroom practice",
            "education policy meets classroom practice",
            &["higher education".to_string()],
            2,
            &vocab,
            &dict,
            &filters,
        );
        assert!(terms.len() <= 2);
        let unique: BTreeSet<&String> = terms.iter().collect();
        assert_eq!(unique.len(), terms.len());
    }

    #[test]
    fn variant_folds_to_canonical_value() {
        let dict = DomainDictionary::new();
        let vocab = vocabulary();
        let filters = open_filters();
        let terms = concept_terms(
            "Education policy reform",
            "",
            &[],
            10,
            &vocab,
            &dict,
            &filters,
        );
        assert_eq!(terms, vec!["educational policy"]);
    }

    #[test]
    fn empty_inputs_yield_empty_terms() {
        let dict = DomainDictionary::new();
        let filters = Filters::default();
        let terms = concept_terms("", "", &[], 10, &ConceptDictionary::default(), &dict, &filters);
        assert!(terms.is_empty());
    }

    #[test]
    fn missing_dictionary_file_loads_empty() {
        let vocab = ConceptDictionary::load_or_default(Path::new("/nonexistent/latest.json"));
        assert!(vocab.is_empty());
        assert_eq!(vocab.resolve("higher education"), None);
    }
}
