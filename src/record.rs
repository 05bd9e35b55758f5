use std::collections::HashMap;

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::concepts::{concept_terms, ConceptDictionary, DEFAULT_CONCEPT_LIMIT};
use crate::dictionary::DomainDictionary;
use crate::filters::Filters;
use crate::ngram::top_terms;

/// Everything record construction needs besides the raw metadata itself.
pub struct ExtractionContext {
    pub domain: DomainDictionary,
    pub concepts: ConceptDictionary,
    pub filters: Filters,
}

/// The unit of analysis. Built once per aggregation pass from a raw metadata
/// object; every derived field (year, methodologies, themes, concept terms)
/// is computed here and never recomputed for the lifetime of the record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub supervisors: Vec<String>,
    pub date: String,
    pub year: Option<i32>,
    pub degree: String,
    pub program: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub subjects: Vec<String>,
    pub pages: u32,
    pub pages_source: String,
    pub word_count: u32,
    pub word_count_source: String,
    pub char_count: usize,
    pub themes: Vec<String>,
    pub methodologies: Vec<String>,
    pub concept_terms: Vec<String>,
}

impl DocumentRecord {
    /// Title + abstract + subject terms, the searchable text concept and
    /// phrase extraction run on.
    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.title, self.abstract_text, self.subjects.join(" "))
    }

    /// Wider text used for the single-token word cloud.
    pub fn cloud_text(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.title,
            self.abstract_text,
            self.subjects.join(" "),
            self.program,
            self.degree
        )
    }
}

/// Per-document measurements extracted from the stored file itself, keyed by
/// record id; they override the weaker metadata-derived estimates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileMetrics {
    pub word_count: Option<u32>,
    pub page_count: Option<u32>,
    pub word_source: Option<String>,
    pub page_source: Option<String>,
}

/// Flatten a metadata value into trimmed, non-empty strings. Arrays flatten
/// recursively; scalars stringify.
pub fn to_array(value: Option<&Value>) -> Vec<String> {
    fn push(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => out.push("true".to_string()),
            Value::Array(items) => {
                for item in items {
                    push(item, out);
                }
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
            Value::Number(n) => out.push(n.to_string()),
            Value::Object(_) => {}
        }
    }
    let mut out = Vec::new();
    if let Some(value) = value {
        push(value, &mut out);
    }
    out
}

/// Flatten to a single whitespace-collapsed string.
pub fn flatten_text(value: Option<&Value>) -> String {
    to_array(value)
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First-present-wins across a fixed priority list of alias keys. A key whose
/// value is null or the empty string counts as absent.
pub fn first_present<'a>(doc: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let map = doc.as_object()?;
    keys.iter().find_map(|key| match map.get(*key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(value) => Some(value),
    })
}

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(19|20)\d{2}").unwrap());
static PAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,5})\s*(pages?|p\.|leaves?)").unwrap());
static OC_DIRECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+$").unwrap());
static OC_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/items/(\d+\.\d+)([/?#]|$)").unwrap());
static OC_PDF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/pdf/\d+/(\d+\.\d+)([/?#]|$)").unwrap());

/// First plausible 4-digit year (19xx/20xx) anywhere in a raw date string.
pub fn extract_year(raw: &str) -> Option<i32> {
    YEAR_RE.find(raw).and_then(|m| m.as_str().parse().ok())
}

/// Page count from extent strings like "xi, 204 pages" or "187 leaves".
pub fn parse_page_count(extent_values: &[String]) -> Option<u32> {
    for value in extent_values {
        let lowered = value.to_lowercase();
        if let Some(caps) = PAGE_RE.captures(&lowered) {
            if let Ok(pages) = caps[1].parse() {
                return Some(pages);
            }
        }
    }
    None
}

/// Catalogue item ids look like "1.0103842", either bare or embedded in an
/// item or pdf-download URL.
fn extract_catalogue_id(value: &str) -> Option<String> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }
    if OC_DIRECT_RE.is_match(text) {
        return Some(text.to_string());
    }
    OC_ITEM_RE
        .captures(text)
        .or_else(|| OC_PDF_RE.captures(text))
        .map(|caps| caps[1].to_string())
}

/// Every http(s) value under a url/uri-flavored metadata key, as extra
/// candidates for catalogue-id recovery.
fn candidate_urls(doc: &Value) -> Vec<String> {
    let Some(map) = doc.as_object() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (key, value) in map {
        let key = key.to_lowercase();
        if key.contains("url") || key.contains("uri") {
            let text = flatten_text(Some(value));
            if text.starts_with("http") {
                out.push(text);
            }
        }
    }
    out
}

static METHODOLOGY_KEYWORDS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("Qualitative", r"(?i)\bqualitative\b"),
        ("Quantitative", r"(?i)\bquantitative\b"),
        ("Mixed Methods", r"(?i)\bmixed[- ]methods?\b"),
        ("Case Study", r"(?i)\bcase\s+stud(?:y|ies)\b"),
        ("Ethnography", r"(?i)\bethnograph(?:y|ic)\b"),
        ("Grounded Theory", r"(?i)\bgrounded\s+theory\b"),
        ("Phenomenology", r"(?i)\bphenomenolog(?:y|ical)\b"),
        ("Action Research", r"(?i)\baction\s+research\b"),
        ("Narrative Inquiry", r"(?i)\bnarrative\s+(?:inquiry|research|analysis)\b"),
        ("Survey", r"(?i)\bsurveys?\b"),
        ("Experimental", r"(?i)\bexperimental\b"),
        ("Longitudinal", r"(?i)\blongitudinal\b"),
        ("Content Analysis", r"(?i)\bcontent\s+analysis\b"),
        ("Discourse Analysis", r"(?i)\bdiscourse\s+analysis\b"),
        ("Interviews", r"(?i)\binterview(?:s|ing)?\b"),
        ("Autoethnography", r"(?i)\bautoethnograph(?:y|ic)\b"),
        ("Participatory", r"(?i)\bparticipatory\b"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).unwrap()))
    .collect()
});

/// Methodology labels whose keyword patterns fire anywhere in the text, in
/// fixed table order.
pub fn detect_methodologies(text: &str) -> Vec<String> {
    METHODOLOGY_KEYWORDS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(label, _)| label.to_string())
        .collect()
}

fn dedupe_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

/// Project one raw metadata object into a `DocumentRecord`. Missing or
/// malformed fields degrade to empty values; nothing here aborts the batch.
pub fn build_record(doc: &Value, ctx: &ExtractionContext) -> DocumentRecord {
    let raw_id = flatten_text(first_present(doc, &["_id", "id", "identifier", "Identifier"]));
    let title = flatten_text(first_present(doc, &["title", "Title", "name", "Name"]));
    let authors = to_array(first_present(doc, &["creator", "Creator", "author", "Author"]));
    // supervisor normalization is an external collaborator; names arrive
    // canonical and we only guard against verbatim repeats
    let supervisors = dedupe_preserving_order(to_array(first_present(
        doc,
        &["supervisor", "Supervisor"],
    )));
    let date_raw = flatten_text(first_present(
        doc,
        &[
            "date_available", "DateAvailable", "dateAvailable",
            "dateIssued", "DateIssued",
            "graduationDate", "GraduationDate",
            "ubc_date_sort",
            "date", "Date",
            "year", "Year",
            "issued", "Issued",
        ],
    ));
    let description = flatten_text(first_present(
        doc,
        &["description", "Description", "abstract", "Abstract"],
    ));
    let full_text = flatten_text(first_present(
        doc,
        &["full_text", "FullText", "transcript", "text", "ocr", "body"],
    ));
    let subjects = to_array(first_present(
        doc,
        &["subject", "Subject", "subjects", "keywords", "keyword"],
    ));
    let program = to_array(first_present(doc, &["program_theses", "program", "Program"]));
    let degree = to_array(first_present(doc, &["degree_theses", "degree", "Degree"]));
    let extent_values = to_array(first_present(doc, &["extent", "Extent"]));
    let uri = flatten_text(first_present(
        doc,
        &["uri", "URI", "isShownAt", "identifier", "Identifier"],
    ));

    let doi = flatten_text(first_present(doc, &["doi", "DOI"]));
    let id = extract_catalogue_id(&raw_id)
        .or_else(|| extract_catalogue_id(&uri))
        .or_else(|| extract_catalogue_id(&doi))
        .or_else(|| candidate_urls(doc).iter().find_map(|url| extract_catalogue_id(url)))
        .unwrap_or_else(|| {
            let seed = format!("{}|{}", title, authors.first().map(String::as_str).unwrap_or(""));
            format!("{:016x}", xxh3_64(seed.as_bytes()))
        });

    let text_for_length = if full_text.is_empty() { &description } else { &full_text };
    let word_count = if text_for_length.is_empty() {
        0
    } else {
        text_for_length.split_whitespace().count() as u32
    };
    let char_count = text_for_length.chars().count();
    let extent_pages = parse_page_count(&extent_values);
    let pages = extent_pages
        .unwrap_or_else(|| ((word_count.max(1) as f64) / 300.0).round().max(1.0) as u32);

    let theme_text = format!(
        "{} {} {} {} {}",
        title,
        description,
        subjects.join(" "),
        program.join(" "),
        degree.join(" ")
    );
    let themes = top_terms(&theme_text, 12, &ctx.filters);
    let methodology_text = format!("{} {} {}", title, description, subjects.join(" "));
    let methodologies = detect_methodologies(&methodology_text);
    let concept_terms = concept_terms(
        &title,
        &description,
        &subjects,
        DEFAULT_CONCEPT_LIMIT,
        &ctx.concepts,
        &ctx.domain,
        &ctx.filters,
    );

    DocumentRecord {
        id,
        year: extract_year(&date_raw),
        date: date_raw,
        title,
        authors,
        supervisors,
        degree: degree.join("; "),
        program: program.join("; "),
        abstract_text: description,
        subjects: if subjects.is_empty() {
            vec!["(Unspecified)".to_string()]
        } else {
            subjects
        },
        pages,
        pages_source: if extent_pages.is_some() {
            "metadata_extent".to_string()
        } else {
            "estimated_from_metadata_words".to_string()
        },
        word_count,
        word_count_source: "metadata_text".to_string(),
        char_count,
        themes,
        methodologies,
        concept_terms,
    }
}

/// Build the full record set for one aggregation pass: raw metadata projected
/// in parallel, then the file-metric and committee overlays applied.
pub fn build_records(
    docs: &[Value],
    file_metrics: &HashMap<String, FileMetrics>,
    committee: &HashMap<String, Vec<String>>,
    ctx: &ExtractionContext,
) -> Vec<DocumentRecord> {
    let mut records: Vec<DocumentRecord> =
        docs.par_iter().map(|doc| build_record(doc, ctx)).collect();

    for rec in records.iter_mut() {
        if let Some(fm) = file_metrics.get(&rec.id) {
            if let Some(words) = fm.word_count {
                rec.word_count = words;
                rec.word_count_source =
                    fm.word_source.clone().unwrap_or_else(|| "pdf".to_string());
            }
            if let Some(pages) = fm.page_count {
                rec.pages = pages;
                rec.pages_source = fm.page_source.clone().unwrap_or_else(|| "pdf".to_string());
            }
        }
        if let Some(names) = committee.get(&rec.id) {
            let names: Vec<String> =
                dedupe_preserving_order(names.iter().map(|n| n.trim().to_string()).collect())
                    .into_iter()
                    .filter(|n| !n.is_empty())
                    .collect();
            if !names.is_empty() {
                rec.supervisors = names;
            }
        }
    }

    debug!("Records built - raw={}, records={}", docs.len(), records.len());
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExtractionContext {
        ExtractionContext {
            domain: DomainDictionary::new(),
            concepts: ConceptDictionary::default(),
            filters: Filters::default(),
        }
    }

    #[test]
    fn alias_keys_resolve_first_present_wins() {
        let doc = json!({ "dateIssued": "2015-09-01", "date": "1999" });
        let rec = build_record(&doc, &ctx());
        assert_eq!(rec.date, "2015-09-01");
        assert_eq!(rec.year, Some(2015));
    }

    #[test]
    fn empty_string_alias_is_skipped() {
        let doc = json!({ "title": "", "Title": "Actual Title" });
        let rec = build_record(&doc, &ctx());
        assert_eq!(rec.title, "Actual Title");
    }

    #[test]
    fn year_extraction() {
        assert_eq!(extract_year("Fall 2018"), Some(2018));
        assert_eq!(extract_year("1997-05"), Some(1997));
        assert_eq!(extract_year("no year here"), None);
        assert_eq!(extract_year("1845"), None);
    }

    #[test]
    fn page_count_parsing() {
        assert_eq!(parse_page_count(&["xi, 204 pages".to_string()]), Some(204));
        assert_eq!(parse_page_count(&["187 leaves".to_string()]), Some(187));
        assert_eq!(parse_page_count(&["54 p.".to_string()]), Some(54));
        assert_eq!(parse_page_count(&["online resource".to_string()]), None);
    }

    #[test]
    fn pages_estimated_from_word_count_when_extent_missing() {
        let doc = json!({
            "title": "T",
            "description": (0..600).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
        });
        let rec = build_record(&doc, &ctx());
        assert_eq!(rec.word_count, 600);
        assert_eq!(rec.pages, 2);
        assert_eq!(rec.pages_source, "estimated_from_metadata_words");
    }

    #[test]
    fn methodology_detection() {
        let found = detect_methodologies("A qualitative case study using interviews");
        assert_eq!(found, vec!["Qualitative", "Case Study", "Interviews"]);
        assert!(detect_methodologies("nothing relevant").is_empty());
    }

    #[test]
    fn to_array_stringifies_true_and_drops_false() {
        let value = json!([true, false, "x", 7]);
        assert_eq!(to_array(Some(&value)), vec!["true", "x", "7"]);
    }

    #[test]
    fn malformed_fields_degrade_without_aborting() {
        let doc = json!({ "title": 42, "subject": [null, "Policy", ["Nested"]], "date": {} });
        let rec = build_record(&doc, &ctx());
        assert_eq!(rec.title, "42");
        assert_eq!(rec.subjects, vec!["Policy", "Nested"]);
        assert_eq!(rec.year, None);
        assert_eq!(rec.date, "");
    }

    #[test]
    fn subjects_default_placeholder_when_absent() {
        let rec = build_record(&json!({ "title": "T" }), &ctx());
        assert_eq!(rec.subjects, vec!["(Unspecified)"]);
    }

    #[test]
    fn catalogue_id_preferred_then_hash_fallback() {
        let doc = json!({ "_id": "1.0103842", "title": "T" });
        assert_eq!(build_record(&doc, &ctx()).id, "1.0103842");

        let doc = json!({ "uri": "https://example.org/items/1.0055123", "title": "T" });
        assert_eq!(build_record(&doc, &ctx()).id, "1.0055123");

        let doc = json!({
            "uri": "https://open.library.ubc.ca/media/download/pdf/24/1.0066312/1",
            "title": "T"
        });
        assert_eq!(build_record(&doc, &ctx()).id, "1.0066312");

        // any url-flavored key is scanned before hashing
        let doc = json!({ "downloadUrl": "https://example.org/items/1.0012345", "title": "T" });
        assert_eq!(build_record(&doc, &ctx()).id, "1.0012345");

        let a = build_record(&json!({ "title": "Same", "creator": "A. Author" }), &ctx());
        let b = build_record(&json!({ "title": "Same", "creator": "A. Author" }), &ctx());
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn overlays_replace_metadata_derived_values() {
        let docs = vec![json!({ "_id": "1.0001", "title": "T", "supervisor": "Old Name" })];
        let mut metrics = HashMap::new();
        metrics.insert(
            "1.0001".to_string(),
            FileMetrics {
                word_count: Some(45000),
                page_count: Some(180),
                word_source: None,
                page_source: None,
            },
        );
        let mut committee = HashMap::new();
        committee.insert(
            "1.0001".to_string(),
            vec!["Jane Smith".to_string(), "Jane Smith".to_string()],
        );
        let records = build_records(&docs, &metrics, &committee, &ctx());
        assert_eq!(records[0].word_count, 45000);
        assert_eq!(records[0].word_count_source, "pdf");
        assert_eq!(records[0].pages, 180);
        assert_eq!(records[0].supervisors, vec!["Jane Smith"]);
    }
}
