use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, info};

use crate::ngram::{document_phrases, tokenize};
use crate::record::{DocumentRecord, ExtractionContext};

/// Result-set caps for every aggregate, tuned for the dashboard views.
#[derive(Debug, Clone)]
pub struct AggregationLimits {
    pub subject_limit: usize,
    pub word_cloud_terms: usize,
    pub concept_cloud_terms: usize,
    pub ngram_cloud_terms: usize,
    pub supervisor_rows: usize,
    pub methodology_rows: usize,
    pub matrix_concepts: usize,
    pub cooccurrence_pairs: usize,
    pub timeline_series: usize,
    pub gap_pool: usize,
    pub gap_pairs: usize,
}

impl Default for AggregationLimits {
    fn default() -> Self {
        AggregationLimits {
            subject_limit: 25,
            word_cloud_terms: 70,
            concept_cloud_terms: 60,
            ngram_cloud_terms: 60,
            supervisor_rows: 12,
            methodology_rows: 10,
            matrix_concepts: 10,
            cooccurrence_pairs: 20,
            timeline_series: 8,
            gap_pool: 20,
            gap_pairs: 15,
        }
    }
}

/// `{count, min, max, mean}` over a numeric sample; all-`None` when empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

pub fn stats(values: &[f64]) -> Stats {
    if values.is_empty() {
        return Stats::default();
    }
    let sum: f64 = values.iter().sum();
    Stats {
        count: values.len(),
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
        mean: Some(sum / values.len() as f64),
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptStat {
    pub concept: String,
    pub doc_count: usize,
    pub weighted_doc_equivalent: f64,
    pub weighted_mean: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearStats {
    pub year: i32,
    #[serde(flatten)]
    pub stats: Stats,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageTrendPoint {
    pub year: i32,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusMetrics {
    pub record_count: usize,
    pub overall_word_count: Stats,
    pub overall_page_count: Stats,
    pub overall_char_count: Stats,
    pub by_concept: Vec<ConceptStat>,
    pub by_year: Vec<YearStats>,
    pub avg_pages_by_year: Vec<YearStats>,
    pub page_trend: Vec<PageTrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCount {
    pub term: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodologyCount {
    pub methodology: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooccurrencePair {
    pub concept_id_a: String,
    pub concept_id_b: String,
    pub term_a: String,
    pub term_b: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    pub year: i32,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSeries {
    pub concept: String,
    pub total_docs: usize,
    pub data: Vec<TimelinePoint>,
}

/// Dense count table cross-tabulating a row category (supervisors,
/// methodologies) against the top concepts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContingencyMatrix {
    pub rows: Vec<String>,
    pub concepts: Vec<String>,
    pub concept_ids: Vec<String>,
    pub matrix: Vec<Vec<u32>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchGap {
    pub concept_a: String,
    pub concept_b: String,
    pub count_a: usize,
    pub count_b: usize,
    pub cooccurrence: u32,
    pub gap_score: f64,
}

/// The full analytics payload handed to presentation collaborators: plain
/// data, no behavior, recomputed from the record set on every call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsPayload {
    pub generated_at: String,
    pub metrics: CorpusMetrics,
    pub documents: Vec<DocumentRecord>,
    pub word_cloud: Vec<TermCount>,
    pub concept_cloud: Vec<TermCount>,
    pub ngram_cloud: Vec<TermCount>,
    pub methodologies: Vec<MethodologyCount>,
    pub supervisor_concept_matrix: ContingencyMatrix,
    pub methodology_concept_matrix: ContingencyMatrix,
    pub term_cooccurrence: Vec<CooccurrencePair>,
    pub concept_timeline: Vec<TimelineSeries>,
    pub research_gaps: Vec<ResearchGap>,
}

/// Stable presentation id for a concept label.
fn concept_id(term: &str) -> String {
    format!("c:{}", term.replace(' ', "_"))
}

fn unique_concepts(rec: &DocumentRecord) -> BTreeSet<&str> {
    rec.concept_terms.iter().map(String::as_str).collect()
}

/// Rank `(term, count)` pairs: count descending, term ascending on ties.
fn top_counts(counts: BTreeMap<String, u32>, limit: usize) -> Vec<TermCount> {
    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
        .into_iter()
        .map(|(term, count)| TermCount { term, count })
        .collect()
}

/// Weighted concept/word-length stats plus the per-year series. Each document
/// contributes `word_count / k` to each of its `k` unique concepts, so a
/// document listing many concepts does not over-influence any single mean.
pub fn build_metrics(records: &[DocumentRecord], subject_limit: usize) -> CorpusMetrics {
    struct Acc {
        weighted_word_sum: f64,
        weight_sum: f64,
        doc_count: usize,
    }
    let mut concept_words: BTreeMap<&str, Acc> = BTreeMap::new();
    let mut year_words: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    let mut year_pages: BTreeMap<i32, Vec<f64>> = BTreeMap::new();

    for rec in records {
        let concepts = unique_concepts(rec);
        if !concepts.is_empty() {
            let weight = 1.0 / concepts.len() as f64;
            for concept in concepts {
                let acc = concept_words.entry(concept).or_insert(Acc {
                    weighted_word_sum: 0.0,
                    weight_sum: 0.0,
                    doc_count: 0,
                });
                acc.weighted_word_sum += rec.word_count as f64 * weight;
                acc.weight_sum += weight;
                acc.doc_count += 1;
            }
        }
        if let Some(year) = rec.year {
            year_words.entry(year).or_default().push(rec.word_count as f64);
            year_pages.entry(year).or_default().push(rec.pages as f64);
        }
    }

    let mut by_concept: Vec<ConceptStat> = concept_words
        .into_iter()
        .map(|(concept, acc)| ConceptStat {
            concept: concept.to_string(),
            doc_count: acc.doc_count,
            weighted_doc_equivalent: acc.weight_sum,
            weighted_mean: (acc.weight_sum > 0.0).then(|| acc.weighted_word_sum / acc.weight_sum),
        })
        .collect();
    by_concept.sort_by(|a, b| {
        b.doc_count
            .cmp(&a.doc_count)
            .then_with(|| {
                b.weighted_mean
                    .unwrap_or(0.0)
                    .total_cmp(&a.weighted_mean.unwrap_or(0.0))
            })
            .then_with(|| a.concept.cmp(&b.concept))
    });
    by_concept.truncate(subject_limit);

    let by_year = year_words
        .iter()
        .map(|(&year, values)| YearStats { year, stats: stats(values) })
        .collect();
    let avg_pages_by_year = year_pages
        .iter()
        .map(|(&year, values)| YearStats { year, stats: stats(values) })
        .collect();
    let page_trend = year_pages
        .iter()
        .map(|(&year, values)| {
            let s = stats(values);
            PageTrendPoint {
                year,
                median: median(values),
                min: s.min,
                max: s.max,
                count: values.len(),
            }
        })
        .collect();

    CorpusMetrics {
        record_count: records.len(),
        overall_word_count: stats(&records.iter().map(|r| r.word_count as f64).collect::<Vec<_>>()),
        overall_page_count: stats(&records.iter().map(|r| r.pages as f64).collect::<Vec<_>>()),
        overall_char_count: stats(&records.iter().map(|r| r.char_count as f64).collect::<Vec<_>>()),
        by_concept,
        by_year,
        avg_pages_by_year,
        page_trend,
    }
}

/// Single-token frequency cloud over the wide per-record text.
pub fn build_word_cloud(
    records: &[DocumentRecord],
    limit: usize,
    ctx: &ExtractionContext,
) -> Vec<TermCount> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for rec in records {
        for token in tokenize(&rec.cloud_text(), &ctx.filters) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    top_counts(counts, limit)
}

/// Frequency cloud over the controlled concept vocabulary.
pub fn build_concept_cloud(records: &[DocumentRecord], limit: usize) -> Vec<TermCount> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for rec in records {
        for term in &rec.concept_terms {
            *counts.entry(term.clone()).or_insert(0) += 1;
        }
    }
    top_counts(counts, limit)
}

/// Frequency cloud over free-form maximal phrases (no vocabulary involved).
pub fn build_ngram_cloud(
    records: &[DocumentRecord],
    limit: usize,
    ctx: &ExtractionContext,
) -> Vec<TermCount> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for rec in records {
        for (term, count) in document_phrases(&rec.search_text(), &ctx.domain, &ctx.filters) {
            *counts.entry(term).or_insert(0) += count;
        }
    }
    top_counts(counts, limit)
}

pub fn build_methodology_stats(records: &[DocumentRecord]) -> Vec<MethodologyCount> {
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for rec in records {
        for label in &rec.methodologies {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(&str, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .map(|(methodology, count)| MethodologyCount {
            methodology: methodology.to_string(),
            count,
        })
        .collect()
}

fn pair_counts(records: &[DocumentRecord]) -> BTreeMap<(String, String), u32> {
    let mut counts: BTreeMap<(String, String), u32> = BTreeMap::new();
    for rec in records {
        // sorted unique set, so every unordered pair appears exactly once per
        // document with a < b
        for (a, b) in unique_concepts(rec).iter().copied().tuple_combinations() {
            *counts.entry((a.to_string(), b.to_string())).or_insert(0) += 1;
        }
    }
    counts
}

/// Top unordered concept pairs by number of documents carrying both.
pub fn build_cooccurrence(records: &[DocumentRecord], limit: usize) -> Vec<CooccurrencePair> {
    let mut ranked: Vec<((String, String), u32)> = pair_counts(records).into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
        .into_iter()
        .map(|((term_a, term_b), count)| CooccurrencePair {
            concept_id_a: concept_id(&term_a),
            concept_id_b: concept_id(&term_b),
            term_a,
            term_b,
            count,
        })
        .collect()
}

fn concept_doc_counts(records: &[DocumentRecord]) -> BTreeMap<&str, usize> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for rec in records {
        for concept in unique_concepts(rec) {
            *counts.entry(concept).or_insert(0) += 1;
        }
    }
    counts
}

fn rank_desc<'a>(counts: &BTreeMap<&'a str, usize>, limit: usize) -> Vec<&'a str> {
    let mut ranked: Vec<(&str, usize)> = counts.iter().map(|(&k, &v)| (k, v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(limit);
    ranked.into_iter().map(|(k, _)| k).collect()
}

/// Per-year document counts for the most frequent concepts. Documents without
/// a year still count toward a concept's total but contribute no data point.
pub fn build_concept_timeline(records: &[DocumentRecord], top_n: usize) -> Vec<TimelineSeries> {
    let doc_counts = concept_doc_counts(records);
    let mut year_counts: BTreeMap<&str, BTreeMap<i32, u32>> = BTreeMap::new();
    for rec in records {
        if let Some(year) = rec.year {
            for concept in unique_concepts(rec) {
                *year_counts.entry(concept).or_default().entry(year).or_insert(0) += 1;
            }
        }
    }

    rank_desc(&doc_counts, top_n)
        .into_iter()
        .map(|concept| TimelineSeries {
            concept: concept.to_string(),
            total_docs: doc_counts[concept],
            data: year_counts
                .get(concept)
                .map(|years| {
                    years
                        .iter()
                        .map(|(&year, &count)| TimelinePoint { year, count })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

/// Cross-tabulate a row category against the top concepts. Concept columns
/// are ranked only over documents carrying at least one row value, so
/// documents with no supervisor/methodology signal cannot dilute the matrix.
fn build_contingency_matrix<'a>(
    records: &'a [DocumentRecord],
    row_values: impl Fn(&'a DocumentRecord) -> &'a [String],
    top_rows: usize,
    top_concepts: usize,
) -> ContingencyMatrix {
    let mut row_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut col_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for rec in records {
        let rows = row_values(rec);
        for row in rows {
            *row_counts.entry(row).or_insert(0) += 1;
        }
        if !rows.is_empty() {
            for concept in unique_concepts(rec) {
                *col_counts.entry(concept).or_insert(0) += 1;
            }
        }
    }

    let rows = rank_desc(&row_counts, top_rows);
    let concepts = rank_desc(&col_counts, top_concepts);
    let row_index: HashMap<&str, usize> = rows.iter().enumerate().map(|(i, &r)| (r, i)).collect();
    let col_index: HashMap<&str, usize> =
        concepts.iter().enumerate().map(|(j, &c)| (c, j)).collect();

    let mut matrix = vec![vec![0u32; concepts.len()]; rows.len()];
    for rec in records {
        let rec_rows: Vec<usize> = row_values(rec)
            .iter()
            .filter_map(|r| row_index.get(r.as_str()).copied())
            .collect();
        if rec_rows.is_empty() {
            continue;
        }
        let rec_cols: Vec<usize> = unique_concepts(rec)
            .into_iter()
            .filter_map(|c| col_index.get(c).copied())
            .collect();
        for &i in &rec_rows {
            for &j in &rec_cols {
                matrix[i][j] += 1;
            }
        }
    }

    ContingencyMatrix {
        rows: rows.iter().map(|r| r.to_string()).collect(),
        concepts: concepts.iter().map(|c| c.to_string()).collect(),
        concept_ids: concepts.iter().map(|c| concept_id(c)).collect(),
        matrix,
    }
}

pub fn build_supervisor_concept_matrix(
    records: &[DocumentRecord],
    top_rows: usize,
    top_concepts: usize,
) -> ContingencyMatrix {
    build_contingency_matrix(records, |r| r.supervisors.as_slice(), top_rows, top_concepts)
}

pub fn build_methodology_concept_matrix(
    records: &[DocumentRecord],
    top_rows: usize,
    top_concepts: usize,
) -> ContingencyMatrix {
    build_contingency_matrix(records, |r| r.methodologies.as_slice(), top_rows, top_concepts)
}

/// Pairwise "research gap" score over the most popular concepts:
/// `countA * countB / (cooccurrence + 1)`. Individually popular pairs that
/// are rarely studied together float to the top.
pub fn build_research_gaps(
    records: &[DocumentRecord],
    pool: usize,
    top_n: usize,
) -> Vec<ResearchGap> {
    let doc_counts = concept_doc_counts(records);
    let pairs = pair_counts(records);
    let top = rank_desc(&doc_counts, pool);

    let mut gaps: Vec<ResearchGap> = Vec::new();
    for (i, &a) in top.iter().enumerate() {
        for &b in &top[i + 1..] {
            let key = if a < b {
                (a.to_string(), b.to_string())
            } else {
                (b.to_string(), a.to_string())
            };
            let cooccurrence = pairs.get(&key).copied().unwrap_or(0);
            let count_a = doc_counts[a];
            let count_b = doc_counts[b];
            gaps.push(ResearchGap {
                concept_a: a.to_string(),
                concept_b: b.to_string(),
                count_a,
                count_b,
                cooccurrence,
                gap_score: (count_a * count_b) as f64 / (cooccurrence + 1) as f64,
            });
        }
    }
    gaps.sort_by(|a, b| {
        b.gap_score
            .total_cmp(&a.gap_score)
            .then_with(|| a.concept_a.cmp(&b.concept_a))
            .then_with(|| a.concept_b.cmp(&b.concept_b))
    });
    gaps.truncate(top_n);
    gaps
}

/// Assemble the whole analytics payload from an already-built record set.
/// Pure aside from the timestamp; an empty record set yields a well-formed,
/// zeroed payload.
pub fn collect_analytics(
    records: Vec<DocumentRecord>,
    limits: &AggregationLimits,
    ctx: &ExtractionContext,
) -> AnalyticsPayload {
    let start = std::time::Instant::now();
    debug!("Aggregation started - records={}", records.len());

    let payload = AnalyticsPayload {
        generated_at: chrono::Utc::now().to_rfc3339(),
        metrics: build_metrics(&records, limits.subject_limit),
        word_cloud: build_word_cloud(&records, limits.word_cloud_terms, ctx),
        concept_cloud: build_concept_cloud(&records, limits.concept_cloud_terms),
        ngram_cloud: build_ngram_cloud(&records, limits.ngram_cloud_terms, ctx),
        methodologies: build_methodology_stats(&records),
        supervisor_concept_matrix: build_supervisor_concept_matrix(
            &records,
            limits.supervisor_rows,
            limits.matrix_concepts,
        ),
        methodology_concept_matrix: build_methodology_concept_matrix(
            &records,
            limits.methodology_rows,
            limits.matrix_concepts,
        ),
        term_cooccurrence: build_cooccurrence(&records, limits.cooccurrence_pairs),
        concept_timeline: build_concept_timeline(&records, limits.timeline_series),
        research_gaps: build_research_gaps(&records, limits.gap_pool, limits.gap_pairs),
        documents: records,
    };

    info!(
        "Aggregation completed - records={}, duration={:.2}s",
        payload.metrics.record_count,
        start.elapsed().as_secs_f32()
    );
    payload
}
