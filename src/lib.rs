//! Concept-vocabulary analytics over academic document metadata: text
//! normalization, a canonicalizing domain dictionary with a hot-reloaded
//! overlay, n-gram extraction, concept resolution, and corpus aggregation
//! into a single serializable payload.

pub mod cache;
pub mod concepts;
pub mod dictionary;
pub mod filters;
pub mod metrics;
pub mod ngram;
pub mod normalize;
pub mod record;

pub use cache::TtlCache;
pub use concepts::ConceptDictionary;
pub use dictionary::{DomainDictionary, DEFAULT_RELOAD_INTERVAL};
pub use filters::Filters;
pub use metrics::{collect_analytics, AggregationLimits, AnalyticsPayload};
pub use record::{build_records, DocumentRecord, ExtractionContext, FileMetrics};
