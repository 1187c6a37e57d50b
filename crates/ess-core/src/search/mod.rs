//! Engineering Context Agent query pipeline (C7, spec.md §4.6).
//!
//! `SearchEngine::query` runs intent classification, the ambiguity gate,
//! query embedding, a dual-backend retrieval pass (semantic via
//! [`crate::vector::VectorStore`], structural via
//! [`crate::store::GraphStore`]), deterministic merge/rank, veracity
//! scoring, and packet assembly — steps 1 through 7 of the spec. Each
//! backend call is wrapped by its own [`crate::circuit::CircuitBreakerRegistry`]
//! entry and measured against its own deadline; a slow/failed backend
//! degrades the response to `partial` rather than failing the whole query.

pub mod intent;

use std::path::Path;
use std::time::Instant;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::circuit::CircuitBreakerRegistry;
use crate::config::SearchConfig;
use crate::embedder::Embedder;
use crate::error::EssError;
use crate::ids::ProjectId;
use crate::store::GraphStore;
use crate::types::{
    Insights, QueryResponse, QueryResults, ResponseMeta, ResponseStatus, ResultSize,
    SemanticMatch, SemanticResults, StructuralRelationship, StructuralResults, VeracityReport,
};
use crate::vector::VectorStore;
use crate::veracity::{self, GraphSnapshot};
use intent::{IntentClassification, QueryIntent};

/// Per-intent result size limits (spec.md §4.6): `(min, max, max_bytes_per_match)`.
fn size_limits(intent: QueryIntent) -> (usize, usize, usize) {
    match intent {
        QueryIntent::Code | QueryIntent::Location => (1, 20, 50_000),
        QueryIntent::Explanation => (3, 50, 10_000),
        QueryIntent::Relationship | QueryIntent::Both | QueryIntent::Unknown => (5, 30, 25_000),
    }
}

/// The C7 query engine.
pub struct SearchEngine {
    config: SearchConfig,
}

impl SearchEngine {
    /// Create a new engine with the given search configuration.
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Compute RRF score from two rank lists. Retained from the original
    /// fusion approach as an optional internal re-ranking signal; the
    /// packet's own sort order is still the deterministic
    /// `(score DESC, path ASC, uid ASC)` contract, not RRF rank order.
    pub fn rrf_score(&self, semantic_rank: Option<u32>, keyword_rank: Option<u32>) -> f64 {
        let k = f64::from(self.config.rrf_k);
        let semantic = semantic_rank.map_or(0.0, |r| 1.0 / (k + f64::from(r)));
        let keyword = keyword_rank.map_or(0.0, |r| 1.0 / (k + f64::from(r)));
        semantic + keyword
    }

    /// Run the full pipeline for one query, in `one_shot` mode.
    /// Conversational-mode ambiguity gating happens one layer up, in
    /// [`crate::conversation::ConversationManager`], which re-invokes this
    /// with an enriched query once satisfied.
    ///
    /// The semantic and structural backends are queried concurrently: a
    /// vector search/embed call runs on a scoped thread while the graph
    /// backend opens its own connection to `db_path` and runs the keyword
    /// search, each measured against its own deadline in
    /// [`crate::config::SearchConfig`]. Path/excerpt resolution for semantic
    /// hits happens back on the calling thread after both join, since it
    /// needs `store` (the engine's already-open, locked connection, which
    /// cannot itself cross the thread boundary).
    #[allow(clippy::too_many_arguments)]
    pub fn query(
        &self,
        project: &ProjectId,
        raw_query: &str,
        request_id: &str,
        store: &GraphStore,
        vector: &VectorStore,
        db_path: &Path,
        embedder: &Embedder,
        circuits: &CircuitBreakerRegistry,
        graph_snapshot: &dyn GraphSnapshot,
    ) -> QueryResponse {
        let start = Instant::now();
        let classification = intent::classify(raw_query);
        let (min_results, max_results, max_bytes_per_match) = size_limits(classification.intent);

        let semantic_deadline = self.config.semantic_timeout_ms;
        let structural_deadline = self.config.structural_timeout_ms;

        let (semantic_outcome, semantic_elapsed, structural_outcome, structural_elapsed) = std::thread::scope(|scope| {
            let semantic_handle = scope.spawn(|| {
                let t0 = Instant::now();
                let outcome = circuits.call("vector", || embed_and_search(raw_query, vector, embedder, max_results));
                (outcome, t0.elapsed().as_millis() as u64)
            });

            let structural_handle = scope.spawn(|| {
                let t0 = Instant::now();
                let outcome = GraphStore::open(db_path)
                    .and_then(|structural_store| {
                        circuits.call("graph", || run_structural(project, raw_query, &structural_store, max_results))
                    });
                (outcome, t0.elapsed().as_millis() as u64)
            });

            let (semantic_outcome, semantic_elapsed) = semantic_handle.join().unwrap_or_else(|_| {
                (Err(EssError::Internal("semantic search thread panicked".into())), 0)
            });
            let (structural_outcome, structural_elapsed) = structural_handle.join().unwrap_or_else(|_| {
                (Err(EssError::Internal("structural search thread panicked".into())), 0)
            });
            (semantic_outcome, semantic_elapsed, structural_outcome, structural_elapsed)
        });

        let semantic_timed_out = semantic_elapsed > semantic_deadline;
        let structural_timed_out = structural_elapsed > structural_deadline;

        let semantic_ok = semantic_outcome.is_ok() && !semantic_timed_out;
        let structural_ok = structural_outcome.is_ok() && !structural_timed_out;

        let mut semantic_matches = semantic_outcome
            .map(|hits| resolve_semantic_hits(hits, project, store, max_bytes_per_match))
            .unwrap_or_default();
        semantic_matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.uid.cmp(&b.uid))
        });
        semantic_matches.truncate(max_results);

        let mut structural_relationships = structural_outcome.unwrap_or_default();
        structural_relationships.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.target.cmp(&b.target))
                .then_with(|| format!("{:?}", a.kind).cmp(&format!("{:?}", b.kind)))
        });
        structural_relationships.truncate(max_results);

        let status = match (semantic_ok, structural_ok) {
            (true, true) => ResponseStatus::Success,
            (true, false) | (false, true) => ResponseStatus::Partial,
            (false, false) => ResponseStatus::Unavailable,
        };

        let mut warnings = Vec::new();
        if !semantic_ok {
            warnings.push("semantic backend unavailable".to_string());
        }
        if !structural_ok {
            warnings.push("structural backend unavailable".to_string());
        }

        let semantic_summary = if semantic_ok {
            format!("{} semantic match(es)", semantic_matches.len())
        } else {
            "semantic backend unavailable".to_string()
        };
        let structural_summary = if structural_ok {
            format!("{} structural relationship(s)", structural_relationships.len())
        } else {
            "structural backend unavailable".to_string()
        };

        let insights = build_insights(&semantic_matches, min_results);

        let elapsed_ms = start.elapsed().as_millis() as u64;

        let mut packet = QueryResponse {
            schema_version: "1.0".into(),
            request_id: request_id.to_string(),
            status,
            timestamp: now_iso8601(),
            query_type: classification.intent.as_str().to_string(),
            results: QueryResults {
                semantic: SemanticResults { summary: semantic_summary, matches: semantic_matches },
                structural: StructuralResults { summary: structural_summary, relationships: structural_relationships },
                insights,
            },
            warnings: if status == ResponseStatus::Partial && !warnings.is_empty() { Some(warnings) } else { None },
            fallback_message: if status == ResponseStatus::Unavailable {
                Some(QueryResponse::UNAVAILABLE_MESSAGE.to_string())
            } else {
                None
            },
            meta: ResponseMeta {
                graph_queried: true,
                vector_queried: true,
                graph_latency_ms: structural_elapsed,
                vector_latency_ms: semantic_elapsed,
                total_latency_ms: elapsed_ms,
                cache_hit: false,
                result_size: ResultSize::default(),
                confidence: classification.confidence,
                ambiguous: classification.ambiguity,
            },
            veracity: VeracityReport { score: 100, faults: Vec::new() },
        };

        packet.veracity = veracity::validate(&packet, graph_snapshot);

        let bytes = serde_json::to_vec(&packet).map(|v| v.len()).unwrap_or(0);
        packet.meta.result_size = ResultSize {
            total_bytes: bytes,
            semantic_matches: packet.results.semantic.matches.len(),
            structural_relationships: packet.results.structural.relationships.len(),
            compressed: bytes > self.config.stream_threshold_bytes,
        };

        if bytes > self.config.max_response_bytes {
            truncate_to_budget(&mut packet, self.config.max_response_bytes);
        }

        packet
    }
}

/// Embed `raw_query` and run the vector scan. Backend-facing half of the
/// semantic leg; runs on its own thread and touches only `vector` and
/// `embedder`, both `Sync`, so it never needs the store connection.
fn embed_and_search(
    raw_query: &str,
    vector: &VectorStore,
    embedder: &Embedder,
    limit: usize,
) -> Result<Vec<(String, f32)>, EssError> {
    let query_vector = embedder.embed_query(raw_query)?;
    Ok(vector.search(&query_vector, limit))
}

/// Resolve raw vector hits to [`SemanticMatch`]es. Runs back on the calling
/// thread (after the semantic/structural threads join) because it needs
/// `store`, which cannot cross the thread boundary alongside the
/// already-open connection the engine holds for the whole query.
fn resolve_semantic_hits(
    hits: Vec<(String, f32)>,
    project: &ProjectId,
    store: &GraphStore,
    max_bytes_per_match: usize,
) -> Vec<SemanticMatch> {
    let mut matches = Vec::with_capacity(hits.len());
    for (uid, score) in hits {
        let (path, line_start, line_end, mut excerpt) = match store.get_chunk(project, &uid) {
            Ok(Some(chunk)) => (chunk.path, None, None, chunk.content),
            Ok(None) => match store.get_code_entity(project, &uid) {
                Ok(Some(entity)) => (entity.path, Some(entity.line_start), Some(entity.line_end), entity.qualified_name),
                _ => continue,
            },
            Err(_) => continue,
        };

        if excerpt.len() > max_bytes_per_match {
            excerpt.truncate(max_bytes_per_match);
        }

        matches.push(SemanticMatch {
            uid,
            path,
            line_start,
            line_end,
            score: f64::from(score),
            excerpt,
        });
    }
    matches
}

fn run_structural(
    project: &ProjectId,
    raw_query: &str,
    store: &GraphStore,
    limit: usize,
) -> Result<Vec<StructuralRelationship>, EssError> {
    let keyword_hits = store.keyword_search(project, raw_query, limit)?;

    let mut seen_paths = std::collections::BTreeSet::new();
    let mut relationships = Vec::new();
    for (_, path, _, _) in keyword_hits {
        if !seen_paths.insert(path.clone()) {
            continue;
        }
        for edge in store.relationships_for_path(project, &path)? {
            relationships.push(StructuralRelationship {
                path: path.clone(),
                source: edge.source_uid,
                target: edge.target_uid,
                kind: edge.kind,
            });
            if relationships.len() >= limit {
                return Ok(relationships);
            }
        }
    }
    Ok(relationships)
}

/// Synthesize a citation-backed summary from semantic matches, when there
/// are enough of them to be worth citing (spec.md §4.6's `min_results`
/// floor per intent). `None` when the backend was unavailable (the caller
/// uses `fallback_message` for that) or evidence is too thin.
fn build_insights(matches: &[SemanticMatch], min_results: usize) -> Option<Insights> {
    if matches.len() < min_results || matches.is_empty() {
        return None;
    }

    let cited_uids: Vec<String> = matches.iter().map(|m| m.uid.clone()).collect();
    let summary = matches
        .iter()
        .take(3)
        .map(|m| format!("{} ({})", m.path, m.uid))
        .collect::<Vec<_>>()
        .join("; ");

    Some(Insights {
        summary: format!("Top matches: {summary}"),
        cited_uids,
    })
}

/// Trim semantic matches from the tail until the serialized packet fits
/// `max_bytes`. A blunt instrument, but deterministic (always drops the
/// lowest-ranked matches first) and never drops structural relationships,
/// which are smaller and carry the citation graph.
fn truncate_to_budget(packet: &mut QueryResponse, max_bytes: usize) {
    while packet.meta.result_size.total_bytes > max_bytes && !packet.results.semantic.matches.is_empty() {
        packet.results.semantic.matches.pop();
        packet.meta.result_size.total_bytes = serde_json::to_vec(packet).map(|v| v.len()).unwrap_or(0);
    }
    packet.meta.result_size.semantic_matches = packet.results.semantic.matches.len();
    packet.meta.result_size.compressed = true;
}

fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SearchConfig {
        SearchConfig::default()
    }

    #[test]
    fn test_rrf_score_both_signals() {
        let engine = SearchEngine::new(config());
        let score = engine.rrf_score(Some(1), Some(1));
        let expected = 2.0 / 61.0;
        assert!((score - expected).abs() < 1e-10);
    }

    #[test]
    fn test_rrf_score_semantic_only() {
        let engine = SearchEngine::new(config());
        let score = engine.rrf_score(Some(1), None);
        let expected = 1.0 / 61.0;
        assert!((score - expected).abs() < 1e-10);
    }

    #[test]
    fn test_rrf_score_no_signal() {
        let engine = SearchEngine::new(config());
        let score = engine.rrf_score(None, None);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_size_limits_by_intent() {
        assert_eq!(size_limits(QueryIntent::Code), (1, 20, 50_000));
        assert_eq!(size_limits(QueryIntent::Explanation), (3, 50, 10_000));
        assert_eq!(size_limits(QueryIntent::Both), (5, 30, 25_000));
    }

    #[test]
    fn test_build_insights_none_below_min_results() {
        assert!(build_insights(&[], 5).is_none());
    }

    #[test]
    fn test_unavailable_message_is_the_documented_literal() {
        assert_eq!(QueryResponse::UNAVAILABLE_MESSAGE, "SYSTEM IS UNAVAILABLE, USE WEB & CODEBASE RESEARCH");
    }
}
