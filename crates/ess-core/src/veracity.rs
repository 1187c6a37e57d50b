//! Veracity Validator (C8).
//!
//! Scores an evidence packet against the graph it was drawn from. Starts at
//! 100, applies the fixed penalty table in [`Fault::penalty`] cumulatively,
//! floors at 0. `validate` itself is a pure function of its inputs; callers
//! supply graph facts through [`GraphSnapshot`] so this module never talks
//! to the store directly and stays trivially testable.

use time::OffsetDateTime;

use crate::types::{Fault, QueryResponse, VeracityReport};

/// Document mtime older than this relative to "now" triggers `STALE_DOC`.
const STALE_DOC_DAYS: i64 = 90;

/// A cited Code node whose provenance is this much newer than the citing
/// Document's mtime triggers `CONTRADICTION`.
const CONTRADICTION_DAYS: i64 = 30;

/// A node is considered orphaned if its induced-subgraph degree is below this.
const ORPHANED_DEGREE_THRESHOLD: usize = 2;

/// Fewer than this many total merged results triggers `LOW_COVERAGE`.
const LOW_COVERAGE_THRESHOLD: usize = 5;

/// Facts about the graph needed to score one packet. Implemented by a thin
/// adapter over [`crate::store::GraphStore`] / [`crate::graph::DependencyGraph`]
/// in production, and by hand-built fixtures in tests.
pub trait GraphSnapshot {
    /// Total in+out degree of `uid` within the project's graph.
    fn degree(&self, uid: &str) -> usize;
    /// `prov_last_modified` of a Document node, parsed, if it exists.
    fn document_last_modified(&self, uid: &str) -> Option<OffsetDateTime>;
    /// `prov_last_modified` of a Code entity's owning file, parsed, if it exists.
    fn code_last_modified(&self, uid: &str) -> Option<OffsetDateTime>;
    /// Whether `uid` currently has a stored embedding.
    fn has_embedding(&self, uid: &str) -> bool;
    /// uids of Code/File nodes a Document node's `MENTIONS` edges point at.
    fn mentioned_code_uids(&self, document_uid: &str) -> Vec<String>;
    /// Current wall-clock time, used for `STALE_DOC`. Passed through the
    /// trait (rather than called directly) so tests can pin "now".
    fn now(&self) -> OffsetDateTime;
}

/// Score `packet` against `graph`, returning the faults found and the
/// resulting score. Never mutates `packet`.
pub fn validate(packet: &QueryResponse, graph: &dyn GraphSnapshot) -> VeracityReport {
    let mut faults = Vec::new();

    let semantic_matches = &packet.results.semantic.matches;
    let structural_relationships = &packet.results.structural.relationships;

    let total_results = semantic_matches.len() + structural_relationships.len();
    if total_results < LOW_COVERAGE_THRESHOLD {
        faults.push(Fault::LowCoverage);
    }

    for m in semantic_matches {
        if graph.degree(&m.uid) < ORPHANED_DEGREE_THRESHOLD {
            faults.push(Fault::OrphanedNode);
        }
        if !graph.has_embedding(&m.uid) {
            faults.push(Fault::EmbeddingMissing);
        }
        if let Some(doc_mtime) = graph.document_last_modified(&m.uid) {
            if graph.now() - doc_mtime > time::Duration::days(STALE_DOC_DAYS) {
                faults.push(Fault::StaleDoc);
            }
            for code_uid in graph.mentioned_code_uids(&m.uid) {
                if let Some(code_mtime) = graph.code_last_modified(&code_uid) {
                    if code_mtime - doc_mtime > time::Duration::days(CONTRADICTION_DAYS) {
                        faults.push(Fault::Contradiction);
                    }
                }
            }
        }
    }

    // Structural hits never came through the vector backend, so nothing
    // upstream has already confirmed they carry an embedding; check both
    // endpoints directly so a skipped vector write still surfaces here.
    for rel in structural_relationships {
        if graph.degree(&rel.source) < ORPHANED_DEGREE_THRESHOLD {
            faults.push(Fault::OrphanedNode);
        }
        if !graph.has_embedding(&rel.source) {
            faults.push(Fault::EmbeddingMissing);
        }
        if !graph.has_embedding(&rel.target) {
            faults.push(Fault::EmbeddingMissing);
        }
    }

    let mut score: i32 = 100;
    for fault in &faults {
        score -= fault.penalty();
    }
    let score = score.clamp(0, 100) as u8;

    VeracityReport { score, faults }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        EdgeKind, QueryResults, ResponseMeta, ResponseStatus, ResultSize, SemanticMatch,
        SemanticResults, StructuralRelationship, StructuralResults,
    };
    use std::collections::{HashMap, HashSet};

    struct FakeGraph {
        now: OffsetDateTime,
        degrees: HashMap<String, usize>,
        embeddings: HashSet<String>,
        doc_mtimes: HashMap<String, OffsetDateTime>,
        code_mtimes: HashMap<String, OffsetDateTime>,
        mentions: HashMap<String, Vec<String>>,
    }

    impl GraphSnapshot for FakeGraph {
        fn degree(&self, uid: &str) -> usize {
            *self.degrees.get(uid).unwrap_or(&0)
        }
        fn document_last_modified(&self, uid: &str) -> Option<OffsetDateTime> {
            self.doc_mtimes.get(uid).copied()
        }
        fn code_last_modified(&self, uid: &str) -> Option<OffsetDateTime> {
            self.code_mtimes.get(uid).copied()
        }
        fn has_embedding(&self, uid: &str) -> bool {
            self.embeddings.contains(uid)
        }
        fn mentioned_code_uids(&self, document_uid: &str) -> Vec<String> {
            self.mentions.get(document_uid).cloned().unwrap_or_default()
        }
        fn now(&self) -> OffsetDateTime {
            self.now
        }
    }

    fn empty_packet() -> QueryResponse {
        QueryResponse {
            schema_version: "1.0".into(),
            request_id: "test-request".into(),
            status: ResponseStatus::Success,
            timestamp: "2024-01-01T00:00:00Z".into(),
            query_type: "code".into(),
            results: QueryResults {
                semantic: SemanticResults::default(),
                structural: StructuralResults::default(),
                insights: None,
            },
            warnings: None,
            fallback_message: None,
            meta: ResponseMeta {
                graph_queried: true,
                vector_queried: true,
                graph_latency_ms: 10,
                vector_latency_ms: 10,
                total_latency_ms: 20,
                cache_hit: false,
                result_size: ResultSize::default(),
                confidence: 0.9,
                ambiguous: false,
            },
            veracity: VeracityReport { score: 100, faults: Vec::new() },
        }
    }

    fn base_graph() -> FakeGraph {
        FakeGraph {
            now: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            degrees: HashMap::new(),
            embeddings: HashSet::new(),
            doc_mtimes: HashMap::new(),
            code_mtimes: HashMap::new(),
            mentions: HashMap::new(),
        }
    }

    #[test]
    fn test_low_coverage_on_empty_packet() {
        let report = validate(&empty_packet(), &base_graph());
        assert!(report.faults.contains(&Fault::LowCoverage));
        assert_eq!(report.score, 90);
    }

    #[test]
    fn test_well_supported_packet_has_no_orphan_or_missing_embedding_faults() {
        let mut packet = empty_packet();
        for i in 0..5 {
            packet.results.semantic.matches.push(SemanticMatch {
                uid: format!("uid{i}"),
                path: "src/lib.rs".into(),
                line_start: Some(1),
                line_end: Some(2),
                score: 0.9,
                excerpt: "fn f() {}".into(),
            });
        }
        let mut graph = base_graph();
        for i in 0..5 {
            graph.degrees.insert(format!("uid{i}"), 3);
            graph.embeddings.insert(format!("uid{i}"));
        }
        let report = validate(&packet, &graph);
        assert!(!report.faults.contains(&Fault::OrphanedNode));
        assert!(!report.faults.contains(&Fault::EmbeddingMissing));
        assert!(!report.faults.contains(&Fault::LowCoverage));
        assert_eq!(report.score, 100);
    }

    #[test]
    fn test_orphaned_node_penalized() {
        let mut packet = empty_packet();
        packet.results.semantic.matches.push(SemanticMatch {
            uid: "lonely".into(),
            path: "src/lib.rs".into(),
            line_start: None,
            line_end: None,
            score: 0.5,
            excerpt: "x".into(),
        });
        let mut graph = base_graph();
        graph.degrees.insert("lonely".into(), 0);
        graph.embeddings.insert("lonely".into());
        let report = validate(&packet, &graph);
        assert!(report.faults.contains(&Fault::OrphanedNode));
    }

    #[test]
    fn test_stale_doc_and_contradiction() {
        let mut packet = empty_packet();
        packet.results.semantic.matches.push(SemanticMatch {
            uid: "doc1".into(),
            path: "README.md".into(),
            line_start: None,
            line_end: None,
            score: 0.8,
            excerpt: "docs".into(),
        });
        let mut graph = base_graph();
        graph.degrees.insert("doc1".into(), 5);
        graph.embeddings.insert("doc1".into());
        let old = graph.now - time::Duration::days(200);
        graph.doc_mtimes.insert("doc1".into(), old);
        graph.mentions.insert("doc1".into(), vec!["code1".into()]);
        graph.code_mtimes.insert("code1".into(), graph.now);

        let report = validate(&packet, &graph);
        assert!(report.faults.contains(&Fault::StaleDoc));
        assert!(report.faults.contains(&Fault::Contradiction));
    }

    #[test]
    fn test_score_floors_at_zero() {
        let mut packet = empty_packet();
        for i in 0..10 {
            packet.results.semantic.matches.push(SemanticMatch {
                uid: format!("u{i}"),
                path: "x".into(),
                line_start: None,
                line_end: None,
                score: 0.1,
                excerpt: String::new(),
            });
        }
        let graph = base_graph();
        let report = validate(&packet, &graph);
        assert_eq!(report.score, 0);
    }

    #[test]
    fn test_structural_relationships_checked_for_orphans() {
        let mut packet = empty_packet();
        packet.results.structural.relationships.push(StructuralRelationship {
            path: "src/lib.rs".into(),
            source: "a".into(),
            target: "b".into(),
            kind: EdgeKind::Calls,
        });
        let mut graph = base_graph();
        graph.degrees.insert("a".into(), 0);
        let report = validate(&packet, &graph);
        assert!(report.faults.contains(&Fault::OrphanedNode));
    }

    #[test]
    fn test_structural_relationship_with_skipped_vector_write_is_embedding_missing() {
        let mut packet = empty_packet();
        packet.results.structural.relationships.push(StructuralRelationship {
            path: "src/lib.rs".into(),
            source: "a".into(),
            target: "b".into(),
            kind: EdgeKind::Calls,
        });
        let mut graph = base_graph();
        graph.degrees.insert("a".into(), 5);
        graph.degrees.insert("b".into(), 5);
        graph.embeddings.insert("a".into());
        // "b"'s vector write was skipped; nothing in `graph.embeddings` names it.
        let report = validate(&packet, &graph);
        assert!(!report.faults.contains(&Fault::OrphanedNode));
        assert!(report.faults.contains(&Fault::EmbeddingMissing));
    }
}
