//! Intent classification: step 1 of the query pipeline (C7, spec.md §4.6).
//!
//! A fixed table of regex triggers maps the raw query text to one of six
//! intents, a confidence in `[0, 1]`, and an ambiguity flag. This is
//! deliberately simple and deterministic — no embeddings, no model calls —
//! since it gates whether the rest of the pipeline even needs to ask for
//! clarification before doing expensive work.

use std::sync::OnceLock;

use regex::Regex;

/// The six-way intent taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryIntent {
    /// "show me the function that...", "how is X implemented"
    Code,
    /// "why does...", "what does X mean", conceptual/explanatory.
    Explanation,
    /// "where is X defined", "which file has...".
    Location,
    /// "what depends on X", "how does A relate to B", "what calls X".
    Relationship,
    /// Matched more than one category with comparable strength.
    Both,
    /// No trigger matched with sufficient strength.
    Unknown,
}

impl QueryIntent {
    /// Stable lowercase identifier, used in `QueryResponse::query_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Explanation => "explanation",
            Self::Location => "location",
            Self::Relationship => "relationship",
            Self::Both => "both",
            Self::Unknown => "unknown",
        }
    }
}

/// Output of [`classify`].
#[derive(Debug, Clone)]
pub struct IntentClassification {
    /// The winning intent (or `Both`/`Unknown`).
    pub intent: QueryIntent,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Whether the query shows multiple ambiguity indicators (spec.md §4.6
    /// step 2): vague pronouns, multiple matched categories, or very short
    /// queries with no concrete identifier.
    pub ambiguity: bool,
}

struct Trigger {
    intent: QueryIntent,
    pattern: &'static str,
}

const TRIGGERS: &[Trigger] = &[
    Trigger { intent: QueryIntent::Location, pattern: r"(?i)\bwhere\s+(is|are|does|do)\b" },
    Trigger { intent: QueryIntent::Location, pattern: r"(?i)\bwhich\s+file\b" },
    Trigger { intent: QueryIntent::Location, pattern: r"(?i)\blocated?\b" },
    Trigger { intent: QueryIntent::Relationship, pattern: r"(?i)\bdepends?\s+on\b" },
    Trigger { intent: QueryIntent::Relationship, pattern: r"(?i)\brelat(e|es|ed|ionship)\b" },
    Trigger { intent: QueryIntent::Relationship, pattern: r"(?i)\bcalls?\b" },
    Trigger { intent: QueryIntent::Relationship, pattern: r"(?i)\bwhat\s+(uses|imports|calls)\b" },
    Trigger { intent: QueryIntent::Relationship, pattern: r"(?i)\bimpact\s+of\b" },
    Trigger { intent: QueryIntent::Explanation, pattern: r"(?i)\bwhy\b" },
    Trigger { intent: QueryIntent::Explanation, pattern: r"(?i)\bwhat\s+does\b" },
    Trigger { intent: QueryIntent::Explanation, pattern: r"(?i)\bexplain\b" },
    Trigger { intent: QueryIntent::Explanation, pattern: r"(?i)\bwhat\s+is\s+the\s+purpose\b" },
    Trigger { intent: QueryIntent::Code, pattern: r"(?i)\bshow\s+me\b" },
    Trigger { intent: QueryIntent::Code, pattern: r"(?i)\bhow\s+is\b.*\bimplement" },
    Trigger { intent: QueryIntent::Code, pattern: r"(?i)\bimplementation\s+of\b" },
    Trigger { intent: QueryIntent::Code, pattern: r"(?i)\bfunction\b" },
    Trigger { intent: QueryIntent::Code, pattern: r"(?i)\bclass\b" },
];

/// Phrases that indicate the query is vague regardless of which trigger
/// matched (spec.md §4.6 step 2, "ambiguity indicators").
const AMBIGUITY_MARKERS: &[&str] = &[
    "what about", "thing", "stuff", "this", "that one", "it", "something",
];

fn compiled_triggers() -> &'static [(QueryIntent, Regex)] {
    static CELL: OnceLock<Vec<(QueryIntent, Regex)>> = OnceLock::new();
    CELL.get_or_init(|| {
        TRIGGERS
            .iter()
            .map(|t| (t.intent, Regex::new(t.pattern).expect("static trigger regex is valid")))
            .collect()
    })
}

/// Classify `query` against the fixed trigger table.
pub fn classify(query: &str) -> IntentClassification {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return IntentClassification {
            intent: QueryIntent::Unknown,
            confidence: 0.0,
            ambiguity: true,
        };
    }

    let mut matched: Vec<QueryIntent> = Vec::new();
    for (intent, regex) in compiled_triggers() {
        if regex.is_match(trimmed) && !matched.contains(intent) {
            matched.push(*intent);
        }
    }

    let word_count = trimmed.split_whitespace().count();
    let has_marker = AMBIGUITY_MARKERS
        .iter()
        .any(|m| trimmed.to_ascii_lowercase().contains(m));
    let marker_count = usize::from(has_marker) + usize::from(word_count <= 3);

    let (intent, confidence) = match matched.len() {
        0 => (QueryIntent::Unknown, 0.2),
        1 => (matched[0], if has_marker { 0.55 } else { 0.85 }),
        _ => (QueryIntent::Both, 0.5),
    };

    let ambiguity_indicators = marker_count + usize::from(matched.len() > 1);
    let ambiguity = ambiguity_indicators >= 2 || matches!(intent, QueryIntent::Unknown);

    IntentClassification { intent, confidence, ambiguity }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_query() {
        let c = classify("where is the main function defined?");
        assert_eq!(c.intent, QueryIntent::Location);
        assert!(c.confidence > 0.5);
    }

    #[test]
    fn test_relationship_query() {
        let c = classify("what depends on the auth module?");
        assert_eq!(c.intent, QueryIntent::Relationship);
    }

    #[test]
    fn test_explanation_query() {
        let c = classify("why does the retry loop back off exponentially?");
        assert_eq!(c.intent, QueryIntent::Explanation);
    }

    #[test]
    fn test_code_query() {
        let c = classify("show me the implementation of the parser");
        assert_eq!(c.intent, QueryIntent::Code);
    }

    #[test]
    fn test_unknown_query_is_low_confidence_and_ambiguous() {
        let c = classify("hmm");
        assert_eq!(c.intent, QueryIntent::Unknown);
        assert!(c.ambiguity);
    }

    #[test]
    fn test_vague_query_flagged_ambiguous() {
        let c = classify("what about that thing");
        assert!(c.ambiguity);
    }

    #[test]
    fn test_empty_query() {
        let c = classify("   ");
        assert_eq!(c.intent, QueryIntent::Unknown);
        assert_eq!(c.confidence, 0.0);
    }
}
