//! Conversation Manager (C10, optional).
//!
//! Bounds a multi-round clarification dialog so an ambiguous query doesn't
//! turn into an open-ended chat. One state machine per `conversation_id`:
//! `analyzing -> clarifying -> resolving -> completed`. State lives in a
//! TTL'd in-memory cache (not persisted across process restarts — spec.md's
//! Open Questions place it in "a TTL'd KV cache" without requiring
//! cross-process durability).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::search::intent::{self, IntentClassification};

/// Default cap on clarification rounds. Spec.md allows 2 in an earlier
/// phase and 3 once conversational mode is fully rolled out; this crate
/// targets the later phase.
pub const MAX_ROUNDS: u32 = 3;

/// Wall-clock budget for an entire conversation before it's forced to
/// fall back to a one-shot answer with the best classification so far.
pub const CONVERSATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Entries older than this are evicted on next access, even if the
/// conversation never reached `Completed`.
const ENTRY_TTL: Duration = Duration::from_secs(600);

/// State machine phase for one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Initial classification of the first turn.
    Analyzing,
    /// Ambiguity gate tripped; waiting on the caller to add context.
    Clarifying,
    /// Enough context collected; re-classifying before final answer.
    Resolving,
    /// Final round reached, or round/time budget exhausted.
    Completed,
}

/// Outcome of feeding one turn into the conversation manager.
#[derive(Debug, Clone)]
pub enum Turn {
    /// Ask the caller to disambiguate; `questions` are suggested prompts.
    NeedsClarification {
        /// Suggested clarifying questions.
        questions: Vec<String>,
        /// Which round this is (1-indexed).
        round: u32,
    },
    /// Enough signal collected (or budget exhausted); proceed as one-shot
    /// with this classification, searching against the enriched query text
    /// (the original turn plus every clarifying answer collected so far).
    Resolved {
        classification: IntentClassification,
        query: String,
    },
}

struct Entry {
    phase: Phase,
    rounds: u32,
    collected_context: Vec<String>,
    started_at: Instant,
    last_touched: Instant,
}

/// Process-wide registry of in-flight conversations.
pub struct ConversationManager {
    conversations: DashMap<String, Mutex<Entry>>,
}

impl ConversationManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            conversations: DashMap::new(),
        }
    }

    /// Feed one turn of `query` (optionally under `conversation_id`) through
    /// the state machine. A fresh `conversation_id` starts a new entry.
    pub fn advance(&self, conversation_id: &str, query: &str) -> Turn {
        self.evict_expired();

        let entry_lock = self
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                Mutex::new(Entry {
                    phase: Phase::Analyzing,
                    rounds: 0,
                    collected_context: Vec::new(),
                    started_at: Instant::now(),
                    last_touched: Instant::now(),
                })
            });
        let mut entry = entry_lock.lock().expect("conversation entry lock poisoned");
        entry.last_touched = Instant::now();
        entry.collected_context.push(query.to_string());
        entry.rounds += 1;

        let enriched_query = entry.collected_context.join(" ");
        let classification = intent::classify(&enriched_query);

        let timed_out = entry.started_at.elapsed() >= CONVERSATION_TIMEOUT;
        let out_of_rounds = entry.rounds >= MAX_ROUNDS;

        if timed_out || out_of_rounds || !is_ambiguous_enough(&classification) {
            entry.phase = Phase::Completed;
            return Turn::Resolved { classification, query: enriched_query };
        }

        entry.phase = if entry.rounds == 1 {
            Phase::Clarifying
        } else {
            Phase::Resolving
        };

        Turn::NeedsClarification {
            questions: clarifying_questions(&classification, &enriched_query),
            round: entry.rounds,
        }
    }

    /// Drop all expired entries. Called opportunistically on `advance`, and
    /// safe to call directly from a maintenance task.
    pub fn evict_expired(&self) {
        self.conversations.retain(|_, entry| {
            entry
                .lock()
                .map(|e| e.last_touched.elapsed() < ENTRY_TTL)
                .unwrap_or(false)
        });
    }

    /// Number of conversations currently tracked (including not-yet-evicted
    /// completed ones).
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether no conversations are tracked.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Mirrors the ambiguity gate in spec.md §4.6 step 2: only worth asking for
/// clarification when confidence is low AND the classifier itself flagged
/// ambiguity indicators.
fn is_ambiguous_enough(classification: &IntentClassification) -> bool {
    classification.confidence < 0.5 && classification.ambiguity
}

fn clarifying_questions(classification: &IntentClassification, query: &str) -> Vec<String> {
    let mut questions = vec![format!(
        "Could you say more about what you mean by \"{}\"?",
        query.trim()
    )];
    if !classification.ambiguity {
        return questions;
    }
    questions.push(
        "Are you looking for a specific file/function, an explanation, or how things are related?"
            .to_string(),
    );
    questions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_query_resolves_in_one_round() {
        let manager = ConversationManager::new();
        let turn = manager.advance("conv-1", "where is the main function defined?");
        assert!(matches!(turn, Turn::Resolved { .. }));
    }

    #[test]
    fn test_ambiguous_query_requests_clarification_then_resolves() {
        let manager = ConversationManager::new();
        let first = manager.advance("conv-2", "what about auth?");
        match first {
            Turn::NeedsClarification { round, .. } => assert_eq!(round, 1),
            Turn::Resolved { .. } => {
                // A sufficiently confident classification on the first round
                // is an acceptable outcome too; nothing further to assert.
            }
        }

        let second = manager.advance("conv-2", "I mean how auth.py relates to session.py");
        assert!(matches!(second, Turn::Resolved { .. } | Turn::NeedsClarification { .. }));
    }

    #[test]
    fn test_round_cap_forces_resolution() {
        let manager = ConversationManager::new();
        let mut last = manager.advance("conv-3", "what about auth?");
        for _ in 0..(MAX_ROUNDS + 2) {
            last = manager.advance("conv-3", "what about auth?");
        }
        assert!(matches!(last, Turn::Resolved { .. }));
    }

    #[test]
    fn test_separate_conversation_ids_are_independent() {
        let manager = ConversationManager::new();
        manager.advance("a", "what about auth?");
        manager.advance("b", "where is main?");
        assert_eq!(manager.len(), 2);
    }
}
