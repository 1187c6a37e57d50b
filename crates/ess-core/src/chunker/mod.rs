//! Chunker (C3): turns parsed structural elements or raw document text into
//! retrievable [`ChunkNode`]s.
//!
//! ## Chunking Strategy
//!
//! Code (`ChunkStrategy::Code`, one call per [`StructuralElement`] from the parser):
//! 1. Single function/method/class if it fits in `chunk_size_tokens`.
//! 2. Otherwise split at blank-line block boundaries, with ~12% token
//!    overlap between consecutive pieces so a match near a boundary still
//!    carries context either side of it.
//!
//! Document (`ChunkStrategy::Document`): split on blank-line paragraph
//! boundaries, greedily packing paragraphs into chunks up to the size limit.
//!
//! Config (`ChunkStrategy::Config`): fixed-size split with the same overlap
//! ratio as code, since structured config has no natural paragraph shape.
//!
//! Rechunking is skipped by the pipeline (not here) when a file's
//! `prov_text_hash` is unchanged from the previous run (I6); this module is a
//! pure function of its inputs and has no knowledge of the store.

use crate::ids::{self, ProjectId};
use crate::parser::StructuralElement;
use crate::types::{ChunkNode, ChunkStrategy, Provenance};

/// Overlap fraction applied when a chunk must be split (spec.md targets 10-15%).
const OVERLAP_RATIO: f64 = 0.12;

/// Chunk the structural elements extracted from a code file.
///
/// `file_hash`/`extractor_version`/`indexed_at` populate each chunk's
/// provenance; `text_hash` is left unset since provenance is carried at the
/// file/entity level, not duplicated per chunk beyond `content_hash`.
pub fn chunk_code(
    project: &ProjectId,
    path: &str,
    elements: &[StructuralElement],
    max_tokens: u32,
    provenance_base: &Provenance,
) -> Vec<ChunkNode> {
    let mut chunks = Vec::new();
    let mut index = 0usize;

    for elem in elements {
        let estimated_tokens = estimate_tokens(&elem.content);

        if estimated_tokens <= max_tokens {
            push_chunk(
                &mut chunks,
                &mut index,
                project,
                path,
                ChunkStrategy::Code,
                &elem.content,
                estimated_tokens,
                elem.kind.default_weight() * elem.visibility.weight_multiplier(),
                provenance_base,
            );
        } else {
            for piece in split_with_overlap(&elem.content, max_tokens) {
                let tokens = estimate_tokens(&piece);
                push_chunk(
                    &mut chunks,
                    &mut index,
                    project,
                    path,
                    ChunkStrategy::Code,
                    &piece,
                    tokens,
                    elem.kind.default_weight() * elem.visibility.weight_multiplier(),
                    provenance_base,
                );
            }
        }
    }

    chunks
}

/// Chunk a prose document (Markdown, plain text) by paragraph, packing
/// consecutive paragraphs into chunks up to `max_tokens`.
pub fn chunk_document(
    project: &ProjectId,
    path: &str,
    text: &str,
    max_tokens: u32,
    provenance_base: &Provenance,
) -> Vec<ChunkNode> {
    let paragraphs = split_paragraphs(text);
    let mut chunks = Vec::new();
    let mut index = 0usize;
    let mut buffer = String::new();

    for para in paragraphs {
        let candidate = if buffer.is_empty() {
            para.clone()
        } else {
            format!("{buffer}\n\n{para}")
        };

        if estimate_tokens(&candidate) > max_tokens && !buffer.is_empty() {
            push_chunk(
                &mut chunks,
                &mut index,
                project,
                path,
                ChunkStrategy::Document,
                &buffer,
                estimate_tokens(&buffer),
                1.0,
                provenance_base,
            );
            buffer = para;
        } else {
            buffer = candidate;
        }
    }

    if !buffer.trim().is_empty() {
        push_chunk(
            &mut chunks,
            &mut index,
            project,
            path,
            ChunkStrategy::Document,
            &buffer,
            estimate_tokens(&buffer),
            1.0,
            provenance_base,
        );
    }

    chunks
}

/// Chunk structured configuration (TOML/YAML/JSON) by fixed size with overlap.
pub fn chunk_config(
    project: &ProjectId,
    path: &str,
    text: &str,
    max_tokens: u32,
    provenance_base: &Provenance,
) -> Vec<ChunkNode> {
    let mut chunks = Vec::new();
    let mut index = 0usize;

    for piece in split_with_overlap(text, max_tokens) {
        let tokens = estimate_tokens(&piece);
        push_chunk(
            &mut chunks,
            &mut index,
            project,
            path,
            ChunkStrategy::Config,
            &piece,
            tokens,
            0.6,
            provenance_base,
        );
    }

    chunks
}

#[expect(clippy::too_many_arguments)]
fn push_chunk(
    chunks: &mut Vec<ChunkNode>,
    index: &mut usize,
    project: &ProjectId,
    path: &str,
    strategy: ChunkStrategy,
    content: &str,
    token_count: u32,
    weight: f64,
    provenance_base: &Provenance,
) {
    if content.trim().is_empty() {
        return;
    }

    let normalized = ids::normalize_text(content);
    let content_hash = ids::text_hash(&normalized);
    let chunk_id = ids::chunk_id(project.as_str(), path, *index, &content_hash);

    let char_start = chunks.last().map_or(0, |c: &ChunkNode| c.char_end);
    let char_end = char_start + normalized.chars().count();

    chunks.push(ChunkNode {
        project: project.clone(),
        chunk_id,
        path: path.to_string(),
        chunk_index: *index,
        strategy,
        char_start,
        char_end,
        content: normalized,
        content_hash,
        token_count,
        weight: weight.clamp(0.0, 1.0),
        provenance: provenance_base.clone(),
    });
    *index += 1;
}

/// Rough token estimation: ~4 characters per token for code/prose alike.
/// Actual tokenization happens in the embedder; this only needs to be good
/// enough to decide when to split.
fn estimate_tokens(content: &str) -> u32 {
    #[expect(clippy::cast_possible_truncation)]
    let estimate = (content.chars().count() / 4) as u32;
    estimate.max(1)
}

/// Split `text` into paragraphs at one-or-more blank lines.
fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split `content` into pieces of at most `max_tokens`, splitting at blank
/// lines where possible and falling back to line boundaries, with
/// [`OVERLAP_RATIO`] of the previous piece repeated at the start of the next.
fn split_with_overlap(content: &str, max_tokens: u32) -> Vec<String> {
    let max_chars = (max_tokens as usize) * 4;
    if estimate_tokens(content) <= max_tokens {
        return vec![content.to_string()];
    }

    let lines: Vec<&str> = content.lines().collect();
    let overlap_chars = ((max_chars as f64) * OVERLAP_RATIO) as usize;

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut carry_over = String::new();

    for line in lines {
        let candidate_len = current.len() + line.len() + 1;
        if candidate_len > max_chars && !current.is_empty() {
            pieces.push(current.clone());
            carry_over = tail_chars(&current, overlap_chars);
            current = carry_over.clone();
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.is_empty() && current != carry_over {
        pieces.push(current);
    }

    if pieces.is_empty() {
        pieces.push(content.to_string());
    }

    pieces
}

/// Last `n` characters of `s`, snapped to a char boundary.
fn tail_chars(s: &str, n: usize) -> String {
    let total = s.chars().count();
    if total <= n {
        return s.to_string();
    }
    s.chars().skip(total - n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkKind, Visibility};

    fn provenance() -> Provenance {
        Provenance {
            file_hash: "filehash".into(),
            text_hash: None,
            extractor_version: "1".into(),
            indexed_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn project() -> ProjectId {
        ProjectId::new("proj").unwrap()
    }

    fn element(content: &str) -> StructuralElement {
        StructuralElement {
            symbol_path: "mod.func".into(),
            name: "func".into(),
            kind: ChunkKind::Function,
            visibility: Visibility::Public,
            line_start: 1,
            line_end: content.lines().count() as u32,
            content: content.to_string(),
            doc_comment: None,
            references: Vec::new(),
        }
    }

    #[test]
    fn test_small_element_becomes_one_chunk() {
        let elements = vec![element("fn hello() {}")];
        let chunks = chunk_code(&project(), "src/lib.rs", &elements, 512, &provenance());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].strategy, ChunkStrategy::Code);
    }

    #[test]
    fn test_large_element_splits_with_overlap() {
        let body: String = (0..500).map(|i| format!("let x{i} = {i};\n")).collect();
        let elements = vec![element(&body)];
        let chunks = chunk_code(&project(), "src/lib.rs", &elements, 64, &provenance());
        assert!(chunks.len() > 1, "large element should split into multiple chunks");
        for pair in chunks.windows(2) {
            assert!(pair[1].char_start <= pair[0].char_end);
        }
    }

    #[test]
    fn test_chunk_ids_are_deterministic() {
        let elements = vec![element("fn hello() {}")];
        let a = chunk_code(&project(), "src/lib.rs", &elements, 512, &provenance());
        let b = chunk_code(&project(), "src/lib.rs", &elements, 512, &provenance());
        assert_eq!(a[0].chunk_id, b[0].chunk_id);
    }

    #[test]
    fn test_document_chunking_packs_paragraphs() {
        let text = "# Title\n\nFirst paragraph.\n\nSecond paragraph.\n";
        let chunks = chunk_document(&project(), "README.md", text, 512, &provenance());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("Second paragraph"));
    }

    #[test]
    fn test_document_chunking_splits_when_over_budget() {
        let para_a = "a ".repeat(200);
        let para_b = "b ".repeat(200);
        let text = format!("{para_a}\n\n{para_b}");
        let chunks = chunk_document(&project(), "README.md", &text, 64, &provenance());
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn test_config_chunking_fixed_size() {
        let text = "key = \"value\"\n".repeat(200);
        let chunks = chunk_config(&project(), "Cargo.toml", &text, 64, &provenance());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.strategy, ChunkStrategy::Config);
        }
    }

    #[test]
    fn test_empty_content_produces_no_chunks() {
        let elements = vec![element("   \n  \n")];
        let chunks = chunk_code(&project(), "src/lib.rs", &elements, 512, &provenance());
        assert!(chunks.is_empty());
    }
}
