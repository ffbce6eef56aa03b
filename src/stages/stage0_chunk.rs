use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{Chunk, ChunkConfig, Segment};

/// Summary of a chunking run, reported by `analyze`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkingStats {
    pub segment_count: usize,
    pub chunk_count: usize,
    pub total_tokens: usize,
    pub max_chunk_tokens: usize,
    pub oversized_chunks: usize,
    /// Segments that appear in two chunks because of overlap
    pub overlap_segments: usize,
}

impl ChunkingStats {
    pub fn from_chunks(segments: &[Segment], chunks: &[Chunk], token_budget: usize) -> Self {
        Self {
            segment_count: segments.len(),
            chunk_count: chunks.len(),
            total_tokens: chunks.iter().map(|c| c.token_count).sum(),
            max_chunk_tokens: chunks.iter().map(|c| c.token_count).max().unwrap_or(0),
            oversized_chunks: chunks.iter().filter(|c| c.is_oversized(token_budget)).count(),
            overlap_segments: chunks.iter().map(|c| c.overlap_segments).sum(),
        }
    }
}

/// Overlap must leave room for new content; otherwise it is disabled
fn effective_overlap(config: &ChunkConfig) -> usize {
    if config.overlap_tokens >= config.token_budget {
        warn!(
            "Overlap of {} tokens is not below the budget of {} tokens, disabling overlap",
            config.overlap_tokens, config.token_budget
        );
        0
    } else {
        config.overlap_tokens
    }
}

/// Split segments into token-bounded chunks.
///
/// Segments are never split: one that alone exceeds the budget becomes a
/// singleton chunk. Each new chunk starts with the trailing segments of the
/// previous one, up to `overlap_tokens` worth, trimmed further if needed so
/// the chunk still fits the budget. Deterministic for identical input.
pub fn split_segments(
    segments: &[Segment],
    config: &ChunkConfig,
    count_tokens: impl Fn(&str) -> usize,
) -> Vec<Chunk> {
    let budget = config.token_budget;
    let overlap = effective_overlap(config);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<(Segment, usize)> = Vec::new();
    let mut current_overlap = 0;

    let close = |chunks: &mut Vec<Chunk>, members: Vec<(Segment, usize)>, overlap_segments: usize| {
        if members.is_empty() {
            return;
        }
        let token_count = members.iter().map(|(_, cost)| cost).sum();
        chunks.push(Chunk {
            index: chunks.len(),
            segments: members.into_iter().map(|(segment, _)| segment).collect(),
            token_count,
            overlap_segments,
        });
    };

    for segment in segments {
        let cost = count_tokens(&segment.labeled_text());

        if cost > budget {
            debug!(
                "Segment at {:.1}s has {} tokens (budget {}), emitting as its own chunk",
                segment.start, cost, budget
            );
            close(&mut chunks, std::mem::take(&mut current), current_overlap);
            close(&mut chunks, vec![(segment.clone(), cost)], 0);
            current_overlap = 0;
            continue;
        }

        let running: usize = current.iter().map(|(_, c)| c).sum();
        if !current.is_empty() && running + cost > budget {
            let seed = overlap_seed(&current, overlap, cost, budget);
            let closed = std::mem::replace(&mut current, seed);
            close(&mut chunks, closed, current_overlap);
            current_overlap = current.len();
        }

        current.push((segment.clone(), cost));
    }
    close(&mut chunks, current, current_overlap);

    info!(
        "Chunker: {} segments -> {} chunks (budget {}, overlap {})",
        segments.len(),
        chunks.len(),
        budget,
        overlap
    );
    chunks
}

/// Trailing members worth at most `overlap` tokens that still leave room for `incoming`.
///
/// The last member is always carried when overlap is enabled, even if it
/// alone costs more than `overlap`, as long as it fits next to `incoming`.
fn overlap_seed(
    members: &[(Segment, usize)],
    overlap: usize,
    incoming: usize,
    budget: usize,
) -> Vec<(Segment, usize)> {
    if overlap == 0 || members.is_empty() {
        return Vec::new();
    }

    let mut start = members.len() - 1;
    let mut taken = members[start].1;
    while start > 0 && taken + members[start - 1].1 <= overlap {
        start -= 1;
        taken += members[start].1;
    }

    while start < members.len() && taken + incoming > budget {
        taken -= members[start].1;
        start += 1;
    }

    if start == members.len() {
        debug!(
            "No room for overlap: last segment has {} tokens, incoming {} (budget {})",
            members[members.len() - 1].1,
            incoming,
            budget
        );
    }
    members[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::estimate_tokens;

    /// One token per whitespace-separated word, labels included
    fn words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn segment(i: usize, text: &str) -> Segment {
        Segment::new(format!("S{}", i % 3), text, i as f64, i as f64 + 1.0)
    }

    fn transcript(word_counts: &[usize]) -> Vec<Segment> {
        word_counts
            .iter()
            .enumerate()
            .map(|(i, &n)| segment(i, &vec!["w"; n].join(" ")))
            .collect()
    }

    fn config(token_budget: usize, overlap_tokens: usize) -> ChunkConfig {
        ChunkConfig {
            token_budget,
            overlap_tokens,
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(split_segments(&[], &ChunkConfig::default(), estimate_tokens).is_empty());
    }

    #[test]
    fn test_every_chunk_within_budget() {
        let segments = transcript(&[3, 7, 2, 9, 4, 4, 1, 8, 6, 2, 5, 3, 7, 7, 2]);
        for (budget, overlap) in [(10, 0), (10, 4), (15, 5), (20, 19), (12, 12)] {
            let chunks = split_segments(&segments, &config(budget, overlap), words);
            for chunk in &chunks {
                assert!(
                    chunk.token_count <= budget || chunk.is_oversized(budget),
                    "chunk {} has {} tokens with budget {}",
                    chunk.index,
                    chunk.token_count,
                    budget
                );
                assert!(!chunk.is_empty());
            }
        }
    }

    #[test]
    fn test_oversized_segment_is_singleton() {
        // labeled_text adds one word for the "[Sx]:" label
        let segments = transcript(&[2, 20, 2]);
        let chunks = split_segments(&segments, &config(10, 0), words);

        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].is_oversized(10));
        assert_eq!(chunks[1].token_count, 21);
        assert_eq!(chunks[1].segments[0], segments[1]);
        assert_eq!(chunks[2].overlap_segments, 0);
    }

    #[test]
    fn test_overlap_carries_trailing_segments() {
        let segments = transcript(&[2, 2, 2, 2, 2, 2, 2, 2]);
        let chunks = split_segments(&segments, &config(9, 3), words);

        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            assert!(next.overlap_segments > 0);
            let carried = &next.segments[..next.overlap_segments];
            let tail = &previous.segments[previous.len() - next.overlap_segments..];
            assert_eq!(carried, tail);
        }
    }

    #[test]
    fn test_overlap_carries_segment_larger_than_overlap() {
        // five tokens per segment with the label, overlap of three
        let segments = transcript(&[4, 4, 4, 4, 4, 4]);
        let chunks = split_segments(&segments, &config(12, 3), words);

        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0].overlap_segments, 0);
        for pair in chunks.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            assert_eq!(next.overlap_segments, 1, "no context carried into chunk {}", next.index);
            assert_eq!(next.segments[0], previous.segments[previous.len() - 1]);
            assert!(next.token_count <= 12);
        }
    }

    #[test]
    fn test_overlap_dropped_when_it_cannot_fit() {
        // 6 + 6 tokens leave no room to repeat a 6-token segment
        let segments = transcript(&[5, 5, 5]);
        let chunks = split_segments(&segments, &config(11, 3), words);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.overlap_segments == 0));
    }

    #[test]
    fn test_overlap_clamped_when_not_below_budget() {
        let segments = transcript(&[2, 2, 2, 2]);
        let chunks = split_segments(&segments, &config(6, 6), words);

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.overlap_segments == 0));
        let total: usize = chunks.iter().map(Chunk::len).sum();
        assert_eq!(total, segments.len());
    }

    #[test]
    fn test_every_segment_is_covered_in_order() {
        let segments = transcript(&[4, 1, 6, 3, 3, 2, 8, 1, 1, 5]);
        let chunks = split_segments(&segments, &config(12, 4), words);

        let fresh: Vec<&Segment> = chunks
            .iter()
            .flat_map(|c| c.segments[c.overlap_segments..].iter())
            .collect();
        assert_eq!(fresh, segments.iter().collect::<Vec<_>>());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn test_deterministic() {
        let segments = transcript(&[3, 5, 2, 7, 1, 4, 4]);
        let first = split_segments(&segments, &config(9, 3), words);
        let second = split_segments(&segments, &config(9, 3), words);
        let bounds = |chunks: &[Chunk]| -> Vec<(usize, usize)> {
            chunks.iter().map(|c| (c.len(), c.overlap_segments)).collect()
        };
        assert_eq!(bounds(&first), bounds(&second));
    }

    #[test]
    fn test_stats() {
        let segments = transcript(&[2, 20, 2]);
        let chunks = split_segments(&segments, &config(10, 0), words);
        let stats = ChunkingStats::from_chunks(&segments, &chunks, 10);
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.oversized_chunks, 1);
        assert_eq!(stats.max_chunk_tokens, 21);
        assert_eq!(stats.total_tokens, 27);
    }
}
