use super::Segment;

/// Configuration for chunk generation
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum tokens per chunk
    pub token_budget: usize,
    /// Tokens' worth of trailing segments carried into the next chunk
    pub overlap_tokens: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            token_budget: 550,
            overlap_tokens: 100,
        }
    }
}

/// An ordered, non-empty group of segments processed as one map task
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position of this chunk in the transcript
    pub index: usize,
    /// Segments in transcript order, overlap segments first
    pub segments: Vec<Segment>,
    /// Sum of the segments' token counts
    pub token_count: usize,
    /// Number of leading segments carried over from the previous chunk
    pub overlap_segments: usize,
}

impl Chunk {
    /// Render the chunk with speaker labels, one segment per paragraph
    pub fn render_text(&self) -> String {
        self.segments
            .iter()
            .map(Segment::labeled_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Number of segments (including overlap)
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// A singleton chunk whose only segment alone exceeds the budget
    pub fn is_oversized(&self, token_budget: usize) -> bool {
        self.segments.len() == 1 && self.token_count > token_budget
    }

    /// Start time of the first segment in seconds
    pub fn start_secs(&self) -> f64 {
        self.segments.first().map(|s| s.start).unwrap_or(0.0)
    }

    /// End time of the last segment in seconds
    pub fn end_secs(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }

    /// Distinct speakers in order of first appearance
    pub fn speakers(&self) -> Vec<&str> {
        let mut speakers: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if !speakers.contains(&segment.speaker.as_str()) {
                speakers.push(&segment.speaker);
            }
        }
        speakers
    }
}
