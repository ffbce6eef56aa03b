pub mod cache;
pub mod error;
pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stages;

pub use cache::{Cache, FileCache, MemoryCache};
pub use error::{LlmError, PipelineError};
pub use io::{parse_transcript_file, parse_transcript_json, read_meeting_info, render_document, write_outputs, TranscriptInput};
pub use llm::{AnthropicClient, AnthropicConfig, CachedLlmClient, LlmClient};
pub use models::{ChunkConfig, MeetingInfo, Protocol, Segment};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, PipelineStats};
pub use stages::{split_segments, ChunkingStats};
