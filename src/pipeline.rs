//! Orchestrator: chunk, map, reduce, refine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::Cache;
use crate::error::PipelineError;
use crate::llm::{load_schema, protocol_schema, CachedLlmClient, LlmClient, PromptTemplates};
use crate::models::{ChunkConfig, MeetingInfo, Protocol, Segment};
use crate::stages::{
    execute_map, execute_reduce, execute_refine, split_segments, MapConfig, ReduceConfig, RefineConfig,
};

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk: ChunkConfig,
    /// Configured pool size; clamped to available parallelism at run time
    pub max_workers: usize,
    /// Per-call wait limit for map, reduce and refine
    pub task_timeout: Duration,
    pub map_temperature: f64,
    pub reduce_temperature: f64,
    pub refine_temperature: f64,
    /// Language used when the caller does not pass one
    pub language: String,
    /// Directory with `<stage>_prompt[_<lang>].txt` overrides
    pub prompts_dir: Option<PathBuf>,
    /// Replacement protocol schema
    pub schema_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            max_workers: 5,
            task_timeout: Duration::from_secs(120),
            map_temperature: 0.2,
            reduce_temperature: 0.3,
            refine_temperature: 0.5,
            language: "de".to_string(),
            prompts_dir: None,
            schema_path: None,
        }
    }
}

impl PipelineConfig {
    /// Apply `CHUNK_TOKENS`, `OVERLAP_TOKENS` and `TRANSCRIPTION_LANG`
    pub fn with_env_overrides(mut self) -> Self {
        fn parse_env(name: &str) -> Option<usize> {
            let raw = std::env::var(name).ok()?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring {}={:?}: not a number", name, raw);
                    None
                }
            }
        }

        if let Some(tokens) = parse_env("CHUNK_TOKENS") {
            self.chunk.token_budget = tokens;
        }
        if let Some(tokens) = parse_env("OVERLAP_TOKENS") {
            self.chunk.overlap_tokens = tokens;
        }
        if let Ok(language) = std::env::var("TRANSCRIPTION_LANG") {
            if !language.trim().is_empty() {
                self.language = language.trim().to_lowercase();
            }
        }
        self
    }
}

/// Counters describing one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub run_id: String,
    pub segments: usize,
    pub chunks: usize,
    pub degraded_chunks: usize,
    pub workers: usize,
    pub reduce_degraded: bool,
    pub refine_degraded: bool,
    pub elapsed_secs: f64,
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub protocol: Protocol,
    pub document: String,
    pub stats: PipelineStats,
}

/// Progress callback: stage label and overall fraction in 0..=1
pub type ProgressFn<'a> = &'a (dyn Fn(&str, f64) + Send + Sync);

pub struct Pipeline {
    client: Arc<dyn LlmClient>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(client: Arc<dyn LlmClient>, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    /// Route model calls through `cache`
    pub fn with_cache(client: Arc<dyn LlmClient>, cache: Arc<dyn Cache>, config: PipelineConfig) -> Self {
        Self::new(Arc::new(CachedLlmClient::new(client, cache)), config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn schema(&self) -> Result<Value> {
        match &self.config.schema_path {
            Some(path) => load_schema(path).context("Failed to load protocol schema"),
            None => Ok(protocol_schema()),
        }
    }

    fn templates(&self, language: &str) -> PromptTemplates {
        match &self.config.prompts_dir {
            Some(dir) => PromptTemplates::load(dir, language),
            None => PromptTemplates::builtin(language),
        }
    }

    /// Turn transcript segments into a protocol and its document.
    ///
    /// Stage failures degrade the result instead of aborting; the run only
    /// fails for an empty transcript or when every model call failed.
    pub async fn process(
        &self,
        segments: &[Segment],
        meeting: &MeetingInfo,
        language: Option<&str>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<PipelineOutput> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("pipeline", run_id = %run_id);
        self.run(run_id, segments, meeting, language, progress)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        run_id: String,
        segments: &[Segment],
        meeting: &MeetingInfo,
        language: Option<&str>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<PipelineOutput> {
        let report = |stage: &str, fraction: f64| {
            if let Some(progress) = progress {
                progress(stage, fraction);
            }
        };

        if segments.is_empty() {
            return Err(PipelineError::EmptyTranscript.into());
        }

        let started = Instant::now();
        let language = language.unwrap_or(&self.config.language).to_lowercase();
        let templates = self.templates(&language);
        let refine_config = RefineConfig {
            temperature: self.config.refine_temperature,
            timeout: self.config.task_timeout,
            schema: self.schema()?,
        };
        info!("Processing {} segments (language '{}')", segments.len(), language);

        report("chunking", 0.0);
        let client = self.client.clone();
        let chunks = split_segments(segments, &self.config.chunk, |text| client.count_tokens(text));

        report("map", 0.1);
        let map_config = MapConfig {
            max_workers: self.config.max_workers,
            task_timeout: self.config.task_timeout,
            temperature: self.config.map_temperature,
        };
        let map = execute_map(self.client.clone(), &chunks, &templates.map, &map_config).await;
        let map_failed = map.all_degraded();
        let map_cause = map.first_error().map(|e| e.to_string());
        let workers = map.workers;
        let degraded_chunks = map.degraded_count();
        let results = map.into_results();

        report("reduce", 0.6);
        let reduce_config = ReduceConfig {
            temperature: self.config.reduce_temperature,
            timeout: self.config.task_timeout,
        };
        let reduced = execute_reduce(self.client.as_ref(), &results, &templates.reduce, &reduce_config).await;
        // A pass-through of a single failed chunk counts as a failed reduce
        let reduce_failed = reduced.is_degraded() || (map_failed && results.len() <= 1);
        let (draft, _) = reduced.into_parts();

        report("refine", 0.8);
        let refined = execute_refine(self.client.as_ref(), &draft, meeting, &templates.refine, &refine_config).await;
        let refine_failed = refined.is_degraded();
        let refine_cause = refined.error().map(|e| e.to_string());

        if map_failed && reduce_failed && refine_failed {
            let cause = refine_cause.or(map_cause).unwrap_or_default();
            return Err(PipelineError::LlmUnavailable { cause }.into());
        }

        let output = refined.into_value();
        let stats = PipelineStats {
            run_id,
            segments: segments.len(),
            chunks: chunks.len(),
            degraded_chunks,
            workers,
            reduce_degraded: reduce_failed,
            refine_degraded: refine_failed,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        report("done", 1.0);
        info!(
            "Pipeline finished in {:.1}s: {} chunks ({} degraded), protocol {}",
            stats.elapsed_secs,
            stats.chunks,
            stats.degraded_chunks,
            if output.protocol.is_error() { "degraded" } else { "complete" }
        );

        Ok(PipelineOutput {
            protocol: output.protocol,
            document: output.document,
            stats,
        })
    }
}
