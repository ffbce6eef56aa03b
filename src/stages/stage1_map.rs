use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::ChunkProcessingError;
use crate::llm::{build_map_system_prompt, extraction_schema, validate_against_schema, GenerationRequest, LlmClient};
use crate::models::{Chunk, MapResult, Outcome};

/// Configuration for the map stage
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Upper bound on concurrent chunk analyses
    pub max_workers: usize,
    /// How long to wait for a single chunk once it started
    pub task_timeout: Duration,
    pub temperature: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            task_timeout: Duration::from_secs(120),
            temperature: 0.2,
        }
    }
}

/// Pool size: the configured maximum, capped by available parallelism
pub fn effective_concurrency(max_workers: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    max_workers.min(available).max(1)
}

pub type ChunkOutcome = Outcome<MapResult, ChunkProcessingError>;

/// Result of the map stage, one outcome per chunk in chunk order
#[derive(Debug)]
pub struct MapStageResult {
    pub outcomes: Vec<ChunkOutcome>,
    pub workers: usize,
}

impl MapStageResult {
    pub fn degraded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_degraded()).count()
    }

    pub fn all_degraded(&self) -> bool {
        !self.outcomes.is_empty() && self.degraded_count() == self.outcomes.len()
    }

    /// First failure cause, if any chunk degraded
    pub fn first_error(&self) -> Option<&ChunkProcessingError> {
        self.outcomes.iter().find_map(Outcome::error)
    }

    pub fn into_results(self) -> Vec<MapResult> {
        self.outcomes.into_iter().map(Outcome::into_value).collect()
    }
}

/// Execute the map stage: analyze every chunk independently.
///
/// Chunks run on a pool bounded by [`effective_concurrency`]. A chunk that
/// fails or exceeds `task_timeout` yields a placeholder; siblings are never
/// cancelled. A timed-out call is abandoned, not cancelled: it keeps its
/// pool slot until the client returns.
pub async fn execute_map(
    client: Arc<dyn LlmClient>,
    chunks: &[Chunk],
    map_template: &str,
    config: &MapConfig,
) -> MapStageResult {
    let workers = effective_concurrency(config.max_workers);
    info!("Map: analyzing {} chunks with {} workers", chunks.len(), workers);

    let system = build_map_system_prompt(map_template);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for (position, chunk) in chunks.iter().enumerate() {
        let request = GenerationRequest::new(chunk.render_text())
            .with_system(system.clone())
            .with_temperature(config.temperature)
            .with_timeout(config.task_timeout);
        let client = client.clone();
        let semaphore = semaphore.clone();
        let task_timeout = config.task_timeout;

        tasks.spawn(async move {
            let result = analyze_chunk(client, semaphore, request, task_timeout).await;
            (position, result)
        });
    }

    let mut slots: Vec<Option<Result<MapResult, ChunkProcessingError>>> = vec![None; chunks.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, result)) => slots[position] = Some(result),
            Err(e) => warn!("Map task aborted: {}", e),
        }
    }

    let outcomes: Vec<ChunkOutcome> = slots
        .into_iter()
        .enumerate()
        .map(|(position, slot)| {
            let result = slot.unwrap_or_else(|| {
                Err(ChunkProcessingError::Task("task ended without a result".to_string()))
            });
            match result {
                Ok(map_result) => Outcome::Complete(map_result),
                Err(error) => {
                    warn!("Chunk {} failed: {}", position, error);
                    Outcome::degraded(MapResult::placeholder(&error.to_string()), error)
                }
            }
        })
        .collect();

    let result = MapStageResult { outcomes, workers };
    info!(
        "Map: {} chunks complete, {} degraded",
        chunks.len() - result.degraded_count(),
        result.degraded_count()
    );
    result
}

async fn analyze_chunk(
    client: Arc<dyn LlmClient>,
    semaphore: Arc<Semaphore>,
    request: GenerationRequest,
    task_timeout: Duration,
) -> Result<MapResult, ChunkProcessingError> {
    let permit = semaphore
        .acquire_owned()
        .await
        .map_err(|e| ChunkProcessingError::Task(e.to_string()))?;

    // The call owns the permit so an abandoned call still counts against the pool
    let call = tokio::spawn(async move {
        let _permit = permit;
        client.generate_json(&request).await
    });

    match timeout(task_timeout, call).await {
        Ok(Ok(Ok(object))) => Ok(normalize_response(object)),
        Ok(Ok(Err(e))) => Err(ChunkProcessingError::Llm(e)),
        Ok(Err(e)) => Err(ChunkProcessingError::Task(e.to_string())),
        Err(_) => Err(ChunkProcessingError::TimedOut(task_timeout)),
    }
}

fn normalize_response(object: Map<String, Value>) -> MapResult {
    if let Err(e) = validate_against_schema(&Value::Object(object.clone()), &extraction_schema()) {
        debug!("Map response deviates from schema: {}", e);
    }
    let (result, notes) = MapResult::normalize(&object);
    for note in notes {
        warn!("Map response: {}", note);
    }
    result
}
