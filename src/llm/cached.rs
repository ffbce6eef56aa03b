use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::client::{GenerationRequest, LlmClient};
use crate::cache::{content_hash, Cache};
use crate::error::LlmError;

/// Cache namespace for model responses
pub const LLM_NAMESPACE: &str = "llm";

/// Only near-deterministic calls are worth caching
pub const MAX_CACHEABLE_TEMPERATURE: f64 = 0.3;

/// Wraps a client with a response cache.
///
/// Cache failures are logged and otherwise ignored, so a broken cache only
/// costs extra provider calls.
pub struct CachedLlmClient {
    inner: Arc<dyn LlmClient>,
    cache: Arc<dyn Cache>,
    ttl: Option<Duration>,
}

impl CachedLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, cache: Arc<dyn Cache>) -> Self {
        Self {
            inner,
            cache,
            ttl: Some(Duration::from_secs(7 * 24 * 3600)),
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    fn cache_key(&self, kind: &str, request: &GenerationRequest) -> Option<String> {
        if request.temperature > MAX_CACHEABLE_TEMPERATURE {
            return None;
        }
        let temperature = format!("{:.3}", request.temperature);
        let schema = request.schema.as_ref().map(Value::to_string).unwrap_or_default();
        Some(content_hash(&[
            kind,
            self.inner.model_name(),
            request.system.as_deref().unwrap_or(""),
            &request.prompt,
            &temperature,
            &schema,
        ]))
    }

    // Backends may do file I/O, so they run on the blocking pool
    async fn lookup(&self, key: &str) -> Option<Value> {
        let cache = self.cache.clone();
        let owned_key = key.to_string();
        let read = tokio::task::spawn_blocking(move || cache.get(LLM_NAMESPACE, &owned_key)).await;

        match read {
            Ok(Ok(Some(value))) => {
                debug!("LLM cache hit: {}", key);
                Some(value)
            }
            Ok(Ok(None)) => {
                debug!("LLM cache miss: {}", key);
                None
            }
            Ok(Err(e)) => {
                warn!("LLM cache read failed, calling provider: {}", e);
                None
            }
            Err(e) => {
                warn!("LLM cache read task failed, calling provider: {}", e);
                None
            }
        }
    }

    async fn store(&self, key: &str, value: Value) {
        let cache = self.cache.clone();
        let owned_key = key.to_string();
        let ttl = self.ttl;
        let write = tokio::task::spawn_blocking(move || cache.set(LLM_NAMESPACE, &owned_key, &value, ttl)).await;

        match write {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("LLM cache write failed: {}", e),
            Err(e) => warn!("LLM cache write task failed: {}", e),
        }
    }
}

#[async_trait]
impl LlmClient for CachedLlmClient {
    async fn generate_text(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let key = self.cache_key("text", request);
        if let Some(key) = &key {
            if let Some(Value::String(text)) = self.lookup(key).await {
                return Ok(text);
            }
        }

        let text = self.inner.generate_text(request).await?;
        if let Some(key) = &key {
            self.store(key, Value::String(text.clone())).await;
        }
        Ok(text)
    }

    async fn generate_json(&self, request: &GenerationRequest) -> Result<Map<String, Value>, LlmError> {
        let key = self.cache_key("json", request);
        if let Some(key) = &key {
            if let Some(Value::Object(object)) = self.lookup(key).await {
                return Ok(object);
            }
        }

        let object = self.inner.generate_json(request).await?;
        if let Some(key) = &key {
            self.store(key, Value::Object(object.clone())).await;
        }
        Ok(object)
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
