//! Scripted client for exercising the stages without a provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::client::{GenerationRequest, LlmClient};
use crate::error::LlmError;

pub struct MockReply {
    pub delay: Option<Duration>,
    pub result: Result<Value, LlmError>,
}

impl MockReply {
    pub fn ok(value: Value) -> Self {
        Self {
            delay: None,
            result: Ok(value),
        }
    }

    pub fn err(error: LlmError) -> Self {
        Self {
            delay: None,
            result: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Responder = Box<dyn Fn(&GenerationRequest) -> MockReply + Send + Sync>;

pub struct MockLlmClient {
    responder: Responder,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockLlmClient {
    pub fn new(responder: impl Fn(&GenerationRequest) -> MockReply + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(value: Value) -> Self {
        Self::new(move |_| MockReply::ok(value.clone()))
    }

    pub fn failing(error: LlmError) -> Self {
        Self::new(move |_| MockReply::err(error.clone()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn reply(&self, request: &GenerationRequest) -> Result<Value, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let reply = (self.responder)(request);
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply.result
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate_text(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        match self.reply(request).await? {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }

    async fn generate_json(&self, request: &GenerationRequest) -> Result<Map<String, Value>, LlmError> {
        match self.reply(request).await? {
            Value::Object(object) => Ok(object),
            other => Err(LlmError::invalid_response(format!("not an object: {}", other))),
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
