use std::time::Duration;

use chrono::Local;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::SynthesisError;
use crate::io::render_document;
use crate::llm::{build_refine_prompt, protocol_schema, repair_protocol_json, GenerationRequest, LlmClient, PROTOCOL_SYSTEM_PROMPT};
use crate::models::{MeetingInfo, Outcome, Protocol, ProtocolMetadata, ReducedDraft, DEFAULT_TITLE};

/// Configuration for the refine stage
#[derive(Debug, Clone)]
pub struct RefineConfig {
    pub temperature: f64,
    pub timeout: Duration,
    /// Schema the final protocol is checked against
    pub schema: Value,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            timeout: Duration::from_secs(120),
            schema: protocol_schema(),
        }
    }
}

/// Final artifacts of a run
#[derive(Debug, Clone)]
pub struct RefineOutput {
    pub protocol: Protocol,
    pub document: String,
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Caller metadata with title and date filled in; never carries an error
fn caller_metadata(meeting: &MeetingInfo, today: &str) -> ProtocolMetadata {
    let mut metadata = meeting.metadata.clone();
    metadata.error = None;
    metadata.validation_warnings.clear();
    metadata.title.get_or_insert_with(|| DEFAULT_TITLE.to_string());
    metadata.date.get_or_insert_with(|| today.to_string());
    metadata
}

/// Protocol used when synthesis failed: keeps whatever the draft extracted
pub fn error_protocol(draft: &ReducedDraft, meeting: &MeetingInfo, cause: &str) -> Protocol {
    let mut metadata = caller_metadata(meeting, &today());
    metadata.error = Some(format!("Error during REFINE: {}", cause));

    Protocol {
        metadata,
        participants: Vec::new(),
        agenda_items: Vec::new(),
        summary: format!("Failed to generate protocol due to error: {}", cause),
        decisions: draft.decisions.iter().map(|d| d.to_decision()).collect(),
        action_items: draft.actions.clone(),
        created_at: Local::now(),
    }
}

/// Execute the refine stage: synthesize, repair and render the protocol.
///
/// Never fails: on a model error the outcome is degraded and carries an
/// error protocol plus an error document.
pub async fn execute_refine(
    client: &dyn LlmClient,
    draft: &ReducedDraft,
    meeting: &MeetingInfo,
    refine_template: &str,
    config: &RefineConfig,
) -> Outcome<RefineOutput, SynthesisError> {
    let today = today();
    let fallback_metadata = caller_metadata(meeting, &today);
    let prompt = build_refine_prompt(refine_template, draft, meeting, &today);

    let request = GenerationRequest::new(prompt)
        .with_system(PROTOCOL_SYSTEM_PROMPT)
        .with_temperature(config.temperature)
        .with_timeout(config.timeout);

    info!(
        "Refine: synthesizing protocol from {} decisions and {} action items",
        draft.decisions.len(),
        draft.actions.len()
    );

    match client.generate_json(&request).await {
        Ok(object) => {
            let report = repair_protocol_json(object, &fallback_metadata, &config.schema);
            let mut protocol = Protocol::from_object(&report.object);
            protocol.metadata.fill_missing_from(&fallback_metadata);
            protocol.metadata.validation_warnings = report.warnings;

            if !report.repairs.is_empty() {
                info!("Refine: applied {} repairs to model output", report.repairs.len());
            }

            let document = render_document(&protocol);
            Outcome::Complete(RefineOutput { protocol, document })
        }
        Err(e) => {
            let error = SynthesisError::Llm(e);
            warn!("Refine failed, emitting error protocol: {}", error);
            let protocol = error_protocol(draft, meeting, &error.to_string());
            let document = render_document(&protocol);
            Outcome::degraded(RefineOutput { protocol, document }, error)
        }
    }
}
