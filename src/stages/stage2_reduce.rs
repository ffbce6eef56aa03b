use std::time::Duration;

use tracing::{info, warn};

use crate::error::AggregationError;
use crate::llm::{build_reduce_input, GenerationRequest, LlmClient};
use crate::models::{DecisionEntry, MapResult, Outcome, ReducedDraft};

/// Configuration for the reduce stage
#[derive(Debug, Clone)]
pub struct ReduceConfig {
    pub temperature: f64,
    pub timeout: Duration,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Concatenate all lists in chunk order and join the non-empty summaries
pub fn concatenate(results: &[MapResult]) -> ReducedDraft {
    let mut draft = ReducedDraft::default();
    let mut summaries = Vec::new();

    for result in results {
        if !result.summary.trim().is_empty() {
            summaries.push(result.summary.trim());
        }
        draft.decisions.extend(result.decisions.iter().cloned());
        draft.actions.extend(result.actions.iter().cloned());
        draft.participants.extend(result.participants.iter().cloned());
        draft.agenda_items.extend(result.agenda_items.iter().cloned());
    }

    draft.summary = summaries.join("\n\n");
    draft
}

/// Keep the model's list only when it is an element-wise rewrite of ours
fn adopt_if_same_length<T>(name: &str, concatenated: Vec<T>, from_model: Vec<T>) -> Vec<T> {
    if from_model.len() == concatenated.len() {
        from_model
    } else {
        warn!(
            "Reduce: model returned {} {} for {} extracted, keeping extracted list",
            from_model.len(),
            name,
            concatenated.len()
        );
        concatenated
    }
}

/// Execute the reduce stage: merge per-chunk results into one draft.
///
/// Zero results give an empty draft and a single result is passed through,
/// both without a model call. Otherwise the concatenated lists are kept
/// authoritative and the model supplies the merged summary. A failed call
/// degrades to a draft whose only content is the error marker.
pub async fn execute_reduce(
    client: &dyn LlmClient,
    results: &[MapResult],
    reduce_template: &str,
    config: &ReduceConfig,
) -> Outcome<ReducedDraft, AggregationError> {
    match results {
        [] => {
            info!("Reduce: no map results, returning empty draft");
            return Outcome::Complete(ReducedDraft::default());
        }
        [single] => {
            info!("Reduce: single map result, skipping model call");
            return Outcome::Complete(single.clone());
        }
        _ => {}
    }

    let concatenated = concatenate(results);
    let summaries: Vec<String> = results.iter().map(|r| r.summary.clone()).collect();
    info!(
        "Reduce: merging {} map results ({} decisions, {} actions, {} participants, {} agenda items)",
        results.len(),
        concatenated.decisions.len(),
        concatenated.actions.len(),
        concatenated.participants.len(),
        concatenated.agenda_items.len()
    );

    let request = GenerationRequest::new(build_reduce_input(&summaries, &concatenated))
        .with_system(reduce_template)
        .with_temperature(config.temperature)
        .with_timeout(config.timeout);

    match client.generate_json(&request).await {
        Ok(object) => {
            let (merged, notes) = ReducedDraft::normalize(&object);
            for note in notes {
                warn!("Reduce response: {}", note);
            }

            let summary = if merged.summary.is_empty() {
                warn!("Reduce: model returned no summary, using concatenated summaries");
                concatenated.summary
            } else {
                merged.summary
            };

            Outcome::Complete(ReducedDraft {
                summary,
                decisions: adopt_if_same_length("decisions", concatenated.decisions, merged.decisions),
                actions: adopt_if_same_length("actions", concatenated.actions, merged.actions),
                participants: adopt_if_same_length(
                    "participants",
                    concatenated.participants,
                    merged.participants,
                ),
                agenda_items: adopt_if_same_length(
                    "agenda items",
                    concatenated.agenda_items,
                    merged.agenda_items,
                ),
            })
        }
        Err(e) => {
            warn!("Reduce failed: {}", e);
            let error = AggregationError::Llm(e);
            let draft = ReducedDraft {
                decisions: vec![DecisionEntry::Text(format!("Error during REDUCE: {}", error))],
                ..Default::default()
            };
            Outcome::degraded(draft, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::mock::MockLlmClient;
    use crate::models::{ActionItem, AgendaItem, ParticipantEntry};
    use serde_json::json;

    fn map_result(tag: &str, decisions: usize, actions: usize, participants: usize, agenda: usize) -> MapResult {
        MapResult {
            summary: format!("summary {}", tag),
            decisions: (0..decisions).map(|i| DecisionEntry::Text(format!("{} decision {}", tag, i))).collect(),
            actions: (0..actions).map(|i| ActionItem::new("Ann", format!("{} task {}", tag, i))).collect(),
            participants: (0..participants)
                .map(|i| ParticipantEntry::Name(format!("{} person {}", tag, i)))
                .collect(),
            agenda_items: (0..agenda).map(|i| AgendaItem::new(format!("{} topic {}", tag, i))).collect(),
        }
    }

    fn unused_client() -> MockLlmClient {
        MockLlmClient::failing(LlmError::Config {
            message: "should not be called".to_string(),
        })
    }

    #[tokio::test]
    async fn test_empty_input_gives_empty_draft() {
        let client = unused_client();
        let outcome = execute_reduce(&client, &[], "REDUCE", &ReduceConfig::default()).await;
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.into_value(), ReducedDraft::default());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_single_result_short_circuits() {
        let client = unused_client();
        let only = map_result("a", 2, 1, 1, 1);
        let outcome = execute_reduce(&client, &[only.clone()], "REDUCE", &ReduceConfig::default()).await;

        assert_eq!(client.call_count(), 0);
        assert_eq!(outcome.into_value(), only);
    }

    #[tokio::test]
    async fn test_concatenation_law() {
        // The model drops entries; the concatenated lists must win
        let client = MockLlmClient::always(json!({
            "summary": "merged",
            "decisions": ["only one"],
            "actions": [],
            "participants": [],
            "agenda_items": []
        }));
        let results = vec![
            map_result("a", 2, 0, 1, 3),
            map_result("b", 0, 4, 2, 0),
            map_result("c", 1, 1, 0, 2),
        ];

        let draft = execute_reduce(&client, &results, "REDUCE", &ReduceConfig::default())
            .await
            .into_value();

        assert_eq!(client.call_count(), 1);
        assert_eq!(draft.summary, "merged");
        assert_eq!(draft.decisions.len(), 3);
        assert_eq!(draft.actions.len(), 5);
        assert_eq!(draft.participants.len(), 3);
        assert_eq!(draft.agenda_items.len(), 5);
        assert_eq!(draft.decisions[0].description(), "a decision 0");
        assert_eq!(draft.decisions[2].description(), "c decision 0");
    }

    #[tokio::test]
    async fn test_same_length_lists_are_adopted() {
        let client = MockLlmClient::always(json!({
            "summary": "merged",
            "decisions": ["Decision A", "Decision B"],
            "actions": [],
            "participants": [],
            "agenda_items": []
        }));
        let results = vec![map_result("a", 1, 0, 0, 0), map_result("b", 1, 0, 0, 0)];

        let draft = execute_reduce(&client, &results, "REDUCE", &ReduceConfig::default())
            .await
            .into_value();

        assert_eq!(
            draft.decisions,
            vec![DecisionEntry::from("Decision A"), DecisionEntry::from("Decision B")]
        );
    }

    #[tokio::test]
    async fn test_prompt_contains_all_decisions() {
        let client = MockLlmClient::always(json!({"summary": "merged"}));
        let results = vec![map_result("a", 1, 0, 0, 0), map_result("b", 1, 0, 0, 0)];
        execute_reduce(&client, &results, "REDUCE", &ReduceConfig::default()).await;

        let request = &client.requests()[0];
        assert!(request.prompt.contains("a decision 0"));
        assert!(request.prompt.contains("b decision 0"));
        assert_eq!(request.system.as_deref(), Some("REDUCE"));
        assert_eq!(request.temperature, 0.3);
    }

    #[tokio::test]
    async fn test_failure_yields_error_draft() {
        let client = MockLlmClient::failing(LlmError::Connection {
            message: "refused".to_string(),
        });
        let results = vec![map_result("a", 1, 1, 1, 1), map_result("b", 1, 1, 1, 1)];

        let outcome = execute_reduce(&client, &results, "REDUCE", &ReduceConfig::default()).await;
        assert!(outcome.is_degraded());

        let draft = outcome.into_value();
        assert_eq!(
            draft.decisions,
            vec![DecisionEntry::from("Error during REDUCE: Connection to provider failed: refused")]
        );
        assert!(draft.summary.is_empty());
        assert!(draft.actions.is_empty());
        assert!(draft.participants.is_empty());
        assert!(draft.agenda_items.is_empty());
    }

    #[test]
    fn test_concatenate_joins_summaries() {
        let mut empty = map_result("b", 0, 0, 0, 0);
        empty.summary = "  ".to_string();
        let draft = concatenate(&[map_result("a", 1, 0, 0, 0), empty, map_result("c", 0, 0, 0, 0)]);
        assert_eq!(draft.summary, "summary a\n\nsummary c");
        assert_eq!(draft.decisions.len(), 1);
    }
}
