use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::protocol::{coerce_list, text_field};
use super::{ActionItem, AgendaItem, Decision, Participant};

/// Decisions arrive either as plain sentences or as structured objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecisionEntry {
    Text(String),
    Structured(Decision),
}

impl DecisionEntry {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(DecisionEntry::Text(s.trim().to_string())),
            Value::Object(_) => Decision::from_value(value).map(DecisionEntry::Structured),
            _ => None,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            DecisionEntry::Text(text) => text,
            DecisionEntry::Structured(decision) => &decision.description,
        }
    }

    pub fn to_decision(&self) -> Decision {
        match self {
            DecisionEntry::Text(text) => Decision::new(text.clone()),
            DecisionEntry::Structured(decision) => decision.clone(),
        }
    }
}

impl From<&str> for DecisionEntry {
    fn from(text: &str) -> Self {
        DecisionEntry::Text(text.to_string())
    }
}

/// Participants arrive either as names or as structured objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParticipantEntry {
    Name(String),
    Structured(Participant),
}

impl ParticipantEntry {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(ParticipantEntry::Name(s.trim().to_string())),
            Value::Object(_) => Participant::from_value(value).map(ParticipantEntry::Structured),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParticipantEntry::Name(name) => name,
            ParticipantEntry::Structured(participant) => &participant.name,
        }
    }

    pub fn role(&self) -> Option<&str> {
        match self {
            ParticipantEntry::Name(_) => None,
            ParticipantEntry::Structured(participant) => participant.role.as_deref(),
        }
    }
}

/// Structured highlights of a transcript span.
///
/// Used both for per-chunk map results and for the reduced draft; every
/// field is always populated (possibly empty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub summary: String,
    pub decisions: Vec<DecisionEntry>,
    pub actions: Vec<ActionItem>,
    pub participants: Vec<ParticipantEntry>,
    pub agenda_items: Vec<AgendaItem>,
}

/// Result of analyzing one chunk
pub type MapResult = Extraction;

/// Aggregate of all map results, input to the refine stage
pub type ReducedDraft = Extraction;

/// Keys every extraction response must carry
pub const EXTRACTION_KEYS: [&str; 5] = ["summary", "decisions", "actions", "participants", "agenda_items"];

impl Extraction {
    /// Stand-in for a chunk whose analysis failed
    pub fn placeholder(cause: &str) -> Self {
        Self {
            summary: format!("Error processing chunk: {}", cause),
            ..Default::default()
        }
    }

    /// Turn a partially populated model response into a complete extraction.
    ///
    /// Returns the extraction plus notes about every key that had to be
    /// defaulted and every item that could not be coerced.
    pub fn normalize(object: &Map<String, Value>) -> (Self, Vec<String>) {
        let mut notes = Vec::new();

        for key in EXTRACTION_KEYS {
            let present = object.contains_key(key)
                || (key == "actions" && object.contains_key("action_items"));
            if !present {
                notes.push(format!("missing key '{}' defaulted", key));
            }
        }

        let summary = text_field(object, &["summary"]).unwrap_or_default();
        let decisions = coerce_with_notes(object, &["decisions"], DecisionEntry::from_value, &mut notes);
        let actions = coerce_with_notes(
            object,
            &["actions", "action_items"],
            ActionItem::from_value,
            &mut notes,
        );
        let participants = coerce_with_notes(
            object,
            &["participants"],
            ParticipantEntry::from_value,
            &mut notes,
        );
        let agenda_items = coerce_with_notes(object, &["agenda_items"], AgendaItem::from_value, &mut notes);

        (
            Self {
                summary,
                decisions,
                actions,
                participants,
                agenda_items,
            },
            notes,
        )
    }

    /// True when nothing but (possibly) a summary was extracted
    pub fn has_no_items(&self) -> bool {
        self.decisions.is_empty()
            && self.actions.is_empty()
            && self.participants.is_empty()
            && self.agenda_items.is_empty()
    }
}

fn coerce_with_notes<T>(
    object: &Map<String, Value>,
    keys: &[&str],
    coerce: impl Fn(&Value) -> Option<T>,
    notes: &mut Vec<String>,
) -> Vec<T> {
    let Some((key, value)) = keys.iter().find_map(|key| object.get(*key).map(|v| (*key, v))) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        notes.push(format!("key '{}' is not a list, defaulted", key));
        return Vec::new();
    };

    let coerced = coerce_list(object, &[key], coerce);
    if coerced.len() < items.len() {
        notes.push(format!(
            "dropped {} unusable item(s) from '{}'",
            items.len() - coerced.len(),
            key
        ));
    }
    coerced
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_fills_missing_keys() {
        let (extraction, notes) = Extraction::normalize(&object(json!({
            "summary": "Budget discussed",
            "decisions": ["Approve budget"]
        })));

        assert_eq!(extraction.summary, "Budget discussed");
        assert_eq!(extraction.decisions, vec![DecisionEntry::from("Approve budget")]);
        assert!(extraction.actions.is_empty());
        assert!(extraction.participants.is_empty());
        assert!(extraction.agenda_items.is_empty());
        assert_eq!(notes.len(), 3);
    }

    #[test]
    fn test_normalize_accepts_action_items_alias() {
        let (extraction, notes) = Extraction::normalize(&object(json!({
            "summary": "",
            "decisions": [],
            "action_items": [{"who": "Dana", "what": "Book room"}],
            "participants": ["Dana", {"name": "Eli", "role": "Host"}],
            "agenda_items": []
        })));

        assert!(notes.is_empty(), "unexpected notes: {:?}", notes);
        assert_eq!(extraction.actions.len(), 1);
        assert_eq!(extraction.participants[1].role(), Some("Host"));
    }

    #[test]
    fn test_normalize_reports_bad_items() {
        let (extraction, notes) = Extraction::normalize(&object(json!({
            "summary": "x",
            "decisions": ["ok", 3, null],
            "actions": "not a list",
            "participants": [],
            "agenda_items": []
        })));

        assert_eq!(extraction.decisions.len(), 1);
        assert!(extraction.actions.is_empty());
        assert!(notes.iter().any(|n| n.contains("dropped 2")));
        assert!(notes.iter().any(|n| n.contains("'actions' is not a list")));
    }

    #[test]
    fn test_placeholder_is_fully_populated() {
        let placeholder = Extraction::placeholder("boom");
        assert_eq!(placeholder.summary, "Error processing chunk: boom");
        assert!(placeholder.has_no_items());
    }

    #[test]
    fn test_decision_entry_untagged_serde() {
        let entries: Vec<DecisionEntry> =
            serde_json::from_value(json!(["Plain", {"id": "D2", "description": "Structured"}])).unwrap();
        assert_eq!(entries[0].description(), "Plain");
        assert_eq!(entries[1].to_decision().id.as_deref(), Some("D2"));
    }
}
