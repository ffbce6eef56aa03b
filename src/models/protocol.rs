use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Title used when neither the caller nor the model supplied one
pub const DEFAULT_TITLE: &str = "Meeting Protocol";

/// Read the first present key as text; numbers and booleans are stringified
pub(crate) fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn default_status() -> String {
    "Open".to_string()
}

fn default_present() -> bool {
    true
}

/// A decision recorded in the meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub description: String,
}

impl Decision {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: None,
            description: description.into(),
        }
    }

    /// Accepts a bare string or an object with `description`/`text`/`decision`
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self::new(s.trim())),
            Value::Object(object) => Some(Self {
                id: text_field(object, &["id"]),
                description: text_field(object, &["description", "text", "decision"])?,
            }),
            _ => None,
        }
    }
}

/// A task assigned during the meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Responsible person (empty when unassigned)
    #[serde(default)]
    pub who: String,
    /// Task description
    pub what: String,
    /// Due date, ideally YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

impl ActionItem {
    pub fn new(who: impl Into<String>, what: impl Into<String>) -> Self {
        Self {
            id: None,
            who: who.into(),
            what: what.into(),
            due: None,
            status: default_status(),
        }
    }

    /// Accepts a bare task string or an object using common key aliases
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self::new("", s.trim())),
            Value::Object(object) => Some(Self {
                id: text_field(object, &["id", "action_id"]),
                who: text_field(object, &["who", "assignee", "assigned_to", "owner"])
                    .unwrap_or_default(),
                what: text_field(object, &["what", "task", "description", "action"])?,
                due: text_field(object, &["due", "due_date", "deadline"]),
                status: text_field(object, &["status"]).unwrap_or_else(default_status),
            }),
            _ => None,
        }
    }
}

/// A meeting participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default = "default_present")]
    pub present: bool,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
            present: true,
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self::new(s.trim())),
            Value::Object(object) => {
                let absent = matches!(
                    text_field(object, &["status"]).as_deref(),
                    Some("absent") | Some("excused")
                );
                Some(Self {
                    name: text_field(object, &["name"])?,
                    role: text_field(object, &["role"]),
                    present: object
                        .get("present")
                        .and_then(Value::as_bool)
                        .unwrap_or(!absent),
                })
            }
            _ => None,
        }
    }
}

/// One agenda topic with its own decisions and tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub topic: String,
    #[serde(default)]
    pub discussion_summary: String,
    #[serde(default)]
    pub decisions_made: Vec<Decision>,
    #[serde(default)]
    pub action_items_assigned: Vec<ActionItem>,
}

impl AgendaItem {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: None,
            topic: topic.into(),
            discussion_summary: String::new(),
            decisions_made: Vec::new(),
            action_items_assigned: Vec::new(),
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self::new(s.trim())),
            Value::Object(object) => Some(Self {
                id: text_field(object, &["id"]),
                topic: text_field(object, &["topic", "title"])?,
                discussion_summary: text_field(
                    object,
                    &["discussion_summary", "discussion", "summary"],
                )
                .unwrap_or_default(),
                decisions_made: coerce_list(object, &["decisions_made", "decisions"], Decision::from_value),
                action_items_assigned: coerce_list(
                    object,
                    &["action_items_assigned", "action_items", "actions"],
                    ActionItem::from_value,
                ),
            }),
            _ => None,
        }
    }
}

/// Coerce the first present array under `keys`, skipping unusable items
pub(crate) fn coerce_list<T>(
    object: &Map<String, Value>,
    keys: &[&str],
    coerce: impl Fn(&Value) -> Option<T>,
) -> Vec<T> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array))
        .map(|items| items.iter().filter_map(&coerce).collect())
        .unwrap_or_default()
}

/// Protocol header: well-known fields plus any caller-supplied extras
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Set only on error protocols
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Schema violations that survived repair
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_warnings: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProtocolMetadata {
    /// Lenient read of a model-produced metadata object. `error` is never
    /// taken from model output.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let known = [
            "title",
            "date",
            "location",
            "organizer",
            "author",
            "error",
            "validation_warnings",
        ];
        let extra = object
            .iter()
            .filter(|(key, _)| !known.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            title: text_field(object, &["title"]),
            date: text_field(object, &["date"]),
            location: text_field(object, &["location"]),
            organizer: text_field(object, &["organizer"]),
            author: text_field(object, &["author"]),
            error: None,
            validation_warnings: Vec::new(),
            extra,
        }
    }

    /// Fill fields this metadata lacks from `fallback`
    pub fn fill_missing_from(&mut self, fallback: &ProtocolMetadata) {
        fn fill(slot: &mut Option<String>, other: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(other);
            }
        }
        fill(&mut self.title, &fallback.title);
        fill(&mut self.date, &fallback.date);
        fill(&mut self.location, &fallback.location);
        fill(&mut self.organizer, &fallback.organizer);
        fill(&mut self.author, &fallback.author);
        for (key, value) in &fallback.extra {
            self.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }
}

/// The final structured meeting minutes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    pub metadata: ProtocolMetadata,
    pub participants: Vec<Participant>,
    pub agenda_items: Vec<AgendaItem>,
    pub summary: String,
    pub decisions: Vec<Decision>,
    pub action_items: Vec<ActionItem>,
    pub created_at: DateTime<Local>,
}

impl Protocol {
    /// Build from a repaired protocol object (all required keys present)
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            metadata: object
                .get("metadata")
                .map(ProtocolMetadata::from_value)
                .unwrap_or_default(),
            participants: coerce_list(object, &["participants"], Participant::from_value),
            agenda_items: coerce_list(object, &["agenda_items"], AgendaItem::from_value),
            summary: text_field(object, &["summary"]).unwrap_or_default(),
            decisions: coerce_list(object, &["decisions"], Decision::from_value),
            action_items: coerce_list(object, &["action_items"], ActionItem::from_value),
            created_at: Local::now(),
        }
    }

    /// Error protocols carry the failure cause in `metadata.error`
    pub fn is_error(&self) -> bool {
        self.metadata.error.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.metadata.error.as_deref()
    }
}
