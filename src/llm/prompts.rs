use std::path::Path;

use tracing::{debug, warn};

use crate::models::{ActionItem, DecisionEntry, MeetingInfo, ParticipantEntry, ReducedDraft};

/// Language used when a localized template is missing
pub const BASE_LANGUAGE: &str = "en";

pub const MAP_PROMPT_EN: &str = r#"You are analyzing one part of a longer meeting transcript. Each paragraph starts with the speaker label in square brackets.

Extract only what is stated in this part:
- summary: 2-4 sentences describing what was discussed
- decisions: decisions that were actually made (not proposals)
- actions: tasks with the responsible person ("who"), the task ("what") and a due date ("due", YYYY-MM-DD) when one was named
- participants: people who spoke or were mentioned as attending
- agenda_items: topics discussed, each with a "topic" and a short "discussion_summary"

Do not invent content. Use empty lists when nothing applies."#;

pub const MAP_PROMPT_DE: &str = r#"Du analysierst einen Ausschnitt aus einem längeren Sitzungstranskript. Jeder Absatz beginnt mit der Sprecherkennung in eckigen Klammern.

Extrahiere nur, was in diesem Ausschnitt gesagt wird:
- summary: 2-4 Sätze zum Inhalt der Diskussion
- decisions: tatsächlich gefasste Beschlüsse (keine Vorschläge)
- actions: Aufgaben mit verantwortlicher Person ("who"), Aufgabe ("what") und Termin ("due", YYYY-MM-DD), falls genannt
- participants: Personen, die gesprochen haben oder als anwesend genannt wurden
- agenda_items: besprochene Themen, jeweils mit "topic" und kurzer "discussion_summary"

Erfinde nichts. Verwende leere Listen, wenn nichts zutrifft. Antworte auf Deutsch."#;

pub const REDUCE_PROMPT_EN: &str = r#"You receive the summaries and extracted items of consecutive parts of one meeting.

Merge them into one result:
- summary: one coherent summary of the whole meeting
- decisions, actions, participants, agenda_items: return the given lists in the same order and with the same number of entries, normalizing wording and field names only

Do not drop or add entries."#;

pub const REDUCE_PROMPT_DE: &str = r#"Du erhältst die Zusammenfassungen und extrahierten Punkte aufeinanderfolgender Abschnitte einer Sitzung.

Führe sie zu einem Ergebnis zusammen:
- summary: eine zusammenhängende Zusammenfassung der gesamten Sitzung
- decisions, actions, participants, agenda_items: gib die Listen in derselben Reihenfolge und mit derselben Anzahl Einträge zurück, vereinheitliche nur Formulierungen und Feldnamen

Lasse keine Einträge weg und füge keine hinzu. Antworte auf Deutsch."#;

pub const REFINE_PROMPT_EN: &str = r#"Create the final protocol for the meeting "{{title}}" held on {{date}}.

Participants:
{{participants}}

Agenda:
{{agenda}}

Summary of the discussion:
{{summary}}

Decisions:
{{decisions}}

Action items:
{{actions}}

Return a JSON object with the keys metadata (title, date, location, organizer, author), participants (name, role, present), agenda_items (id, topic, discussion_summary, decisions_made, action_items_assigned), summary, decisions (id, description) and action_items (id, who, what, due, status). Assign each decision and action item to the matching agenda item where possible."#;

pub const REFINE_PROMPT_DE: &str = r#"Erstelle das Protokoll der Sitzung "{{title}}" vom {{date}}.

Teilnehmende:
{{participants}}

Traktanden:
{{agenda}}

Zusammenfassung der Diskussion:
{{summary}}

Beschlüsse:
{{decisions}}

Pendenzen:
{{actions}}

Gib ein JSON-Objekt mit den Schlüsseln metadata (title, date, location, organizer, author), participants (name, role, present), agenda_items (id, topic, discussion_summary, decisions_made, action_items_assigned), summary, decisions (id, description) und action_items (id, who, what, due, status) zurück. Ordne Beschlüsse und Pendenzen wenn möglich dem passenden Traktandum zu. Schreibe alle Texte auf Deutsch."#;

/// System message for the refine call
pub const PROTOCOL_SYSTEM_PROMPT: &str = "You are a meeting protocol generator. Produce one well-structured JSON object \
with the keys metadata, participants, agenda_items, summary, decisions and action_items. \
All dates must use the YYYY-MM-DD format.";

/// Appended to the map system prompt so partial answers are rare
const MAP_FIELD_REMINDER: &str =
    "Your response must include the following fields: summary, decisions, actions, participants, agenda_items.";

/// Pipeline stage a template belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStage {
    Map,
    Reduce,
    Refine,
}

impl PromptStage {
    pub fn name(self) -> &'static str {
        match self {
            PromptStage::Map => "map",
            PromptStage::Reduce => "reduce",
            PromptStage::Refine => "refine",
        }
    }

    fn builtin(self, language: &str) -> Option<&'static str> {
        match (self, language) {
            (PromptStage::Map, "en") => Some(MAP_PROMPT_EN),
            (PromptStage::Map, "de") => Some(MAP_PROMPT_DE),
            (PromptStage::Reduce, "en") => Some(REDUCE_PROMPT_EN),
            (PromptStage::Reduce, "de") => Some(REDUCE_PROMPT_DE),
            (PromptStage::Refine, "en") => Some(REFINE_PROMPT_EN),
            (PromptStage::Refine, "de") => Some(REFINE_PROMPT_DE),
            _ => None,
        }
    }
}

/// Resolved templates for one run
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub map: String,
    pub reduce: String,
    pub refine: String,
}

impl PromptTemplates {
    /// Built-in templates for `language`, English when it is not supported
    pub fn builtin(language: &str) -> Self {
        Self::resolve(None, language)
    }

    /// Templates from `dir`, falling back to the built-ins
    pub fn load(dir: &Path, language: &str) -> Self {
        Self::resolve(Some(dir), language)
    }

    fn resolve(dir: Option<&Path>, language: &str) -> Self {
        let language = language.to_lowercase();
        Self {
            map: resolve_template(dir, PromptStage::Map, &language),
            reduce: resolve_template(dir, PromptStage::Reduce, &language),
            refine: resolve_template(dir, PromptStage::Refine, &language),
        }
    }
}

/// Localized file, base file, localized built-in, English built-in
fn resolve_template(dir: Option<&Path>, stage: PromptStage, language: &str) -> String {
    if let Some(dir) = dir {
        let localized = dir.join(format!("{}_prompt_{}.txt", stage.name(), language));
        let base = dir.join(format!("{}_prompt.txt", stage.name()));

        if let Ok(content) = std::fs::read_to_string(&localized) {
            debug!("Loaded prompt template: {}", localized.display());
            return content;
        }
        if let Ok(content) = std::fs::read_to_string(&base) {
            if language != BASE_LANGUAGE {
                warn!(
                    "No {} template for language '{}', using {}",
                    stage.name(),
                    language,
                    base.display()
                );
            }
            return content;
        }
        debug!("No {} template in {}, using built-in", stage.name(), dir.display());
    }

    match stage.builtin(language) {
        Some(template) => template.to_string(),
        None => {
            warn!(
                "No built-in {} template for language '{}', using English",
                stage.name(),
                language
            );
            stage.builtin(BASE_LANGUAGE).unwrap_or_default().to_string()
        }
    }
}

/// Substitute `{{name}}` placeholders; unknown placeholders are left as-is
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{{{}}}}}", name), value)
    })
}

/// System message for a map call: the stage template plus the field reminder
pub fn build_map_system_prompt(template: &str) -> String {
    format!("{}\n\n{}", template.trim_end(), MAP_FIELD_REMINDER)
}

fn json_list<T: serde::Serialize>(items: &[T]) -> String {
    serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string())
}

/// User message for the reduce call: per-chunk summaries and concatenated lists
pub fn build_reduce_input(summaries: &[String], concatenated: &ReducedDraft) -> String {
    let combined = summaries
        .iter()
        .enumerate()
        .map(|(i, summary)| format!("Segment {} Summary: {}", i + 1, summary))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Combined Summaries:\n{}\n\nExtracted Decisions:\n{}\n\nExtracted Actions:\n{}\n\nExtracted Participants:\n{}\n\nExtracted Agenda Items:\n{}",
        combined,
        json_list(&concatenated.decisions),
        json_list(&concatenated.actions),
        json_list(&concatenated.participants),
        json_list(&concatenated.agenda_items),
    )
}

fn format_participant(participant: &ParticipantEntry) -> String {
    match participant.role() {
        Some(role) => format!("- {} ({})", participant.name(), role),
        None => format!("- {}", participant.name()),
    }
}

fn format_decision(decision: &DecisionEntry) -> String {
    format!("- {}", decision.description())
}

fn format_action(action: &ActionItem) -> String {
    let who = if action.who.is_empty() { "N/A" } else { &action.who };
    format!(
        "- Task: {}, Assigned to: {}, Due: {}",
        action.what,
        who,
        action.due.as_deref().unwrap_or("N/A")
    )
}

fn lines_or(lines: Vec<String>, fallback: &str) -> String {
    if lines.is_empty() {
        fallback.to_string()
    } else {
        lines.join("\n")
    }
}

/// Fill the refine template from the draft and the caller's meeting info.
///
/// Participants and agenda come from the caller; the draft's extracted
/// participants and agenda topics stand in when the caller gave none.
pub fn build_refine_prompt(template: &str, draft: &ReducedDraft, meeting: &MeetingInfo, today: &str) -> String {
    let title = meeting.metadata.title_or_default();
    let date = meeting.metadata.date.as_deref().unwrap_or(today);

    let participants = if meeting.participants.is_empty() {
        &draft.participants
    } else {
        &meeting.participants
    };
    let participants = lines_or(
        participants.iter().map(format_participant).collect(),
        "- (No participants listed)",
    );

    let agenda: Vec<&str> = if meeting.agenda.is_empty() {
        draft.agenda_items.iter().map(|item| item.topic.as_str()).collect()
    } else {
        meeting.agenda.iter().map(String::as_str).collect()
    };
    let agenda = lines_or(
        agenda
            .iter()
            .enumerate()
            .map(|(i, topic)| format!("{}. {}", i + 1, topic))
            .collect(),
        "- (No agenda items listed)",
    );

    let summary = if draft.summary.trim().is_empty() {
        "(No summary available)".to_string()
    } else {
        draft.summary.trim().to_string()
    };
    let decisions = lines_or(
        draft.decisions.iter().map(format_decision).collect(),
        "- (No decisions recorded)",
    );
    let actions = lines_or(
        draft.actions.iter().map(format_action).collect(),
        "- (No action items recorded)",
    );

    render_template(
        template,
        &[
            ("title", title),
            ("date", date),
            ("participants", participants.as_str()),
            ("agenda", agenda.as_str()),
            ("summary", summary.as_str()),
            ("decisions", decisions.as_str()),
            ("actions", actions.as_str()),
        ],
    )
}
