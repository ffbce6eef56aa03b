//! Markdown rendering of a protocol. Pure functions of the protocol value.

use crate::models::{ActionItem, Decision, Protocol};

/// Heading suffix that marks a degraded document
pub const ERROR_MARKER: &str = " - ERROR";

fn format_decision(decision: &Decision) -> String {
    match &decision.id {
        Some(id) => format!("- [{}] {}", id, decision.description),
        None => format!("- {}", decision.description),
    }
}

fn format_action(action: &ActionItem) -> String {
    let mut line = String::from("- ");
    if let Some(id) = &action.id {
        line.push_str(&format!("[{}] ", id));
    }
    line.push_str(&action.what);
    if !action.who.is_empty() {
        line.push_str(&format!(" (Responsible: {})", action.who));
    }
    if let Some(due) = &action.due {
        line.push_str(&format!(" (Due: {})", due));
    }
    line.push_str(&format!(" [{}]", action.status));
    line
}

fn push_lines(output: &mut String, lines: Vec<String>, empty: &str) {
    if lines.is_empty() {
        output.push_str(empty);
        output.push('\n');
    } else {
        for line in lines {
            output.push_str(&line);
            output.push('\n');
        }
    }
    output.push('\n');
}

fn or_na(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("N/A")
}

/// Render a protocol; error protocols get the error layout
pub fn render_document(protocol: &Protocol) -> String {
    match protocol.error() {
        Some(cause) => render_error_document(protocol, cause),
        None => render_protocol_document(protocol),
    }
}

fn render_protocol_document(protocol: &Protocol) -> String {
    let metadata = &protocol.metadata;
    let mut output = format!("# {}\n\n", metadata.title_or_default());

    output.push_str(&format!("**Date:** {}\n", or_na(&metadata.date)));
    output.push_str(&format!("**Location:** {}\n", or_na(&metadata.location)));
    output.push_str(&format!("**Organizer:** {}\n", or_na(&metadata.organizer)));
    if let Some(author) = &metadata.author {
        output.push_str(&format!("**Author:** {}\n", author));
    }
    output.push('\n');

    output.push_str("## Participants\n\n");
    let participants = protocol
        .participants
        .iter()
        .map(|p| {
            let mut line = format!("- {}", p.name);
            if let Some(role) = &p.role {
                line.push_str(&format!(" ({})", role));
            }
            if !p.present {
                line.push_str(" - absent");
            }
            line
        })
        .collect();
    push_lines(&mut output, participants, "- None listed");

    output.push_str("## Summary\n\n");
    if protocol.summary.trim().is_empty() {
        output.push_str("- None recorded\n\n");
    } else {
        output.push_str(protocol.summary.trim());
        output.push_str("\n\n");
    }

    output.push_str("## Agenda Items\n\n");
    if protocol.agenda_items.is_empty() {
        output.push_str("- None listed\n\n");
    }
    for (i, item) in protocol.agenda_items.iter().enumerate() {
        let label = item.id.clone().unwrap_or_else(|| (i + 1).to_string());
        output.push_str(&format!("### {}. {}\n\n", label, item.topic));
        if !item.discussion_summary.is_empty() {
            output.push_str(&format!("{}\n\n", item.discussion_summary));
        }
        output.push_str("**Decisions:**\n");
        push_lines(
            &mut output,
            item.decisions_made.iter().map(format_decision).collect(),
            "- None recorded",
        );
        output.push_str("**Action Items:**\n");
        push_lines(
            &mut output,
            item.action_items_assigned.iter().map(format_action).collect(),
            "- None recorded",
        );
    }

    output.push_str("## Decisions\n\n");
    push_lines(
        &mut output,
        protocol.decisions.iter().map(format_decision).collect(),
        "- None recorded",
    );

    output.push_str("## Action Items\n\n");
    push_lines(
        &mut output,
        protocol.action_items.iter().map(format_action).collect(),
        "- None recorded",
    );

    if !metadata.validation_warnings.is_empty() {
        output.push_str("## Validation Warnings\n\n");
        push_lines(
            &mut output,
            metadata.validation_warnings.iter().map(|w| format!("- {}", w)).collect(),
            "",
        );
    }

    output.push_str(&format!(
        "---\n*Generated {}*\n",
        protocol.created_at.format("%Y-%m-%d %H:%M")
    ));
    output
}

fn render_error_document(protocol: &Protocol, cause: &str) -> String {
    let mut output = format!("# {}{}\n\n", protocol.metadata.title_or_default(), ERROR_MARKER);
    output.push_str("## Error\n\n");
    output.push_str(&format!("**{}**\n\n", cause));
    output.push_str(
        "The protocol generation encountered an error. Only the extracted decisions and action items are available.\n\n",
    );

    output.push_str("## Extracted Decisions\n\n");
    push_lines(
        &mut output,
        protocol.decisions.iter().map(format_decision).collect(),
        "- None extracted",
    );

    output.push_str("## Extracted Action Items\n\n");
    push_lines(
        &mut output,
        protocol.action_items.iter().map(format_action).collect(),
        "- None extracted",
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgendaItem, Participant, ProtocolMetadata};
    use chrono::Local;

    fn protocol() -> Protocol {
        Protocol {
            metadata: ProtocolMetadata {
                title: Some("Board Meeting".to_string()),
                date: Some("2024-05-02".to_string()),
                ..Default::default()
            },
            participants: vec![Participant::new("Ann")],
            agenda_items: vec![],
            summary: "We met.".to_string(),
            decisions: vec![Decision::new("Approve budget")],
            action_items: vec![],
            created_at: Local::now(),
        }
    }

    #[test]
    fn test_sections_in_order_with_none_lines() {
        let document = render_document(&protocol());

        let order = ["# Board Meeting", "## Participants", "## Summary", "## Agenda Items", "## Decisions", "## Action Items"];
        let positions: Vec<usize> = order.iter().map(|h| document.find(h).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(document.contains("**Location:** N/A"));
        assert!(document.contains("- Ann\n"));
        assert!(document.contains("## Agenda Items\n\n- None listed"));
        assert!(document.contains("## Action Items\n\n- None recorded"));
        assert!(!document.contains(ERROR_MARKER));
    }

    #[test]
    fn test_agenda_item_rendering() {
        let mut protocol = protocol();
        let mut item = AgendaItem::new("Budget");
        item.discussion_summary = "Numbers reviewed".to_string();
        let mut action = ActionItem::new("Ben", "Send figures");
        action.due = Some("2024-05-10".to_string());
        item.action_items_assigned.push(action);
        protocol.agenda_items.push(item);

        let document = render_document(&protocol);
        assert!(document.contains("### 1. Budget\n\nNumbers reviewed\n\n**Decisions:**\n- None recorded\n"));
        assert!(document.contains("- Send figures (Responsible: Ben) (Due: 2024-05-10) [Open]"));
    }

    #[test]
    fn test_error_document() {
        let mut protocol = protocol();
        protocol.metadata.error = Some("Error during REFINE: boom".to_string());

        let document = render_document(&protocol);
        assert!(document.starts_with("# Board Meeting - ERROR\n"));
        assert!(document.contains("**Error during REFINE: boom**"));
        assert!(document.contains("## Extracted Decisions\n\n- Approve budget\n"));
        assert!(document.contains("## Extracted Action Items\n\n- None extracted\n"));
    }
}
