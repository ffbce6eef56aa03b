use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use serde_json::Value;

use crate::models::Protocol;

const MAX_BASE_NAME_CHARS: usize = 50;

/// Header block of the EGL export
#[derive(Debug, Clone, Serialize)]
pub struct EglMeta {
    pub titel: String,
    pub datum: String,
    pub ort: String,
    pub sitzungsleiter: String,
    pub verfasser: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EglTeilnehmer {
    pub anwesend: Vec<String>,
    pub entschuldigt: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EglPendenz {
    pub wer: String,
    pub was: String,
    pub frist: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EglTraktandum {
    pub id: String,
    pub titel: String,
    pub diskussion: String,
    pub entscheidungen: Vec<String>,
    pub pendenzen: Vec<EglPendenz>,
}

/// German protocol export (meta, attendance, agenda items, attachments)
#[derive(Debug, Clone, Serialize)]
pub struct EglProtocol {
    pub meta: EglMeta,
    pub teilnehmer: EglTeilnehmer,
    pub traktanden: Vec<EglTraktandum>,
    #[serde(rename = "anhänge")]
    pub anhaenge: Vec<Value>,
}

impl EglProtocol {
    pub fn from_protocol(protocol: &Protocol) -> Self {
        let metadata = &protocol.metadata;
        let text = |value: &Option<String>| value.clone().unwrap_or_default();

        let meta = EglMeta {
            titel: metadata.title.clone().unwrap_or_else(|| "Protokoll".to_string()),
            datum: metadata
                .date
                .clone()
                .unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string()),
            ort: text(&metadata.location),
            sitzungsleiter: text(&metadata.organizer),
            verfasser: metadata.author.clone().unwrap_or_else(|| "AI Assistant".to_string()),
        };

        let (present, excused): (Vec<_>, Vec<_>) = protocol.participants.iter().partition(|p| p.present);
        let teilnehmer = EglTeilnehmer {
            anwesend: present.into_iter().map(|p| p.name.clone()).collect(),
            entschuldigt: excused.into_iter().map(|p| p.name.clone()).collect(),
        };

        let traktanden = protocol
            .agenda_items
            .iter()
            .enumerate()
            .map(|(i, item)| EglTraktandum {
                id: item.id.clone().unwrap_or_else(|| format!("T{:03}", i + 1)),
                titel: item.topic.clone(),
                diskussion: item.discussion_summary.clone(),
                entscheidungen: item.decisions_made.iter().map(|d| d.description.clone()).collect(),
                pendenzen: item
                    .action_items_assigned
                    .iter()
                    .map(|a| EglPendenz {
                        wer: a.who.clone(),
                        was: a.what.clone(),
                        frist: a.due.clone(),
                    })
                    .collect(),
            })
            .collect();

        let anhaenge = metadata
            .extra
            .get("attachments")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Self {
            meta,
            teilnehmer,
            traktanden,
            anhaenge,
        }
    }
}

/// `<date>_<title>` with the title reduced to a filesystem-safe form
pub fn output_base_name(protocol: &Protocol) -> String {
    let date = protocol
        .metadata
        .date
        .clone()
        .unwrap_or_else(|| protocol.created_at.format("%Y-%m-%d").to_string());
    let title: String = protocol
        .metadata
        .title_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect::<String>()
        .trim()
        .replace(' ', "_")
        .chars()
        .take(MAX_BASE_NAME_CHARS)
        .collect();
    format!("{}_{}", date, title)
}

/// Files written for one protocol
#[derive(Debug, Clone)]
pub struct WrittenOutputs {
    pub document: PathBuf,
    pub protocol_json: PathBuf,
    pub egl_json: Option<PathBuf>,
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("Failed to create file: {:?}", path))?;
    serde_json::to_writer_pretty(file, value).context("Failed to write JSON")?;
    Ok(())
}

fn write_text(text: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path).with_context(|| format!("Failed to create file: {:?}", path))?;
    write!(file, "{}", text)?;
    Ok(())
}

/// Write the Markdown document, the protocol JSON and (for German) the EGL export
pub fn write_outputs(
    protocol: &Protocol,
    document: &str,
    output_dir: &Path,
    language: &str,
) -> Result<WrittenOutputs> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;
    let base = output_base_name(protocol);

    let document_path = output_dir.join(format!("{}.md", base));
    write_text(document, &document_path)?;

    let protocol_path = output_dir.join(format!("{}.json", base));
    write_json(protocol, &protocol_path)?;

    let egl_json = if language.eq_ignore_ascii_case("de") {
        let path = output_dir.join(format!("{}_egl.json", base));
        write_json(&EglProtocol::from_protocol(protocol), &path)?;
        Some(path)
    } else {
        None
    };

    Ok(WrittenOutputs {
        document: document_path,
        protocol_json: protocol_path,
        egl_json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionItem, AgendaItem, Decision, Participant, ProtocolMetadata};
    use serde_json::json;

    fn protocol() -> Protocol {
        let mut absent = Participant::new("Cleo");
        absent.present = false;
        let mut item = AgendaItem::new("Budget");
        item.decisions_made.push(Decision::new("Approve"));
        item.action_items_assigned.push(ActionItem::new("Ben", "Send figures"));

        let mut metadata = ProtocolMetadata {
            title: Some("Vorstand: Sitzung #3 / Juni".to_string()),
            date: Some("2024-06-12".to_string()),
            ..Default::default()
        };
        metadata.extra.insert("attachments".to_string(), json!(["budget.pdf"]));

        Protocol {
            metadata,
            participants: vec![Participant::new("Anna"), absent],
            agenda_items: vec![item],
            summary: "s".to_string(),
            decisions: vec![],
            action_items: vec![],
            created_at: Local::now(),
        }
    }

    #[test]
    fn test_output_base_name() {
        assert_eq!(output_base_name(&protocol()), "2024-06-12_Vorstand_Sitzung_3__Juni");

        let mut long = protocol();
        long.metadata.title = Some("x".repeat(80));
        assert_eq!(output_base_name(&long).len(), "2024-06-12_".len() + 50);
    }

    #[test]
    fn test_egl_export() {
        let egl = serde_json::to_value(EglProtocol::from_protocol(&protocol())).unwrap();

        assert_eq!(egl["meta"]["verfasser"], json!("AI Assistant"));
        assert_eq!(egl["meta"]["ort"], json!(""));
        assert_eq!(egl["teilnehmer"], json!({"anwesend": ["Anna"], "entschuldigt": ["Cleo"]}));
        assert_eq!(egl["traktanden"][0]["id"], json!("T001"));
        assert_eq!(egl["traktanden"][0]["entscheidungen"], json!(["Approve"]));
        assert_eq!(egl["traktanden"][0]["pendenzen"][0]["wer"], json!("Ben"));
        assert_eq!(egl["anhänge"], json!(["budget.pdf"]));
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let protocol = protocol();

        let written = write_outputs(&protocol, "# Doc\n", dir.path(), "de").unwrap();
        assert_eq!(std::fs::read_to_string(&written.document).unwrap(), "# Doc\n");
        let json: Value = serde_json::from_str(&std::fs::read_to_string(&written.protocol_json).unwrap()).unwrap();
        assert_eq!(json["summary"], json!("s"));
        assert!(written.egl_json.unwrap().exists());

        let written = write_outputs(&protocol, "# Doc\n", dir.path(), "en").unwrap();
        assert!(written.egl_json.is_none());
    }
}
