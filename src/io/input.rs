use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::models::{MeetingInfo, Segment, UNKNOWN_SPEAKER};

/// Speaker assigned to plain-text lines without a recognizable label
const UNLABELED_SPEAKER: &str = "speaker_0";

/// Speaking rate used to estimate plain-text durations
const WORDS_PER_SECOND: f64 = 5.0;

/// Default duration of a JSON segment that has no end time
const DEFAULT_SEGMENT_SECS: f64 = 5.0;

/// A parsed transcript plus whatever context came with it
#[derive(Debug, Clone, Default)]
pub struct TranscriptInput {
    pub segments: Vec<Segment>,
    /// Language tag stored alongside the segments
    pub language: Option<String>,
    /// Meeting facts stored alongside the segments
    pub meeting: MeetingInfo,
}

/// Parse a transcript file; the format follows the extension
pub fn parse_transcript_file(path: &Path) -> Result<TranscriptInput> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let input = match extension.as_str() {
        "json" => match serde_json::from_str::<Value>(&content) {
            Ok(value) => parse_transcript_value(value)?,
            Err(e) => {
                warn!("{:?} is not valid JSON ({}), reading it as plain text", path, e);
                TranscriptInput {
                    segments: parse_plain_text(&content),
                    ..Default::default()
                }
            }
        },
        "txt" | "text" | "md" | "markdown" => TranscriptInput {
            segments: parse_plain_text(&content),
            ..Default::default()
        },
        other => anyhow::bail!("Unsupported transcript format: '{}'", other),
    };

    info!("Loaded {} segments from {:?}", input.segments.len(), path);
    Ok(input)
}

/// Parse transcript JSON from a string
pub fn parse_transcript_json(json: &str) -> Result<TranscriptInput> {
    let value: Value = serde_json::from_str(json).context("Failed to parse transcript JSON")?;
    parse_transcript_value(value)
}

fn parse_transcript_value(value: Value) -> Result<TranscriptInput> {
    match value {
        Value::Array(items) => Ok(TranscriptInput {
            segments: order_segments(parse_segment_list(&items)?),
            ..Default::default()
        }),
        Value::Object(object) => parse_transcript_object(object),
        other => anyhow::bail!("Transcript JSON must be an array or object, found {}", other),
    }
}

fn parse_transcript_object(mut object: Map<String, Value>) -> Result<TranscriptInput> {
    let segments = if let Some(Value::Array(items)) = object.get("segments") {
        parse_segment_list(items)?
    } else if let Some(Value::Array(items)) = object.get("output").and_then(|o| o.get("segments")) {
        parse_segment_list(items)?
    } else if let Some(text) = ["transcript", "transcription"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
    {
        parse_plain_text(text)
    } else {
        anyhow::bail!("Transcript JSON object has no 'segments', 'transcript' or 'transcription'");
    };

    let language = object
        .get("language")
        .and_then(Value::as_str)
        .map(str::to_string);
    let meeting = match object.remove("metadata") {
        Some(metadata) => {
            serde_json::from_value(metadata).context("Failed to parse transcript metadata")?
        }
        None => MeetingInfo::default(),
    };

    Ok(TranscriptInput {
        segments: order_segments(segments),
        language,
        meeting,
    })
}

fn parse_segment_list(items: &[Value]) -> Result<Vec<Segment>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_segment(item).with_context(|| format!("Invalid segment at index {}", i)))
        .collect()
}

/// Lenient segment read: `text` is required, times and speaker are defaulted
fn parse_segment(item: &Value) -> Result<Segment> {
    let object = item.as_object().context("segment is not an object")?;
    let text = object
        .get("text")
        .and_then(Value::as_str)
        .context("segment has no 'text'")?;
    let start = object.get("start").and_then(Value::as_f64).unwrap_or(0.0);
    let end = object
        .get("end")
        .and_then(Value::as_f64)
        .unwrap_or(start + DEFAULT_SEGMENT_SECS);
    let speaker = object
        .get("speaker")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SPEAKER);

    Ok(Segment::new(speaker, text.trim(), start, end))
}

/// Stable sort by start time
pub fn order_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    let ordered = segments.windows(2).all(|w| w[0].start <= w[1].start);
    if !ordered {
        warn!("Transcript segments are not ordered by start time, sorting");
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    }
    segments
}

/// Split a `Name: text`, `[Name] text` or `Name (10:30): text` line
fn split_speaker(line: &str) -> Option<(&str, &str)> {
    let (name, text) = if let Some(rest) = line.strip_prefix('[') {
        rest.split_once(']')?
    } else if let (Some(open), Some(close)) = (line.find('('), line.find("):")) {
        if open < close && !line[..open].contains(':') {
            (&line[..open], &line[close + 2..])
        } else {
            line.split_once(':')?
        }
    } else {
        line.split_once(':')?
    };

    let name = name.trim();
    if name.is_empty() || name.split_whitespace().count() > 4 {
        return None;
    }
    Some((name, text.trim()))
}

/// Parse plain text, one utterance per line.
///
/// Named speakers map to `speaker_1`, `speaker_2`, ... in order of first
/// appearance; durations are estimated from the word count.
pub fn parse_plain_text(text: &str) -> Vec<Segment> {
    let mut speakers: Vec<String> = Vec::new();
    let mut segments = Vec::new();
    let mut clock = 0.0;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (speaker, utterance) = match split_speaker(line) {
            Some((name, utterance)) => {
                let position = match speakers.iter().position(|s| s == name) {
                    Some(position) => position,
                    None => {
                        speakers.push(name.to_string());
                        speakers.len() - 1
                    }
                };
                (format!("speaker_{}", position + 1), utterance)
            }
            None => (UNLABELED_SPEAKER.to_string(), line),
        };

        let words = utterance.split_whitespace().count() as f64;
        let duration = (words / WORDS_PER_SECOND).max(1.0);
        segments.push(Segment::new(speaker, utterance, clock, clock + duration));
        clock += duration;
    }

    segments
}

/// Read meeting info (title, date, participants, agenda, extras) from JSON
pub fn read_meeting_info(path: &Path) -> Result<MeetingInfo> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse meeting info: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segment_array() {
        let input = parse_transcript_json(
            r#"[
                {"text": "Second", "start": 2.0, "end": 3.0, "speaker": "B"},
                {"text": "First", "start": 0.0, "end": 2.0}
            ]"#,
        )
        .unwrap();

        assert_eq!(input.segments.len(), 2);
        assert_eq!(input.segments[0].text, "First");
        assert_eq!(input.segments[0].speaker, UNKNOWN_SPEAKER);
        assert_eq!(input.segments[1].speaker, "B");
        assert!(input.language.is_none());
    }

    #[test]
    fn test_parse_object_with_metadata() {
        let input = parse_transcript_json(
            r#"{
                "language": "en",
                "metadata": {"title": "Weekly", "agenda": ["Status"]},
                "segments": [{"text": "Hi", "start": 0, "end": 1, "speaker": "A"}]
            }"#,
        )
        .unwrap();

        assert_eq!(input.language.as_deref(), Some("en"));
        assert_eq!(input.meeting.metadata.title.as_deref(), Some("Weekly"));
        assert_eq!(input.meeting.agenda, vec!["Status"]);
        assert_eq!(input.segments[0].end, 1.0);
    }

    #[test]
    fn test_segment_without_text_is_rejected() {
        assert!(parse_transcript_json(r#"[{"start": 0, "end": 1}]"#).is_err());
        assert!(parse_transcript_json(r#""just a string""#).is_err());
    }

    #[test]
    fn test_parse_plain_text() {
        let segments = parse_plain_text(
            "Anna: Guten Morgen zusammen\n\n[Ben] Hallo\nAnna (10:30): Wir beginnen mit dem Budget heute\nohne Sprecher",
        );

        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].speaker, "speaker_1");
        assert_eq!(segments[0].text, "Guten Morgen zusammen");
        assert_eq!(segments[1].speaker, "speaker_2");
        assert_eq!(segments[2].speaker, "speaker_1");
        assert_eq!(segments[2].text, "Wir beginnen mit dem Budget heute");
        assert_eq!(segments[3].speaker, UNLABELED_SPEAKER);

        // 3 words -> 1s minimum, 6 words -> 1.2s
        assert_eq!(segments[0].end, 1.0);
        assert_eq!(segments[1].start, 1.0);
        assert!((segments[2].duration() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_parse_transcript_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("meeting.txt");
        std::fs::write(&txt, "A: one\nB: two").unwrap();
        assert_eq!(parse_transcript_file(&txt).unwrap().segments.len(), 2);

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "A: not json").unwrap();
        assert_eq!(parse_transcript_file(&broken).unwrap().segments.len(), 1);

        let audio = dir.path().join("meeting.wav");
        std::fs::write(&audio, "RIFF").unwrap();
        assert!(parse_transcript_file(&audio).is_err());
    }

    #[test]
    fn test_read_meeting_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meeting.json");
        std::fs::write(&path, r#"{"title": "Retro", "participants": ["Ann"], "room": "3"}"#).unwrap();

        let info = read_meeting_info(&path).unwrap();
        assert_eq!(info.metadata.title.as_deref(), Some("Retro"));
        assert_eq!(info.participants.len(), 1);
        assert!(info.metadata.extra.contains_key("room"));
    }
}
