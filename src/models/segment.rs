use serde::{Deserialize, Serialize};

/// Speaker label used when the transcription did not attribute a segment
pub const UNKNOWN_SPEAKER: &str = "UNKNOWN";

fn default_speaker() -> String {
    UNKNOWN_SPEAKER.to_string()
}

/// A speaker-attributed span of transcribed speech - immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Spoken text
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Speaker identifier (e.g. "SPEAKER_00")
    #[serde(default = "default_speaker")]
    pub speaker: String,
}

impl Segment {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            speaker: speaker.into(),
        }
    }

    /// Duration of this segment in seconds
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Render with its speaker label, as sent to the model
    pub fn labeled_text(&self) -> String {
        format!("[{}]: {}", self.speaker, self.text)
    }
}
