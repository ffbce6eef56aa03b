use serde::{Deserialize, Serialize};

use super::{ParticipantEntry, ProtocolMetadata};

/// Caller-supplied facts about the meeting, fed into the refine stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeetingInfo {
    #[serde(flatten)]
    pub metadata: ProtocolMetadata,
    /// Known attendees; the draft's extracted participants are used when empty
    #[serde(default)]
    pub participants: Vec<ParticipantEntry>,
    /// Planned agenda topics
    #[serde(default)]
    pub agenda: Vec<String>,
}

impl MeetingInfo {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.metadata.date = Some(date.into());
        self
    }

    /// Overlay `other` on top of `self`: fields set in `other` win
    pub fn merge(mut self, other: MeetingInfo) -> Self {
        let mut metadata = other.metadata;
        metadata.fill_missing_from(&self.metadata);
        self.metadata = metadata;
        if !other.participants.is_empty() {
            self.participants = other.participants;
        }
        if !other.agenda.is_empty() {
            self.agenda = other.agenda;
        }
        self
    }
}
