//! Transcript entries and the verdicts attached to them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of grounding sources shown next to a coach reply.
pub const DISPLAYED_SOURCES: usize = 3;

/// Identifier of a transcript entry, monotonic in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSender {
    #[serde(rename = "ai")]
    Coach,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "system_alert")]
    SystemAlert,
}

/// A fallacy verdict on the user's latest statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindSpot {
    #[serde(default)]
    pub detected: bool,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub explanation: String,
}

impl BlindSpot {
    pub fn detected(kind: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            detected: true,
            kind: kind.into(),
            explanation: explanation.into(),
        }
    }
}

/// A web citation returned with a grounded reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

/// One entry of the debate transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: MessageSender,
    pub text: String,
    /// Display time (`HH:MM`); empty for system alerts.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blind_spot: Option<BlindSpot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<GroundingSource>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_audio_playing: bool,
}

impl Message {
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self::plain(id, MessageSender::User, text.into(), display_timestamp())
    }

    pub fn coach(id: MessageId, text: impl Into<String>) -> Self {
        Self::plain(id, MessageSender::Coach, text.into(), display_timestamp())
    }

    /// A coach reply carrying its grounding sources.
    pub fn coach_reply(id: MessageId, text: impl Into<String>, sources: Vec<GroundingSource>) -> Self {
        Self {
            sources: Some(sources),
            ..Self::coach(id, text)
        }
    }

    pub fn blind_spot_alert(id: MessageId, blind_spot: BlindSpot) -> Self {
        Self {
            blind_spot: Some(blind_spot),
            ..Self::plain(id, MessageSender::SystemAlert, String::new(), String::new())
        }
    }

    fn plain(id: MessageId, sender: MessageSender, text: String, timestamp: String) -> Self {
        Self {
            id,
            sender,
            text,
            timestamp,
            blind_spot: None,
            sources: None,
            is_audio_playing: false,
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.sender == MessageSender::User
    }

    pub fn is_from_coach(&self) -> bool {
        self.sender == MessageSender::Coach
    }

    /// Sources to show alongside the reply, capped at [`DISPLAYED_SOURCES`].
    pub fn displayed_sources(&self) -> &[GroundingSource] {
        match &self.sources {
            Some(sources) => &sources[..sources.len().min(DISPLAYED_SOURCES)],
            None => &[],
        }
    }
}

fn display_timestamp() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}
