//! Coach personalities.
//!
//! Each personality selects the tone instruction sent to the backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tone and strategy the coach argues with.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CoachPersonality {
    /// Leads the user to their own contradictions through questions.
    #[default]
    Socratic,
    /// Blunt and critical of every assumption.
    Aggressive,
    /// Formal, scholarly, evidence-oriented.
    Academic,
    /// Calm and detached, separates facts from judgments.
    Stoic,
}

impl CoachPersonality {
    pub const ALL: [CoachPersonality; 4] = [
        CoachPersonality::Socratic,
        CoachPersonality::Aggressive,
        CoachPersonality::Academic,
        CoachPersonality::Stoic,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            CoachPersonality::Socratic => "Socratic",
            CoachPersonality::Aggressive => "Aggressive",
            CoachPersonality::Academic => "Academic",
            CoachPersonality::Stoic => "Stoic",
        }
    }

    /// The tone instruction woven into the coach's system prompt.
    pub fn instruction(&self) -> &'static str {
        match self {
            CoachPersonality::Socratic => {
                "Focus on asking penetrating questions that lead the user to discover their own logical contradictions. Never give direct answers."
            }
            CoachPersonality::Aggressive => {
                "Be blunt, highly critical, and challenge every single assumption the user makes. Use sharp, intense language."
            }
            CoachPersonality::Academic => {
                "Maintain a formal, high-level scholarly tone. Focus on formal logic, structural integrity, and peer-reviewed style evidence."
            }
            CoachPersonality::Stoic => {
                "Remain calm, objective, and detached. Focus on rationality, ethics, and the distinction between facts and emotional judgments."
            }
        }
    }
}

impl fmt::Display for CoachPersonality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPersonality(pub String);

impl fmt::Display for UnknownPersonality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let available = CoachPersonality::ALL
            .iter()
            .map(|p| p.display_name())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Unknown personality '{}'. Available: {}", self.0, available)
    }
}

impl std::error::Error for UnknownPersonality {}

impl FromStr for CoachPersonality {
    type Err = UnknownPersonality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CoachPersonality::ALL
            .into_iter()
            .find(|p| p.display_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPersonality(s.to_string()))
    }
}
