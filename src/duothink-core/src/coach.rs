//! The coach client seam.
//!
//! A backend produces grounded replies, structured fallacy analysis, hints
//! and synthesized speech. [`crate::gemini::GeminiCoach`] is the production
//! implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CoachError;
use crate::message::{BlindSpot, GroundingSource, Message};
use crate::personality::CoachPersonality;

/// Reply used when the grounded call returns no text.
pub const FALLBACK_RETORT: &str = "I'm analyzing your point.";
/// Hint used when the hint call returns no text.
pub const FALLBACK_HINT: &str = "Try focusing on the utilitarian outcome.";
/// Logic score assumed when the analysis is missing or malformed.
pub const NEUTRAL_LOGIC_SCORE: f64 = 50.0;

/// Everything one coach turn produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CoachReply {
    pub retort: String,
    pub blind_spot: BlindSpot,
    /// Unrounded; rounding happens once, after blending.
    pub logic_score: f64,
    pub sources: Vec<GroundingSource>,
}

/// Structured verdict on the user's latest statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub logic_score: f64,
    pub blind_spot: BlindSpot,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            logic_score: NEUTRAL_LOGIC_SCORE,
            blind_spot: BlindSpot::default(),
        }
    }
}

impl Analysis {
    /// Parse the analysis call's JSON text.
    ///
    /// Never fails: malformed JSON yields the neutral verdict, a malformed
    /// `blindSpot` yields an undetected one and a non-numeric `logicScore`
    /// yields [`NEUTRAL_LOGIC_SCORE`].
    pub fn parse(text: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            tracing::warn!("analysis response was not valid JSON; using neutral verdict");
            return Self::default();
        };

        let logic_score = value
            .get("logicScore")
            .and_then(Value::as_f64)
            .unwrap_or(NEUTRAL_LOGIC_SCORE);

        let blind_spot = value
            .get("blindSpot")
            .filter(|spot| spot.is_object())
            .and_then(|spot| BlindSpot::deserialize(spot).ok())
            .unwrap_or_default();

        Self {
            logic_score,
            blind_spot,
        }
    }
}

/// The generative backend the coach talks to.
#[async_trait]
pub trait CoachBackend: Send + Sync {
    /// Produce a grounded counter-argument plus a fallacy/score analysis.
    async fn get_response(
        &self,
        topic: &str,
        transcript: &[Message],
        personality: CoachPersonality,
    ) -> Result<CoachReply, CoachError>;

    /// Produce one short tactical suggestion.
    async fn get_hint(
        &self,
        topic: &str,
        transcript: &[Message],
        personality: CoachPersonality,
    ) -> Result<String, CoachError>;

    /// Synthesize speech; returns base64 of raw 16-bit mono PCM.
    async fn generate_speech(&self, text: &str) -> Result<String, CoachError>;
}

/// Text of the most recent user entry, or empty.
pub fn latest_user_statement(transcript: &[Message]) -> &str {
    transcript
        .iter()
        .rev()
        .find(|m| m.is_from_user())
        .map(|m| m.text.as_str())
        .unwrap_or("")
}
