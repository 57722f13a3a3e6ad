//! GeminiCoach - coach backend over the Gemini REST API.
//!
//! Each debate turn is two independent `generateContent` calls: a grounded
//! reply with Google Search enabled, then a schema-constrained JSON analysis.
//! The backend cannot combine search grounding with a response schema.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

use crate::coach::{
    Analysis, CoachBackend, CoachReply, FALLBACK_HINT, FALLBACK_RETORT, latest_user_statement,
};
use crate::config::Config;
use crate::error::CoachError;
use crate::message::{GroundingSource, Message, MessageSender};
use crate::personality::CoachPersonality;

const HINT_TEMPERATURE: f32 = 0.8;

/// Coach backend that talks to the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiCoach {
    client: Client,
    api_key: String,
    config: Config,
}

impl GeminiCoach {
    /// Creates a coach with the given API key and configuration.
    pub fn new(api_key: impl Into<String>, config: Config) -> Result<Self, CoachError> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(30));
        if let Some(secs) = config.backend.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self::with_client(builder.build()?, api_key, config))
    }

    /// Creates a coach on a preconfigured HTTP client.
    pub fn with_client(client: Client, api_key: impl Into<String>, config: Config) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            config,
        }
    }

    async fn generate(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, CoachError> {
        let url = format!(
            "{}/{model}:generateContent?key={api_key}",
            self.config.backend.api_base.trim_end_matches('/'),
            model = model,
            api_key = self.api_key
        );
        tracing::debug!(model, "sending generateContent request");

        let response = self.client.post(url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl CoachBackend for GeminiCoach {
    async fn get_response(
        &self,
        topic: &str,
        transcript: &[Message],
        personality: CoachPersonality,
    ) -> Result<CoachReply, CoachError> {
        let model = &self.config.backend.text_model;

        let grounded = self
            .generate(
                model,
                &grounded_reply_request(topic, transcript, &self.config.coach_instruction(personality)),
            )
            .await?;
        let retort = non_empty_or(grounded.text(), FALLBACK_RETORT);
        let sources = grounded.grounding_sources();

        // The reply stands even when the analysis round-trip fails.
        let analysis = match self
            .generate(model, &analysis_request(topic, personality, latest_user_statement(transcript)))
            .await
        {
            Ok(response) => Analysis::parse(&response.text()),
            Err(err) => {
                tracing::warn!(error = %err, "analysis call failed; using neutral verdict");
                Analysis::default()
            }
        };

        Ok(CoachReply {
            retort,
            blind_spot: analysis.blind_spot,
            logic_score: analysis.logic_score,
            sources,
        })
    }

    async fn get_hint(
        &self,
        topic: &str,
        transcript: &[Message],
        personality: CoachPersonality,
    ) -> Result<String, CoachError> {
        let request = hint_request(
            topic,
            personality,
            latest_user_statement(transcript),
            &self.config.prompts.hint_instruction,
        );
        let response = self.generate(&self.config.backend.text_model, &request).await?;
        Ok(non_empty_or(response.text(), FALLBACK_HINT))
    }

    async fn generate_speech(&self, text: &str) -> Result<String, CoachError> {
        let request = speech_request(text, &self.config.backend.voice);
        let response = self
            .generate(&self.config.backend.speech_model, &request)
            .await?;
        response.inline_audio().ok_or(CoachError::MissingAudio)
    }
}

fn non_empty_or(text: String, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

/// Grounded reply: topic preamble, role-tagged history, Google Search tool.
pub(crate) fn grounded_reply_request(
    topic: &str,
    transcript: &[Message],
    system_instruction: &str,
) -> GenerateContentRequest {
    let mut contents = vec![Content::text("user", format!("We are debating: {topic}"))];
    contents.extend(
        transcript
            .iter()
            .filter(|m| m.sender != MessageSender::SystemAlert)
            .map(|m| {
                let role = if m.is_from_user() { "user" } else { "model" };
                Content::text(role, m.text.clone())
            }),
    );

    GenerateContentRequest {
        contents,
        system_instruction: Some(Content::instruction(system_instruction)),
        tools: Some(vec![json!({ "googleSearch": {} })]),
        generation_config: None,
    }
}

/// Schema-constrained verdict on the latest user statement.
pub(crate) fn analysis_request(
    topic: &str,
    personality: CoachPersonality,
    statement: &str,
) -> GenerateContentRequest {
    let prompt = format!(
        "Debate Topic: {topic}. Personality Context: {personality}.\nAnalyze the user's last statement: \"{statement}\"\nReturn a JSON evaluation of logic and blind spots."
    );

    GenerateContentRequest {
        contents: vec![Content::text("user", prompt)],
        system_instruction: None,
        tools: None,
        generation_config: Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(analysis_schema()),
            ..Default::default()
        }),
    }
}

pub(crate) fn hint_request(
    topic: &str,
    personality: CoachPersonality,
    statement: &str,
    system_instruction: &str,
) -> GenerateContentRequest {
    let mut prompt = format!(
        "Current Debate Topic: {topic}. Coach Personality: {personality}. Provide a single helpful hint or logical angle for the user."
    );
    if !statement.is_empty() {
        prompt.push_str(&format!("\nThe user's latest statement: \"{statement}\""));
    }

    GenerateContentRequest {
        contents: vec![Content::text("user", prompt)],
        system_instruction: Some(Content::instruction(system_instruction)),
        tools: None,
        generation_config: Some(GenerationConfig {
            temperature: Some(HINT_TEMPERATURE),
            ..Default::default()
        }),
    }
}

pub(crate) fn speech_request(text: &str, voice: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::text("user", text.to_string())],
        system_instruction: None,
        tools: None,
        generation_config: Some(GenerationConfig {
            response_modalities: Some(vec!["AUDIO".to_string()]),
            speech_config: Some(json!({
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            })),
            ..Default::default()
        }),
    }
}

fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "logicScore": { "type": "INTEGER" },
            "blindSpot": {
                "type": "OBJECT",
                "properties": {
                    "detected": { "type": "BOOLEAN" },
                    "type": { "type": "STRING" },
                    "explanation": { "type": "STRING" }
                },
                "required": ["detected", "type", "explanation"]
            }
        },
        "required": ["logicScore", "blindSpot"]
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<TextPart>,
}

impl Content {
    fn text(role: &str, text: String) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![TextPart { text }],
        }
    }

    fn instruction(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![TextPart {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ContentResponse>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartResponse {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateContentResponse {
    fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.first_candidate()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn grounding_sources(&self) -> Vec<GroundingSource> {
        self.first_candidate()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|meta| {
                meta.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .filter_map(|web| {
                        let uri = web.uri.clone()?;
                        let title = web
                            .title
                            .clone()
                            .filter(|t| !t.is_empty())
                            .unwrap_or_else(|| "Source".to_string());
                        Some(GroundingSource { title, uri })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Base64 audio from the first part of the first candidate.
    fn inline_audio(&self) -> Option<String> {
        self.first_candidate()?
            .content
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()?
            .data
            .clone()
            .filter(|data| !data.is_empty())
    }
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn map_http_error(status: StatusCode, body: String) -> CoachError {
    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.clone());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.clone());

    CoachError::Api {
        status: status.as_u16(),
        message,
    }
}
