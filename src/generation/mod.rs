//! Text generation via hosted chat models.
//!
//! The tutor issues one generation call per grounded answer and one per chat turn. The Gemini
//! adapter maps the provider-neutral [`GenerationRequest`] onto `generateContent`: the system
//! prompt becomes `systemInstruction` and assistant turns are replayed with the `model` role so
//! the provider sees the conversation as it happened.

use crate::gemini::{GeminiError, GeminiTransport, model_resource};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Remote provider request failed.
    #[error("Generation provider request failed: {0}")]
    Provider(#[from] GeminiError),
    /// Provider answered without any text.
    #[error("Generation provider returned no text (finish reason: {0})")]
    EmptyResponse(String),
    /// Request could not be sent as constructed.
    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),
}

/// Speaker of a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// Instructions that frame the conversation.
    System,
    /// The learner.
    User,
    /// The tutor model.
    Assistant,
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" | "human" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("Unknown chat role '{other}'")),
        }
    }
}

/// One conversational turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Who produced the turn.
    pub role: ChatRole,
    /// Turn content.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a learner turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Provider-neutral generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Optional system prompt.
    pub system: Option<String>,
    /// Conversation turns in order; system turns are folded into the system prompt.
    pub messages: Vec<ChatMessage>,
    /// Optional sampling temperature override.
    pub temperature: Option<f32>,
}

/// Interface implemented by text generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Model identifier used for generation.
    fn model(&self) -> &str;

    /// Produce a completion for the supplied conversation.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Generation client backed by Gemini `generateContent`.
pub struct GeminiGenerationClient {
    transport: GeminiTransport,
    model: String,
    default_temperature: Option<f32>,
}

impl GeminiGenerationClient {
    /// Create a client generating with `model`.
    pub fn new(transport: GeminiTransport, model: &str, default_temperature: Option<f32>) -> Self {
        Self {
            transport,
            model: model_resource(model),
            default_temperature,
        }
    }
}

fn build_payload(request: &GenerationRequest, default_temperature: Option<f32>) -> Value {
    let mut system_parts: Vec<&str> = request.system.as_deref().into_iter().collect();
    let mut contents = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        let role = match message.role {
            ChatRole::System => {
                system_parts.push(&message.content);
                continue;
            }
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        };
        contents.push(json!({
            "role": role,
            "parts": [{ "text": message.content }],
        }));
    }

    let mut payload = Map::new();
    payload.insert("contents".into(), Value::Array(contents));
    if !system_parts.is_empty() {
        payload.insert(
            "systemInstruction".into(),
            json!({ "parts": [{ "text": system_parts.join("\n\n") }] }),
        );
    }
    if let Some(temperature) = request.temperature.or(default_temperature) {
        payload.insert(
            "generationConfig".into(),
            json!({ "temperature": temperature }),
        );
    }
    Value::Object(payload)
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[async_trait]
impl GenerationClient for GeminiGenerationClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        if !request
            .messages
            .iter()
            .any(|message| message.role != ChatRole::System)
        {
            return Err(GenerationClientError::InvalidRequest(
                "at least one user or assistant message is required".into(),
            ));
        }

        let payload = build_payload(&request, self.default_temperature);
        tracing::debug!(
            model = %self.model,
            turns = request.messages.len(),
            "Requesting Gemini completion"
        );
        let response: GenerateContentResponse = self
            .transport
            .post(&format!("v1beta/{}:generateContent", self.model), &payload)
            .await?;

        let candidate = response.candidates.into_iter().next();
        let finish_reason = candidate
            .as_ref()
            .and_then(|candidate| candidate.finish_reason.clone())
            .unwrap_or_else(|| "none".into());
        let text: String = candidate
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationClientError::EmptyResponse(finish_reason));
        }
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer) -> GeminiGenerationClient {
        let transport = GeminiTransport::new(&server.base_url(), "test-key").expect("transport");
        GeminiGenerationClient::new(transport, "gemini-2.5-flash", Some(0.9))
    }

    #[test]
    fn payload_maps_roles_and_system_prompt() {
        let request = GenerationRequest {
            system: Some("Be brief.".into()),
            messages: vec![
                ChatMessage {
                    role: ChatRole::System,
                    content: "Use examples.".into(),
                },
                ChatMessage::user("What is a cell?"),
                ChatMessage {
                    role: ChatRole::Assistant,
                    content: "The unit of life.".into(),
                },
                ChatMessage::user("And a tissue?"),
            ],
            temperature: None,
        };

        let payload = build_payload(&request, Some(0.5));
        let contents = payload["contents"].as_array().expect("contents");
        let roles: Vec<&str> = contents
            .iter()
            .map(|turn| turn["role"].as_str().unwrap_or_default())
            .collect();

        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "Be brief.\n\nUse examples."
        );
        assert_eq!(payload["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn roles_parse_from_strings() {
        assert_eq!("Human".parse::<ChatRole>(), Ok(ChatRole::User));
        assert_eq!("assistant".parse::<ChatRole>(), Ok(ChatRole::Assistant));
        assert_eq!(" system ".parse::<ChatRole>(), Ok(ChatRole::System));
        assert!("narrator".parse::<ChatRole>().is_err());
    }

    #[tokio::test]
    async fn generate_joins_candidate_parts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-flash:generateContent")
                    .body_contains("systemInstruction");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": {
                            "role": "model",
                            "parts": [{ "text": "Mitochondria " }, { "text": "make ATP." }]
                        },
                        "finishReason": "STOP"
                    }]
                }));
            })
            .await;

        let answer = client(&server)
            .generate(GenerationRequest {
                system: Some("You are a tutor.".into()),
                messages: vec![ChatMessage::user("What do mitochondria do?")],
                temperature: None,
            })
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "Mitochondria make ATP.");
    }

    #[tokio::test]
    async fn generate_reports_empty_candidates() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-flash:generateContent");
                then.status(200).json_body(json!({
                    "candidates": [{ "finishReason": "SAFETY" }]
                }));
            })
            .await;

        let error = client(&server)
            .generate(GenerationRequest {
                messages: vec![ChatMessage::user("hello")],
                ..Default::default()
            })
            .await
            .expect_err("empty response");

        assert!(matches!(
            error,
            GenerationClientError::EmptyResponse(reason) if reason == "SAFETY"
        ));
    }

    #[tokio::test]
    async fn generate_requires_a_non_system_turn() {
        let server = MockServer::start_async().await;
        let error = client(&server)
            .generate(GenerationRequest {
                system: Some("sys".into()),
                messages: vec![],
                temperature: None,
            })
            .await
            .expect_err("no turns");

        assert!(matches!(error, GenerationClientError::InvalidRequest(_)));
    }
}
