//! Gemini API client
//!
//! Implements the remote text model and speech transcription contracts.
//! Uses a long-lived reqwest::Client for connection pooling.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::remote::{ChatRole, PromptMessage, TextModel, Transcriber, Transcription};
use crate::Result;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Marker the model is told to answer with when audio is unintelligible
const NO_SPEECH_MARKER: &str = "[NO_SPEECH]";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    /// Returns None when no API key is configured
    pub fn from_config(config: &AdvisorConfig) -> Result<Option<Self>> {
        match &config.gemini_api_key {
            Some(key) => Ok(Some(Self::new(
                key.clone(),
                config.gemini_model.clone(),
                config.remote_timeout(),
            )?)),
            None => Ok(None),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent?key={}", BASE_URL, self.model, self.api_key)
    }

    async fn generate(&self, request: &GeminiRequest) -> Result<String> {
        info!(model = %self.model, "Calling Gemini API");

        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AdvisorError::RemoteService(format!("Gemini API error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini API error response: {}", error_text);
            return Err(AdvisorError::RemoteService(format!(
                "Gemini API returned {}",
                status
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AdvisorError::Parse(format!("Gemini parse error: {}", e))
        })?;

        let candidate = gemini_response
            .candidates
            .first()
            .ok_or_else(|| AdvisorError::RemoteService("No response from Gemini API".to_string()))?;

        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(AdvisorError::RemoteService(
                "Empty response from Gemini".to_string(),
            ));
        }

        info!(
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            chars = text.len(),
            "Gemini response received"
        );
        Ok(text)
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn complete(&self, messages: &[PromptMessage], json_mode: bool) -> Result<String> {
        let request = build_chat_request(messages, json_mode);
        self.generate(&request).await
    }
}

#[async_trait]
impl Transcriber for GeminiClient {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
        language: &str,
    ) -> Result<Transcription> {
        if audio.is_empty() {
            return Ok(Transcription::CouldNotTranscribe);
        }

        let request = build_transcription_request(audio, mime_type, language);
        let text = self.generate(&request).await?;
        let text = text.trim();

        if text.is_empty() || text.contains(NO_SPEECH_MARKER) {
            warn!("Audio could not be transcribed");
            return Ok(Transcription::CouldNotTranscribe);
        }
        Ok(Transcription::Text(text.to_string()))
    }
}

/// System messages become the system instruction; the rest map to turns
fn build_chat_request(messages: &[PromptMessage], json_mode: bool) -> GeminiRequest {
    let system_text = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let contents = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| Content {
            role: Some(
                match m.role {
                    ChatRole::Assistant => "model",
                    _ => "user",
                }
                .to_string(),
            ),
            parts: vec![Part::text(&m.content)],
        })
        .collect();

    GeminiRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
            response_mime_type: json_mode.then(|| "application/json".to_string()),
        },
        system_instruction: (!system_text.is_empty()).then(|| SystemInstruction {
            parts: vec![Part::text(&system_text)],
        }),
    }
}

fn build_transcription_request(audio: &[u8], mime_type: &str, language: &str) -> GeminiRequest {
    let instruction = format!(
        "Transcribe the speech in this audio verbatim. Language: {}. \
         Reply with the transcript only. If there is no intelligible speech, reply {}.",
        language, NO_SPEECH_MARKER
    );

    GeminiRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::text(&instruction),
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: mime_type.to_string(),
                        data: STANDARD.encode(audio),
                    }),
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: 0.0,
            top_p: 1.0,
            top_k: 1,
            max_output_tokens: 1024,
            response_mime_type: None,
        },
        system_instruction: None,
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serialization() {
        let messages = vec![
            PromptMessage::system("You are an Islamic finance advisor"),
            PromptMessage::user("Как накопить на Хадж?"),
            PromptMessage::assistant("Откройте целевой счет"),
            PromptMessage::user("А сколько в месяц?"),
        ];
        let request = build_chat_request(&messages, true);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(
            json["generation_config"]["response_mime_type"],
            "application/json"
        );
        assert!(json["system_instruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Islamic"));
    }

    #[test]
    fn test_prose_request_omits_mime_type() {
        let request = build_chat_request(&[PromptMessage::user("hi")], false);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["generation_config"].get("response_mime_type").is_none());
        assert!(json.get("system_instruction").is_none());
    }

    #[test]
    fn test_transcription_request_inlines_audio() {
        let request = build_transcription_request(b"abc", "audio/webm", "ru-RU");
        let json = serde_json::to_value(&request).unwrap();
        let inline = &json["contents"][0]["parts"][1]["inline_data"];
        assert_eq!(inline["mime_type"], "audio/webm");
        assert_eq!(inline["data"], "YWJj");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Салам"}]},"finishReason":"STOP"}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates[0].finish_reason.as_deref(), Some("STOP"));
        assert_eq!(parsed.candidates[0].content.parts[0].text.as_deref(), Some("Салам"));
    }
}
