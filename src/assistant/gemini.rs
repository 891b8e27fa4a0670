//! ==============================================================================
//! gemini.rs - generative-language api client
//! ==============================================================================
//!
//! purpose:
//!     request/response contract for `models/<model>:generateContent` and
//!     `<embedding-model>:embedContent`. no retries: a failed call is
//!     returned to the caller, who shows it to the user.
//!
//! ==============================================================================

use crate::config::AssistantConfig;
use crate::error::AssistantError;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self { role: Role::Model, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    /// rendered sensor block, prepended to the user turn when non-empty
    pub sensor_context: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            sensor_context: None,
            temperature: 0.35,
            max_tokens: 1024,
        }
    }
}

// ==============================================================================
// wire format
// ==============================================================================

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub candidate_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Candidate {
    #[serde(default)]
    pub content: CandidateContent,
}

#[derive(Debug, Deserialize, Default)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Default)]
struct EmbedResponse {
    #[serde(default)]
    embedding: Embedding,
}

#[derive(Debug, Deserialize, Default)]
struct Embedding {
    #[serde(default)]
    values: Vec<f32>,
}

fn text_content(role: Option<Role>, text: String) -> Content {
    Content { role, parts: vec![Part { text }] }
}

/// prior turns, then the new user turn with the sensor block in front of it
pub fn build_generate_request(
    history: &[ChatMessage],
    user_prompt: &str,
    opts: &GenerateOptions,
) -> GenerateRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|m| text_content(Some(m.role), m.content.clone()))
        .collect();

    let prompt = match opts.sensor_context.as_deref().filter(|c| !c.is_empty()) {
        Some(ctx) => format!("Contexto dos sensores (resumo atual):\n{}\n\n{}", ctx, user_prompt),
        None => user_prompt.to_string(),
    };
    contents.push(text_content(Some(Role::User), prompt));

    GenerateRequest {
        contents,
        system_instruction: opts
            .system_prompt
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| text_content(None, p.to_string())),
        generation_config: GenerationConfig {
            temperature: opts.temperature,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: opts.max_tokens,
            candidate_count: 1,
        },
    }
}

/// first candidate's parts joined and trimmed; empty if there are none
pub fn extract_reply(response: &GenerateResponse) -> String {
    response
        .candidates
        .first()
        .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect::<String>())
        .unwrap_or_default()
        .trim()
        .to_string()
}

// ==============================================================================
// client
// ==============================================================================

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
        }
    }

    fn key(&self) -> Result<&str, AssistantError> {
        if self.api_key.trim().is_empty() {
            return Err(AssistantError::MissingApiKey);
        }
        Ok(&self.api_key)
    }

    pub async fn generate_chat(
        &self,
        history: &[ChatMessage],
        user_prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String, AssistantError> {
        let key = self.key()?;
        let body = build_generate_request(history, user_prompt, opts);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let res = self
            .http
            .post(url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(AssistantError::Api { status, body });
        }

        let parsed: GenerateResponse = res.json().await?;
        Ok(extract_reply(&parsed))
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AssistantError> {
        let key = self.key()?;
        let url = format!("{}/{}:embedContent", self.base_url, self.embedding_model);
        let body = serde_json::json!({ "content": { "parts": [{ "text": text }] } });

        let res = self
            .http
            .post(url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(AssistantError::Api { status, body });
        }

        let parsed: EmbedResponse = res.json().await?;
        Ok(parsed.embedding.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_history_context_and_config() {
        let history = vec![ChatMessage::user("oi"), ChatMessage::model("olá!")];
        let opts = GenerateOptions {
            system_prompt: Some("seja breve".into()),
            sensor_context: Some("Leituras mais recentes:\n- Som: 3 no dia".into()),
            ..GenerateOptions::default()
        };

        let req = serde_json::to_value(build_generate_request(&history, "como estou?", &opts)).unwrap();

        assert_eq!(req["contents"][0], json!({"role": "user", "parts": [{"text": "oi"}]}));
        assert_eq!(req["contents"][1]["role"], "model");
        assert_eq!(
            req["contents"][2]["parts"][0]["text"],
            "Contexto dos sensores (resumo atual):\nLeituras mais recentes:\n- Som: 3 no dia\n\ncomo estou?"
        );
        assert_eq!(req["systemInstruction"], json!({"parts": [{"text": "seja breve"}]}));
        assert_eq!(req["generationConfig"]["topK"], 40);
        assert_eq!(req["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(req["generationConfig"]["candidateCount"], 1);
    }

    #[test]
    fn empty_context_and_prompt_are_omitted() {
        let opts = GenerateOptions {
            sensor_context: Some(String::new()),
            ..GenerateOptions::default()
        };
        let req = serde_json::to_value(build_generate_request(&[], "oi", &opts)).unwrap();
        assert_eq!(req["contents"][0]["parts"][0]["text"], "oi");
        assert!(req.get("systemInstruction").is_none());
    }

    #[test]
    fn reply_joins_parts_of_first_candidate() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "  Olá, "}, {"text": "tudo bem.\n"}]}},
                {"content": {"parts": [{"text": "ignorado"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(extract_reply(&response), "Olá, tudo bem.");
    }

    #[test]
    fn reply_without_candidates_is_empty() {
        let response: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(extract_reply(&response), "");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = GeminiClient::new(&AssistantConfig::default());
        let err = client.generate_chat(&[], "oi", &GenerateOptions::default()).await.unwrap_err();
        assert!(matches!(err, AssistantError::MissingApiKey));

        let err = client.embed("oi").await.unwrap_err();
        assert!(matches!(err, AssistantError::MissingApiKey));
    }
}
