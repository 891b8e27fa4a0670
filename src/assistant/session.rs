//! One running conversation with the assistant.

use super::gemini::{ChatMessage, GeminiClient, GenerateOptions};
use crate::config::AssistantConfig;
use crate::error::AssistantError;

use tracing::warn;

pub struct ChatSession {
    client: GeminiClient,
    system_prompt: Option<String>,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    last_error: Option<String>,
}

impl ChatSession {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            client: GeminiClient::new(config),
            system_prompt: Some(config.system_prompt.clone()).filter(|p| !p.trim().is_empty()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            messages: Vec::new(),
            last_error: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// send a user turn. blank input is ignored (`Ok(None)`).
    ///
    /// the user turn is recorded before the call; the model turn only on
    /// success. failures are kept as `last_error` and returned.
    pub async fn send(
        &mut self,
        text: &str,
        sensor_context: Option<String>,
    ) -> Result<Option<String>, AssistantError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        self.last_error = None;

        let prior = self.messages.clone();
        self.messages.push(ChatMessage::user(text));

        let opts = GenerateOptions {
            system_prompt: self.system_prompt.clone(),
            sensor_context,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match self.client.generate_chat(&prior, text, &opts).await {
            Ok(reply) => {
                self.messages.push(ChatMessage::model(reply.clone()));
                Ok(Some(reply))
            }
            Err(e) => {
                warn!("assistant request failed: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// embedding vector for `text`, using the session's client
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AssistantError> {
        self.client.embed(text).await
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::Role;

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let mut session = ChatSession::new(&AssistantConfig::default());
        assert!(session.send("   ", None).await.unwrap().is_none());
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_user_turn_and_records_error() {
        let mut session = ChatSession::new(&AssistantConfig::default());
        let err = session.send("como está o ar?", None).await.unwrap_err();
        assert!(matches!(err, AssistantError::MissingApiKey));
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::User);
        assert!(session.last_error().is_some());

        session.reset();
        assert!(session.messages().is_empty());
        assert!(session.last_error().is_none());
    }
}
