use serde_json::Value;
use tracing::debug;

use crate::error::{LlmError, Result};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat};

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// Minimal client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// One system + user turn, free-text completion.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.send(system, user, None).await
    }

    /// One system + user turn, JSON-object completion, parsed.
    pub async fn complete_json(&self, system: &str, user: &str) -> Result<Value> {
        let text = self
            .send(system, user, Some(ResponseFormat::json_object()))
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn send(
        &self,
        system: &str,
        user: &str,
        response_format: Option<ResponseFormat>,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            response_format,
        };
        debug!(model = %self.model, "chat completion request");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| LlmError::MalformedResponse("no choices in completion".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = ChatClient::new("https://api.openai.com/v1/", "k", "m");
        assert_eq!(client.base_url, "https://api.openai.com/v1");
    }
}
