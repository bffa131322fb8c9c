use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_SYSTEM_PROMPT: &str = "Create a concise summary that highlights the main points and crucial details of the provided news text. Eliminate unnecessary language and focus on the most important information use Headings followed by a short paragraph of concise text.";

/// Condenses source text through an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct ChatSummarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    system_prompt: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl ChatSummarizer {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Summary of `text`, or a human-readable reason it could not be made.
    pub async fn summarize(&self, text: &str) -> Result<String, String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{status}: {}", body.trim()));
        }

        let reply: ChatResponse = response.json().await.map_err(|e| e.to_string())?;
        let summary = extract_summary(reply)?;
        debug!(model = %self.model, bytes = summary.len(), "summarized");
        Ok(summary)
    }
}

fn extract_summary(reply: ChatResponse) -> Result<String, String> {
    reply
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| "model returned no text".to_string())
}
