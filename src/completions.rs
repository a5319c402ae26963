//! Chat completions client for the text-chat surface
//!
//! Talks to the same completions endpoint the voice transport uses: posts
//! the conversation history with the caller's user id, then reads the SSE
//! chunk stream, accumulating text deltas and surfacing any inline tool
//! calls (the biometric trigger arrives this way).

use crate::error::AuthorizationError;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Inline tool call surfaced by the stream
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallPayload {
    pub name: String,
    pub arguments: Value,
}

/// One fully-assembled agent turn
#[derive(Debug, Clone, Default)]
pub struct AgentTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCallPayload>,
}

/// Client for the streamed completions endpoint (connection-pooled)
pub struct CompletionsClient {
    client: Client,
    url: String,
    secret: String,
    model: String,
}

impl CompletionsClient {
    pub fn new(url: String, secret: String, model: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            url,
            secret,
            model,
        }
    }

    /// Build from `CHAT_COMPLETIONS_URL` / `CHAT_COMPLETIONS_SECRET`
    pub fn from_env() -> Option<Self> {
        let url = env::var("CHAT_COMPLETIONS_URL").ok()?;
        let secret = env::var("CHAT_COMPLETIONS_SECRET").unwrap_or_default();
        let model =
            env::var("CHAT_COMPLETIONS_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());

        Some(Self::new(url, secret, model))
    }

    /// Send the history and assemble the streamed reply
    pub async fn send(&self, messages: &[ChatMessage], user_id: &str) -> Result<AgentTurn> {
        let body = CompletionsRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            stream: true,
        };

        info!(user_id, "Calling completions endpoint");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.secret)
            .header("X-User-ID", user_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Completions request failed: {}", e);
                AuthorizationError::CompletionsError(format!("request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Completions endpoint returned {}: {}", status, text);
            return Err(AuthorizationError::CompletionsError(format!(
                "endpoint returned {}",
                status
            )));
        }

        let stream_body = response.text().await.map_err(|e| {
            AuthorizationError::CompletionsError(format!("failed to read stream: {}", e))
        })?;

        let turn = parse_sse_stream(&stream_body);
        debug!(
            text_len = turn.text.len(),
            tool_calls = turn.tool_calls.len(),
            "Agent turn assembled"
        );

        Ok(turn)
    }
}

/// Assemble an agent turn from the raw SSE body.
///
/// Malformed chunks are skipped rather than failing the whole turn; the
/// upstream interleaves keep-alives and occasionally truncates a line.
pub fn parse_sse_stream(body: &str) -> AgentTurn {
    let mut turn = AgentTurn::default();

    for line in body.lines() {
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }

        let Ok(chunk) = serde_json::from_str::<ChunkEnvelope>(data) else {
            continue;
        };

        for choice in chunk.choices {
            // Some upstreams put tool calls on `message` instead of `delta`
            for part in [choice.delta, choice.message].into_iter().flatten() {
                if let Some(content) = part.content {
                    turn.text.push_str(&content);
                }
                for tc in part.tool_calls.unwrap_or_default() {
                    let Some(function) = tc.function else {
                        continue;
                    };
                    let arguments = function
                        .arguments
                        .as_deref()
                        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                        .unwrap_or_else(|| Value::Object(Default::default()));

                    turn.tool_calls.push(ToolCallPayload {
                        name: function.name,
                        arguments,
                    });
                }
            }
        }
    }

    turn
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
struct CompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChunkEnvelope {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    message: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallWire>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallWire {
    #[serde(default)]
    function: Option<FunctionWire>,
}

#[derive(Debug, Deserialize)]
struct FunctionWire {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}
