//! Conversation channel adapter
//!
//! Thin translation layer between the opaque voice/chat transport and the
//! orchestrator's event vocabulary. Performs no authorization logic.

use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

/// Events delivered to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Typed or transcribed user input
    UserText(String),
    /// Agent speech/text rendered to the user
    AgentText(String),
    /// Structured tool invocation from the transport
    ToolInvocation { name: String, parameters: Value },
}

/// Outbound capability: render text as displayed/spoken agent output
#[async_trait::async_trait]
pub trait ConversationChannel: Send + Sync {
    async fn say(&self, text: &str) -> Result<()>;
}

/// Channel that buffers outbound lines.
///
/// Used by the HTTP surface to return agent output per request, and by
/// tests to assert on exactly what was said.
pub struct BufferedChannel {
    lines: Mutex<Vec<String>>,
}

impl BufferedChannel {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Take and clear everything said so far
    pub async fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().await)
    }

    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

impl Default for BufferedChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConversationChannel for BufferedChannel {
    async fn say(&self, text: &str) -> Result<()> {
        self.lines.lock().await.push(text.to_string());
        Ok(())
    }
}

//
// ================= Transport Wire Format =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    User,
    Agent,
}

impl Default for SpeakerRole {
    fn default() -> Self {
        SpeakerRole::Agent
    }
}

/// Inbound payloads of the opaque transport session
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportMessage {
    Message {
        #[serde(default)]
        role: SpeakerRole,
        text: String,
    },
    ToolCall {
        name: String,
        #[serde(default)]
        parameters: Value,
    },
}

impl TransportMessage {
    pub fn into_event(self) -> ChannelEvent {
        match self {
            TransportMessage::Message {
                role: SpeakerRole::User,
                text,
            } => ChannelEvent::UserText(text),
            TransportMessage::Message {
                role: SpeakerRole::Agent,
                text,
            } => ChannelEvent::AgentText(text),
            TransportMessage::ToolCall { name, parameters } => {
                ChannelEvent::ToolInvocation { name, parameters }
            }
        }
    }
}
