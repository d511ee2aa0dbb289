use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::DeskPilotResult;
use crate::llm::types::{CallConfig, ChatMessage, ModelEvent, ToolDef};

/// Events of one streaming invocation. The stream ends after `Finished` or
/// after the first `Err`.
pub type ModelStream = mpsc::Receiver<DeskPilotResult<ModelEvent>>;

/// A chat model reachable over a streaming API.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches the config key).
    fn name(&self) -> &str;

    /// Starts one streaming invocation. Failures before the first byte
    /// (bad status, rate limit) are returned directly; later ones arrive on
    /// the stream.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
        cfg: &CallConfig,
    ) -> DeskPilotResult<ModelStream>;
}
