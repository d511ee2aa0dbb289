use serde::Serialize;

use crate::agent_engine::conversation::Conversation;
use crate::errors::DeskPilotError;

/// Lifecycle of one conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    AwaitingModel { step: u32 },
    ToolCallIssued { step: u32, call_id: String },
    Dispatching { step: u32, call_id: String },
    Done { reason: DoneReason },
    Errored { kind: FailureKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// The model answered without calling a tool.
    Completed,
    CeilingReached,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    SessionGone,
    Provider,
}

impl FailureKind {
    pub fn of(err: &DeskPilotError) -> Self {
        match err {
            DeskPilotError::ProviderRateLimited(_) => FailureKind::RateLimited,
            DeskPilotError::SessionGone(_) => FailureKind::SessionGone,
            _ => FailureKind::Provider,
        }
    }
}

/// Streamed upward while a turn runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StateChanged {
        state: AgentState,
    },
    TextDelta {
        text: String,
    },
    ToolCallIssued {
        call_id: String,
        name: String,
        args: serde_json::Value,
    },
    ToolResultReady {
        call_id: String,
        summary: String,
        is_image: bool,
        is_error: bool,
    },
    Finished {
        reason: DoneReason,
    },
    /// `notice` is the only text shown to the operator.
    Failed {
        kind: FailureKind,
        notice: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    Done { reason: DoneReason },
    Errored { kind: FailureKind },
}

/// What a finished turn hands back to its caller.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Model invocations made.
    pub steps: u32,
    pub conversation: Conversation,
}
