pub mod conversation;
pub mod engine;
pub mod event_bus;
pub mod loop_control;
pub mod state;

pub use conversation::{Conversation, Part, Role, Turn};
pub use engine::AgentEngine;
pub use event_bus::{EventBus, ObserverEvent};
pub use state::{AgentEvent, AgentState, DoneReason, FailureKind, TurnOutcome, TurnReport};
