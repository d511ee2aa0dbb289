use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::sandbox::types::{
    ClickKind, CommandOutput, Credential, SandboxConfig, ScrollDirection, SessionRef,
};

/// Control plane of the remote sandbox service.
///
/// `connect` must fail with `DeskPilotError::NotFound` for unknown ids.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    async fn list(&self, credential: &Credential) -> DeskPilotResult<Vec<SessionRef>>;

    async fn create(
        &self,
        credential: &Credential,
        config: &SandboxConfig,
    ) -> DeskPilotResult<Arc<dyn Desktop>>;

    async fn connect(&self, credential: &Credential, id: &str)
        -> DeskPilotResult<Arc<dyn Desktop>>;
}

/// One live remote desktop. Every call is a remote round trip.
///
/// Implementations report an expired or killed sandbox as
/// `DeskPilotError::SessionGone`; anything else is a transport failure.
#[async_trait]
pub trait Desktop: Send + Sync {
    fn id(&self) -> &str;

    /// PNG-encoded frame of the current display.
    async fn screenshot(&self) -> DeskPilotResult<Vec<u8>>;

    async fn move_mouse(&self, x: i32, y: i32) -> DeskPilotResult<()>;

    async fn click(&self, kind: ClickKind) -> DeskPilotResult<()>;

    async fn write(&self, text: &str) -> DeskPilotResult<()>;

    /// `combo` is xdotool syntax, e.g. `ctrl+l`, `Return`.
    async fn hotkey(&self, combo: &str) -> DeskPilotResult<()>;

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> DeskPilotResult<()>;

    async fn cursor_position(&self) -> DeskPilotResult<(i32, i32)>;

    async fn run_command(&self, cmd: &str, background: bool) -> DeskPilotResult<CommandOutput>;

    /// Server-side timeout measured from now.
    async fn set_timeout(&self, timeout: Duration) -> DeskPilotResult<()>;

    async fn kill(&self) -> DeskPilotResult<()>;

    /// Starts the observer stream and returns its URL.
    async fn start_stream(&self) -> DeskPilotResult<String>;
}
