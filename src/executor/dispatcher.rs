use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::conversation::Conversation;
use crate::config::{AgentSettings, SafetyConfig};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::actions::{
    ActionErrorKind, ActionRequest, ActionResult, ActionVocabulary, ScrollPolicy,
};
use crate::executor::safety::ShellGate;
use crate::perception::screenshot::{self, Screenshot};
use crate::perception::traits::VisualLocator;
use crate::perception::types::FrameMeta;
use crate::sandbox::session::SessionHandle;
use crate::sandbox::types::{ClickKind, ScrollDirection};

/// Executes validated actions against the active desktop.
///
/// Holds no state beyond its settings; everything durable lives in the
/// session. Each action waits `action_delay` before touching the desktop so
/// the remote UI can settle after the previous one.
pub struct Dispatcher {
    action_delay: Duration,
    scroll: ScrollPolicy,
    shell: ShellGate,
    locator: Option<Arc<dyn VisualLocator>>,
}

impl Dispatcher {
    pub fn new(
        agent: &AgentSettings,
        safety: &SafetyConfig,
        locator: Option<Arc<dyn VisualLocator>>,
    ) -> DeskPilotResult<Self> {
        Ok(Self {
            action_delay: Duration::from_millis(agent.action_delay_ms),
            scroll: ScrollPolicy {
                mode: agent.scroll_mode,
                default_amount: agent.default_scroll_amount,
            },
            shell: ShellGate::from_config(safety)?,
            locator,
        })
    }

    pub fn scroll_policy(&self) -> &ScrollPolicy {
        &self.scroll
    }

    /// Validates raw `computer` arguments, executes them and records the
    /// result under `call_id`. Only a vanished session escapes as `Err`.
    pub async fn dispatch(
        &self,
        session: &SessionHandle,
        call_id: &str,
        args: &serde_json::Value,
        vocabulary: &ActionVocabulary,
        conversation: &mut Conversation,
    ) -> DeskPilotResult<ActionResult> {
        let result = self.perform(session, call_id, args, vocabulary).await?;
        conversation.record_result(call_id, &result);
        Ok(result)
    }

    /// Like [`Dispatcher::dispatch`] but leaves recording to the caller, for
    /// steps that answer several calls at once.
    pub async fn perform(
        &self,
        session: &SessionHandle,
        call_id: &str,
        args: &serde_json::Value,
        vocabulary: &ActionVocabulary,
    ) -> DeskPilotResult<ActionResult> {
        let result = match ActionRequest::parse(args, vocabulary, &self.scroll) {
            Ok(request) => self.execute(session, request).await?,
            Err(DeskPilotError::InvalidArgument(msg)) => ActionResult::invalid(msg),
            Err(e) => ActionResult::invalid(e.to_string()),
        };
        if let ActionResult::Error { kind, message } = &result {
            tracing::info!(session = %session.id, call_id, kind = kind.as_str(), %message, "action failed");
        }
        Ok(result)
    }

    pub async fn execute(
        &self,
        session: &SessionHandle,
        request: ActionRequest,
    ) -> DeskPilotResult<ActionResult> {
        if let Some(refusal) = self.precheck(&request) {
            return Ok(refusal);
        }

        tokio::time::sleep(self.action_delay).await;
        tracing::debug!(session = %session.id, action = request.name().as_str(), "dispatching");

        match self.run(session, request).await {
            Ok(result) => Ok(result),
            Err(DeskPilotError::SessionGone(_)) | Err(DeskPilotError::NotFound(_)) => {
                Err(DeskPilotError::SessionGone(session.id.clone()))
            }
            Err(DeskPilotError::InvalidArgument(msg)) => Ok(ActionResult::invalid(msg)),
            Err(e) => {
                tracing::warn!(session = %session.id, error = %e, "sandbox call failed");
                Ok(ActionResult::Error {
                    kind: ActionErrorKind::Sandbox,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Refusals that need no sandbox round trip, and so no pacing delay.
    fn precheck(&self, request: &ActionRequest) -> Option<ActionResult> {
        match request {
            ActionRequest::RunCommand { command, .. } => {
                self.shell.check(command).err().map(ActionResult::invalid)
            }
            ActionRequest::LocateItem { .. } if self.locator.is_none() => Some(ActionResult::Error {
                kind: ActionErrorKind::Grounding,
                message: "no visual locator is configured".into(),
            }),
            _ => None,
        }
    }

    async fn run(&self, session: &SessionHandle, request: ActionRequest) -> DeskPilotResult<ActionResult> {
        let desktop = session.desktop.as_ref();
        match request {
            ActionRequest::Screenshot => Ok(ActionResult::Image(screenshot::capture(desktop).await?)),
            ActionRequest::Type { text } => {
                desktop.write(&text).await?;
                Ok(ActionResult::Text(format!("typed {text}")))
            }
            ActionRequest::Key { combo } => {
                desktop.hotkey(&combo).await?;
                Ok(ActionResult::Text(format!("pressed key {combo}")))
            }
            ActionRequest::CursorPosition => {
                let (x, y) = desktop.cursor_position().await?;
                Ok(ActionResult::Text(format!("cursor at [{x},{y}]")))
            }
            ActionRequest::Click(kind) => {
                desktop.click(kind).await?;
                Ok(ActionResult::Text(format!("{} performed", click_label(kind))))
            }
            ActionRequest::MouseMove(p) => {
                desktop.move_mouse(p.x, p.y).await?;
                Ok(ActionResult::Text(format!("moved mouse to [{},{}]", p.x, p.y)))
            }
            ActionRequest::MouseScroll { direction, amount } => {
                desktop.scroll(direction, amount).await?;
                Ok(ActionResult::Text(scroll_label(direction, amount, &self.scroll)))
            }
            ActionRequest::LocateItem { description } => self.locate(session, &description).await,
            ActionRequest::RunCommand { command, background } => {
                let out = desktop.run_command(&command, background).await?;
                if background {
                    return Ok(ActionResult::Text(format!("started in background: {command}")));
                }
                let mut text = out.stdout;
                if !out.stderr.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&out.stderr);
                }
                if let Some(code) = out.exit_code.filter(|c| *c != 0) {
                    text.push_str(&format!("\n(exit code {code})"));
                }
                if text.is_empty() {
                    text = "command completed with no output".into();
                }
                Ok(ActionResult::Text(text))
            }
        }
    }

    /// Grounds `description` on a fresh frame. A miss is a normal result and
    /// is never retried here.
    async fn locate(&self, session: &SessionHandle, description: &str) -> DeskPilotResult<ActionResult> {
        let Some(locator) = self.locator.as_ref() else {
            return Ok(ActionResult::Error {
                kind: ActionErrorKind::Grounding,
                message: "no visual locator is configured".into(),
            });
        };

        let mut frame: Screenshot = screenshot::capture(session.desktop.as_ref()).await?;
        if frame.meta.is_none() {
            frame.meta = Some(FrameMeta {
                width: session.resolution.width,
                height: session.resolution.height,
            });
        }

        match locator.locate(description, &frame).await {
            Ok(Some(point)) => Ok(ActionResult::Coordinate(point)),
            Ok(None) => Ok(ActionResult::Error {
                kind: ActionErrorKind::NotFound,
                message: "item not found".into(),
            }),
            Err(e) => {
                tracing::warn!(description = %description, error = %e, "visual locator failed");
                Ok(ActionResult::Error {
                    kind: ActionErrorKind::Grounding,
                    message: e.to_string(),
                })
            }
        }
    }
}

fn click_label(kind: ClickKind) -> &'static str {
    match kind {
        ClickKind::Left => "left click",
        ClickKind::Right => "right click",
        ClickKind::Middle => "middle click",
        ClickKind::Double => "double click",
    }
}

fn scroll_label(direction: ScrollDirection, amount: u32, policy: &ScrollPolicy) -> String {
    if amount == policy.default_amount {
        format!("scrolled {}", direction.as_str())
    } else {
        format!("scrolled {} by {amount}", direction.as_str())
    }
}
