use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::conversation::{Conversation, Part};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{
    AgentEvent, AgentState, DoneReason, FailureKind, TurnOutcome, TurnReport,
};
use crate::config::AgentSettings;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::actions::{ActionResult, ActionVocabulary, ScrollMode};
use crate::executor::dispatcher::Dispatcher;
use crate::llm::registry::{ModelRoute, ProviderRegistry};
use crate::llm::tools::{computer_tool, COMPUTER_TOOL};
use crate::llm::types::{FinishReason, ModelEvent, ToolCall, ToolDef};
use crate::perception::screenshot;
use crate::sandbox::session::SessionHandle;

const EXTRA_CALL_MESSAGE: &str =
    "only one action per step is supported; this call was not executed";

/// Drives one bounded model/tool exchange per request.
///
/// Single-flight: a step's tool call finishes dispatching before the next
/// model invocation starts.
pub struct AgentEngine {
    registry: ProviderRegistry,
    dispatcher: Dispatcher,
    max_steps: u32,
    scroll_mode: ScrollMode,
}

/// Everything a step needs that is fixed for the whole turn.
struct TurnPlan {
    route: ModelRoute,
    system_prompt: String,
    tools: Vec<ToolDef>,
}

enum StepEnd {
    Continue,
    Stop(TurnEnd),
}

enum TurnEnd {
    Done(DoneReason),
    Failed(DeskPilotError),
}

impl AgentEngine {
    pub fn new(registry: ProviderRegistry, dispatcher: Dispatcher, agent: &AgentSettings) -> Self {
        Self {
            registry,
            dispatcher,
            max_steps: agent.max_steps,
            scroll_mode: agent.scroll_mode,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Runs one turn. Only an unusable model identifier is returned as
    /// `Err`; everything that happens once the turn started is reported in
    /// the [`TurnReport`] and on `events`.
    pub async fn run_turn(
        &self,
        session: &SessionHandle,
        model_id: &str,
        mut conversation: Conversation,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> DeskPilotResult<TurnReport> {
        let route = self.registry.resolve(model_id)?;
        let vocabulary = route.kind.vocabulary();
        let plan = TurnPlan {
            system_prompt: route.kind.system_prompt(session.resolution, self.scroll_mode),
            tools: vec![computer_tool(&vocabulary, self.scroll_mode)],
            route,
        };
        tracing::info!(
            session = %session.id,
            model_id,
            max_steps = self.max_steps,
            actions = ?vocabulary.names(),
            "turn started"
        );

        let mut ctrl = LoopController::new(self.max_steps);

        let end = match screenshot::capture(session.desktop.as_ref()).await {
            Err(e) => TurnEnd::Failed(session_error(e, session)),
            Ok(frame) => {
                conversation.push_screenshot(&frame);
                loop {
                    if cancel.is_cancelled() {
                        break TurnEnd::Done(DoneReason::Cancelled);
                    }
                    let Some(step) = ctrl.next_step() else {
                        break TurnEnd::Done(DoneReason::CeilingReached);
                    };
                    emit(&events, AgentEvent::StateChanged {
                        state: AgentState::AwaitingModel { step },
                    })
                    .await;

                    let reply = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        r = self.invoke(&plan, &conversation, &events) => Some(r),
                    };
                    let (text, calls) = match reply {
                        None => break TurnEnd::Done(DoneReason::Cancelled),
                        Some(Err(e)) => break TurnEnd::Failed(e),
                        Some(Ok(reply)) => reply,
                    };

                    match self
                        .handle_reply(step, session, &vocabulary, text, calls, &mut conversation, &events)
                        .await
                    {
                        StepEnd::Continue => {}
                        StepEnd::Stop(end) => break end,
                    }
                }
            }
        };

        let outcome = match end {
            TurnEnd::Done(reason) => {
                tracing::info!(session = %session.id, steps = ctrl.steps_taken(), ?reason, "turn done");
                emit(&events, AgentEvent::StateChanged {
                    state: AgentState::Done { reason },
                })
                .await;
                emit(&events, AgentEvent::Finished { reason }).await;
                TurnOutcome::Done { reason }
            }
            TurnEnd::Failed(err) => {
                let kind = FailureKind::of(&err);
                tracing::error!(session = %session.id, steps = ctrl.steps_taken(), error = %err, ?kind, "turn failed");
                emit(&events, AgentEvent::StateChanged {
                    state: AgentState::Errored { kind },
                })
                .await;
                emit(&events, AgentEvent::Failed {
                    kind,
                    notice: err.operator_notice().to_string(),
                })
                .await;
                TurnOutcome::Errored { kind }
            }
        };

        Ok(TurnReport {
            outcome,
            steps: ctrl.steps_taken(),
            conversation,
        })
    }

    /// One streaming model invocation. Text deltas are forwarded as they
    /// arrive; tool calls are collected.
    async fn invoke(
        &self,
        plan: &TurnPlan,
        conversation: &Conversation,
        events: &mpsc::Sender<AgentEvent>,
    ) -> DeskPilotResult<(String, Vec<ToolCall>)> {
        let messages = conversation.to_chat_messages(&plan.system_prompt);
        tracing::debug!(
            messages = messages.len(),
            images = conversation.image_count(),
            "invoking model"
        );
        let mut stream = plan
            .route
            .provider
            .stream_chat(messages, plan.tools.clone(), &plan.route.call)
            .await?;

        let mut text = String::new();
        let mut calls = Vec::new();
        while let Some(event) = stream.recv().await {
            match event? {
                ModelEvent::TextDelta(delta) => {
                    text.push_str(&delta);
                    emit(events, AgentEvent::TextDelta { text: delta }).await;
                }
                ModelEvent::ToolCall(call) => calls.push(call),
                ModelEvent::Finished(FinishReason::Error) => {
                    return Err(DeskPilotError::LlmProvider(
                        "model finished with an error".into(),
                    ));
                }
                ModelEvent::Finished(reason) => {
                    tracing::debug!(?reason, tool_calls = calls.len(), "model finished");
                    break;
                }
            }
        }
        Ok((text, calls))
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_reply(
        &self,
        step: u32,
        session: &SessionHandle,
        vocabulary: &ActionVocabulary,
        text: String,
        calls: Vec<ToolCall>,
        conversation: &mut Conversation,
        events: &mpsc::Sender<AgentEvent>,
    ) -> StepEnd {
        if calls.is_empty() {
            conversation.push_assistant(text, Vec::new());
            return StepEnd::Stop(TurnEnd::Done(DoneReason::Completed));
        }

        let parsed: Vec<(ToolCall, serde_json::Value)> = calls
            .into_iter()
            .map(|call| {
                let args = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| serde_json::Value::String(call.function.arguments.clone()));
                (call, args)
            })
            .collect();
        conversation.push_assistant(
            text,
            parsed
                .iter()
                .map(|(call, args)| Part::ToolCall {
                    call_id: call.id.clone(),
                    name: call.function.name.clone(),
                    args: args.clone(),
                })
                .collect(),
        );

        let mut parsed = parsed.into_iter();
        let Some((call, args)) = parsed.next() else {
            return StepEnd::Continue;
        };

        emit(events, AgentEvent::ToolCallIssued {
            call_id: call.id.clone(),
            name: call.function.name.clone(),
            args: args.clone(),
        })
        .await;
        emit(events, AgentEvent::StateChanged {
            state: AgentState::ToolCallIssued {
                step,
                call_id: call.id.clone(),
            },
        })
        .await;

        let result = if call.function.name == COMPUTER_TOOL {
            emit(events, AgentEvent::StateChanged {
                state: AgentState::Dispatching {
                    step,
                    call_id: call.id.clone(),
                },
            })
            .await;
            match self.dispatcher.perform(session, &call.id, &args, vocabulary).await {
                Ok(result) => result,
                Err(e) => return StepEnd::Stop(TurnEnd::Failed(e)),
            }
        } else {
            ActionResult::invalid(format!(
                "unknown tool `{}`; use `{COMPUTER_TOOL}`",
                call.function.name
            ))
        };
        emit(events, result_event(&call.id, &result)).await;

        let mut results = vec![(call.id, result)];
        for (extra, _) in parsed {
            tracing::warn!(call_id = %extra.id, "extra tool call in one step rejected");
            let result = ActionResult::invalid(EXTRA_CALL_MESSAGE);
            emit(events, result_event(&extra.id, &result)).await;
            results.push((extra.id, result));
        }
        conversation.record_step(&results);
        StepEnd::Continue
    }
}

fn result_event(call_id: &str, result: &ActionResult) -> AgentEvent {
    AgentEvent::ToolResultReady {
        call_id: call_id.to_string(),
        summary: result.to_text(),
        is_image: matches!(result, ActionResult::Image(_)),
        is_error: result.is_error(),
    }
}

/// A vanished desktop surfaces as `SessionGone`; other capture failures stay generic.
fn session_error(err: DeskPilotError, session: &SessionHandle) -> DeskPilotError {
    match err {
        DeskPilotError::SessionGone(_) | DeskPilotError::NotFound(_) => {
            DeskPilotError::SessionGone(session.id.clone())
        }
        other => other,
    }
}

async fn emit(events: &mpsc::Sender<AgentEvent>, event: AgentEvent) {
    if events.send(event).await.is_err() {
        tracing::trace!("agent event receiver dropped");
    }
}
