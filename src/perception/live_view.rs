use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::event_bus::{EventBus, ObserverEvent};
use crate::perception::screenshot;
use crate::sandbox::backend::Desktop;

/// Periodic frame capture for the human observer. Runs beside the agent
/// loop and never blocks dispatch.
pub struct LiveView {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl LiveView {
    pub fn spawn(desktop: Arc<dyn Desktop>, every: Duration, bus: EventBus) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                match screenshot::capture(desktop.as_ref()).await {
                    Ok(frame) => bus.publish(ObserverEvent::FrameCaptured {
                        session_id: desktop.id().to_string(),
                        image_base64: frame.to_base64(),
                    }),
                    Err(e) => {
                        tracing::warn!(session = %desktop.id(), error = %e, "live view capture failed")
                    }
                }
            }
            tracing::debug!(session = %desktop.id(), "live view stopped");
        });
        Self { stop, task }
    }

    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "live view task ended abnormally");
        }
    }
}
