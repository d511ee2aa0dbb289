//! Client-side mirror of the sandbox's server-side timeout.
//!
//! Advisory UI state only: the sandbox enforces expiry on its own, and a
//! positive countdown does not mean a dispatch will succeed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::event_bus::{EventBus, ObserverEvent};

#[derive(Debug)]
pub struct ExpiryCountdown {
    deadline: watch::Sender<Option<DateTime<Utc>>>,
}

impl ExpiryCountdown {
    pub fn new() -> Self {
        let (deadline, _) = watch::channel(None);
        Self { deadline }
    }

    /// Restarts the countdown at `duration` from now.
    pub fn reset(&self, duration: Duration) -> DateTime<Utc> {
        let at = Utc::now()
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        self.deadline.send_replace(Some(at));
        at
    }

    pub fn clear(&self) {
        self.deadline.send_replace(None);
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        *self.deadline.borrow()
    }

    pub fn remaining_secs(&self) -> Option<i64> {
        self.deadline()
            .map(|at| (at - Utc::now()).num_seconds().max(0))
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.deadline.subscribe()
    }

    /// Publishes the remaining time on `bus` every `every` until `stop` fires.
    pub fn spawn_ticker(
        &self,
        every: Duration,
        bus: EventBus,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let deadline = self.deadline.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut elapsed_reported = false;
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let Some(at) = *deadline.borrow() else {
                    elapsed_reported = false;
                    continue;
                };
                let remaining_secs = (at - Utc::now()).num_seconds().max(0);
                bus.publish(ObserverEvent::CountdownTick { remaining_secs });
                if remaining_secs == 0 && !elapsed_reported {
                    tracing::info!("local session countdown elapsed");
                    bus.publish(ObserverEvent::CountdownElapsed);
                    elapsed_reported = true;
                } else if remaining_secs > 0 {
                    elapsed_reported = false;
                }
            }
            tracing::debug!("countdown ticker stopped");
        })
    }
}

impl Default for ExpiryCountdown {
    fn default() -> Self {
        Self::new()
    }
}
