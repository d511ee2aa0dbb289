use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sandbox::backend::Desktop;
use crate::sandbox::types::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Active,
    Expired,
    Terminated,
}

/// Lifecycle record of one remote desktop. Only `SessionManager` mutates it;
/// everyone else sees snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolution: Resolution,
    pub status: SessionStatus,
}

impl Session {
    pub fn is_live(&self) -> bool {
        matches!(self.status, SessionStatus::Pending | SessionStatus::Active)
    }

    /// Seconds left on the local (advisory) countdown.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Explicit handle used for every operation against a live session.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub resolution: Resolution,
    pub desktop: Arc<dyn Desktop>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}
