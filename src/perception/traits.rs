use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::perception::screenshot::Screenshot;
use crate::perception::types::Point;

/// Maps a text description of an on-screen item to pixel coordinates.
///
/// `Ok(None)` is a normal "no match" answer. Callers never retry on their
/// own; the model decides whether to ask again.
#[async_trait]
pub trait VisualLocator: Send + Sync {
    async fn locate(&self, description: &str, frame: &Screenshot) -> DeskPilotResult<Option<Point>>;
}
