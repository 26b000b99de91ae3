//! Collaborators the coordinator consumes: the backend that starts a capture
//! on a device, and the source it polls for the subject's latest reading.

mod http;
mod memory;

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

use async_trait::async_trait;

use crate::error::SourceResult;
use crate::models::{DeviceId, Reading, SessionId, SubjectId};

#[async_trait]
pub trait CaptureBackend: Send + Sync + 'static {
    /// Ask the intermediary service to start a capture on `device_id` for
    /// `subject_id`. Returns the remote session id.
    async fn create_capture_session(
        &self,
        subject_id: &SubjectId,
        device_id: &DeviceId,
    ) -> SourceResult<SessionId>;
}

#[async_trait]
pub trait ReadingSource: Send + Sync + 'static {
    /// Most recent reading recorded for `subject_id`, of any source.
    /// Must be free of side effects; the poller calls it once per tick.
    async fn latest_reading(&self, subject_id: &SubjectId) -> SourceResult<Option<Reading>>;
}
