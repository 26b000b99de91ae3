use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{SourceError, SourceResult};
use crate::models::{DeviceId, Reading, SessionId, SubjectId};

use super::{CaptureBackend, ReadingSource};

/// Scripted backend that keeps everything in process memory.
///
/// Readings are published by hand, devices can be marked unavailable, and
/// fetch failures can be injected, which makes it the backend of choice for
/// station demos and for exercising the registry.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    latest: HashMap<SubjectId, Reading>,
    unavailable_devices: HashSet<DeviceId>,
    unknown_subjects: HashSet<SubjectId>,
    transient_failures: u32,
    create_delay: Option<Duration>,
    fetches: u64,
    sessions_created: u64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record `reading` as the newest one for its subject.
    pub fn publish(&self, reading: Reading) {
        self.state()
            .latest
            .insert(reading.subject_id.clone(), reading);
    }

    pub fn set_device_unavailable(&self, device_id: DeviceId) {
        self.state().unavailable_devices.insert(device_id);
    }

    /// Make every later fetch for `subject_id` fail with `SubjectNotFound`.
    pub fn forget_subject(&self, subject_id: SubjectId) {
        self.state().unknown_subjects.insert(subject_id);
    }

    /// The next `count` fetches fail with a transient network error.
    pub fn fail_next_fetches(&self, count: u32) {
        self.state().transient_failures = count;
    }

    /// Hold every creation call for `delay` before answering.
    pub fn set_create_delay(&self, delay: Duration) {
        self.state().create_delay = Some(delay);
    }

    pub fn fetch_count(&self) -> u64 {
        self.state().fetches
    }

    pub fn sessions_created(&self) -> u64 {
        self.state().sessions_created
    }
}

#[async_trait]
impl CaptureBackend for InMemoryBackend {
    async fn create_capture_session(
        &self,
        _subject_id: &SubjectId,
        device_id: &DeviceId,
    ) -> SourceResult<SessionId> {
        let delay = self.state().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.unavailable_devices.contains(device_id) {
            return Err(SourceError::DeviceUnavailable(format!(
                "device {device_id} is offline"
            )));
        }
        state.sessions_created += 1;
        Ok(SessionId::new(Uuid::new_v4().to_string()))
    }
}

#[async_trait]
impl ReadingSource for InMemoryBackend {
    async fn latest_reading(&self, subject_id: &SubjectId) -> SourceResult<Option<Reading>> {
        let mut state = self.state();
        state.fetches += 1;

        if state.unknown_subjects.contains(subject_id) {
            return Err(SourceError::SubjectNotFound(subject_id.clone()));
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(SourceError::Network("injected fetch failure".into()));
        }
        Ok(state.latest.get(subject_id).cloned())
    }
}
