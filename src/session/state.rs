use std::sync::{
    atomic::{AtomicU8, Ordering},
    OnceLock,
};

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::models::{
    DeviceId, Reading, SessionId, SessionOutcome, SessionSnapshot, SessionState, SubjectId,
};

/// One capture attempt: a subject, a device and a time window.
///
/// `state` is the single source of truth. Leaving `Active` is one
/// compare-and-set, so at most one of poller, guard and cancel ever wins.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    subject_id: SubjectId,
    device_id: DeviceId,
    started_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    state: AtomicU8,
    result: OnceLock<Reading>,
    stop: CancellationToken,
}

impl Session {
    /// Build an `Active` session. `started_at` must be taken before the
    /// remote creation call and `created_at` after it returned.
    pub fn new(
        id: SessionId,
        subject_id: SubjectId,
        device_id: DeviceId,
        started_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            subject_id,
            device_id,
            started_at,
            created_at,
            deadline: started_at
                .checked_add_signed(timeout)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            state: AtomicU8::new(SessionState::Active.to_u8()),
            result: OnceLock::new(),
            stop: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Width of `(started_at, created_at]`, the creation round trip.
    ///
    /// Readings captured inside it are attributed to this session even though
    /// the device had not been told to measure yet. Stamping the start before
    /// the call accepts that exposure so a fast device is never turned away
    /// as too early; anything at or before `started_at` stays stale.
    pub fn creation_window(&self) -> Duration {
        self.created_at - self.started_at
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// The matched reading; only ever set on a `Completed` session.
    pub fn result(&self) -> Option<&Reading> {
        if self.state() == SessionState::Completed {
            self.result.get()
        } else {
            None
        }
    }

    /// Fires once the session has left `Active`.
    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Move from `Active` to the outcome's terminal state.
    ///
    /// Returns `false` without touching anything when the session already
    /// ended. The winner records the result and stops the session's tasks.
    pub(crate) fn try_finish(&self, outcome: &SessionOutcome) -> bool {
        let next = outcome.state();
        debug_assert!(next.is_terminal());

        // Stored ahead of the state change so any reader that observes
        // `Completed` also observes the reading. `result()` hides it if the
        // swap below loses.
        if let SessionOutcome::Completed(reading) = outcome {
            if self.state.load(Ordering::Acquire) != SessionState::Active.to_u8() {
                return false;
            }
            let _ = self.result.set(reading.clone());
        }

        let won = self
            .state
            .compare_exchange(
                SessionState::Active.to_u8(),
                next.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            self.stop.cancel();
        }
        won
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            subject_id: self.subject_id.clone(),
            device_id: self.device_id.clone(),
            started_at: self.started_at,
            created_at: self.created_at,
            deadline: self.deadline,
            state: self.state(),
            result: self.result().cloned(),
        }
    }
}
