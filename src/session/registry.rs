use std::{
    collections::HashMap,
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::Context;
use log::{error, info, warn};
use tokio::{task::JoinHandle, time::Instant};

use crate::{
    clock::{AnchoredClock, Clock},
    error::{RegistryError, RegistryResult},
    models::{DeviceId, SessionId, SessionNotice, SessionOutcome, SessionSnapshot, SubjectId},
    notify::NotificationSink,
    settings::CaptureSettings,
    source::{CaptureBackend, ReadingSource},
};

use super::{guard::deadline_guard, poller::poll_loop, Session};

/// Caller's view of an opened session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session: Arc<Session>,
}

impl Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

enum Slot {
    /// Creation call in flight; the subject is taken.
    Opening,
    Open {
        session: Arc<Session>,
        tasks: Vec<JoinHandle<()>>,
    },
}

struct RegistryInner {
    backend: Arc<dyn CaptureBackend>,
    source: Arc<dyn ReadingSource>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    settings: CaptureSettings,
    slots: Mutex<HashMap<SubjectId, Slot>>,
    /// Set by `shutdown` while holding the slots lock.
    closed: AtomicBool,
}

impl RegistryInner {
    fn slots(&self) -> MutexGuard<'_, HashMap<SubjectId, Slot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop the subject's slot if it still holds `session_id`. A newer
    /// session for the same subject is left alone.
    fn evict(&self, subject_id: &SubjectId, session_id: &SessionId) {
        let mut slots = self.slots();
        let owned = matches!(
            slots.get(subject_id),
            Some(Slot::Open { session, .. }) if session.id() == session_id
        );
        if owned {
            slots.remove(subject_id);
        }
    }
}

/// Gives a session's tasks (and `cancel`) the single way to end it.
#[derive(Clone)]
pub(crate) struct SessionControl {
    inner: Arc<RegistryInner>,
    session: Arc<Session>,
}

impl SessionControl {
    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Perform the terminal transition. Only the caller that wins the
    /// compare-and-set notifies the sink and evicts the session; everyone
    /// else gets `false` and must not act.
    pub(crate) fn finish(&self, outcome: SessionOutcome) -> bool {
        if !self.session.try_finish(&outcome) {
            return false;
        }

        let notice = SessionNotice {
            session_id: self.session.id().clone(),
            subject_id: self.session.subject_id().clone(),
            device_id: self.session.device_id().clone(),
            started_at: self.session.started_at(),
            finished_at: self.inner.clock.now(),
            outcome,
        };
        info!(
            "session {} for subject {} is {}",
            notice.session_id,
            notice.subject_id,
            notice.outcome.state().as_str()
        );

        self.inner.sink.notify(notice);
        self.inner.evict(self.session.subject_id(), self.session.id());
        true
    }
}

/// Frees a reserved subject slot if `open` never got to fill it, including
/// when the `open` future itself is dropped mid-creation.
struct Reservation<'a> {
    inner: &'a RegistryInner,
    subject_id: SubjectId,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = self.inner.slots();
        if matches!(slots.get(&self.subject_id), Some(Slot::Opening)) {
            slots.remove(&self.subject_id);
        }
    }
}

/// Coordinates device measurement sessions, at most one active per subject.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        source: Arc<dyn ReadingSource>,
        sink: Arc<dyn NotificationSink>,
        settings: CaptureSettings,
    ) -> anyhow::Result<Self> {
        Self::with_clock(backend, source, sink, settings, Arc::new(AnchoredClock::new()))
    }

    pub fn with_clock(
        backend: Arc<dyn CaptureBackend>,
        source: Arc<dyn ReadingSource>,
        sink: Arc<dyn NotificationSink>,
        settings: CaptureSettings,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        settings
            .validate()
            .context("refusing to start session registry")?;

        Ok(Self {
            inner: Arc::new(RegistryInner {
                backend,
                source,
                sink,
                clock,
                settings,
                slots: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.inner.settings
    }

    /// Start a capture for `subject_id` on `device_id`.
    ///
    /// Fails with `Conflict` while the subject has an active session or one
    /// being opened. Creation failures come back here and nothing is
    /// notified, since the session never became active.
    ///
    /// If `shutdown` runs while the creation call is in flight, the remote
    /// session is settled as `Failed` without starting its tasks and the
    /// caller gets `ShuttingDown`.
    pub async fn open(
        &self,
        subject_id: SubjectId,
        device_id: DeviceId,
    ) -> RegistryResult<SessionHandle> {
        let inner = &self.inner;

        {
            let mut slots = inner.slots();
            if inner.closed.load(Ordering::Acquire) {
                return Err(RegistryError::ShuttingDown);
            }
            let busy = match slots.get(&subject_id) {
                Some(Slot::Opening) => true,
                Some(Slot::Open { session, .. }) => session.is_active(),
                None => false,
            };
            if busy {
                return Err(RegistryError::Conflict(subject_id));
            }
            slots.insert(subject_id.clone(), Slot::Opening);
        }
        let mut reservation = Reservation {
            inner: inner.as_ref(),
            subject_id: subject_id.clone(),
            armed: true,
        };

        // Stamp the start before the remote call so a reading captured while
        // it is in flight still counts as new.
        let started_at = inner.clock.now();
        let started = Instant::now();

        let session_id = match inner
            .backend
            .create_capture_session(&subject_id, &device_id)
            .await
        {
            Ok(session_id) => session_id,
            Err(err) => {
                warn!(
                    "failed to start measurement for subject {} on device {}: {}",
                    subject_id, device_id, err
                );
                return Err(err.into());
            }
        };

        let created_at = inner.clock.now();
        let timeout = inner.settings.session_timeout();
        let session = Arc::new(Session::new(
            session_id,
            subject_id.clone(),
            device_id,
            started_at,
            created_at,
            chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX),
        ));
        let control = SessionControl {
            inner: inner.clone(),
            session: session.clone(),
        };

        let registered = {
            let mut slots = inner.slots();
            if inner.closed.load(Ordering::Acquire) {
                false
            } else {
                let poller = tokio::spawn(poll_loop(
                    control.clone(),
                    inner.source.clone(),
                    started,
                    inner.settings.poll_interval(),
                    inner.settings.fetch_timeout(),
                ));
                let guard = tokio::spawn(deadline_guard(control.clone(), started + timeout));
                slots.insert(
                    subject_id,
                    Slot::Open {
                        session: session.clone(),
                        tasks: vec![poller, guard],
                    },
                );
                reservation.armed = false;
                true
            }
        };

        if !registered {
            drop(reservation);
            warn!(
                "registry shut down while session {} was being created",
                session.id()
            );
            control.finish(SessionOutcome::Failed(
                "registry shut down before the session started".to_string(),
            ));
            return Err(RegistryError::ShuttingDown);
        }

        info!(
            "opened session {} for subject {} on device {} (deadline {}, creation window {}ms)",
            session.id(),
            session.subject_id(),
            session.device_id(),
            session.deadline(),
            session.creation_window().num_milliseconds()
        );

        Ok(SessionHandle { session })
    }

    /// Cancel an active session. Returns `NotActive` without notifying again
    /// when the session already ended or is unknown.
    pub fn cancel(&self, session_id: &SessionId) -> RegistryResult<()> {
        let session = self
            .inner
            .slots()
            .values()
            .find_map(|slot| match slot {
                Slot::Open { session, .. } if session.id() == session_id => Some(session.clone()),
                _ => None,
            })
            .ok_or_else(|| RegistryError::NotActive(session_id.clone()))?;

        let control = SessionControl {
            inner: self.inner.clone(),
            session,
        };
        if control.finish(SessionOutcome::Cancelled) {
            Ok(())
        } else {
            Err(RegistryError::NotActive(session_id.clone()))
        }
    }

    pub fn snapshot(&self, subject_id: &SubjectId) -> Option<SessionSnapshot> {
        match self.inner.slots().get(subject_id) {
            Some(Slot::Open { session, .. }) => Some(session.snapshot()),
            _ => None,
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Open { session, .. } if session.is_active()))
            .count()
    }

    /// Cancel every active session and wait for all of their tasks to stop.
    /// Later `open` calls, and those still creating, fail with
    /// `ShuttingDown`.
    pub async fn shutdown(&self) {
        let open: Vec<(Arc<Session>, Vec<JoinHandle<()>>)> = {
            let mut slots = self.inner.slots();
            self.inner.closed.store(true, Ordering::Release);
            let subjects: Vec<SubjectId> = slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Open { .. }))
                .map(|(subject_id, _)| subject_id.clone())
                .collect();
            subjects
                .into_iter()
                .filter_map(|subject_id| match slots.remove(&subject_id) {
                    Some(Slot::Open { session, tasks }) => Some((session, tasks)),
                    _ => None,
                })
                .collect()
        };

        info!("shutting down {} measurement session(s)", open.len());

        for (session, tasks) in open {
            let control = SessionControl {
                inner: self.inner.clone(),
                session,
            };
            control.finish(SessionOutcome::Cancelled);
            for task in tasks {
                if let Err(err) = task.await {
                    error!(
                        "session {} task failed to join: {}",
                        control.session().id(),
                        err
                    );
                }
            }
        }
    }
}
