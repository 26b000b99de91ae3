use log::{info, warn};
use tokio::sync::mpsc;

use crate::models::{SessionNotice, SessionOutcome, SESSION_FINISHED_EVENT};

/// Receives the single terminal notice of every session.
///
/// Called from whichever task won the terminal transition, so implementations
/// must not block.
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, notice: SessionNotice);
}

/// Forwards notices over an unbounded channel to a UI or workflow task.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionNotice>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notice: SessionNotice) {
        let session_id = notice.session_id.clone();
        if self.tx.send(notice).is_err() {
            warn!("dropping {SESSION_FINISHED_EVENT} for session {session_id}: receiver closed");
        }
    }
}

/// Writes each outcome to the log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notice: SessionNotice) {
        match &notice.outcome {
            SessionOutcome::Completed(reading) => info!(
                "{SESSION_FINISHED_EVENT}: session {} for subject {} completed with reading captured at {}",
                notice.session_id, notice.subject_id, reading.captured_at
            ),
            SessionOutcome::TimedOut => warn!(
                "{SESSION_FINISHED_EVENT}: session {} for subject {} timed out, check device {} connection",
                notice.session_id, notice.subject_id, notice.device_id
            ),
            SessionOutcome::Cancelled => info!(
                "{SESSION_FINISHED_EVENT}: session {} for subject {} cancelled",
                notice.session_id, notice.subject_id
            ),
            SessionOutcome::Failed(reason) => warn!(
                "{SESSION_FINISHED_EVENT}: session {} for subject {} failed: {}",
                notice.session_id, notice.subject_id, reason
            ),
        }
    }
}
