use tokio::time::{self, Instant};

use crate::models::SessionOutcome;

use super::registry::SessionControl;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Time the session out at `deadline` unless it ends first.
pub(crate) async fn deadline_guard(control: SessionControl, deadline: Instant) {
    let session = control.session().clone();

    tokio::select! {
        biased;
        _ = session.stop_token().cancelled() => {
            log_debug!("deadline guard for session {} stood down", session.id());
        }
        _ = time::sleep_until(deadline) => {
            if control.finish(SessionOutcome::TimedOut) {
                log_info!(
                    "session {} for subject {} timed out at {}",
                    session.id(),
                    session.subject_id(),
                    session.deadline()
                );
            }
        }
    }
}
