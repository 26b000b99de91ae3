use std::sync::Arc;

use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::models::SessionOutcome;
use crate::source::ReadingSource;

use super::filter::matches;
use super::registry::SessionControl;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Fetch the subject's latest reading every `interval` until the session
/// leaves `Active`.
///
/// The first fetch happens one interval after `start`. Fetch errors and
/// timeouts are logged and the next tick retries, whatever their kind.
pub(crate) async fn poll_loop(
    control: SessionControl,
    source: Arc<dyn ReadingSource>,
    start: Instant,
    interval: Duration,
    fetch_timeout: Duration,
) {
    let session = control.session().clone();
    let stop = session.stop_token().clone();

    let mut ticker = time::interval_at(start + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !session.is_active() {
            break;
        }
        ticks += 1;

        let fetch = time::timeout(fetch_timeout, source.latest_reading(session.subject_id()));
        let fetched = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            fetched = fetch => fetched,
        };

        match fetched {
            Ok(Ok(Some(reading))) if matches(&session, &reading) => {
                if control.finish(SessionOutcome::Completed(reading)) {
                    log_info!(
                        "session {} matched a device reading on tick {}",
                        session.id(),
                        ticks
                    );
                }
                break;
            }
            Ok(Ok(Some(reading))) => {
                log_debug!(
                    "session {} tick {}: ignoring {} reading captured at {} (started {})",
                    session.id(),
                    ticks,
                    reading.source.as_str(),
                    reading.captured_at,
                    session.started_at()
                );
            }
            Ok(Ok(None)) => {
                log_debug!("session {} tick {}: no reading yet", session.id(), ticks);
            }
            Ok(Err(err)) if err.is_transient() => {
                log_warn!("session {} tick {}: fetch failed: {}", session.id(), ticks, err);
            }
            Ok(Err(err)) => {
                // Only a terminal transition stops polling; the guard still
                // times the session out.
                log_warn!(
                    "session {} tick {}: source rejected the fetch: {}",
                    session.id(),
                    ticks,
                    err
                );
            }
            Err(_) => {
                log_warn!(
                    "session {} tick {}: fetch timed out (> {}ms)",
                    session.id(),
                    ticks,
                    fetch_timeout.as_millis()
                );
            }
        }
    }

    log_debug!("poller for session {} stopped after {} ticks", session.id(), ticks);
}
