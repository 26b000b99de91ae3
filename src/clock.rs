use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of wall-clock timestamps for session start and deadlines.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock pinned to a monotonic anchor.
///
/// `now()` is the wall time at construction plus the monotonic time elapsed
/// since, so NTP steps never move a session's start backwards. Because it is
/// built on `tokio::time::Instant` it also follows a paused test runtime.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    wall_anchor: DateTime<Utc>,
    anchor: Instant,
}

impl AnchoredClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall_anchor: DateTime<Utc>) -> Self {
        Self {
            wall_anchor,
            anchor: Instant::now(),
        }
    }
}

impl Default for AnchoredClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_anchor + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn follows_tokio_time() {
        let epoch = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = AnchoredClock::starting_at(epoch);
        assert_eq!(clock.now(), epoch);

        tokio::time::advance(Duration::from_secs(12)).await;
        assert_eq!(clock.now(), epoch + chrono::Duration::seconds(12));
    }
}
