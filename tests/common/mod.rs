#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Duration, Instant};
use vitals_capture::{
    AnchoredClock, CaptureSettings, ChannelSink, Clock, InMemoryBackend, Reading, SessionNotice,
    SessionRegistry, SourceKind, SubjectId, VitalSigns,
};

pub struct Harness {
    pub backend: InMemoryBackend,
    pub registry: SessionRegistry,
    pub notices: UnboundedReceiver<SessionNotice>,
    pub clock: AnchoredClock,
    pub t0: Instant,
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Registry over an in-memory backend with the default 2s/60s cadence.
/// Must be called inside a paused runtime; `t = 0` is the moment of the call.
pub fn harness() -> Harness {
    harness_with(CaptureSettings::default())
}

pub fn harness_with(settings: CaptureSettings) -> Harness {
    let backend = InMemoryBackend::new();
    let clock = AnchoredClock::starting_at(epoch());
    let (sink, notices) = ChannelSink::new();
    let registry = SessionRegistry::with_clock(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        Arc::new(sink),
        settings,
        Arc::new(clock.clone()),
    )
    .expect("valid settings");

    Harness {
        backend,
        registry,
        notices,
        clock,
        t0: Instant::now(),
    }
}

impl Harness {
    /// Wall time `secs` after the harness was built.
    pub fn at(&self, secs: f64) -> DateTime<Utc> {
        epoch() + chrono::Duration::milliseconds((secs * 1_000.0) as i64)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn elapsed(&self) -> Duration {
        self.t0.elapsed()
    }

    pub async fn next_notice(&mut self) -> SessionNotice {
        tokio::time::timeout(Duration::from_secs(600), self.notices.recv())
            .await
            .expect("no notice within 600s")
            .expect("notice channel closed")
    }

    /// Publish a reading `delay` from now, stamped with the clock at that
    /// moment.
    pub fn publish_after(&self, delay: Duration, subject: u64, source: SourceKind) {
        let backend = self.backend.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            backend.publish(reading(subject, source, clock.now()));
        });
    }
}

pub fn reading(subject: u64, source: SourceKind, captured_at: DateTime<Utc>) -> Reading {
    Reading::new(
        SubjectId::from(subject),
        source,
        captured_at,
        VitalSigns {
            blood_pressure: Some("118/76".into()),
            temperature: Some(36.7),
            spo2: Some(98.0),
            heart_rate: Some(71.0),
        },
    )
}
