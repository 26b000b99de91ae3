use crate::models::{Reading, SourceKind};

use super::Session;

/// Whether `reading` can be attributed to `session`.
///
/// Same subject, captured by a device, and strictly after the session's start
/// stamp. A reading taken exactly at `started_at` belongs to whatever came
/// before.
pub fn matches(session: &Session, reading: &Reading) -> bool {
    reading.subject_id == *session.subject_id()
        && reading.source == SourceKind::Device
        && reading.captured_at > session.started_at()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubjectId, VitalSigns};
    use crate::session::state::tests::session_at;
    use chrono::{Duration, Utc};

    fn reading(subject: u64, source: SourceKind, offset_secs: i64) -> (Session, Reading) {
        let start = Utc::now();
        let session = session_at(42, start);
        let reading = Reading::new(
            SubjectId::from(subject),
            source,
            start + Duration::seconds(offset_secs),
            VitalSigns::default(),
        );
        (session, reading)
    }

    #[test]
    fn accepts_fresh_device_reading() {
        let (session, reading) = reading(42, SourceKind::Device, 12);
        assert!(matches(&session, &reading));
    }

    #[test]
    fn rejects_reading_taken_before_start() {
        let (session, reading) = reading(42, SourceKind::Device, -5);
        assert!(!matches(&session, &reading));
    }

    #[test]
    fn rejects_reading_taken_exactly_at_start() {
        let (session, reading) = reading(42, SourceKind::Device, 0);
        assert!(!matches(&session, &reading));
    }

    #[test]
    fn rejects_manual_entry() {
        let (session, reading) = reading(42, SourceKind::Manual, 5);
        assert!(!matches(&session, &reading));
    }

    #[test]
    fn rejects_other_subject() {
        let (session, reading) = reading(7, SourceKind::Device, 5);
        assert!(!matches(&session, &reading));
    }

    #[test]
    fn payload_does_not_participate() {
        let (session, mut reading) = reading(42, SourceKind::Device, 1);
        reading.values = VitalSigns {
            blood_pressure: Some("not/a/pressure".into()),
            temperature: Some(-300.0),
            ..Default::default()
        };
        reading.record_id = None;
        assert!(matches(&session, &reading));
    }
}
