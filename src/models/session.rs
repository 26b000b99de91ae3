use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DeviceId, Reading, SessionId, SubjectId};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Pending,
    Active,
    Completed,
    TimedOut,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "Pending",
            SessionState::Active => "Active",
            SessionState::Completed => "Completed",
            SessionState::TimedOut => "TimedOut",
            SessionState::Cancelled => "Cancelled",
            SessionState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::TimedOut
                | SessionState::Cancelled
                | SessionState::Failed
        )
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            SessionState::Pending => 0,
            SessionState::Active => 1,
            SessionState::Completed => 2,
            SessionState::TimedOut => 3,
            SessionState::Cancelled => 4,
            SessionState::Failed => 5,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Active,
            2 => SessionState::Completed,
            3 => SessionState::TimedOut,
            4 => SessionState::Cancelled,
            5 => SessionState::Failed,
            _ => SessionState::Pending,
        }
    }
}

/// How a session ended. Exactly one of these is delivered per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum SessionOutcome {
    Completed(Reading),
    TimedOut,
    Cancelled,
    Failed(String),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Completed(_) => SessionState::Completed,
            SessionOutcome::TimedOut => SessionState::TimedOut,
            SessionOutcome::Cancelled => SessionState::Cancelled,
            SessionOutcome::Failed(_) => SessionState::Failed,
        }
    }

    pub fn reading(&self) -> Option<&Reading> {
        match self {
            SessionOutcome::Completed(reading) => Some(reading),
            _ => None,
        }
    }
}

/// Event name used when notices are forwarded to a UI layer.
pub const SESSION_FINISHED_EVENT: &str = "measurement-session-finished";

/// Terminal notification handed to the sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotice {
    pub session_id: SessionId,
    pub subject_id: SubjectId,
    pub device_id: DeviceId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: SessionOutcome,
}

/// Read-only view of a session as currently held by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub subject_id: SubjectId,
    pub device_id: DeviceId,
    pub started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub state: SessionState,
    pub result: Option<Reading>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceKind, VitalSigns};

    #[test]
    fn only_outcome_states_are_terminal() {
        assert_eq!(SessionState::default(), SessionState::Pending);
        assert!(!SessionState::Pending.is_terminal());
        assert!(!SessionState::Active.is_terminal());
        for state in [
            SessionState::Completed,
            SessionState::TimedOut,
            SessionState::Cancelled,
            SessionState::Failed,
        ] {
            assert!(state.is_terminal(), "{} should be terminal", state.as_str());
            assert_eq!(SessionState::from_u8(state.to_u8()), state);
        }
    }

    #[test]
    fn notice_serializes_with_tagged_outcome() {
        let started_at = Utc::now();
        let reading = Reading::new(
            SubjectId::from(42),
            SourceKind::Device,
            started_at,
            VitalSigns {
                heart_rate: Some(72.0),
                ..Default::default()
            },
        );
        let notice = SessionNotice {
            session_id: SessionId::from("9"),
            subject_id: SubjectId::from(42),
            device_id: DeviceId::from(1),
            started_at,
            finished_at: started_at,
            outcome: SessionOutcome::Completed(reading),
        };

        let value = serde_json::to_value(&notice).unwrap();
        assert_eq!(value["sessionId"], "9");
        assert_eq!(value["outcome"]["kind"], "completed");
        assert_eq!(value["outcome"]["detail"]["source"], "device");
        assert_eq!(value["outcome"]["detail"]["values"]["heartRate"], 72.0);

        let failed = serde_json::to_value(SessionOutcome::Failed("gone".into())).unwrap();
        assert_eq!(failed["kind"], "failed");
        assert_eq!(failed["detail"], "gone");
    }
}
