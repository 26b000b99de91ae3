mod ids;
mod reading;
mod session;

pub use ids::{DeviceId, SessionId, SubjectId};
pub use reading::{Reading, SourceKind, VitalSigns};
pub use session::{
    SessionNotice, SessionOutcome, SessionSnapshot, SessionState, SESSION_FINISHED_EVENT,
};
