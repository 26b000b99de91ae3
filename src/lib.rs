//! Device measurement session coordinator.
//!
//! Opens a capture on a vitals kiosk through the clinic backend, polls for the
//! patient's newest reading, and settles every session exactly once as
//! completed, timed out, cancelled or failed.

pub mod clock;
pub mod error;
pub mod models;
pub mod notify;
pub mod session;
pub mod settings;
pub mod source;
mod utils;

pub use clock::{AnchoredClock, Clock};
pub use error::{RegistryError, RegistryResult, SourceError, SourceResult};
pub use models::{
    DeviceId, Reading, SessionId, SessionNotice, SessionOutcome, SessionSnapshot, SessionState,
    SourceKind, SubjectId, VitalSigns, SESSION_FINISHED_EVENT,
};
pub use notify::{ChannelSink, LogSink, NotificationSink};
pub use session::{matches, Session, SessionHandle, SessionRegistry};
pub use settings::{CaptureSettings, SettingsStore};
pub use source::{CaptureBackend, HttpBackend, InMemoryBackend, ReadingSource};
pub use utils::init_logging;
