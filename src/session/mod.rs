pub mod filter;
mod guard;
mod poller;
pub mod registry;
pub mod state;

pub use filter::matches;
pub use registry::{SessionHandle, SessionRegistry};
pub use state::Session;
