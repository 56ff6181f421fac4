//! Per-tab session state machine: logout modal, expiry flag and countdown.

mod coordinator;
mod state;

pub use coordinator::{start_session_coordinator, SessionCommand, SessionHandle};
pub use state::{Alert, AlertKind, Phase, SessionState, SyncedCountdown};
