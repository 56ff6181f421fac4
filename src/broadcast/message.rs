use serde::{Deserialize, Serialize};

/// The only logical channel used by the session core.
pub const LOGOUT_MODAL_SYNC: &str = "logout-modal-sync";

/// A message exchanged between tabs. Ephemeral and unacknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastMessage {
    TriggerLogoutModal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        countdown: Option<u32>,
    },
    ExtendSession,
    Logout,
    CountdownSync {
        countdown: u32,
    },
    HideLogoutModal,
}
