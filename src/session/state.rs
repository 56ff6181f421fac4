use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Coarse state of the session as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// No modal
    Active,
    /// Modal shown, countdown running, session can still be extended
    Warning,
    /// Modal shown, session is over
    Expired,
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Error,
}

/// A dismissible banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Error,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

/// A countdown value reported by another tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncedCountdown {
    pub received_at: Instant,
    pub value: u32,
}

/// In-memory session state of one tab. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub alert: Option<Alert>,
    /// Seconds left before automatic logout; meaningful only while the modal is shown
    pub countdown: u32,
    pub is_loading: bool,
    pub is_session_expired: bool,
    pub logged_out: bool,
    pub logout_in_progress: bool,
    pub show_logout_modal: bool,
    /// Last countdown reported by another tab
    #[serde(skip)]
    pub synced_countdown: Option<SyncedCountdown>,
}

impl SessionState {
    pub fn new(countdown: u32) -> Self {
        Self {
            alert: None,
            countdown,
            is_loading: false,
            is_session_expired: false,
            logged_out: false,
            logout_in_progress: false,
            show_logout_modal: false,
            synced_countdown: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.logged_out {
            Phase::LoggedOut
        } else if !self.show_logout_modal {
            Phase::Active
        } else if self.is_session_expired {
            Phase::Expired
        } else {
            Phase::Warning
        }
    }

    /// Countdown to display: the local value, pulled down by a peer that is further along.
    pub fn display_countdown(&self) -> u32 {
        self.display_countdown_at(Instant::now())
    }

    pub fn display_countdown_at(&self, now: Instant) -> u32 {
        match self.synced_countdown {
            Some(synced) => {
                let elapsed = now.saturating_duration_since(synced.received_at).as_secs();
                let aged = u64::from(synced.value).saturating_sub(elapsed) as u32;
                aged.min(self.countdown)
            }
            None => self.countdown,
        }
    }

    pub fn title(&self) -> &'static str {
        if self.is_session_expired {
            "Session Expired"
        } else {
            "Session Timed Out"
        }
    }

    pub fn message(&self) -> String {
        if self.is_session_expired {
            "Your session has timed out. To continue working, please log in again.".to_string()
        } else {
            format!(
                "Your session is about to expire in {} seconds. Do you want to extend your session?",
                self.display_countdown()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_phase_derivation() {
        let mut state = SessionState::new(15);
        assert_eq!(state.phase(), Phase::Active);

        state.show_logout_modal = true;
        assert_eq!(state.phase(), Phase::Warning);

        state.is_session_expired = true;
        assert_eq!(state.phase(), Phase::Expired);
        assert_eq!(state.title(), "Session Expired");

        state.logged_out = true;
        assert_eq!(state.phase(), Phase::LoggedOut);
    }

    #[test]
    fn test_display_countdown_prefers_lower_peer_value() {
        let now = Instant::now();
        let mut state = SessionState::new(12);
        assert_eq!(state.display_countdown_at(now), 12);

        state.synced_countdown = Some(SyncedCountdown {
            received_at: now,
            value: 10,
        });
        assert_eq!(state.display_countdown_at(now), 10);
        assert_eq!(state.display_countdown_at(now + Duration::from_millis(2500)), 8);

        state.synced_countdown = Some(SyncedCountdown {
            received_at: now,
            value: 14,
        });
        assert_eq!(state.display_countdown_at(now), 12);
    }

    #[tokio::test]
    async fn test_message_uses_display_countdown() {
        let mut state = SessionState::new(12);
        state.synced_countdown = Some(SyncedCountdown {
            received_at: Instant::now(),
            value: 10,
        });
        assert!(state.message().contains("expire in 10 seconds"));
    }
}
