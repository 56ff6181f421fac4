//! The per-tab session actor.
//!
//! One task owns all transitions for a tab. It consumes local commands,
//! messages from other tabs, its own countdown ticker and identity changes,
//! and publishes the resulting [`SessionState`] on a watch channel.
//!
//! Every transition is idempotent so that broadcast ordering does not
//! matter: a late `EXTEND_SESSION` on a hidden modal or a second `LOGOUT`
//! is a no-op.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use super::state::{Phase, SessionState, SyncedCountdown};
use crate::broadcast::{BroadcastChannel, BroadcastMessage, Subscription, LOGOUT_MODAL_SYNC};
use crate::config::SessionConfig;
use crate::identity::{Identity, IdentityStore};
use crate::logout::{LogoutExecutor, LogoutOrigin};

/// Inputs raised inside the tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// "Ok" on the expired modal
    Acknowledge,
    DismissAlert,
    ExtendSession,
    /// Hide the modal in every tab without changing the session
    HideModal,
    /// The idle detector fired
    Idle,
    Logout,
    /// The API layer saw an authorization-expired response
    TriggerSessionExpire,
}

/// Handle to a tab's session actor. Dropping it stops the actor.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            warn!(?command, "Session coordinator is gone");
        }
    }

    /// Sender usable from callbacks such as the idle detector.
    pub fn commands(&self) -> mpsc::UnboundedSender<SessionCommand> {
        self.commands.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Coordinator {
    channel: BroadcastChannel,
    config: SessionConfig,
    executor: Arc<LogoutExecutor>,
    identity: IdentityStore,
    state: Arc<watch::Sender<SessionState>>,
    tab_id: Uuid,
    /// Countdown ticker, present only while the warning modal is shown
    ticker: Option<Interval>,
}

/// Start the session actor of a tab.
///
/// `state` is shared with the logout executor, which finalizes logouts
/// directly on it.
pub fn start_session_coordinator(
    config: &SessionConfig,
    identity: IdentityStore,
    channel: BroadcastChannel,
    executor: Arc<LogoutExecutor>,
    state: Arc<watch::Sender<SessionState>>,
) -> SessionHandle {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let state_rx = state.subscribe();
    let subscription = channel.subscribe(LOGOUT_MODAL_SYNC);
    let identity_rx = identity.subscribe();

    let coordinator = Coordinator {
        tab_id: channel.tab_id(),
        channel,
        config: config.clone(),
        executor,
        identity,
        state,
        ticker: None,
    };
    let task = tokio::spawn(coordinator.run(command_rx, subscription, identity_rx));

    SessionHandle {
        commands,
        state: state_rx,
        task,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut subscription: Subscription,
        mut identity_rx: watch::Receiver<Option<Identity>>,
    ) {
        // The identity may have changed between construction and first poll
        let identity = identity_rx.borrow_and_update().clone();
        self.on_identity_change(identity);

        let mut bus_open = true;
        let mut identity_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                message = subscription.recv(), if bus_open => match message {
                    Some(message) => self.handle_remote(message),
                    None => {
                        warn!(tab = %self.tab_id, "Broadcast bus closed, continuing single-tab");
                        bus_open = false;
                    }
                },
                _ = next_tick(&mut self.ticker) => self.on_tick(),
                changed = identity_rx.changed(), if identity_open => {
                    if changed.is_err() {
                        identity_open = false;
                        continue;
                    }
                    let identity = identity_rx.borrow_and_update().clone();
                    self.on_identity_change(identity);
                }
            }
        }

        debug!(tab = %self.tab_id, "Session coordinator stopped");
    }

    fn phase(&self) -> Phase {
        self.state.borrow().phase()
    }

    fn handle_command(&mut self, command: SessionCommand) {
        debug!(tab = %self.tab_id, ?command, phase = ?self.phase(), "Session command");

        match command {
            SessionCommand::Idle => {
                if self.identity.is_authenticated() && self.phase() == Phase::Active {
                    let countdown = self.config.countdown_seconds;
                    self.channel.send(
                        LOGOUT_MODAL_SYNC,
                        BroadcastMessage::TriggerLogoutModal {
                            countdown: Some(countdown),
                        },
                    );
                    self.enter_warning(countdown);
                }
            }
            SessionCommand::TriggerSessionExpire => {
                if self.identity.is_authenticated() && self.phase() == Phase::Active {
                    self.enter_warning(self.config.countdown_seconds);
                }
            }
            SessionCommand::ExtendSession => {
                if self.phase() == Phase::Warning {
                    self.channel
                        .send(LOGOUT_MODAL_SYNC, BroadcastMessage::ExtendSession);
                    self.clear_modal();
                }
            }
            SessionCommand::Logout => {
                if self.phase() != Phase::LoggedOut {
                    self.expire_and_logout();
                }
            }
            SessionCommand::Acknowledge => {
                if self.phase() == Phase::Expired {
                    self.executor.execute(LogoutOrigin::Local);
                }
            }
            SessionCommand::HideModal => {
                if self.state.borrow().show_logout_modal {
                    self.channel
                        .send(LOGOUT_MODAL_SYNC, BroadcastMessage::HideLogoutModal);
                    self.hide_modal();
                }
            }
            SessionCommand::DismissAlert => {
                self.state.send_if_modified(|s| s.alert.take().is_some());
            }
        }
    }

    fn handle_remote(&mut self, message: BroadcastMessage) {
        debug!(tab = %self.tab_id, ?message, phase = ?self.phase(), "Message from another tab");

        match message {
            BroadcastMessage::TriggerLogoutModal { countdown } => {
                // A countdown already running is left alone
                if self.identity.is_authenticated() && self.phase() == Phase::Active {
                    self.enter_warning(countdown.unwrap_or(self.config.countdown_seconds));
                }
            }
            BroadcastMessage::ExtendSession => {
                if self.state.borrow().show_logout_modal {
                    self.clear_modal();
                }
            }
            BroadcastMessage::Logout => {
                self.ticker = None;
                self.executor.execute(LogoutOrigin::Remote);
            }
            BroadcastMessage::CountdownSync { countdown } => {
                self.state.send_if_modified(|s| {
                    if s.phase() != Phase::Warning {
                        return false;
                    }
                    s.synced_countdown = Some(SyncedCountdown {
                        received_at: Instant::now(),
                        value: countdown,
                    });
                    true
                });
            }
            BroadcastMessage::HideLogoutModal => {
                self.hide_modal();
            }
        }
    }

    /// One second of the local countdown.
    fn on_tick(&mut self) {
        if self.phase() != Phase::Warning {
            self.ticker = None;
            return;
        }

        let mut remaining = 0;
        self.state.send_modify(|s| {
            s.countdown = s.countdown.saturating_sub(1);
            remaining = s.countdown;
        });

        if remaining > 0 {
            // Display sync only, every tab keeps its own countdown
            self.channel.send(
                LOGOUT_MODAL_SYNC,
                BroadcastMessage::CountdownSync {
                    countdown: remaining,
                },
            );
        } else {
            debug!(tab = %self.tab_id, "Countdown exhausted");
            self.expire_and_logout();
        }
    }

    fn on_identity_change(&mut self, identity: Option<Identity>) {
        match identity {
            Some(identity) => {
                if self.phase() == Phase::LoggedOut {
                    debug!(tab = %self.tab_id, user_id = %identity.id, "Session started");
                    self.ticker = None;
                    self.state
                        .send_replace(SessionState::new(self.config.countdown_seconds));
                }
            }
            None => {
                self.ticker = None;
                self.state.send_if_modified(|s| {
                    if s.logged_out {
                        return false;
                    }
                    s.logged_out = true;
                    s.show_logout_modal = false;
                    s.is_session_expired = false;
                    true
                });
            }
        }
    }

    /// Show the warning modal with a fresh countdown.
    fn enter_warning(&mut self, countdown: u32) {
        debug!(tab = %self.tab_id, countdown, "Session about to expire");
        self.state.send_modify(|s| {
            s.countdown = countdown;
            s.is_session_expired = false;
            s.show_logout_modal = true;
            s.synced_countdown = None;
        });
        self.start_ticker();
    }

    fn expire_and_logout(&mut self) {
        self.ticker = None;
        self.state.send_modify(|s| {
            if s.show_logout_modal {
                s.is_session_expired = true;
            }
        });
        self.executor.execute(LogoutOrigin::Local);
    }

    fn clear_modal(&mut self) {
        self.ticker = None;
        let countdown = self.config.countdown_seconds;
        self.state.send_modify(|s| {
            s.countdown = countdown;
            s.is_session_expired = false;
            s.show_logout_modal = false;
            s.synced_countdown = None;
        });
    }

    fn hide_modal(&mut self) {
        self.ticker = None;
        self.state.send_if_modified(|s| {
            let was_shown = s.show_logout_modal;
            s.show_logout_modal = false;
            s.synced_countdown = None;
            was_shown
        });
    }

    fn start_ticker(&mut self) {
        let period = self.config.tick_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(interval);
    }
}
