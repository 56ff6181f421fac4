//! session-sync - cross-tab session expiry and logout coordination
//!
//! Every open tab of an application runs its own session actor. Tabs talk
//! over a same-origin broadcast bus and share one small flag store:
//! - Idle detection per tab, raising a logout warning with a countdown
//! - Warning, extend and logout mirrored to every other tab
//! - Logout finalized locally first, then confirmed with the server once
//! - Degrades to single-tab behaviour when the bus is unavailable

pub mod api;
pub mod broadcast;
pub mod config;
pub mod identity;
pub mod idle;
pub mod logout;
pub mod session;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use api::SessionApi;
use broadcast::{BroadcastChannel, BroadcastHub};
use config::Config;
use identity::{Identity, IdentityStore};
use idle::{ActivityKind, IdleHandle};
use logout::{LogoutContext, LogoutExecutor, Navigator, RequestScope};
use session::{SessionCommand, SessionHandle, SessionState};
use storage::{Database, SessionFlag};

/// State shared by every tab of one application origin.
pub struct Origin {
    pub api: Arc<dyn SessionApi>,
    pub config: Config,
    pub db: Database,
    pub hub: BroadcastHub,
}

impl Origin {
    pub fn new(config: Config, db: Database, api: Arc<dyn SessionApi>) -> Self {
        let hub = BroadcastHub::new(config.session.channel_capacity);
        Self {
            api,
            config,
            db,
            hub,
        }
    }

    /// Open a tab connected to the origin's broadcast bus.
    ///
    /// An `identity` passed here is taken as already signed in and is not
    /// persisted; use [`Tab::login`] to record a fresh sign-in.
    pub fn open_tab(&self, identity: Option<Identity>, navigator: Arc<dyn Navigator>) -> Tab {
        let tab_id = Uuid::new_v4();
        self.open_tab_with_channel(self.hub.open(tab_id), identity, navigator)
    }

    /// Open a tab whose broadcast transport is blocked.
    pub fn open_isolated_tab(
        &self,
        identity: Option<Identity>,
        navigator: Arc<dyn Navigator>,
    ) -> Tab {
        let channel = BroadcastChannel::unavailable(Uuid::new_v4());
        warn!(tab = %channel.tab_id(), "Broadcast transport unavailable, tab runs alone");
        self.open_tab_with_channel(channel, identity, navigator)
    }

    fn open_tab_with_channel(
        &self,
        channel: BroadcastChannel,
        identity: Option<Identity>,
        navigator: Arc<dyn Navigator>,
    ) -> Tab {
        let id = channel.tab_id();
        let session_config = &self.config.session;

        let mut initial = SessionState::new(session_config.countdown_seconds);
        initial.logged_out = identity.is_none();
        let (state_tx, _state_rx) = watch::channel(initial);
        let state = Arc::new(state_tx);

        let identity = IdentityStore::new(identity);
        let requests = Arc::new(RequestScope::new());

        let executor = LogoutExecutor::new(
            LogoutContext {
                api: Arc::clone(&self.api),
                channel: channel.clone(),
                flags: self.db.clone(),
                identity: identity.clone(),
                navigator,
                requests: Arc::clone(&requests),
                state: Arc::clone(&state),
            },
            session_config,
        );

        let session = session::start_session_coordinator(
            session_config,
            identity.clone(),
            channel,
            Arc::clone(&executor),
            state,
        );

        let commands = session.commands();
        let idle = idle::start_idle_detector(
            &self.config.idle,
            &identity,
            session.subscribe(),
            move || {
                let _ = commands.send(SessionCommand::Idle);
            },
        );

        info!(tab = %id, authenticated = identity.is_authenticated(), "Tab opened");

        Tab {
            db: self.db.clone(),
            executor,
            id,
            identity,
            idle,
            requests,
            session,
        }
    }
}

/// One open tab. Dropping it closes the tab and releases its timers and
/// subscriptions.
pub struct Tab {
    db: Database,
    executor: Arc<LogoutExecutor>,
    id: Uuid,
    identity: IdentityStore,
    idle: IdleHandle,
    requests: Arc<RequestScope>,
    session: SessionHandle,
}

impl Tab {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    /// Cancellation scope for the tab's application requests.
    pub fn requests(&self) -> &Arc<RequestScope> {
        &self.requests
    }

    pub fn executor(&self) -> &Arc<LogoutExecutor> {
        &self.executor
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Record a successful sign-in in this tab.
    pub fn login(&self, identity: Identity) {
        info!(tab = %self.id, user_id = %identity.id, "Logged in");
        if let Err(e) = self.db.set_flag(SessionFlag::IsLoggedIn, true) {
            warn!(error = %e, "Failed to persist login flag");
        }
        if let Err(e) = self.db.remove_flag(SessionFlag::IsLoggedOut) {
            warn!(error = %e, "Failed to clear logged-out flag");
        }
        self.identity.set(identity);
    }

    pub fn activity(&self, kind: ActivityKind) {
        self.idle.record(kind);
    }

    /// Force the warning modal, e.g. after a 403 from the API.
    pub fn trigger_session_expire(&self) {
        self.session.send(SessionCommand::TriggerSessionExpire);
    }

    pub fn extend_session(&self) {
        self.session.send(SessionCommand::ExtendSession);
    }

    pub fn logout(&self) {
        self.session.send(SessionCommand::Logout);
    }

    /// "Ok" on the expired modal.
    pub fn acknowledge(&self) {
        self.session.send(SessionCommand::Acknowledge);
    }

    pub fn hide_modal(&self) {
        self.session.send(SessionCommand::HideModal);
    }

    pub fn dismiss_alert(&self) {
        self.session.send(SessionCommand::DismissAlert);
    }
}
