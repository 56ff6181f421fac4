//! Logout, performed once per session across all tabs.
//!
//! Local state is finalized before the server is told (finalize-before-confirm):
//! the tab reaches the logged-out state even if the request never completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::navigator::Navigator;
use super::scope::RequestScope;
use crate::api::SessionApi;
use crate::broadcast::{BroadcastChannel, BroadcastMessage, LOGOUT_MODAL_SYNC};
use crate::config::SessionConfig;
use crate::identity::IdentityStore;
use crate::session::{Alert, SessionState};
use crate::storage::{Database, SessionFlag};

pub const LOGOUT_ERROR_MESSAGE: &str = "An error occurred while processing your request. \
     Please try again later or contact the site administrator.";

/// Where the decision to log out was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOrigin {
    /// This tab: user action, countdown exhaustion or the "Ok" button
    Local,
    /// Another tab broadcast `LOGOUT`
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutDisposition {
    /// Finalized here and the server notification was sent off
    Started,
    /// Finalized here after another tab's logout; no server call
    Followed,
    /// A guard tripped; nothing was done
    Suppressed,
}

/// Everything the executor acts on, owned by the tab.
pub struct LogoutContext {
    pub api: Arc<dyn SessionApi>,
    pub channel: BroadcastChannel,
    pub flags: Database,
    pub identity: IdentityStore,
    pub navigator: Arc<dyn Navigator>,
    pub requests: Arc<RequestScope>,
    pub state: Arc<watch::Sender<SessionState>>,
}

pub struct LogoutExecutor {
    ctx: LogoutContext,
    /// Local re-entrancy guard, held for one logout attempt
    in_progress: AtomicBool,
    login_route: String,
    redirect_delay: Duration,
}

impl LogoutExecutor {
    pub fn new(ctx: LogoutContext, config: &SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            in_progress: AtomicBool::new(false),
            login_route: config.login_route.clone(),
            redirect_delay: config.redirect_delay(),
        })
    }

    /// Log out. Never fails; network errors end up as an alert in the session state.
    pub fn execute(self: &Arc<Self>, origin: LogoutOrigin) -> LogoutDisposition {
        match origin {
            LogoutOrigin::Local => self.execute_local(),
            LogoutOrigin::Remote => self.follow_remote(),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn execute_local(self: &Arc<Self>) -> LogoutDisposition {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Logout already in progress in this tab");
            return LogoutDisposition::Suppressed;
        }

        let Some(identity) = self.ctx.identity.current() else {
            self.in_progress.store(false, Ordering::SeqCst);
            debug!("Logout requested with no identity present");
            return LogoutDisposition::Suppressed;
        };

        // Check-then-set: two tabs can both pass before either writes.
        // The server side tolerates the duplicate call.
        if self.ctx.flags.flag_is_set(SessionFlag::LogoutInProgress) {
            self.in_progress.store(false, Ordering::SeqCst);
            debug!("Another tab is logging out");
            return LogoutDisposition::Suppressed;
        }
        if let Err(e) = self.ctx.flags.set_flag(SessionFlag::LogoutInProgress, true) {
            warn!(error = %e, "Failed to persist logout guard");
        }

        self.ctx.requests.cancel_and_renew();
        self.ctx
            .channel
            .send(LOGOUT_MODAL_SYNC, BroadcastMessage::Logout);

        self.finalize();
        self.ctx.state.send_modify(|s| {
            s.alert = None;
            s.is_loading = true;
            s.logout_in_progress = true;
        });

        info!(user_id = %identity.id, "Logged out, notifying server");

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.notify_server(&identity.id).await;
        });

        LogoutDisposition::Started
    }

    fn follow_remote(&self) -> LogoutDisposition {
        if self.is_in_progress() || !self.ctx.identity.is_authenticated() {
            return LogoutDisposition::Suppressed;
        }

        self.ctx.requests.cancel_and_renew();
        self.finalize();
        info!("Logged out by another tab");
        LogoutDisposition::Followed
    }

    /// Commit the logged-out state locally. Safe to repeat.
    fn finalize(&self) {
        self.ctx.identity.clear();
        self.ctx.state.send_modify(|s| {
            s.is_session_expired = false;
            s.logged_out = true;
            s.show_logout_modal = false;
            s.synced_countdown = None;
        });

        if let Err(e) = self.ctx.flags.set_flags(&[
            (SessionFlag::IsLoggedIn, false),
            (SessionFlag::IsLoggedOut, true),
            (SessionFlag::LogoutInProgress, false),
        ]) {
            warn!(error = %e, "Failed to persist logged-out flags");
        }

        // Give the login view time to mount before redirecting
        let navigator = Arc::clone(&self.ctx.navigator);
        let route = self.login_route.clone();
        let delay = self.redirect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            navigator.navigate(&route);
        });
    }

    async fn notify_server(&self, user_id: &str) {
        let alert = match self.ctx.api.logout_user(user_id).await {
            Ok(outcome) if outcome.is_success() => {
                debug!(user_id, ?outcome, "Server confirmed logout");
                None
            }
            Ok(outcome) => {
                warn!(user_id, ?outcome, "Server rejected logout");
                Some(Alert::error(LOGOUT_ERROR_MESSAGE))
            }
            Err(e) => {
                warn!(user_id, error = %e, "Logout request failed");
                Some(Alert::error(LOGOUT_ERROR_MESSAGE))
            }
        };

        self.ctx.state.send_modify(|s| {
            s.alert = alert;
            s.is_loading = false;
            s.logout_in_progress = false;
        });
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LogoutOutcome;
    use crate::broadcast::BroadcastHub;
    use crate::testutil::{make_identity, setup_db, test_config, MockApi, RecordingNavigator};
    use tempfile::TempDir;
    use uuid::Uuid;

    struct Fixture {
        api: Arc<MockApi>,
        db: Database,
        executor: Arc<LogoutExecutor>,
        hub: BroadcastHub,
        identity: IdentityStore,
        navigator: Arc<RecordingNavigator>,
        requests: Arc<RequestScope>,
        state: watch::Receiver<SessionState>,
        _temp: TempDir,
    }

    fn fixture(api: MockApi) -> Fixture {
        let (db, temp) = setup_db();
        let config = test_config();
        let hub = BroadcastHub::new(16);
        let api = Arc::new(api);
        let navigator = Arc::new(RecordingNavigator::default());
        let identity = IdentityStore::new(Some(make_identity("u-1")));
        let requests = Arc::new(RequestScope::new());
        let (state_tx, state) = watch::channel(SessionState::new(15));

        let executor = LogoutExecutor::new(
            LogoutContext {
                api: api.clone(),
                channel: hub.open(Uuid::new_v4()),
                flags: db.clone(),
                identity: identity.clone(),
                navigator: navigator.clone(),
                requests: Arc::clone(&requests),
                state: Arc::new(state_tx),
            },
            &config.session,
        );

        Fixture {
            api,
            db,
            executor,
            hub,
            identity,
            navigator,
            requests,
            state,
            _temp: temp,
        }
    }

    fn settle() -> tokio::time::Sleep {
        tokio::time::sleep(Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_logout_calls_server_once() {
        let f = fixture(MockApi::new(LogoutOutcome::LoggedOut));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let executor = Arc::clone(&f.executor);
                tokio::spawn(async move { executor.execute(LogoutOrigin::Local) })
            })
            .collect();
        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() == LogoutDisposition::Started {
                started += 1;
            }
        }
        settle().await;

        // Attempts after the first attempt completed
        assert_eq!(
            f.executor.execute(LogoutOrigin::Local),
            LogoutDisposition::Suppressed
        );
        assert_eq!(
            f.executor.execute(LogoutOrigin::Remote),
            LogoutDisposition::Suppressed
        );
        settle().await;

        assert_eq!(started, 1);
        assert_eq!(f.api.calls(), vec!["u-1".to_string()]);
        assert_eq!(f.db.get_flag(SessionFlag::IsLoggedIn).unwrap(), Some(false));
        assert_eq!(f.db.get_flag(SessionFlag::IsLoggedOut).unwrap(), Some(true));
        assert_eq!(
            f.db.get_flag(SessionFlag::LogoutInProgress).unwrap(),
            Some(false)
        );
        assert_eq!(f.navigator.routes(), vec!["/login".to_string()]);
        assert!(!f.executor.is_in_progress());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalizes_before_server_answers() {
        let f = fixture(MockApi::hanging());

        assert_eq!(
            f.executor.execute(LogoutOrigin::Local),
            LogoutDisposition::Started
        );

        // Nothing from the server yet, local state is already final
        let state = f.state.borrow().clone();
        assert!(state.logged_out);
        assert!(!state.show_logout_modal);
        assert!(state.is_loading);
        assert!(f.identity.current().is_none());
        assert!(!f.db.flag_is_set(SessionFlag::IsLoggedIn));
        assert!(f.db.flag_is_set(SessionFlag::IsLoggedOut));

        settle().await;
        assert_eq!(f.navigator.routes(), vec!["/login".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persisted_guard_suppresses_logout() {
        let f = fixture(MockApi::new(LogoutOutcome::LoggedOut));
        f.db.set_flag(SessionFlag::LogoutInProgress, true).unwrap();

        assert_eq!(
            f.executor.execute(LogoutOrigin::Local),
            LogoutDisposition::Suppressed
        );
        settle().await;
        assert!(f.api.calls().is_empty());
        assert!(f.identity.is_authenticated());

        // The local guard did not outlive the attempt
        assert!(!f.executor.is_in_progress());
        f.db.set_flag(SessionFlag::LogoutInProgress, false).unwrap();
        assert_eq!(
            f.executor.execute(LogoutOrigin::Local),
            LogoutDisposition::Started
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_is_treated_as_success() {
        let f = fixture(MockApi::new(LogoutOutcome::AlreadyUnauthorized));
        f.executor.execute(LogoutOrigin::Local);
        settle().await;

        let state = f.state.borrow().clone();
        assert!(state.alert.is_none());
        assert!(!state.is_loading);
        assert!(state.logged_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_raises_alert_but_stays_logged_out() {
        let f = fixture(MockApi::new(LogoutOutcome::Rejected(500)));
        f.executor.execute(LogoutOrigin::Local);
        settle().await;

        let state = f.state.borrow().clone();
        assert_eq!(
            state.alert.map(|a| a.message),
            Some(LOGOUT_ERROR_MESSAGE.to_string())
        );
        assert!(state.logged_out);
        assert!(!state.logout_in_progress);
        assert!(f.db.flag_is_set(SessionFlag::IsLoggedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_raises_alert() {
        let f = fixture(MockApi::failing());
        f.executor.execute(LogoutOrigin::Local);
        settle().await;

        assert!(f.state.borrow().alert.is_some());
        assert!(f.state.borrow().logged_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_logout_broadcasts_and_cancels_requests() {
        let f = fixture(MockApi::new(LogoutOutcome::LoggedOut));
        let mut other_tab = f.hub.open(Uuid::new_v4()).subscribe(LOGOUT_MODAL_SYNC);
        let in_flight = f.requests.token();

        f.executor.execute(LogoutOrigin::Local);

        assert!(in_flight.is_cancelled());
        assert!(!f.requests.token().is_cancelled());
        assert_eq!(other_tab.recv().await, Some(BroadcastMessage::Logout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_logout_follows_without_server_call() {
        let f = fixture(MockApi::new(LogoutOutcome::LoggedOut));
        // The originating tab may not have cleared the shared guard yet
        f.db.set_flag(SessionFlag::LogoutInProgress, true).unwrap();
        let mut other_tab = f.hub.open(Uuid::new_v4()).subscribe(LOGOUT_MODAL_SYNC);

        assert_eq!(
            f.executor.execute(LogoutOrigin::Remote),
            LogoutDisposition::Followed
        );
        settle().await;

        assert!(f.api.calls().is_empty());
        assert!(f.state.borrow().logged_out);
        assert!(f.identity.current().is_none());
        assert_eq!(f.navigator.routes(), vec!["/login".to_string()]);

        // No re-broadcast
        let echoed = tokio::time::timeout(Duration::from_millis(50), other_tab.recv()).await;
        assert!(echoed.is_err());
    }
}
