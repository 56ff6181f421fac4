//! Idle timer for one tab.

use std::collections::BTreeSet;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::activity::ActivityKind;
use crate::config::IdleConfig;
use crate::identity::IdentityStore;
use crate::session::{Phase, SessionState};

/// Handle to a running idle detector. Dropping it stops the detector.
#[derive(Debug)]
pub struct IdleHandle {
    activity_tx: mpsc::UnboundedSender<ActivityKind>,
    task: JoinHandle<()>,
}

impl IdleHandle {
    /// Report a user input event observed in this tab.
    pub fn record(&self, kind: ActivityKind) {
        let _ = self.activity_tx.send(kind);
    }
}

impl Drop for IdleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start the idle detector for a tab.
///
/// `on_idle` runs once per idle period, after `timeout` without a counted
/// activity event, and only while an identity is present. Events outside the
/// configured set are ignored, and events closer than `debounce` to the last
/// counted one are coalesced into it.
///
/// The timer also restarts whenever `session` returns to
/// [`Phase::Active`], e.g. after the warning is extended in this tab or in
/// another one.
pub fn start_idle_detector<F>(
    config: &IdleConfig,
    identity: &IdentityStore,
    mut session: watch::Receiver<SessionState>,
    mut on_idle: F,
) -> IdleHandle
where
    F: FnMut() + Send + 'static,
{
    let timeout = config.timeout();
    let debounce = config.debounce();
    let events: BTreeSet<ActivityKind> = config.activity_events.clone();
    let mut identity_rx = identity.subscribe();
    let mut last_phase = session.borrow_and_update().phase();
    let (activity_tx, mut activity_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut deadline = Instant::now() + timeout;
        let mut fired = false;
        let mut last_counted: Option<Instant> = None;
        let mut identity_open = true;
        let mut session_open = true;

        loop {
            let armed = !fired && identity_rx.borrow().is_some();

            tokio::select! {
                kind = activity_rx.recv() => {
                    let Some(kind) = kind else { break };
                    if !events.contains(&kind) {
                        continue;
                    }

                    let now = Instant::now();
                    let within_burst = last_counted.is_some_and(|last| now.duration_since(last) < debounce);
                    if within_burst && !fired {
                        continue;
                    }

                    trace!(%kind, "Activity resets idle timer");
                    last_counted = Some(now);
                    deadline = now + timeout;
                    fired = false;
                }
                changed = identity_rx.changed(), if identity_open => {
                    if changed.is_err() {
                        identity_open = false;
                        continue;
                    }
                    if identity_rx.borrow_and_update().is_some() {
                        // A fresh login starts a fresh idle period
                        deadline = Instant::now() + timeout;
                        fired = false;
                        last_counted = None;
                    }
                }
                changed = session.changed(), if session_open => {
                    if changed.is_err() {
                        session_open = false;
                        continue;
                    }
                    let phase = session.borrow_and_update().phase();
                    let resumed = phase == Phase::Active && last_phase != Phase::Active;
                    last_phase = phase;
                    if resumed {
                        trace!("Session resumed, idle timer restarted");
                        deadline = Instant::now() + timeout;
                        fired = false;
                        last_counted = None;
                    }
                }
                _ = tokio::time::sleep_until(deadline), if armed => {
                    fired = true;
                    debug!(timeout_ms = timeout.as_millis() as u64, "User idle");
                    on_idle();
                }
            }
        }
    });

    IdleHandle { activity_tx, task }
}
