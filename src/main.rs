use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_sync::api::HttpSessionApi;
use session_sync::broadcast::LOGOUT_MODAL_SYNC;
use session_sync::config::Config;
use session_sync::identity::Identity;
use session_sync::idle::ActivityKind;
use session_sync::logout::LogNavigator;
use session_sync::storage::Database;
use session_sync::{Origin, Tab};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "session-sync starting");

    let config = Config::load()?;
    let db = Database::open(&config.storage.data_dir)?;
    info!("Flag store opened at: {}", config.storage.data_dir);

    if db.take_logged_out_notice()? {
        info!("You have been logged out successfully");
    }

    let api = Arc::new(HttpSessionApi::new(&config.api)?);
    let origin = Origin::new(config, db, api);

    let tab = origin.open_tab(None, Arc::new(LogNavigator));
    if let Some(identity) = identity_from_env() {
        tab.login(identity);
    }

    // Trace every message other tabs put on the bus
    let _bus_trace = origin.hub.open(uuid::Uuid::new_v4()).listen(LOGOUT_MODAL_SYNC, |message| {
        tracing::debug!(?message, "Bus message");
    });

    let state_logger = spawn_state_logger(&tab);

    tokio::select! {
        result = command_loop(&tab) => result?,
        _ = shutdown_signal() => {},
    }

    state_logger.abort();
    info!("Shutdown complete");
    Ok(())
}

fn identity_from_env() -> Option<Identity> {
    let id = std::env::var("SESSION_USER_ID").ok()?;
    Some(Identity {
        email: std::env::var("SESSION_USER_EMAIL").unwrap_or_default(),
        id,
        is_logged_in: true,
        name: std::env::var("SESSION_USER_NAME").unwrap_or_default(),
        role: std::env::var("SESSION_USER_ROLE").unwrap_or_default(),
    })
}

fn spawn_state_logger(tab: &Tab) -> tokio::task::JoinHandle<()> {
    let mut rx = tab.session().subscribe();
    let tab_id = tab.id();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            info!(
                tab = %tab_id,
                phase = ?state.phase(),
                countdown = state.display_countdown(),
                loading = state.is_loading,
                "Session state changed"
            );
            if state.show_logout_modal {
                info!("{}: {}", state.title(), state.message());
            }
            if let Some(alert) = &state.alert {
                warn!("{}", alert.message);
            }
        }
    })
}

/// Read line commands from stdin until EOF or `quit`.
async fn command_loop(tab: &Tab) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("activity") => {
                let kind = words.next().unwrap_or("mousemove");
                match kind.parse::<ActivityKind>() {
                    Ok(kind) => tab.activity(kind),
                    Err(e) => warn!(error = %e, "Ignoring activity"),
                }
            }
            Some("expire") => tab.trigger_session_expire(),
            Some("extend") => tab.extend_session(),
            Some("logout") => tab.logout(),
            Some("ok") => tab.acknowledge(),
            Some("hide") => tab.hide_modal(),
            Some("dismiss") => tab.dismiss_alert(),
            Some("status") => {
                let state = tab.state();
                println!("{}", serde_json::to_string(&state)?);
            }
            Some("quit") => break,
            Some(other) => warn!(command = other, "Unknown command"),
            None => {}
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
