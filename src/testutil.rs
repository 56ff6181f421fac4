//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::api::{ApiError, LogoutOutcome, SessionApi};
use crate::config::{ApiConfig, Config, IdleConfig, SessionConfig, StorageConfig};
use crate::identity::Identity;
use crate::logout::Navigator;
use crate::storage::Database;
use crate::{Origin, Tab};

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard. The caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A `Config` with the production timings.
pub fn test_config() -> Config {
    Config {
        api: ApiConfig::default(),
        idle: IdleConfig::default(),
        session: SessionConfig::default(),
        storage: StorageConfig {
            data_dir: "/tmp/test".to_string(),
        },
    }
}

pub fn make_identity(id: &str) -> Identity {
    Identity {
        email: format!("user{id}@example.com"),
        id: id.to_string(),
        is_logged_in: true,
        name: format!("User {id}"),
        role: "admin".to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
enum MockBehavior {
    Answer(LogoutOutcome),
    Fail,
    Hang,
}

/// `SessionApi` that records every logout call.
#[derive(Debug)]
pub struct MockApi {
    behavior: MockBehavior,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new(outcome: LogoutOutcome) -> Self {
        Self::with_behavior(MockBehavior::Answer(outcome))
    }

    /// Every call fails at the network layer.
    pub fn failing() -> Self {
        Self::with_behavior(MockBehavior::Fail)
    }

    /// Every call stays in flight forever.
    pub fn hanging() -> Self {
        Self::with_behavior(MockBehavior::Hang)
    }

    fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// User ids of every logout call so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionApi for MockApi {
    async fn logout_user(&self, user_id: &str) -> Result<LogoutOutcome, ApiError> {
        self.calls.lock().unwrap().push(user_id.to_string());
        match self.behavior {
            MockBehavior::Answer(outcome) => Ok(outcome),
            MockBehavior::Fail => {
                // A builder error stands in for a failed connection
                let err = reqwest::Client::new()
                    .post("not a url")
                    .build()
                    .unwrap_err();
                Err(ApiError::Network(err))
            }
            MockBehavior::Hang => std::future::pending().await,
        }
    }
}

/// `Navigator` that records every route it was asked for.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}

/// An origin backed by a temporary database and a `MockApi`.
pub struct TestOrigin {
    pub api: Arc<MockApi>,
    pub origin: Origin,
    _temp: TempDir,
}

impl TestOrigin {
    pub fn new(api: MockApi) -> Self {
        let (db, temp) = setup_db();
        let api = Arc::new(api);
        let origin = Origin::new(test_config(), db, api.clone());
        Self {
            api,
            origin,
            _temp: temp,
        }
    }

    /// Open a signed-in tab. Returns its navigator alongside.
    pub fn open_tab(&self, user_id: &str) -> (Tab, Arc<RecordingNavigator>) {
        let navigator = Arc::new(RecordingNavigator::default());
        let tab = self
            .origin
            .open_tab(Some(make_identity(user_id)), navigator.clone());
        (tab, navigator)
    }
}
