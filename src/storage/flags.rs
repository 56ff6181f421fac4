use redb::ReadableTable;
use tracing::warn;

use super::db::{Database, DatabaseError};
use super::tables::*;

/// Coarse session flags persisted for every tab of the origin.
///
/// Values are stored as the strings `"true"` / `"false"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlag {
    IsLoggedIn,
    IsLoggedOut,
    LogoutInProgress,
}

impl SessionFlag {
    pub fn key(self) -> &'static str {
        match self {
            SessionFlag::IsLoggedIn => "isLoggedIn",
            SessionFlag::IsLoggedOut => "isLoggedOut",
            SessionFlag::LogoutInProgress => "logoutInProgress",
        }
    }
}

fn encode(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

impl Database {
    // ========================================================================
    // Flag operations
    // ========================================================================

    /// Read a flag. `None` when it was never written or has been removed.
    pub fn get_flag(&self, flag: SessionFlag) -> Result<Option<bool>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSION_FLAGS)?;

        let Some(value) = table.get(flag.key())? else {
            return Ok(None);
        };

        match value.value() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(DatabaseError::CorruptFlag {
                key: flag.key().to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Write a single flag
    pub fn set_flag(&self, flag: SessionFlag, value: bool) -> Result<(), DatabaseError> {
        self.set_flags(&[(flag, value)])
    }

    /// Write several flags in one transaction
    pub fn set_flags(&self, flags: &[(SessionFlag, bool)]) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_FLAGS)?;
            for (flag, value) in flags {
                table.insert(flag.key(), encode(*value))?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove a flag. Returns true if it was present.
    pub fn remove_flag(&self, flag: SessionFlag) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SESSION_FLAGS)?;
            let removed = table.remove(flag.key())?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Read a flag on a path that must not fail.
    ///
    /// Missing, corrupt and unreadable values all read as `false`.
    pub fn flag_is_set(&self, flag: SessionFlag) -> bool {
        match self.get_flag(flag) {
            Ok(value) => value.unwrap_or(false),
            Err(e) => {
                warn!(flag = flag.key(), error = %e, "Unreadable session flag, treating as unset");
                false
            }
        }
    }

    /// Consume the one-shot "logged out successfully" notice shown by the login view.
    pub fn take_logged_out_notice(&self) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let was_logged_out = {
            let mut table = write_txn.open_table(SESSION_FLAGS)?;
            let removed = table.remove(SessionFlag::IsLoggedOut.key())?;
            let was_logged_out = removed.is_some_and(|v| v.value() == "true");
            was_logged_out
        };
        write_txn.commit()?;
        Ok(was_logged_out)
    }
}
