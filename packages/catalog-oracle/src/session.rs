//! Scoped store sessions.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use catalog_core::{HarnessError, Result};

/// One connection, opened for a single oracle operation and closed on drop.
pub(crate) struct Session {
    conn: Connection,
}

impl Session {
    /// Opens the database read-write. A missing database file is an error,
    /// never an implicit create.
    pub(crate) fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            HarnessError::StoreUnavailable(format!(
                "Failed to open {}: {}",
                path.display(),
                e
            ))
        })?;
        conn.busy_timeout(busy_timeout).map_err(store_error)?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(store_error)?;
        tracing::debug!(path = %path.display(), "store session acquired");
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!("store session released");
    }
}

/// Maps a SQLite failure to `StoreUnavailable`.
pub(crate) fn store_error(e: rusqlite::Error) -> HarnessError {
    HarnessError::StoreUnavailable(e.to_string())
}
