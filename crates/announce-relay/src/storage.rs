//! SQLite persistence for registered users and their authorization flag.
//!
//! The schema matches the `users.db` files already deployed with the bot,
//! so an existing database is picked up unchanged.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use announce_core::{DirectoryError, Profile, Recipient, RecipientId, UserDirectory};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

const RECIPIENT_COLUMNS: &str = "tg_id, first_name, last_name, username, language_code, is_authorized";

/// Persistent storage backed by SQLite.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read/write performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Self::init(conn).inspect(|_| info!("Database opened: {}", path.display()))
    }

    /// Open a private database that lives as long as the handle.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                table_id      INTEGER PRIMARY KEY,
                tg_id         INTEGER UNIQUE,
                first_name    TEXT,
                last_name     TEXT,
                username      TEXT,
                language_code TEXT,
                is_authorized INTEGER DEFAULT 0
            );"
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a user unless the id is already known. Returns true if inserted.
    pub fn add_user(&self, id: RecipientId, profile: &Profile) -> Result<bool, rusqlite::Error> {
        let conn = self.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (tg_id, first_name, last_name, username, language_code, is_authorized)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![id, profile.first_name, profile.last_name, profile.username, profile.language_code],
        )?;
        Ok(inserted > 0)
    }

    /// Whether the user may submit broadcasts. Unknown users may not.
    pub fn is_user_authorized(&self, id: RecipientId) -> Result<bool, rusqlite::Error> {
        let conn = self.lock();
        let flag: Option<Option<i64>> = conn
            .query_row(
                "SELECT is_authorized FROM users WHERE tg_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.flatten() == Some(1))
    }

    /// Set the authorization flag. Returns the number of rows changed.
    pub fn set_authorization(&self, id: RecipientId, authorized: bool) -> Result<usize, rusqlite::Error> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE users SET is_authorized = ?1 WHERE tg_id = ?2",
            params![authorized as i64, id],
        )?;
        info!("User {id} authorization set to {authorized} ({rows} rows updated)");
        Ok(rows)
    }

    pub fn get_user(&self, id: RecipientId) -> Result<Option<Recipient>, rusqlite::Error> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {RECIPIENT_COLUMNS} FROM users WHERE tg_id = ?1"),
            params![id],
            map_recipient_row,
        )
        .optional()
    }

    /// All users in registration order.
    pub fn list_users(&self) -> Result<Vec<Recipient>, rusqlite::Error> {
        self.query_users(&format!("SELECT {RECIPIENT_COLUMNS} FROM users ORDER BY table_id"))
    }

    /// Authorized users in registration order.
    pub fn list_authorized_users(&self) -> Result<Vec<Recipient>, rusqlite::Error> {
        self.query_users(&format!(
            "SELECT {RECIPIENT_COLUMNS} FROM users WHERE is_authorized = 1 ORDER BY table_id"
        ))
    }

    fn query_users(&self, sql: &str) -> Result<Vec<Recipient>, rusqlite::Error> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let users = stmt
            .query_map([], map_recipient_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

fn map_recipient_row(row: &rusqlite::Row) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: row.get(0)?,
        first_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        last_name: row.get(2)?,
        username: row.get(3)?,
        language_code: row.get(4)?,
        authorized: row.get::<_, Option<i64>>(5)? == Some(1),
    })
}

#[async_trait]
impl UserDirectory for Storage {
    async fn is_authorized(&self, id: RecipientId) -> Result<bool, DirectoryError> {
        self.is_user_authorized(id).map_err(DirectoryError::unavailable)
    }

    async fn register_if_absent(
        &self,
        id: RecipientId,
        profile: &Profile,
    ) -> Result<bool, DirectoryError> {
        self.add_user(id, profile).map_err(DirectoryError::unavailable)
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>, DirectoryError> {
        self.list_users().map_err(DirectoryError::unavailable)
    }

    async fn list_authorized_recipients(&self) -> Result<Vec<Recipient>, DirectoryError> {
        self.list_authorized_users().map_err(DirectoryError::unavailable)
    }

    async fn set_authorized(
        &self,
        id: RecipientId,
        authorized: bool,
    ) -> Result<usize, DirectoryError> {
        self.set_authorization(id, authorized).map_err(DirectoryError::unavailable)
    }

    async fn get(&self, id: RecipientId) -> Result<Option<Recipient>, DirectoryError> {
        self.get_user(id).map_err(DirectoryError::unavailable)
    }
}
