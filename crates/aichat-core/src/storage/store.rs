use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::Row;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::mutation::{Mutation, SessionSnapshot};
use crate::models::{Author, Message, Session, SessionFilter, SessionSort};

/// Migrations applied in order. Each entry is (version, sql).
/// To add a new migration: append a tuple with the next version number and its SQL.
/// Never edit or remove existing entries, existing databases depend on them.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS sessions (
        id               TEXT    PRIMARY KEY,
        title            TEXT    NOT NULL DEFAULT '',
        created_at       INTEGER NOT NULL,
        last_modified_at INTEGER NOT NULL,
        is_archived      INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS messages (
        id         TEXT    PRIMARY KEY,
        session_id TEXT    NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        content    TEXT    NOT NULL DEFAULT '',
        is_user    INTEGER NOT NULL,
        timestamp  INTEGER NOT NULL,
        position   INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_last_modified_at
        ON sessions (last_modified_at DESC);
    CREATE INDEX IF NOT EXISTS idx_messages_session_position
        ON messages (session_id, position)",
)];

const SESSION_COLUMNS: &str = "id, title, created_at, last_modified_at, is_archived";
const MESSAGE_COLUMNS: &str = "id, session_id, content, is_user, timestamp";

/// Where the store keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    InMemory,
    File(PathBuf),
}

impl StoreLocation {
    /// `<config_dir>/aichat/chat.db`
    pub fn default_file() -> StoreResult<Self> {
        dirs::config_dir()
            .ok_or_else(|| StoreError::InitializationError {
                message: "Cannot find config directory".into(),
            })
            .map(|p| StoreLocation::File(p.join("aichat").join("chat.db")))
    }
}

struct Backend {
    pool: SqlitePool,
    location: StoreLocation,
}

/// SQLite-backed store for sessions and their messages.
///
/// Writes are staged with [`Store::stage`] (or the typed helpers) and only
/// reach the database on [`Store::commit`], which applies the whole batch in
/// one transaction. Deleting a session cascades to its messages through the
/// foreign key on `messages.session_id`.
pub struct Store {
    requested: StoreLocation,
    backend: RwLock<Backend>,
    pending: Mutex<Vec<Mutation>>,
    /// Held shared by commits and queries, exclusively by a reset
    gate: tokio::sync::RwLock<()>,
}

impl Store {
    /// Open (or create) the store.
    ///
    /// A file store that cannot be opened is replaced by an in-memory one;
    /// an error is returned only when even that fallback fails.
    pub async fn open(location: StoreLocation) -> StoreResult<Self> {
        let backend = Self::open_backend(&location).await?;
        Ok(Self {
            requested: location,
            backend: RwLock::new(backend),
            pending: Mutex::new(Vec::new()),
            gate: tokio::sync::RwLock::new(()),
        })
    }

    pub async fn open_in_memory() -> StoreResult<Self> {
        Self::open(StoreLocation::InMemory).await
    }

    async fn open_backend(location: &StoreLocation) -> StoreResult<Backend> {
        match Self::connect(location).await {
            Ok(pool) => Ok(Backend {
                pool,
                location: location.clone(),
            }),
            Err(e) if *location != StoreLocation::InMemory => {
                warn!(error = %e, ?location, "Failed to open chat database, using in-memory fallback");
                let pool = Self::connect(&StoreLocation::InMemory).await?;
                Ok(Backend {
                    pool,
                    location: StoreLocation::InMemory,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn connect(location: &StoreLocation) -> StoreResult<SqlitePool> {
        let pool = match location {
            StoreLocation::InMemory => {
                // Every connection to :memory: is its own database, so keep
                // exactly one connection alive for the lifetime of the pool.
                let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await?
            }
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    tokio::fs::create_dir_all(parent).await?;
                }

                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .foreign_keys(true);

                SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect_with(options)
                    .await?
            }
        };

        Self::run_migrations(&pool).await?;

        info!(?location, "Opened chat database");

        Ok(pool)
    }

    /// Create the schema_version table if absent, then apply any pending migrations.
    async fn run_migrations(pool: &SqlitePool) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // Seed version 0 if the table is empty (fresh database).
        sqlx::query("INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)")
            .execute(pool)
            .await?;

        let current: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                info!(version, "Applying schema migration");
                // sqlx doesn't support multiple statements in a single query call,
                // so split on ';' and execute each statement individually.
                for statement in sql.split(';') {
                    let trimmed = statement.trim();
                    if !trimmed.is_empty() {
                        sqlx::query(trimmed).execute(pool).await?;
                    }
                }
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }

    fn pool(&self) -> SqlitePool {
        self.backend.read().pool.clone()
    }

    /// The location actually in use, which differs from the requested one
    /// after an in-memory fallback.
    pub fn location(&self) -> StoreLocation {
        self.backend.read().location.clone()
    }

    pub fn is_in_memory(&self) -> bool {
        self.location() == StoreLocation::InMemory
    }

    /// True when a file store was requested but the in-memory fallback is active
    pub fn is_fallback(&self) -> bool {
        self.requested != StoreLocation::InMemory && self.is_in_memory()
    }

    pub fn stage(&self, mutation: Mutation) {
        debug!(kind = mutation.kind(), "Staging mutation");
        self.pending.lock().push(mutation);
    }

    /// Stage a new session row along with any messages it already owns
    pub fn insert_session(&self, session: &Session) {
        self.stage(Mutation::InsertSession(SessionSnapshot::from(session)));
        for (position, message) in session.messages().iter().enumerate() {
            self.insert_message(message, position as i64);
        }
    }

    pub fn update_session(&self, session: &Session) {
        self.stage(Mutation::UpdateSession(SessionSnapshot::from(session)));
    }

    pub fn delete_session(&self, session_id: Uuid) {
        self.stage(Mutation::DeleteSession(session_id));
    }

    pub fn insert_message(&self, message: &Message, position: i64) {
        self.stage(Mutation::InsertMessage {
            message: message.clone(),
            position,
        });
    }

    pub fn delete_message(&self, message_id: Uuid) {
        self.stage(Mutation::DeleteMessage(message_id));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Apply every staged mutation in one transaction.
    ///
    /// On failure the transaction is rolled back and the batch is dropped;
    /// callers must re-query to observe the true state.
    pub async fn commit(&self) -> StoreResult<usize> {
        let _gate = self.gate.read().await;
        self.flush().await
    }

    async fn flush(&self) -> StoreResult<usize> {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return Ok(0);
        }

        let pool = self.pool();
        let mut tx = pool.begin().await?;
        for mutation in &batch {
            Self::apply(&mut tx, mutation).await?;
        }
        tx.commit().await?;

        debug!(count = batch.len(), "Committed mutations");
        Ok(batch.len())
    }

    async fn apply(conn: &mut SqliteConnection, mutation: &Mutation) -> StoreResult<()> {
        match mutation {
            Mutation::InsertSession(s) => {
                sqlx::query(
                    "INSERT INTO sessions (id, title, created_at, last_modified_at, is_archived)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .bind(s.id.to_string())
                .bind(&s.title)
                .bind(s.created_at.timestamp_millis())
                .bind(s.last_modified_at.timestamp_millis())
                .bind(s.is_archived)
                .execute(&mut *conn)
                .await?;
            }
            Mutation::UpdateSession(s) => {
                sqlx::query(
                    "UPDATE sessions
                     SET title = ?1, last_modified_at = ?2, is_archived = ?3
                     WHERE id = ?4",
                )
                .bind(&s.title)
                .bind(s.last_modified_at.timestamp_millis())
                .bind(s.is_archived)
                .bind(s.id.to_string())
                .execute(&mut *conn)
                .await?;
            }
            Mutation::DeleteSession(id) => {
                sqlx::query("DELETE FROM sessions WHERE id = ?")
                    .bind(id.to_string())
                    .execute(&mut *conn)
                    .await?;
            }
            Mutation::InsertMessage { message, position } => {
                sqlx::query(
                    "INSERT INTO messages (id, session_id, content, is_user, timestamp, position)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .bind(message.id().to_string())
                .bind(message.session_id().to_string())
                .bind(message.content())
                .bind(message.is_user())
                .bind(message.timestamp().timestamp_millis())
                .bind(*position)
                .execute(&mut *conn)
                .await?;
            }
            Mutation::DeleteMessage(id) => {
                sqlx::query("DELETE FROM messages WHERE id = ?")
                    .bind(id.to_string())
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }

    /// Fetch sessions with their messages fully loaded, in insertion order
    pub async fn query_sessions(
        &self,
        filter: SessionFilter,
        sort: SessionSort,
    ) -> StoreResult<Vec<Session>> {
        let _gate = self.gate.read().await;
        let pool = self.pool();

        let where_clause = match filter {
            SessionFilter::All => "",
            SessionFilter::Id(_) => " WHERE id = ?",
            SessionFilter::Archived(_) => " WHERE is_archived = ?",
        };
        let sql = format!(
            "SELECT {} FROM sessions{} ORDER BY {}",
            SESSION_COLUMNS,
            where_clause,
            sort.order_by()
        );

        let query = match filter {
            SessionFilter::All => sqlx::query(&sql),
            SessionFilter::Id(id) => sqlx::query(&sql).bind(id.to_string()),
            SessionFilter::Archived(archived) => sqlx::query(&sql).bind(archived),
        };
        let rows = query.fetch_all(&pool).await?;

        let message_scope = match filter {
            SessionFilter::Id(id) => Some(id),
            _ => None,
        };
        let mut messages_by_session: HashMap<Uuid, Vec<Message>> = HashMap::new();
        for message in Self::load_messages(&pool, message_scope).await? {
            messages_by_session
                .entry(message.session_id())
                .or_default()
                .push(message);
        }

        rows.iter()
            .map(|row| -> StoreResult<Session> {
                let id = parse_uuid(row.try_get("id")?)?;
                let messages = messages_by_session.remove(&id).unwrap_or_default();
                Ok(Session::from_parts(
                    id,
                    row.try_get("title")?,
                    parse_millis(row.try_get("created_at")?)?,
                    parse_millis(row.try_get("last_modified_at")?)?,
                    row.try_get("is_archived")?,
                    messages,
                ))
            })
            .collect()
    }

    /// Fetch messages, optionally restricted to one session
    pub async fn query_messages(&self, session_id: Option<Uuid>) -> StoreResult<Vec<Message>> {
        let _gate = self.gate.read().await;
        let pool = self.pool();
        Self::load_messages(&pool, session_id).await
    }

    async fn load_messages(pool: &SqlitePool, session_id: Option<Uuid>) -> StoreResult<Vec<Message>> {
        let rows = match session_id {
            Some(id) => {
                let sql = format!(
                    "SELECT {} FROM messages WHERE session_id = ? ORDER BY position ASC",
                    MESSAGE_COLUMNS
                );
                sqlx::query(&sql).bind(id.to_string()).fetch_all(pool).await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM messages ORDER BY session_id ASC, position ASC",
                    MESSAGE_COLUMNS
                );
                sqlx::query(&sql).fetch_all(pool).await?
            }
        };

        rows.iter().map(message_from_row).collect()
    }

    /// Trivial query against each table; false if either fails
    pub async fn health_check(&self) -> bool {
        let _gate = self.gate.read().await;
        let pool = self.pool();
        for table in ["sessions", "messages"] {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            if let Err(e) = sqlx::query_scalar::<_, i64>(&sql).fetch_one(&pool).await {
                warn!(table, error = %e, "Database health check failed");
                return false;
            }
        }
        true
    }

    /// Delete every record, discard the storage file and recreate the schema.
    ///
    /// Any failure along the way leaves the store running on a fresh
    /// in-memory database.
    pub async fn reset(&self) {
        // Nothing is seeded, so there is nothing left to fail
        self.reset_with(&[]).await.ok();
    }

    /// Reset, then insert `seed` before any commit or query can run, so no
    /// reader ever sees the store between the wipe and the seed.
    pub async fn reset_with(&self, seed: &[Session]) -> StoreResult<usize> {
        let _gate = self.gate.write().await;

        let dropped = std::mem::take(&mut *self.pending.lock()).len();
        if dropped > 0 {
            warn!(dropped, "Discarding staged mutations before reset");
        }

        let old_pool = self.pool();
        let result = Self::rebuild(&old_pool, &self.requested).await;

        let backend = match result {
            Ok(pool) => {
                info!(location = ?self.requested, "Database successfully reset");
                Backend {
                    pool,
                    location: self.requested.clone(),
                }
            }
            Err(e) => {
                error!(error = %e, "Error resetting database, switching to in-memory store");
                match Self::connect(&StoreLocation::InMemory).await {
                    Ok(pool) => Backend {
                        pool,
                        location: StoreLocation::InMemory,
                    },
                    Err(e) => {
                        error!(error = %e, "Failed to create even an in-memory database");
                        return Err(e);
                    }
                }
            }
        };

        *self.backend.write() = backend;

        for session in seed {
            self.insert_session(session);
        }
        self.flush().await
    }

    async fn rebuild(old_pool: &SqlitePool, location: &StoreLocation) -> StoreResult<SqlitePool> {
        // Errors here are not fatal: the file is about to be removed anyway.
        if let Err(e) = sqlx::query("DELETE FROM messages").execute(old_pool).await {
            warn!(error = %e, "Failed to delete messages during reset");
        }
        if let Err(e) = sqlx::query("DELETE FROM sessions").execute(old_pool).await {
            warn!(error = %e, "Failed to delete sessions during reset");
        }
        old_pool.close().await;

        if let StoreLocation::File(path) = location {
            for file in database_files(path) {
                match tokio::fs::remove_file(&file).await {
                    Ok(()) => debug!(path = %file.display(), "Removed database file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Self::connect(location).await
    }
}

/// The database file plus the WAL and shared-memory files SQLite keeps beside it
fn database_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name: OsString = path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

fn message_from_row(row: &SqliteRow) -> StoreResult<Message> {
    let is_user: bool = row.try_get("is_user")?;
    Ok(Message::from_parts(
        parse_uuid(row.try_get("id")?)?,
        row.try_get("content")?,
        Author::from_is_user(is_user),
        parse_millis(row.try_get("timestamp")?)?,
        parse_uuid(row.try_get("session_id")?)?,
    ))
}

fn parse_uuid(raw: String) -> StoreResult<Uuid> {
    Uuid::parse_str(&raw).map_err(|e| StoreError::InvalidData {
        message: format!("invalid id {:?}: {}", raw, e),
    })
}

fn parse_millis(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::InvalidData {
        message: format!("timestamp out of range: {}", millis),
    })
}
