//! ScyllaDB-backed `SessionStore` for production: a hot TTL'd table, a
//! no-TTL cold archive table, and a TTL'd lease table (spec §4.1).
//!
//! Mirrors the reference `persistence::client::ScyllaClient` and
//! `persistence::schema` — a `SessionBuilder` connection plus hand-written
//! `CREATE TABLE IF NOT EXISTS` DDL run once at startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use scylla::{Session, SessionBuilder};
use tokio::sync::Notify;
use voice_core::CoreMemory;

use crate::error::{Result, SessionError};
use crate::store::{ColdStore, SessionStore};

#[derive(Debug, Clone)]
pub struct ScyllaSessionConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl Default for ScyllaSessionConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1:9042".to_string()],
            keyspace: "voice_agent".to_string(),
            replication_factor: 1,
        }
    }
}

pub struct ScyllaSessionStore {
    session: Arc<Session>,
    keyspace: String,
    // Lease-conflict wakeups are process-local only: a second server
    // process racing against this one for the same session won't observe
    // these, since there is nothing in `session_leases` for it to poll.
    // The within-process case this guards is the one `SessionManager`
    // actually has to reconcile (spec §2).
    lease_notifiers: RwLock<HashMap<String, Arc<Notify>>>,
}

impl ScyllaSessionStore {
    pub async fn connect(config: ScyllaSessionConfig) -> Result<Self> {
        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .build()
            .await
            .map_err(|e| SessionError::Unavailable(format!("scylla connect: {e}")))?;

        let store = Self {
            session: Arc::new(session),
            keyspace: config.keyspace.clone(),
            lease_notifiers: RwLock::new(HashMap::new()),
        };
        store.ensure_schema(config.replication_factor).await?;
        Ok(store)
    }

    async fn ensure_schema(&self, replication_factor: u8) -> Result<()> {
        let ks = &self.keyspace;
        self.run(&format!(
            "CREATE KEYSPACE IF NOT EXISTS {ks} WITH replication = \
             {{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}"
        ))
        .await?;

        self.run(&format!(
            "CREATE TABLE IF NOT EXISTS {ks}.sessions (
                session_id TEXT PRIMARY KEY,
                memory_json TEXT,
                version BIGINT,
                last_write TIMESTAMP
            )"
        ))
        .await?;

        self.run(&format!(
            "CREATE TABLE IF NOT EXISTS {ks}.session_archive (
                session_id TEXT PRIMARY KEY,
                memory_json TEXT,
                archived_at TIMESTAMP
            )"
        ))
        .await?;

        self.run(&format!(
            "CREATE TABLE IF NOT EXISTS {ks}.session_leases (
                session_id TEXT PRIMARY KEY,
                holder_id TEXT,
                expires_at TIMESTAMP
            )"
        ))
        .await?;

        Ok(())
    }

    async fn run(&self, query: &str) -> Result<()> {
        self.session
            .query_unpaged(query.to_string(), &[])
            .await
            .map_err(|e| SessionError::Unavailable(format!("schema ddl: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for ScyllaSessionStore {
    async fn load(&self, session_id: &str) -> Result<CoreMemory> {
        let ks = &self.keyspace;
        let result = self
            .session
            .query_unpaged(
                format!("SELECT memory_json FROM {ks}.sessions WHERE session_id = ?"),
                (session_id,),
            )
            .await
            .map_err(|e| SessionError::Unavailable(format!("load: {e}")))?
            .into_rows_result()
            .map_err(|e| SessionError::Unavailable(format!("load rows: {e}")))?;

        let row = result
            .rows::<(String,)>()
            .map_err(|e| SessionError::Unavailable(format!("load decode: {e}")))?
            .next()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?
            .map_err(|e| SessionError::Unavailable(format!("load row: {e}")))?;

        serde_json::from_str(&row.0)
            .map_err(|e| SessionError::Unavailable(format!("corrupt memory_json: {e}")))
    }

    async fn save(&self, session_id: &str, memory: &CoreMemory, ttl: Duration) -> Result<()> {
        let ks = &self.keyspace;
        let json = serde_json::to_string(memory)
            .map_err(|e| SessionError::Unavailable(format!("serialize: {e}")))?;
        let ttl_secs = ttl.as_secs() as i32;

        self.session
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.sessions (session_id, memory_json, version, last_write) \
                     VALUES (?, ?, ?, ?) USING TTL ?"
                ),
                (session_id, json, memory.version as i64, Utc::now(), ttl_secs),
            )
            .await
            .map_err(|e| SessionError::Unavailable(format!("save: {e}")))?;
        Ok(())
    }

    async fn touch(&self, session_id: &str, ttl: Duration) -> Result<()> {
        let memory = self.load(session_id).await?;
        self.save(session_id, &memory, ttl).await
    }

    async fn acquire_lease(&self, session_id: &str, holder_id: &str, ttl: Duration) -> Result<Arc<Notify>> {
        let ks = &self.keyspace;
        let existing = self
            .session
            .query_unpaged(
                format!("SELECT holder_id, expires_at FROM {ks}.session_leases WHERE session_id = ?"),
                (session_id,),
            )
            .await
            .map_err(|e| SessionError::Unavailable(format!("lease read: {e}")))?
            .into_rows_result()
            .map_err(|e| SessionError::Unavailable(format!("lease rows: {e}")))?;

        let previous_holder = existing
            .rows::<(String, chrono::DateTime<Utc>)>()
            .map_err(|e| SessionError::Unavailable(format!("lease decode: {e}")))?
            .next()
            .and_then(|row| row.ok())
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(holder, _)| holder);

        // Newer wins (spec §2): always overwrite, never reject the attach.
        self.session
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.session_leases (session_id, holder_id, expires_at) \
                     VALUES (?, ?, ?) USING TTL ?"
                ),
                (session_id, holder_id, Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default(), ttl.as_secs() as i32),
            )
            .await
            .map_err(|e| SessionError::Unavailable(format!("lease write: {e}")))?;

        let notify = self
            .lease_notifiers
            .write()
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone();

        if previous_holder.is_some_and(|holder| holder != holder_id) {
            notify.notify_one();
        }

        Ok(notify)
    }

    async fn release_lease(&self, session_id: &str, holder_id: &str) {
        let ks = &self.keyspace;
        let _ = self
            .session
            .query_unpaged(
                format!(
                    "DELETE FROM {ks}.session_leases WHERE session_id = ? IF holder_id = ?"
                ),
                (session_id, holder_id),
            )
            .await;
    }

    async fn archive(&self, session_id: &str) -> Result<()> {
        let ks = &self.keyspace;
        let memory = self.load(session_id).await?;
        let json = serde_json::to_string(&memory)
            .map_err(|e| SessionError::Unavailable(format!("serialize: {e}")))?;

        self.session
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.session_archive (session_id, memory_json, archived_at) \
                     VALUES (?, ?, ?)"
                ),
                (session_id, json, Utc::now()),
            )
            .await
            .map_err(|e| SessionError::ArchiveFailed {
                session_id: session_id.to_string(),
                reason: e.to_string(),
            })?;

        self.session
            .query_unpaged(
                format!("DELETE FROM {ks}.sessions WHERE session_id = ?"),
                (session_id,),
            )
            .await
            .map_err(|e| SessionError::ArchiveFailed {
                session_id: session_id.to_string(),
                reason: format!("archived but failed to delete hot record: {e}"),
            })?;
        Ok(())
    }
}

/// Adapts the `sessions` table's own archive path into the generic
/// `ColdStore` trait, for callers that want to write directly to the cold
/// table without going through `SessionStore::archive`.
pub struct ScyllaColdStore {
    session: Arc<Session>,
    keyspace: String,
}

#[async_trait]
impl ColdStore for ScyllaColdStore {
    async fn write(&self, memory: &CoreMemory) -> Result<()> {
        let ks = &self.keyspace;
        let json = serde_json::to_string(memory)
            .map_err(|e| SessionError::Unavailable(format!("serialize: {e}")))?;
        self.session
            .query_unpaged(
                format!(
                    "INSERT INTO {ks}.session_archive (session_id, memory_json, archived_at) \
                     VALUES (?, ?, ?)"
                ),
                (memory.session_id(), json, Utc::now()),
            )
            .await
            .map_err(|e| SessionError::ArchiveFailed {
                session_id: memory.session_id().to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
