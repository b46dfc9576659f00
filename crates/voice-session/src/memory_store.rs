//! `InMemorySessionStore` — a `parking_lot`-guarded `HashMap` implementation
//! of `SessionStore`, for tests and single-process deployments (spec §4.1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;
use voice_core::CoreMemory;

use crate::error::{Result, SessionError};
use crate::store::{ColdStore, SessionStore};

struct HotRecord {
    memory: CoreMemory,
    expires_at: Instant,
}

struct Lease {
    holder_id: String,
    expires_at: Instant,
}

/// In-memory cold store used by tests and as the default archival sink
/// when no external cold store is configured.
#[derive(Default)]
pub struct InMemoryColdStore {
    records: RwLock<HashMap<String, CoreMemory>>,
}

impl InMemoryColdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<CoreMemory> {
        self.records.read().get(session_id).cloned()
    }
}

#[async_trait]
impl ColdStore for InMemoryColdStore {
    async fn write(&self, memory: &CoreMemory) -> Result<()> {
        self.records
            .write()
            .insert(memory.session_id().to_string(), memory.clone());
        Ok(())
    }
}

/// Default `SessionStore` implementation, backed by a `parking_lot::RwLock`
/// over a `HashMap` (mirrors the reference `InMemorySessionStore`).
pub struct InMemorySessionStore {
    hot: RwLock<HashMap<String, HotRecord>>,
    leases: RwLock<HashMap<String, Lease>>,
    lease_notifiers: RwLock<HashMap<String, Arc<Notify>>>,
    cold: Arc<dyn ColdStore>,
}

impl InMemorySessionStore {
    pub fn new(cold: Arc<dyn ColdStore>) -> Self {
        Self {
            hot: RwLock::new(HashMap::new()),
            leases: RwLock::new(HashMap::new()),
            lease_notifiers: RwLock::new(HashMap::new()),
            cold,
        }
    }

    /// Convenience constructor backed by its own `InMemoryColdStore`,
    /// handy in tests that don't care about inspecting the archive.
    pub fn with_in_memory_cold() -> Self {
        Self::new(Arc::new(InMemoryColdStore::new()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<CoreMemory> {
        let hot = self.hot.read();
        match hot.get(session_id) {
            Some(record) if record.expires_at > Instant::now() => Ok(record.memory.clone()),
            _ => Err(SessionError::NotFound(session_id.to_string())),
        }
    }

    async fn save(&self, session_id: &str, memory: &CoreMemory, ttl: Duration) -> Result<()> {
        self.hot.write().insert(
            session_id.to_string(),
            HotRecord {
                memory: memory.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn touch(&self, session_id: &str, ttl: Duration) -> Result<()> {
        let mut hot = self.hot.write();
        match hot.get_mut(session_id) {
            Some(record) => {
                record.expires_at = Instant::now() + ttl;
                Ok(())
            }
            None => Err(SessionError::NotFound(session_id.to_string())),
        }
    }

    async fn acquire_lease(&self, session_id: &str, holder_id: &str, ttl: Duration) -> Result<Arc<Notify>> {
        let now = Instant::now();
        let previous_holder = {
            let mut leases = self.leases.write();
            let previous = leases
                .get(session_id)
                .filter(|lease| lease.expires_at > now)
                .map(|lease| lease.holder_id.clone());
            leases.insert(
                session_id.to_string(),
                Lease {
                    holder_id: holder_id.to_string(),
                    expires_at: now + ttl,
                },
            );
            previous
        };

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
        let mut leases = self.leases.write();
        if let Some(lease) = leases.get(session_id) {
            if lease.holder_id == holder_id {
                leases.remove(session_id);
            }
        }
    }

    async fn archive(&self, session_id: &str) -> Result<()> {
        let memory = self.load(session_id).await?;
        self.cold
            .write(&memory)
            .await
            .map_err(|e| SessionError::ArchiveFailed {
                session_id: session_id.to_string(),
                reason: e.to_string(),
            })?;
        self.hot.write().remove(session_id);
        Ok(())
    }
}
