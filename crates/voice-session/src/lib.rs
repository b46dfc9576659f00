//! `SessionStore` (spec §4.1): TTL'd `CoreMemory` persistence, advisory
//! leases enforcing single-writer ownership, and one-shot archival to a
//! cold store.

pub mod error;
pub mod keys;
pub mod memory_store;
pub mod store;

#[cfg(feature = "scylla-backend")]
pub mod scylla_store;

pub use error::{Result, SessionError};
pub use keys::KeySchema;
pub use memory_store::{InMemoryColdStore, InMemorySessionStore};
pub use store::{ColdStore, SessionStore};

#[cfg(feature = "scylla-backend")]
pub use scylla_store::{ScyllaColdStore, ScyllaSessionConfig, ScyllaSessionStore};

/// TTL policy (spec §4.1, recommended defaults, not hard contracts).
pub mod ttl {
    use std::time::Duration;

    pub const SESSION_MEMORY: Duration = Duration::from_secs(30 * 60);
    pub const SESSION_HISTORY: Duration = Duration::from_secs(2 * 60 * 60);
    pub const LEASE: Duration = Duration::from_secs(60);
    pub const SYNTHESIZER_PHRASE_CACHE: Duration = Duration::from_secs(24 * 60 * 60);
}
