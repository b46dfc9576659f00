//! `SessionStore` trait (spec §4.1): durable, TTL'd `CoreMemory` storage
//! plus advisory leases and one-shot cold-store archival.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use voice_core::CoreMemory;

use crate::error::Result;

/// A destination for finalized session state (spec §4.1 `archive`).
///
/// Kept as a separate trait from `SessionStore` because the hot store and
/// the cold store are frequently different systems (a TTL'd hot table vs.
/// an append-only audit table), mirroring the reference's split between
/// `sessions` and an audit/cold table in `persistence::schema`.
#[async_trait]
pub trait ColdStore: Send + Sync {
    async fn write(&self, memory: &CoreMemory) -> Result<()>;
}

/// Durable, TTL'd storage of `CoreMemory` keyed by `session_id`, plus
/// advisory leases and a one-shot archival hook (spec §4.1).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the session's memory. Fails with `NotFound` if absent.
    async fn load(&self, session_id: &str) -> Result<CoreMemory>;

    /// Idempotent, atomic replace. Bumps `last_write`.
    async fn save(&self, session_id: &str, memory: &CoreMemory, ttl: Duration) -> Result<()>;

    /// Renews TTL without a full read-modify-write.
    async fn touch(&self, session_id: &str, ttl: Duration) -> Result<()>;

    /// Unconditionally takes over the session's write lease for
    /// `holder_id`, even if currently held by someone else (spec §2: "on
    /// lease conflict, the newer `MediaHandler` wins and the older must
    /// tear down"). Returns a notifier shared by every successive holder
    /// of this session's lease: it fires once, the next time a later
    /// caller steals the lease back out from under `holder_id`, so the
    /// caller can tear itself down with `DetachReason::LeaseLost`.
    async fn acquire_lease(&self, session_id: &str, holder_id: &str, ttl: Duration) -> Result<Arc<Notify>>;

    /// No-op if the lease is not held by `holder_id`.
    async fn release_lease(&self, session_id: &str, holder_id: &str);

    /// Atomically reads the final state, writes it to the cold store, and
    /// deletes the hot record. On partial failure, prefers leaving the hot
    /// record over losing data.
    async fn archive(&self, session_id: &str) -> Result<()>;
}
