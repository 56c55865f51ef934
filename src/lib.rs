//! Larch library entry point.
//!
//! Larch synchronizes shared, concurrently edited documents across many
//! clients using an operation-based CRDT discipline. Clients periodically
//! exchange change packs with the server; the server persists pushed
//! changes, returns missing remote changes (or a snapshot), advances
//! per-client checkpoints, and garbage-collects behind a global
//! minimum-synced horizon.
//!
//! The crate is transport-agnostic: an RPC layer is expected to
//! authenticate callers, derive access attributes with
//! [`auth::access_attributes`], gate them through [`auth::verify_access`],
//! and hand the decoded [`document::ChangePack`] to [`packs::synchronize`].

#![warn(missing_docs)]

/// Webhook-gated authorization with two-TTL decision caching.
pub mod auth;
/// Wiring bundle shared by all components plus config and background tasks.
pub mod backend;
/// Cluster-wide named locks and document event fan-out.
pub mod coordination;
/// Logical clocks, change identifiers and the change pack wire unit.
pub mod document;
/// The PushPull synchronization engine and the snapshot worker.
pub mod packs;
/// Storage trait consumed by the engine and an in-memory implementation.
pub mod storage;

pub use backend::Backend;
pub use backend::Config;
pub use document::ChangePack;
pub use packs::SyncError;
pub use packs::push_pull;
pub use packs::synchronize;
