//! # stepwise-store
//!
//! Durable storage for paused stepwise runs.
//!
//! ## Overview
//!
//! Two implementations of [`TaskStore`](stepwise_core::traits::TaskStore):
//!
//! - [`InMemoryTaskStore`]: a shared `HashMap`, for tests and single-process
//!   use.
//! - [`FileTaskStore`]: one JSON file per task with atomic replace, so a
//!   paused run survives a process restart.
//!
//! Both treat snapshots as opaque bytes; encoding and integrity checks live
//! in `stepwise_core::snapshot`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stepwise_store::FileTaskStore;
//!
//! let store = Arc::new(FileTaskStore::open("/var/lib/stepwise").await?);
//! let engine = Engine::new(registry, backend, policy, validator, store);
//! ```

pub mod file;
pub mod memory;

pub use file::FileTaskStore;
pub use memory::InMemoryTaskStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
