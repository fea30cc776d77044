//! # replikv
//!
//! Consistent reads over a sharded, replicated object store:
//! - Tunable consistency (ONE, QUORUM, ALL) per read
//! - One full read plus digest reads to every replica, returning at the level
//! - Conflict resolution by version, update time and tombstones
//! - Background read repair of stale replicas
//! - Batch reads and consistency sweeps partitioned by shard
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!              ┌──────────────────────────────┐
//!              │           Finder             │
//!              │  get_one / get_all / exists  │
//!              │  node_object / check_*       │
//!              └──────────────┬───────────────┘
//!                             │ pull (k tasks)
//!   ┌─────────────────────────┼─────────────────────────┐
//!   │ full read               │ digest                  │ digest
//! ┌─▼──────────┐        ┌─────▼──────┐           ┌──────▼─────┐
//! │ Replica A  │        │ Replica B  │           │ Replica C  │
//! └────────────┘        └────────────┘           └────────────┘
//!         ▲                    replies ──► stream ──► repairer
//!         └──────────────── overwrite (background) ◄───┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Read an object at QUORUM
//! replikv --config cluster.toml get --shard s1 6f1c3d0e-6a9b-4b55-8d5f-2f5f3e1d9c11
//!
//! # Existence check at ALL
//! replikv --config cluster.toml --level all exists --shard s1 <id>
//!
//! # Consistency sweep over objects dumped as JSON
//! replikv --config cluster.toml check objects.json
//! ```

pub mod common;
pub mod replica;
pub mod transport;

// Re-export commonly used types
pub use common::{Config, Error, ReadFailure, Result};
pub use replica::{ConsistencyLevel, ConsistencyReport, Finder, Object, ReplicaClient, Resolver};
pub use transport::HttpReplicaClient;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
