//! # raphf
//!
//! Resource and persistent handle factory: a registry through which
//! independent subsystems share pools of expensive handles (connections,
//! sockets, parser contexts) instead of recreating them for every operation.
//!
//! ## Features
//!
//! - Providers registered by name, each with its own reference counted factory
//! - Per-namespace free lists with last-in first-out reuse of warm handles
//! - Per-provider quota enforced when handles are released
//! - Optional wakeup/retire hooks when handles leave or enter the free list
//! - Automatic release of handles via RAII (Drop trait)
//! - Cleanup of idle handles by provider, namespace, or both
//! - Statistics snapshots, info table and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use raphf::{FnOps, Registry, RegistryConfiguration};
//!
//! let registry = Registry::new(RegistryConfiguration::default());
//! registry
//!     .provide("sockets", FnOps::<String, str>::new().with_create(|addr| Some(format!("socket to {addr}"))))
//!     .unwrap();
//!
//! let lease = registry.concede::<FnOps<String, str>>("sockets", "php.net:80").unwrap();
//! {
//!     let socket = lease.checkout("php.net:80").unwrap();
//!     println!("Got: {}", *socket);
//!     // Handle automatically returned when `socket` goes out of scope
//! }
//! assert_eq!(registry.stat_all().unwrap().get("sockets", "php.net:80").unwrap().free, 1);
//! ```
//!
//! ## Threading
//!
//! A registry may be shared between threads; every provider keeps its
//! counters and free lists behind a lock. The free-list order and counter
//! arithmetic assume the operations on one provider are not interleaved
//! mid-call, so a host with several workers should either give each worker
//! its own registry or serialize access externally.

mod config;
mod errors;
mod factory;
mod handle_list;
mod lease;
mod metrics;
mod provider;
mod registry;

pub use config::{LIMIT_ENV_VAR, RegistryConfiguration};
pub use errors::{PoolError, PoolResult};
pub use factory::{FnOps, HandleOps, ResourceFactory};
pub use lease::{Hook, Lease, LeaseHooks, PooledHandle};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::{HandleStats, PoolStats};
pub use registry::Registry;
