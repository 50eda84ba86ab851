//! Bounded-concurrency slot leases over a shared key-value store.
//!
//! A *target* (a printer, an API credential, a build runner) has a fixed
//! number of interchangeable *slots*. A participant holds a slot by writing a
//! lease record `client|deadline|token` into it. Leases expire unless renewed,
//! so a crashed holder never blocks a slot for longer than one TTL.
//!
//! The crate is a library over any [`LeaseStore`] that offers per-key
//! read/write/delete and a per-key mutual-exclusion lock. All participants
//! sharing a store and agreeing on `key_prefix` and `concurrency_limit`
//! coordinate correctly, whether they are tasks, threads or processes.
//!
//! # Layers
//!
//! - [`pure`]: key layout, normalization and deadline arithmetic
//! - [`Lease`]: the persisted record and its codec
//! - [`SlotAllocator`]: double-checked slot claiming
//! - [`LeaseManager`]: `acquire` / `renew` / `release` / `status`
//! - [`RenewalSupervisor`]: background renewal with a joinable stop
//! - [`ManagedSession`]: acquire with retry, run, always release
//!
//! # Example
//!
//! ```ignore
//! use slotlease::LeaseConfig;
//! use slotlease::LeaseManager;
//! use slotlease::ManagedSession;
//! use slotlease_store::FileLeaseStore;
//!
//! let store = Arc::new(FileLeaseStore::open("/var/lib/slotlease")?);
//! let manager = LeaseManager::new(store, LeaseConfig::load()?);
//!
//! ManagedSession::new(manager, "printer", "worker-1")
//!     .run(|lease| async move { print(lease.slot).await })
//!     .await?;
//! ```

pub mod allocator;
pub mod config;
pub mod constants;
pub mod error;
pub mod lease;
pub mod manager;
pub mod pure;
pub mod session;
pub mod supervisor;

pub use allocator::ClaimedSlot;
pub use allocator::SlotAllocator;
pub use config::ConfigError;
pub use config::LeaseConfig;
pub use error::LeaseError;
pub use error::SessionError;
pub use lease::Lease;
pub use lease::LeaseToken;
pub use manager::AcquiredLease;
pub use manager::LeaseManager;
pub use manager::SlotState;
pub use manager::SlotStatus;
pub use session::ManagedSession;
pub use slotlease_store::FileLeaseStore;
pub use slotlease_store::InMemoryLeaseStore;
pub use slotlease_store::LeaseStore;
pub use slotlease_store::StoreError;
pub use slotlease_time::SystemTimeSource;
pub use slotlease_time::TimeSource;
pub use supervisor::RenewalHealth;
pub use supervisor::RenewalSupervisor;
