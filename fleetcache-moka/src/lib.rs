#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! In-process implementations of fleetcache's external collaborators.
//!
//! - [`MokaStore`] - a [`SharedStore`](fleetcache_backend::SharedStore) backed
//!   by a Moka cache with per-entry expiration
//! - [`MemoryBus`] - a [`PubSub`](fleetcache_backend::PubSub) backed by tokio
//!   broadcast channels
//!
//! Both are shared by cloning, so every "process" holding a clone sees the
//! same data. That makes them the natural choice for single-process
//! deployments and for tests that simulate a fleet inside one binary:
//!
//! ```
//! use std::sync::Arc;
//! use fleetcache_backend::{PubSub, SharedStore};
//! use fleetcache_moka::{MemoryBus, MokaStore};
//!
//! let store: Arc<dyn SharedStore> = Arc::new(MokaStore::new());
//! let bus: Arc<dyn PubSub> = Arc::new(MemoryBus::new());
//! # let _ = (store, bus);
//! ```

mod builder;
mod bus;
mod store;

pub use builder::MokaStoreBuilder;
pub use bus::MemoryBus;
pub use moka::policy::EvictionPolicy;
pub use store::MokaStore;
