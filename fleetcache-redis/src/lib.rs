#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod bus;
mod connection;
pub mod error;
mod store;

#[doc(inline)]
pub use crate::bus::RedisBus;
#[doc(inline)]
pub use crate::store::{RedisStore, RedisStoreBuilder};
