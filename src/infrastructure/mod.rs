//! Storage adapters implementing the domain ports.

pub mod in_memory;
mod locks;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

pub use locks::{AccountGuard, AccountLocks};
