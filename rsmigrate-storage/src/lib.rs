//! # rsmigrate-storage
//!
//! State stores for rsmigrate.
//!
//! This crate provides:
//! - A durable file store keeping one checksummed JSON record per storage key
//! - An in-memory store with access counters and fault injection
//! - The titles payload codec shared by both

pub mod codec;
pub mod error;
pub mod file;
pub mod memory;

pub use error::StorageError;
pub use file::{FileConnection, FileStateStore, StoredRecord};
pub use memory::{MemoryStateStore, StoreStats};
