#![forbid(unsafe_code)]

//! Durable storage for the mizar node core: the pluggable [`KvBackend`]
//! trait the authenticated tries write through, and the [`BlockStorage`]
//! keyspaces for blocks, transaction bodies, and metadata.

pub mod block_storage;
pub mod kv;

pub use block_storage::{BlockStorage, MetaType};
pub use kv::{KvBackend, MemoryKv, RedbKv};
