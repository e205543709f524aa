#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Core data structures, canonical encodings, and error types for the
//! mizar node core.

pub mod block;
pub mod codec;
pub mod error;
pub mod primitives;
pub mod transaction;

pub use primitives::{Address, Hash256, Peer, ACC_ADDR_SIZE, HASH_SIZE};
