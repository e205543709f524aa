#![forbid(unsafe_code)]

//! Hashing, address derivation, and the two signature schemes used by
//! the mizar node core: Ed25519 for transactions and BLS12-381
//! aggregated multi-signatures for committee co-signing.

pub mod bls;
pub mod eddsa;
pub mod error;
pub mod hash;

pub use error::CryptoError;
