//! Error types for the mizar node core.

use thiserror::Error;

use crate::primitives::Address;

/// Errors produced while reading or writing the canonical byte encodings.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before the encoding was complete.
    #[error("truncated input: needed {needed} bytes, have {have}")]
    Truncated {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },
    /// A fixed-size field had the wrong length.
    #[error("bad field length: expected {expected}, got {got}")]
    BadLength {
        /// Expected byte length.
        expected: usize,
        /// Length found in the input.
        got: usize,
    },
    /// The input decoded but violated a structural rule.
    #[error("malformed input: {0}")]
    Malformed(String),
}

/// Errors from the durable key-value layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A failure in the underlying key-value backend.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// The requested key was not present.
    #[error("not found")]
    NotFound,
}

/// Errors from the account-state engine.
#[derive(Error, Debug)]
pub enum StateError {
    /// No account is registered under the address.
    #[error("account not found: {0}")]
    AccountNotFound(Address),
    /// An account already exists under the address.
    #[error("account already exists: {0}")]
    AccountExists(Address),
    /// A debit would take the balance below zero.
    #[error("insufficient balance")]
    InsufficientBalance,
    /// Checked balance arithmetic overflowed.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    /// The transaction nonce does not follow the account nonce.
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch {
        /// The nonce the account requires next.
        expected: u64,
        /// The nonce carried by the transaction.
        got: u64,
    },
    /// A contract-only operation was applied to a plain account.
    #[error("account is not a contract")]
    NotContract,
    /// Contract init data or a stored record failed to parse.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// An error surfaced from the storage layer.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An error surfaced from the canonical codec.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A programmer-error assertion; fatal at the process level.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Errors from transaction and block validation.
#[derive(Error, Debug)]
pub enum ValidatorError {
    /// The transaction's packed chain id does not match this chain.
    #[error("wrong chain id: expected {expected}, got {got}")]
    WrongChainId {
        /// The chain id this node runs on.
        expected: u16,
        /// The chain id unpacked from the transaction version.
        got: u16,
    },
    /// The sender public key derives to the zero address.
    #[error("invalid sender address")]
    InvalidAddress,
    /// The sender account is not known to the store.
    #[error("unknown sender: {0}")]
    UnknownSender(Address),
    /// The sender balance does not cover the transaction amount.
    #[error("insufficient balance for {0}")]
    InsufficientBalance(Address),
    /// The transaction is routed to a different shard.
    #[error("wrong shard: tx belongs to shard {expected}, this node is shard {got}")]
    WrongShard {
        /// The shard derived from the address.
        expected: u32,
        /// The shard this node serves.
        got: u32,
    },
    /// The gas price is below the epoch minimum.
    #[error("gas price {got} below minimum {min}")]
    LowGasPrice {
        /// Minimum gas price from the latest DS block.
        min: u128,
        /// Gas price offered by the transaction.
        got: u128,
    },
    /// The transaction signature failed to verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// The aggregated committee co-signature failed to verify.
    #[error("invalid co-signature: {0}")]
    InvalidCosig(String),
    /// A block did not follow its predecessor.
    #[error("bad block sequence: {0}")]
    BadBlockSequence(String),
    /// An error surfaced from the state engine.
    #[error(transparent)]
    State(#[from] StateError),
    /// An error surfaced from the storage layer.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
