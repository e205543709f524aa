//! Fixed-size identifiers and small wire primitives shared across the core.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Size in bytes of a SHA2-256 digest.
pub const HASH_SIZE: usize = 32;

/// Size in bytes of an account address.
pub const ACC_ADDR_SIZE: usize = 20;

/// A 32-byte digest. The all-zero value denotes "absent".
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Encode, Decode, Serialize, Deserialize,
)]
pub struct Hash256(pub [u8; HASH_SIZE]);

impl Hash256 {
    /// The zero digest, used as the empty/absent marker.
    pub const ZERO: Hash256 = Hash256([0u8; HASH_SIZE]);

    /// Whether this is the zero digest.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    /// Builds a digest from a byte slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; HASH_SIZE] = bytes
            .try_into()
            .map_err(|_| CodecError::BadLength {
                expected: HASH_SIZE,
                got: bytes.len(),
            })?;
        Ok(Hash256(arr))
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash256({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A 20-byte account identifier, derived from a public key or from a
/// `(sender, nonce)` pair for contracts.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Encode, Decode, Serialize, Deserialize,
)]
pub struct Address(pub [u8; ACC_ADDR_SIZE]);

/// The all-zero address, used as the "no recipient" marker for contract
/// creation transactions.
pub const NULL_ADDRESS: Address = Address([0u8; ACC_ADDR_SIZE]);

impl Address {
    /// Whether this is the null address.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; ACC_ADDR_SIZE]
    }

    /// Builds an address from a byte slice, which must be exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; ACC_ADDR_SIZE] = bytes
            .try_into()
            .map_err(|_| CodecError::BadLength {
                expected: ACC_ADDR_SIZE,
                got: bytes.len(),
            })?;
        Ok(Address(arr))
    }

    /// The raw address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering without a prefix.
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Network endpoint of a committee member.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode,
)]
pub struct Peer {
    /// IP address, IPv4-mapped into the low bytes when applicable.
    pub ip: u128,
    /// Listening port.
    pub listen_port: u32,
}

impl Peer {
    /// Builds a peer from an IPv4 quad and port, for tests and tools.
    pub fn from_v4(octets: [u8; 4], listen_port: u32) -> Self {
        Peer {
            ip: u32::from_be_bytes(octets) as u128,
            listen_port,
        }
    }
}

/// Packs a signer bitmap into the wire form used inside co-signature
/// preimages: a 2-byte big-endian bit count followed by the bits, most
/// significant bit first.
pub fn pack_bit_vector(bits: &[bool]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + bits.len().div_ceil(8));
    out.extend_from_slice(&(bits.len() as u16).to_be_bytes());
    let mut acc = 0u8;
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            acc |= 0x80 >> (i % 8);
        }
        if i % 8 == 7 {
            out.push(acc);
            acc = 0;
        }
    }
    if bits.len() % 8 != 0 {
        out.push(acc);
    }
    out
}

/// Reverses [`pack_bit_vector`]. Fails on a truncated buffer.
pub fn unpack_bit_vector(bytes: &[u8]) -> Result<Vec<bool>, CodecError> {
    if bytes.len() < 2 {
        return Err(CodecError::Truncated {
            needed: 2,
            have: bytes.len(),
        });
    }
    let count = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let body = &bytes[2..];
    if body.len() < count.div_ceil(8) {
        return Err(CodecError::Truncated {
            needed: 2 + count.div_ceil(8),
            have: bytes.len(),
        });
    }
    let mut bits = Vec::with_capacity(count);
    for i in 0..count {
        bits.push((body[i / 8] & (0x80 >> (i % 8))) != 0);
    }
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_vector_round_trip() {
        let bits = vec![true, false, true, true, false, false, false, true, true, false];
        let packed = pack_bit_vector(&bits);
        assert_eq!(packed[..2], (bits.len() as u16).to_be_bytes());
        assert_eq!(unpack_bit_vector(&packed).unwrap(), bits);
    }

    #[test]
    fn bit_vector_empty() {
        let packed = pack_bit_vector(&[]);
        assert_eq!(packed, vec![0, 0]);
        assert!(unpack_bit_vector(&packed).unwrap().is_empty());
    }

    #[test]
    fn hash_from_slice_rejects_wrong_length() {
        assert!(Hash256::from_slice(&[0u8; 31]).is_err());
        assert!(Address::from_slice(&[0u8; 21]).is_err());
    }

    #[test]
    fn zero_markers() {
        assert!(Hash256::ZERO.is_zero());
        assert!(NULL_ADDRESS.is_null());
        assert!(!Address([1u8; 20]).is_null());
    }
}
