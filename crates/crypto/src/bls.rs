//! BLS12-381 committee multi-signatures.
//!
//! Signatures live in G1 (48-byte compressed), public keys in G2
//! (96-byte compressed). Both signatures and public keys aggregate by
//! point addition, which is what makes the committee co-signature
//! scheme work: the validator adds up the keys selected by the signer
//! bitmap and verifies one signature against the sum.
//!
//! Rogue-key resistance is assumed to be handled at committee
//! registration; the core verifies against rosters it is handed.

use blstrs::{pairing, G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use ff::Field;
use group::{prime::PrimeCurveAffine, Group};
use rand::rngs::OsRng;

use crate::error::CryptoError;

const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Compressed size of a public key.
pub const BLS_PUBKEY_SIZE: usize = 96;
/// Compressed size of a signature.
pub const BLS_SIGNATURE_SIZE: usize = 48;

/// A BLS key pair.
#[derive(Clone)]
pub struct BlsKeyPair {
    public_key: BlsPublicKey,
    secret_key: BlsPrivateKey,
}

/// A BLS public key (a G2 point).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlsPublicKey(pub G2Affine);

/// A BLS private key (a scalar).
#[derive(Clone)]
pub struct BlsPrivateKey(pub Scalar);

/// A BLS signature (a G1 point).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlsSignature(pub G1Affine);

impl BlsKeyPair {
    /// Generates a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        let secret = Scalar::random(OsRng);
        let public = G2Affine::from(G2Projective::generator() * secret);
        Self {
            public_key: BlsPublicKey(public),
            secret_key: BlsPrivateKey(secret),
        }
    }

    /// The public half of the pair.
    pub fn public_key(&self) -> BlsPublicKey {
        self.public_key
    }

    /// Signs a message: `sig = sk * H(m)` with H hashing to G1.
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        let msg_point = G1Projective::hash_to_curve(message, BLS_DST, &[]);
        BlsSignature(G1Affine::from(msg_point * self.secret_key.0))
    }
}

impl BlsPublicKey {
    /// Verifies a signature over `message`:
    /// `e(sig, g2) == e(H(m), pk)`.
    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> Result<(), CryptoError> {
        let msg_point = G1Affine::from(G1Projective::hash_to_curve(message, BLS_DST, &[]));
        let lhs = pairing(&signature.0, &G2Affine::generator());
        let rhs = pairing(&msg_point, &self.0);
        if lhs == rhs {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }

    /// The compressed key bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_compressed().to_vec()
    }

    /// Decodes a compressed G2 point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; BLS_PUBKEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: BLS_PUBKEY_SIZE,
                got: bytes.len(),
            })?;
        Option::<G2Affine>::from(G2Affine::from_compressed(&arr))
            .map(BlsPublicKey)
            .ok_or_else(|| CryptoError::Deserialization("invalid G2 point".into()))
    }
}

impl BlsSignature {
    /// The compressed signature bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_compressed().to_vec()
    }

    /// Decodes a compressed G1 point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; BLS_SIGNATURE_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: BLS_SIGNATURE_SIZE,
                got: bytes.len(),
            })?;
        Option::<G1Affine>::from(G1Affine::from_compressed(&arr))
            .map(BlsSignature)
            .ok_or_else(|| CryptoError::Deserialization("invalid G1 point".into()))
    }
}

/// Aggregates public keys by G2 point addition, in the order given.
pub fn aggregate_public_keys(keys: &[BlsPublicKey]) -> Result<BlsPublicKey, CryptoError> {
    let first = keys.first().ok_or_else(|| {
        CryptoError::InvalidInput("cannot aggregate an empty key set".into())
    })?;
    let mut acc = G2Projective::from(first.0);
    for key in &keys[1..] {
        acc += G2Projective::from(key.0);
    }
    Ok(BlsPublicKey(G2Affine::from(acc)))
}

/// Aggregates signatures over the same message by G1 point addition.
pub fn aggregate_signatures(signatures: &[BlsSignature]) -> Result<BlsSignature, CryptoError> {
    let first = signatures.first().ok_or_else(|| {
        CryptoError::InvalidInput("cannot aggregate an empty signature set".into())
    })?;
    let mut acc = G1Projective::from(first.0);
    for sig in &signatures[1..] {
        acc += G1Projective::from(sig.0);
    }
    Ok(BlsSignature(G1Affine::from(acc)))
}
