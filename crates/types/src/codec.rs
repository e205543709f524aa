//! The canonical length-prefixed byte encoding used for accounts in the
//! state trie and for contract-storage cells.
//!
//! All integers are big-endian. Variable-length fields carry a u32
//! length prefix. Two encodings are byte-equal iff the encoded values
//! are semantically equal.

use crate::error::CodecError;
use crate::primitives::{Hash256, HASH_SIZE};

/// Appends a big-endian u32.
pub fn put_u32(dst: &mut Vec<u8>, v: u32) {
    dst.extend_from_slice(&v.to_be_bytes());
}

/// Appends a big-endian u64.
pub fn put_u64(dst: &mut Vec<u8>, v: u64) {
    dst.extend_from_slice(&v.to_be_bytes());
}

/// Appends a big-endian u128.
pub fn put_u128(dst: &mut Vec<u8>, v: u128) {
    dst.extend_from_slice(&v.to_be_bytes());
}

/// Appends a 32-byte digest verbatim.
pub fn put_hash(dst: &mut Vec<u8>, h: &Hash256) {
    dst.extend_from_slice(&h.0);
}

/// Appends a u32 length prefix followed by the bytes.
pub fn put_var_bytes(dst: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(dst, bytes.len() as u32);
    dst.extend_from_slice(bytes);
}

/// A checked cursor over a canonical encoding.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Starts reading at the front of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() - self.pos < n {
            return Err(CodecError::Truncated {
                needed: self.pos + n,
                have: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Reads a big-endian u32.
    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// Reads a big-endian u64.
    pub fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Reads a big-endian u128.
    pub fn u128(&mut self) -> Result<u128, CodecError> {
        Ok(u128::from_be_bytes(self.take(16)?.try_into().unwrap()))
    }

    /// Reads a 32-byte digest.
    pub fn hash(&mut self) -> Result<Hash256, CodecError> {
        Ok(Hash256(self.take(HASH_SIZE)?.try_into().unwrap()))
    }

    /// Reads a u32 length prefix followed by that many bytes.
    pub fn var_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads exactly `n` bytes with no length prefix.
    pub fn fixed(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(n)?.to_vec())
    }

    /// Whether the cursor has consumed the whole input.
    pub fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Fails unless every input byte was consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(CodecError::Malformed(format!(
                "{} trailing bytes",
                self.buf.len() - self.pos
            )))
        }
    }
}

/// Encodes a contract-storage cell: a 4-field length-prefixed tuple of
/// `(vname, "True"/"False", type, value_blob)`. The mutability flag is
/// ASCII for compatibility with the reference encoding.
pub fn encode_storage_cell(vname: &str, is_mutable: bool, ty: &str, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    put_var_bytes(&mut out, vname.as_bytes());
    put_var_bytes(&mut out, if is_mutable { b"True" } else { b"False" });
    put_var_bytes(&mut out, ty.as_bytes());
    put_var_bytes(&mut out, value);
    out
}

/// A decoded contract-storage cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCell {
    /// The Scilla variable name.
    pub vname: String,
    /// Whether the cell is mutable runtime state (immutable cells are
    /// init parameters).
    pub is_mutable: bool,
    /// The declared Scilla type.
    pub ty: String,
    /// The serialized value.
    pub value: Vec<u8>,
}

/// Decodes a contract-storage cell produced by [`encode_storage_cell`].
pub fn decode_storage_cell(bytes: &[u8]) -> Result<StorageCell, CodecError> {
    let mut r = Reader::new(bytes);
    let vname = String::from_utf8(r.var_bytes()?)
        .map_err(|e| CodecError::Malformed(format!("vname not utf-8: {e}")))?;
    let flag = r.var_bytes()?;
    let is_mutable = match flag.as_slice() {
        b"True" => true,
        b"False" => false,
        other => {
            return Err(CodecError::Malformed(format!(
                "bad mutability flag: {:?}",
                String::from_utf8_lossy(other)
            )))
        }
    };
    let ty = String::from_utf8(r.var_bytes()?)
        .map_err(|e| CodecError::Malformed(format!("type not utf-8: {e}")))?;
    let value = r.var_bytes()?;
    r.finish()?;
    Ok(StorageCell {
        vname,
        is_mutable,
        ty,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_round_trip() {
        let mut buf = Vec::new();
        put_u32(&mut buf, 7);
        put_u64(&mut buf, u64::MAX - 1);
        put_u128(&mut buf, 1u128 << 100);
        put_hash(&mut buf, &Hash256([9u8; 32]));
        put_var_bytes(&mut buf, b"hello");

        let mut r = Reader::new(&buf);
        assert_eq!(r.u32().unwrap(), 7);
        assert_eq!(r.u64().unwrap(), u64::MAX - 1);
        assert_eq!(r.u128().unwrap(), 1u128 << 100);
        assert_eq!(r.hash().unwrap(), Hash256([9u8; 32]));
        assert_eq!(r.var_bytes().unwrap(), b"hello");
        assert!(r.finish().is_ok());
    }

    #[test]
    fn reader_rejects_truncation() {
        let mut buf = Vec::new();
        put_var_bytes(&mut buf, b"abcdef");
        buf.truncate(buf.len() - 2);
        let mut r = Reader::new(&buf);
        assert!(matches!(r.var_bytes(), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn reader_rejects_trailing_bytes() {
        let mut buf = Vec::new();
        put_u32(&mut buf, 1);
        buf.push(0xff);
        let mut r = Reader::new(&buf);
        r.u32().unwrap();
        assert!(r.finish().is_err());
    }

    #[test]
    fn storage_cell_round_trip() {
        let cell = encode_storage_cell("owner", false, "ByStr20", b"\"0xabc\"");
        let decoded = decode_storage_cell(&cell).unwrap();
        assert_eq!(decoded.vname, "owner");
        assert!(!decoded.is_mutable);
        assert_eq!(decoded.ty, "ByStr20");
        assert_eq!(decoded.value, b"\"0xabc\"");
    }

    #[test]
    fn storage_cell_rejects_bad_flag() {
        let mut out = Vec::new();
        put_var_bytes(&mut out, b"x");
        put_var_bytes(&mut out, b"Maybe");
        put_var_bytes(&mut out, b"Uint32");
        put_var_bytes(&mut out, b"1");
        assert!(decode_storage_cell(&out).is_err());
    }
}
