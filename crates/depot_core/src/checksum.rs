//! Checksum value types and the streaming checksum reader.

use crate::error::{DepotError, Result};
use md5::Md5 as Md5Hasher;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1 as Sha1Hasher};
use std::fmt;
use std::io::{self, Read};

macro_rules! checksum_type {
    ($(#[$doc:meta])* $name:ident, $len:expr, $label:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name([u8; $len]);

        impl $name {
            /// The length in bytes.
            pub const LEN: usize = $len;

            /// The length as a hex string.
            pub const HEX_LEN: usize = $len * 2;

            /// Creates a checksum from raw bytes.
            #[inline]
            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Returns the raw digest bytes.
            #[inline]
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Returns the lowercase hex form.
            pub fn as_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parses the hex form. Surrounding whitespace is ignored.
            pub fn from_hex(s: &str) -> Result<Self> {
                let s = s.trim();
                if s.len() != Self::HEX_LEN {
                    return Err(DepotError::InvalidChecksum(format!(
                        "{}: expected {} hex chars, got {}",
                        $label,
                        Self::HEX_LEN,
                        s.len()
                    )));
                }
                let bytes = hex::decode(s).map_err(|e| DepotError::InvalidChecksum(e.to_string()))?;
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| DepotError::InvalidChecksum("invalid length".to_string()))?;
                Ok(Self(arr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}...)", $label, &self.as_hex()[..12])
            }
        }
    };
}

checksum_type!(
    /// A 20-byte SHA-1 digest. Binaries are addressed by this value.
    Sha1,
    20,
    "Sha1"
);
checksum_type!(
    /// A 16-byte MD5 digest, recorded alongside the SHA-1 for clients that ask for it.
    Md5,
    16,
    "Md5"
);

impl Sha1 {
    /// Computes the SHA-1 of an in-memory buffer.
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha1Hasher::digest(data).into())
    }

    /// Shard directory name (first two hex characters).
    ///
    /// ```
    /// use depot_core::Sha1;
    ///
    /// let mut bytes = [0u8; 20];
    /// bytes[0] = 0x0f;
    /// assert_eq!(Sha1::from_bytes(bytes).shard(), "0f");
    /// ```
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

impl Md5 {
    /// Computes the MD5 of an in-memory buffer.
    pub fn digest(data: &[u8]) -> Self {
        Self(Md5Hasher::digest(data).into())
    }
}

/// Wraps a reader and computes SHA-1 and MD5 over every byte read through it.
///
/// Bytes pass through unchanged; call [`ChecksumReader::finish`] once the
/// inner reader is exhausted.
pub struct ChecksumReader<R> {
    inner: R,
    sha1: Sha1Hasher,
    md5: Md5Hasher,
    bytes_read: u64,
}

impl<R: Read> ChecksumReader<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            sha1: Sha1Hasher::new(),
            md5: Md5Hasher::new(),
            bytes_read: 0,
        }
    }

    /// Bytes observed so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consumes the reader and returns `(sha1, md5, bytes_read)`.
    pub fn finish(self) -> (Sha1, Md5, u64) {
        (
            Sha1(self.sha1.finalize().into()),
            Md5(self.md5.finalize().into()),
            self.bytes_read,
        )
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sha1.update(&buf[..n]);
        self.md5.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}
