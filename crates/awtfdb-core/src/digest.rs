//! Keyed Blake3 digests.
//!
//! Every 32-byte digest in the index is derived with Blake3 in KDF mode
//! under [`HASH_CONTEXT`]. The same derivation covers file contents
//! (streamed), tag-core randomness, and pool-core randomness.

use std::{fmt, io::Read, str::FromStr};

/// Fixed KDF context string. Changing it would re-key every stored digest,
/// so it is carried verbatim from the original index format.
pub const HASH_CONTEXT: &str =
  "awtfdb Sun Mar 20 16:58:11 AM +00 2022 main hash key";

/// Length in bytes of every stored digest.
pub const DIGEST_LEN: usize = 32;

/// Chunk size for streaming file digests. Lives on the stack; no per-chunk
/// heap allocation.
const STREAM_BUF_LEN: usize = 8 * 1024;

/// A 32-byte keyed Blake3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
  pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] { &self.0 }

  /// Wrap a raw 32-byte slice. Returns `None` on any other length.
  pub fn from_slice(bytes: &[u8]) -> Option<Self> {
    <[u8; DIGEST_LEN]>::try_from(bytes).ok().map(Self)
  }
}

impl From<[u8; DIGEST_LEN]> for Digest {
  fn from(bytes: [u8; DIGEST_LEN]) -> Self { Self(bytes) }
}

impl fmt::Display for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", hex::encode(self.0))
  }
}

impl fmt::Debug for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Digest({})", hex::encode(self.0))
  }
}

impl FromStr for Digest {
  type Err = hex::FromHexError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut bytes = [0u8; DIGEST_LEN];
    hex::decode_to_slice(s, &mut bytes)?;
    Ok(Self(bytes))
  }
}

// ─── Digest computation ──────────────────────────────────────────────────────

/// Digest an in-memory byte sequence (tag-core and pool-core randomness).
pub fn digest_bytes(bytes: &[u8]) -> Digest {
  let mut hasher = blake3::Hasher::new_derive_key(HASH_CONTEXT);
  hasher.update(bytes);
  Digest(*hasher.finalize().as_bytes())
}

/// Digest a reader in 8 KiB chunks (file contents).
pub fn digest_reader<R: Read>(reader: &mut R) -> std::io::Result<Digest> {
  let mut hasher = blake3::Hasher::new_derive_key(HASH_CONTEXT);
  let mut buf = [0u8; STREAM_BUF_LEN];
  loop {
    let n = reader.read(&mut buf)?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }
  Ok(Digest(*hasher.finalize().as_bytes()))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
