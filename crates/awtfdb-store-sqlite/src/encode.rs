//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Hash ids are stored as 26-character ULID TEXT, digests and core
//! randomness as BLOBs, paths as UTF-8 TEXT. Decode failures on data read
//! back from the store are index inconsistencies, not caller errors.

use std::path::{Path, PathBuf};

use awtfdb_core::{
  digest::Digest,
  file::File,
  hash::Hash,
  id::HashId,
  source::{SourceKind, SourceRef, SystemSource},
};

use crate::{Error, Result};

// ─── HashId ──────────────────────────────────────────────────────────────────

pub fn encode_hash_id(id: HashId) -> String { id.to_string() }

pub fn decode_hash_id(s: &str) -> Result<HashId> {
  s.parse().map_err(|_| {
    Error::InconsistentIndex(format!("malformed hash id in store: {s:?}"))
  })
}

// ─── Digest ──────────────────────────────────────────────────────────────────

pub fn encode_digest(d: &Digest) -> Vec<u8> { d.as_bytes().to_vec() }

pub fn decode_digest(blob: &[u8]) -> Result<Digest> {
  Digest::from_slice(blob).ok_or_else(|| {
    Error::InconsistentIndex(format!(
      "stored digest has length {}, expected 32",
      blob.len()
    ))
  })
}

// ─── Tag sources ─────────────────────────────────────────────────────────────

/// Decode the stored `(tag_source_type, tag_source_id)` column pair.
pub fn decode_source(kind: i64, id: i64) -> Result<SourceRef> {
  match SourceKind::from_i64(kind) {
    Some(SourceKind::System) => SystemSource::from_i64(id)
      .map(SourceRef::System)
      .ok_or_else(|| {
        Error::InconsistentIndex(format!("unknown system tag source id {id}"))
      }),
    Some(SourceKind::External) => Ok(SourceRef::External(id)),
    None => Err(Error::InconsistentIndex(format!(
      "unknown tag source type {kind}"
    ))),
  }
}

// ─── Paths ───────────────────────────────────────────────────────────────────

pub fn encode_path(path: &Path) -> Result<&str> {
  path
    .to_str()
    .ok_or_else(|| Error::NonUtf8Path(path.to_path_buf()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns of a `hashes` row.
pub struct RawHash {
  pub id:        String,
  pub hash_data: Vec<u8>,
}

impl RawHash {
  pub fn into_hash(self) -> Result<Hash> {
    Ok(Hash {
      id:   decode_hash_id(&self.id)?,
      data: decode_digest(&self.hash_data)?,
    })
  }
}

/// Raw columns of a `files` row joined with `hashes`.
pub struct RawFile {
  pub file_hash:  String,
  pub hash_data:  Vec<u8>,
  pub local_path: String,
}

impl RawFile {
  pub fn into_file(self) -> Result<File> {
    Ok(File {
      hash:       RawHash {
        id:        self.file_hash,
        hash_data: self.hash_data,
      }
      .into_hash()?,
      local_path: PathBuf::from(self.local_path),
    })
  }
}
