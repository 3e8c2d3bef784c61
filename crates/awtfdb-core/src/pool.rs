//! Pool entities — ordered file collections.

use crate::{hash::Hash, id::HashId};

/// Bytes of randomness behind a pool core.
pub const POOL_CORE_RANDOM_LEN: usize = 64;

/// A pool: an ordered collection of files under a random hashed identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
  pub hash:  Hash,
  /// The random bytes whose digest is `hash.data`.
  pub data:  Vec<u8>,
  pub title: String,
}

/// One `pool_entries` row. Readers rely on `entry_index` order; removal
/// leaves holes, so indices are increasing but not necessarily dense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntry {
  pub file_hash:   HashId,
  pub entry_index: i64,
}
