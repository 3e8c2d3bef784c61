//! The hash entity — the referent of everything else in the index.

use crate::{digest::Digest, id::HashId};

/// A `hashes` row: a time-ordered id bound to a 32-byte digest.
/// Hashes are created once and never updated outside of janitor repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hash {
  pub id:   HashId,
  pub data: Digest,
}
