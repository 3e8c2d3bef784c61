//! The file entity.

use std::path::PathBuf;

use crate::hash::Hash;

/// A `files` row: a content hash bound to an absolute on-disk path.
/// Deleting a file removes only this binding; the hash stays behind until
/// the janitor sweeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
  pub hash:       Hash,
  pub local_path: PathBuf,
}
