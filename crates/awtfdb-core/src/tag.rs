//! Tag entities.
//!
//! A tag *core* is the hashed random-byte identity of a tag concept; tag
//! *names* are (text, language) pairs bound to a core. Multiple names may
//! share one core (synonyms, translations).

use crate::{hash::Hash, id::HashId, source::TagAttribution};

/// Bytes of randomness behind a tag core.
pub const TAG_CORE_RANDOM_LEN: usize = 128;

/// The cryptographic identity of a tag concept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCore {
  pub hash: Hash,
  /// The random bytes whose digest is `hash.data`.
  pub data: Vec<u8>,
}

/// A (text, language) name bound to a tag core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTag {
  pub core:     TagCore,
  pub text:     String,
  pub language: String,
}

/// A directed "child implies parent" edge in the tag tree.
/// `row_id` is what inferred tag-file links record as their
/// `parent_source_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagImplication {
  pub row_id: i64,
  pub child:  HashId,
  pub parent: HashId,
}

/// A tag attached to a file, with the attribution recorded on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTag {
  pub core:        HashId,
  pub attribution: TagAttribution,
}
