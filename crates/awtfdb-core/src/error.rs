//! Error types for `awtfdb-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A tag name did not fully match the configured `tag_name_regex`.
  /// `matched` is the first subspan the pattern did accept, if any.
  #[error("invalid tag name {text:?}: does not fully match {pattern:?}")]
  InvalidTagName {
    pattern: String,
    text:    String,
    matched: Option<String>,
  },

  /// A query referenced a tag name that is not in the index.
  #[error("unknown tag: {0:?}")]
  UnknownTag(String),

  /// An operation referenced a file that is not in the index.
  #[error("unknown file: {0}")]
  UnknownFile(String),

  /// A byte-amount argument (e.g. `10M`) could not be parsed.
  #[error("invalid byte amount: {0:?}")]
  InvalidByteAmount(String),

  /// The query scanner found no token at the given character offset.
  #[error("unexpected character at offset {offset}")]
  UnexpectedCharacter { offset: usize },

  /// A `hash:` scoped tag did not carry exactly 64 hex characters.
  #[error("malformed hash-scoped tag at offset {offset}")]
  InvalidHashScopedTag { offset: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
