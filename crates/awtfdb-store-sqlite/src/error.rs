//! Error type for `awtfdb-store-sqlite`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] awtfdb_core::Error),

  #[error("database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// The store could not be opened or configured.
  #[error("could not open or configure the store: {0}")]
  ConfigFail(String),

  /// `PRAGMA integrity_check` returned something other than a single "ok".
  #[error("integrity check failed: {rows:?}")]
  FailedIntegrityCheck { rows: Vec<String> },

  /// `PRAGMA foreign_key_check` returned violations.
  #[error("foreign key check failed: {rows:?}")]
  FailedForeignKeyCheck { rows: Vec<String> },

  /// The configured `tag_name_regex` value does not compile.
  #[error("invalid tag_name_regex pattern: {0}")]
  InvalidRegex(String),

  /// A file is gone from disk and it is the only path bound to its hash;
  /// repair cannot decide for the user.
  #[error(
    "manual intervention required for {local_path:?} (hash {file_hash})"
  )]
  ManualInterventionRequired {
    file_hash:  String,
    local_path: PathBuf,
  },

  /// A tag name violates the configured pattern; repair has no safe rewrite.
  #[error("tag name {text:?} is invalid and cannot be repaired")]
  UnrepairableTagName { text: String },

  /// A cross-table reference that foreign keys should have made impossible.
  #[error("inconsistent index: {0}")]
  InconsistentIndex(String),

  /// A loaded janitor report is past its usable window.
  #[error("janitor report is stale ({age_secs}s old)")]
  StaleReport { age_secs: i64 },

  /// A path that cannot be stored in a TEXT column.
  #[error("path is not valid utf-8: {0:?}")]
  NonUtf8Path(PathBuf),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
