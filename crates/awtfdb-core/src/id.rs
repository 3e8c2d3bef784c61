//! Time-ordered hash identifiers.
//!
//! A [`HashId`] is a ULID: a 48-bit millisecond timestamp followed by 80
//! random bits, rendered as 26 Crockford base-32 characters. Lexicographic
//! order over the text form equals chronological order over the timestamps.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Largest value representable in the 48-bit ULID time field.
const MAX_TIMESTAMP_MS: u64 = (1 << 48) - 1;

/// The identifier assigned to every `hashes` row.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HashId(Ulid);

impl HashId {
  /// Mint an id stamped with the current wall-clock time.
  pub fn now() -> Self { Self(Ulid::new()) }

  /// Mint an id whose time component is the given unix-millisecond stamp.
  ///
  /// Used when inserting a hash for a file so the id preserves the file's
  /// mtime as its time component.
  ///
  /// # Panics
  ///
  /// Panics if `ms` does not fit the 48-bit ULID time field. That can only
  /// happen with a timestamp past the year 10889 — a programmer error, not
  /// a recoverable condition.
  pub fn from_unix_ms(ms: u64) -> Self {
    assert!(
      ms <= MAX_TIMESTAMP_MS,
      "timestamp {ms} overflows the 48-bit ULID time field"
    );
    Self(Ulid::from_parts(ms, rand::random::<u128>()))
  }

  /// The millisecond timestamp encoded in this id.
  pub fn timestamp_ms(&self) -> u64 { self.0.timestamp_ms() }
}

impl fmt::Display for HashId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for HashId {
  type Err = ulid::DecodeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self(Ulid::from_string(s)?))
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn text_form_is_26_crockford_chars() {
    let id = HashId::now().to_string();
    assert_eq!(id.len(), 26);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
  }

  #[test]
  fn ids_sort_by_time() {
    let earlier = HashId::from_unix_ms(1_000_000);
    let later = HashId::from_unix_ms(2_000_000);
    assert!(earlier < later);
    assert!(earlier.to_string() < later.to_string());
  }

  #[test]
  fn explicit_timestamp_round_trips() {
    let id = HashId::from_unix_ms(1_647_795_491_000);
    assert_eq!(id.timestamp_ms(), 1_647_795_491_000);
  }

  #[test]
  fn text_round_trip() {
    let id = HashId::now();
    let parsed: HashId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
  }

  #[test]
  #[should_panic(expected = "overflows the 48-bit ULID time field")]
  fn oversized_timestamp_panics() {
    let _ = HashId::from_unix_ms(1 << 48);
  }
}
