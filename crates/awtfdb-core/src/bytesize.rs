//! Parser for the janitor's `--hash-files-smaller-than` argument.

use crate::error::{Error, Result};

/// Parse `<N>`, `<N>K`, `<N>M`, or `<N>G` into a byte count.
/// Suffixes are powers of 1024.
pub fn parse_byte_amount(s: &str) -> Result<u64> {
  let err = || Error::InvalidByteAmount(s.to_string());

  let (digits, multiplier) = match s.chars().last() {
    Some('K') => (&s[..s.len() - 1], 1024u64),
    Some('M') => (&s[..s.len() - 1], 1024 * 1024),
    Some('G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
    Some(c) if c.is_ascii_digit() => (s, 1),
    _ => return Err(err()),
  };

  if digits.is_empty() {
    return Err(err());
  }
  let n: u64 = digits.parse().map_err(|_| err())?;
  n.checked_mul(multiplier).ok_or_else(err)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_bytes() {
    assert_eq!(parse_byte_amount("4096").unwrap(), 4096);
  }

  #[test]
  fn suffixes() {
    assert_eq!(parse_byte_amount("2K").unwrap(), 2048);
    assert_eq!(parse_byte_amount("10M").unwrap(), 10 * 1024 * 1024);
    assert_eq!(parse_byte_amount("1G").unwrap(), 1024 * 1024 * 1024);
  }

  #[test]
  fn malformed_inputs_rejected() {
    for bad in ["", "K", "10X", "M10", "1.5M", "-3K"] {
      assert!(
        matches!(parse_byte_amount(bad), Err(Error::InvalidByteAmount(_))),
        "expected {bad:?} to be rejected"
      );
    }
  }
}
