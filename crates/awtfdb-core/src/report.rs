//! The janitor report document.
//!
//! A report summarises one audit run: per-problem counters plus the rows a
//! later `--from-report` run should revisit. Counters are keyed by the
//! [`Problem`] enum rather than by struct fields so callers can iterate
//! every class without reflection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Current report document version.
pub const REPORT_VERSION: u32 = 1;

/// How long a report stays usable for `--from-report`, in seconds.
pub const REPORT_MAX_AGE_SECS: i64 = 60 * 60;

// ─── Problems & counters ─────────────────────────────────────────────────────

/// The problem classes the janitor counts. The serialized names are the
/// counter keys in the report JSON.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Problem {
  FileNotFound,
  IncorrectHashFiles,
  IncorrectHashCores,
  UnusedHash,
  InvalidTagName,
}

impl Problem {
  pub const ALL: [Problem; 5] = [
    Problem::FileNotFound,
    Problem::IncorrectHashFiles,
    Problem::IncorrectHashCores,
    Problem::UnusedHash,
    Problem::InvalidTagName,
  ];
}

/// One counter pair: everything seen, and the subset repair cannot fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
  pub total:        u64,
  pub unrepairable: u64,
}

/// Enum-keyed counter map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counters(BTreeMap<Problem, Counter>);

impl Counters {
  pub fn bump(&mut self, problem: Problem) {
    self.0.entry(problem).or_default().total += 1;
  }

  pub fn bump_unrepairable(&mut self, problem: Problem) {
    let counter = self.0.entry(problem).or_default();
    counter.total += 1;
    counter.unrepairable += 1;
  }

  pub fn get(&self, problem: Problem) -> Counter {
    self.0.get(&problem).copied().unwrap_or_default()
  }

  /// Total problems across every class.
  pub fn total_problems(&self) -> u64 {
    Problem::ALL.iter().map(|p| self.get(*p).total).sum()
  }
}

// ─── Row entries ─────────────────────────────────────────────────────────────

/// A `files` row whose path could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNotFoundEntry {
  /// 26-character hash id.
  pub file_hash:  String,
  pub local_path: String,
}

/// A `files` row whose recomputed content digest did not match the stored
/// one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncorrectHashEntry {
  /// 26-character hash id.
  pub file_hash:  String,
  pub local_path: String,
  /// Hex digest currently stored in `hashes`.
  pub expected:   String,
  /// Hex digest recomputed from disk.
  pub computed:   String,
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// The full report document, serialized as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JanitorReport {
  pub version:          u32,
  pub counters:         Counters,
  /// Unix seconds at the end of the run.
  pub timestamp:        i64,
  pub files_not_found:  Vec<FileNotFoundEntry>,
  pub incorrect_hashes: Vec<IncorrectHashEntry>,
}

impl JanitorReport {
  pub fn new() -> Self {
    Self {
      version: REPORT_VERSION,
      ..Self::default()
    }
  }

  /// Whether the report is too old to drive a `--from-report` run.
  pub fn is_stale(&self, now_unix: i64) -> bool {
    now_unix - self.timestamp > REPORT_MAX_AGE_SECS
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counters_accumulate() {
    let mut c = Counters::default();
    c.bump(Problem::UnusedHash);
    c.bump(Problem::UnusedHash);
    c.bump_unrepairable(Problem::InvalidTagName);

    assert_eq!(c.get(Problem::UnusedHash).total, 2);
    assert_eq!(c.get(Problem::UnusedHash).unrepairable, 0);
    assert_eq!(c.get(Problem::InvalidTagName).total, 1);
    assert_eq!(c.get(Problem::InvalidTagName).unrepairable, 1);
    assert_eq!(c.total_problems(), 3);
  }

  #[test]
  fn counter_keys_serialize_snake_case() {
    let mut c = Counters::default();
    c.bump(Problem::FileNotFound);
    c.bump_unrepairable(Problem::IncorrectHashCores);

    let json = serde_json::to_value(&c).unwrap();
    assert_eq!(json["file_not_found"]["total"], 1);
    assert_eq!(json["incorrect_hash_cores"]["unrepairable"], 1);
  }

  #[test]
  fn staleness_window_is_one_hour() {
    let mut report = JanitorReport::new();
    report.timestamp = 10_000;
    assert!(!report.is_stale(10_000 + REPORT_MAX_AGE_SECS));
    assert!(report.is_stale(10_000 + REPORT_MAX_AGE_SECS + 1));
  }

  #[test]
  fn report_document_round_trips() {
    let mut report = JanitorReport::new();
    report.timestamp = 1_700_000_000;
    report.counters.bump(Problem::FileNotFound);
    report.files_not_found.push(FileNotFoundEntry {
      file_hash:  "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
      local_path: "/tmp/missing".to_string(),
    });

    let json = serde_json::to_string(&report).unwrap();
    let back: JanitorReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
    assert_eq!(back.version, REPORT_VERSION);
  }
}
