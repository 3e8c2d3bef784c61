//! Tag-link attribution — why a tag is on a file.
//!
//! Every tag-file link records a *source*. System sources are pre-seeded
//! and fixed; external sources are user-created rows with monotonically
//! allocated ids.

/// The two source namespaces. The discriminants are the stored
/// `tag_source_type` column values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  System   = 0,
  External = 1,
}

impl SourceKind {
  pub fn as_i64(self) -> i64 { self as i64 }

  pub fn from_i64(v: i64) -> Option<Self> {
    match v {
      0 => Some(Self::System),
      1 => Some(Self::External),
      _ => None,
    }
  }
}

/// The pre-seeded system sources. The discriminants are the stored
/// `tag_source_id` column values within the system namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemSource {
  /// A human (or a plain CLI call) added the tag.
  ManualInsertion = 0,
  /// The tag-tree engine inferred the tag from an implication edge.
  TagParenting    = 1,
}

impl SystemSource {
  pub fn as_i64(self) -> i64 { self as i64 }

  pub fn from_i64(v: i64) -> Option<Self> {
    match v {
      0 => Some(Self::ManualInsertion),
      1 => Some(Self::TagParenting),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::ManualInsertion => "manual insertion",
      Self::TagParenting => "tag parenting",
    }
  }
}

/// A reference to one tag source row, in either namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRef {
  System(SystemSource),
  External(i64),
}

impl SourceRef {
  pub fn kind(self) -> SourceKind {
    match self {
      Self::System(_) => SourceKind::System,
      Self::External(_) => SourceKind::External,
    }
  }

  pub fn id(self) -> i64 {
    match self {
      Self::System(s) => s.as_i64(),
      Self::External(id) => id,
    }
  }
}

/// A `tag_sources` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSource {
  pub source: SourceRef,
  pub name:   String,
}

/// The attribution stored on a tag-file link. `parent_source_id` is the
/// implication-edge row id and is present exactly when the source is
/// `(system, tag parenting)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagAttribution {
  pub source:           SourceRef,
  pub parent_source_id: Option<i64>,
}

impl Default for TagAttribution {
  fn default() -> Self {
    Self {
      source:           SourceRef::System(SystemSource::ManualInsertion),
      parent_source_id: None,
    }
  }
}

impl TagAttribution {
  /// The attribution the tag-tree engine stamps on inferred links.
  pub fn parented_by(edge_row_id: i64) -> Self {
    Self {
      source:           SourceRef::System(SystemSource::TagParenting),
      parent_source_id: Some(edge_row_id),
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_discriminants_round_trip() {
    for kind in [SourceKind::System, SourceKind::External] {
      assert_eq!(SourceKind::from_i64(kind.as_i64()), Some(kind));
    }
    assert_eq!(SourceKind::from_i64(2), None);
  }

  #[test]
  fn system_source_discriminants_round_trip() {
    for src in [SystemSource::ManualInsertion, SystemSource::TagParenting] {
      assert_eq!(SystemSource::from_i64(src.as_i64()), Some(src));
    }
    assert_eq!(SystemSource::from_i64(7), None);
  }

  #[test]
  fn default_attribution_is_manual() {
    let attr = TagAttribution::default();
    assert_eq!(attr.source, SourceRef::System(SystemSource::ManualInsertion));
    assert!(attr.parent_source_id.is_none());
  }
}
