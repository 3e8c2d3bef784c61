//! Tag-source rows — the attribution registry.

use rusqlite::{params, OptionalExtension as _};

use awtfdb_core::source::{SourceKind, SourceRef, SystemSource, TagSource};

use crate::{Error, Result, Store};

impl Store {
  /// Register an external source. Ids are allocated monotonically within
  /// the external namespace (`max + 1`, starting at 0).
  pub fn create_tag_source(&self, name: &str) -> Result<TagSource> {
    let id: i64 = self.conn().query_row(
      "SELECT COALESCE(MAX(id), -1) + 1 FROM tag_sources WHERE type = ?1",
      params![SourceKind::External.as_i64()],
      |row| row.get(0),
    )?;
    self.conn().execute(
      "INSERT INTO tag_sources (type, id, name) VALUES (?1, ?2, ?3)",
      params![SourceKind::External.as_i64(), id, name],
    )?;
    Ok(TagSource {
      source: SourceRef::External(id),
      name:   name.to_string(),
    })
  }

  /// Look up a source. System ids are validated against the fixed enum
  /// before touching the table; unknown system ids are simply absent.
  pub fn fetch_tag_source(
    &self,
    kind: SourceKind,
    id: i64,
  ) -> Result<Option<TagSource>> {
    let source = match kind {
      SourceKind::System => match SystemSource::from_i64(id) {
        Some(system) => SourceRef::System(system),
        None => return Ok(None),
      },
      SourceKind::External => SourceRef::External(id),
    };

    let name: Option<String> = self
      .conn()
      .query_row(
        "SELECT name FROM tag_sources WHERE type = ?1 AND id = ?2",
        params![kind.as_i64(), id],
        |row| row.get(0),
      )
      .optional()?;

    match (name, kind) {
      (Some(name), _) => Ok(Some(TagSource { source, name })),
      // The system rows are seeded by migration; a hole is corruption.
      (None, SourceKind::System) => Err(Error::InconsistentIndex(format!(
        "missing seeded system tag source {id}"
      ))),
      (None, SourceKind::External) => Ok(None),
    }
  }

  /// Delete an external source. System sources are fixed infrastructure
  /// and may never be removed.
  pub fn delete_tag_source(&self, source: &TagSource) -> Result<()> {
    assert!(
      matches!(source.source, SourceRef::External(_)),
      "only external tag sources can be deleted"
    );
    self.conn().execute(
      "DELETE FROM tag_sources WHERE type = ?1 AND id = ?2",
      params![source.source.kind().as_i64(), source.source.id()],
    )?;
    Ok(())
  }
}
