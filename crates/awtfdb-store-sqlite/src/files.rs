//! File operations: indexing, lookup, tagging, renaming, removal.

use std::{fs, path::Path, time::UNIX_EPOCH};

use rusqlite::{params, OptionalExtension as _};

use awtfdb_core::{
  digest::{digest_reader, Digest},
  file::File,
  id::HashId,
  source::{SourceRef, SystemSource, TagAttribution},
  tag::FileTag,
};

use crate::{
  encode::{
    decode_source, encode_hash_id, encode_path, RawFile,
  },
  store::HashCreateOptions,
  Error, Result, Store,
};

/// Options for [`Store::create_file_from_path`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateFileOptions {
  /// Encode the file's mtime (not "now") into a freshly minted hash id.
  pub use_file_mtime: bool,
}

const SELECT_FILE: &str = "SELECT f.file_hash, h.hash_data, f.local_path
   FROM files f JOIN hashes h ON h.id = f.file_hash";

impl Store {
  // ── Indexing ──────────────────────────────────────────────────────────────

  /// Index a file: resolve `path` to its canonical absolute form, reuse the
  /// existing row if that path is already indexed, otherwise stream-hash
  /// the contents and insert.
  pub fn create_file_from_path(
    &self,
    path: &Path,
    options: CreateFileOptions,
  ) -> Result<File> {
    let abs = fs::canonicalize(path)?;
    if let Some(existing) = self.fetch_file_by_path(&abs)? {
      return Ok(existing);
    }

    let mut handle = fs::File::open(&abs)?;
    let digest = digest_reader(&mut handle)?;

    let file_mtime_ms = if options.use_file_mtime {
      let modified = fs::metadata(&abs)?.modified()?;
      Some(
        modified
          .duration_since(UNIX_EPOCH)
          .map(|d| d.as_millis() as u64)
          .unwrap_or(0),
      )
    } else {
      None
    };

    let hash = self.fetch_or_create_hash(
      digest,
      HashCreateOptions { file_mtime_ms },
    )?;
    self.conn().execute(
      "INSERT INTO files (file_hash, local_path) VALUES (?1, ?2)
       ON CONFLICT DO NOTHING",
      params![encode_hash_id(hash.id), encode_path(&abs)?],
    )?;
    Ok(File {
      hash,
      local_path: abs,
    })
  }

  // ── Lookup ────────────────────────────────────────────────────────────────

  /// Fetch any file bound to this hash id. With several paths sharing a
  /// hash, the lexicographically first path wins.
  pub fn fetch_file(&self, id: HashId) -> Result<Option<File>> {
    let raw: Option<RawFile> = self
      .conn()
      .query_row(
        &format!("{SELECT_FILE} WHERE f.file_hash = ?1 ORDER BY f.local_path LIMIT 1"),
        params![encode_hash_id(id)],
        raw_file_row,
      )
      .optional()?;
    raw.map(RawFile::into_file).transpose()
  }

  /// Fetch the exact (hash id, path) binding.
  pub fn fetch_file_exact(
    &self,
    id: HashId,
    path: &Path,
  ) -> Result<Option<File>> {
    let raw: Option<RawFile> = self
      .conn()
      .query_row(
        &format!("{SELECT_FILE} WHERE f.file_hash = ?1 AND f.local_path = ?2"),
        params![encode_hash_id(id), encode_path(path)?],
        raw_file_row,
      )
      .optional()?;
    raw.map(RawFile::into_file).transpose()
  }

  pub fn fetch_file_by_path(&self, path: &Path) -> Result<Option<File>> {
    let raw: Option<RawFile> = self
      .conn()
      .query_row(
        &format!("{SELECT_FILE} WHERE f.local_path = ?1"),
        params![encode_path(path)?],
        raw_file_row,
      )
      .optional()?;
    raw.map(RawFile::into_file).transpose()
  }

  pub fn fetch_file_by_digest(
    &self,
    digest: &Digest,
  ) -> Result<Option<File>> {
    match self.fetch_hash_by_digest(digest)? {
      Some(hash) => self.fetch_file(hash.id),
      None => Ok(None),
    }
  }

  // ── Tag links ─────────────────────────────────────────────────────────────

  /// Attach a tag core to a file. An already-present link is a silent
  /// no-op; the return value says whether a row was actually inserted.
  ///
  /// `parent_source_id` must be set exactly when the attribution is
  /// `(system, tag parenting)` — anything else is a caller bug.
  pub fn add_tag(
    &self,
    file_hash: HashId,
    core_hash: HashId,
    attribution: Option<TagAttribution>,
  ) -> Result<bool> {
    let attribution = attribution.unwrap_or_default();
    let parenting =
      attribution.source == SourceRef::System(SystemSource::TagParenting);
    assert_eq!(
      parenting,
      attribution.parent_source_id.is_some(),
      "parent_source_id is required exactly when the source is \
       (system, tag parenting)"
    );

    let affected = self.conn().execute(
      "INSERT INTO tag_files
           (file_hash, core_hash, tag_source_type, tag_source_id,
            parent_source_id)
       VALUES (?1, ?2, ?3, ?4, ?5)
       ON CONFLICT (file_hash, core_hash) DO NOTHING",
      params![
        encode_hash_id(file_hash),
        encode_hash_id(core_hash),
        attribution.source.kind().as_i64(),
        attribution.source.id(),
        attribution.parent_source_id,
      ],
    )?;
    Ok(affected > 0)
  }

  pub fn remove_tag(
    &self,
    file_hash: HashId,
    core_hash: HashId,
  ) -> Result<bool> {
    let affected = self.conn().execute(
      "DELETE FROM tag_files WHERE file_hash = ?1 AND core_hash = ?2",
      params![encode_hash_id(file_hash), encode_hash_id(core_hash)],
    )?;
    Ok(affected > 0)
  }

  /// All tag links on a file, with their attributions.
  pub fn fetch_tags(&self, file_hash: HashId) -> Result<Vec<FileTag>> {
    let mut stmt = self.conn().prepare(
      "SELECT core_hash, tag_source_type, tag_source_id, parent_source_id
       FROM tag_files WHERE file_hash = ?1",
    )?;
    let raws: Vec<(String, i64, i64, Option<i64>)> = stmt
      .query_map(params![encode_hash_id(file_hash)], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })?
      .collect::<rusqlite::Result<_>>()?;

    raws
      .into_iter()
      .map(|(core, kind, id, parent_source_id)| {
        Ok(FileTag {
          core:        crate::encode::decode_hash_id(&core)?,
          attribution: TagAttribution {
            source: decode_source(kind, id)?,
            parent_source_id,
          },
        })
      })
      .collect()
  }

  // ── Renames & removal ─────────────────────────────────────────────────────

  /// Atomically re-bind a file row to a new path, keyed on the old
  /// (hash, path) pair so a concurrent rename cannot be half-applied.
  pub fn set_local_path(
    &self,
    file: &mut File,
    new_path: impl Into<std::path::PathBuf>,
  ) -> Result<()> {
    let new_path = new_path.into();
    let affected = self.conn().execute(
      "UPDATE files SET local_path = ?1
       WHERE file_hash = ?2 AND local_path = ?3",
      params![
        encode_path(&new_path)?,
        encode_hash_id(file.hash.id),
        encode_path(&file.local_path)?,
      ],
    )?;
    if affected != 1 {
      return Err(Error::Core(awtfdb_core::Error::UnknownFile(
        file.hash.id.to_string(),
      )));
    }
    file.local_path = new_path;
    Ok(())
  }

  /// Remove the file's row. The hash stays behind for the janitor's
  /// unused-hash sweep.
  pub fn delete_file(&self, file: &File) -> Result<()> {
    self.conn().execute(
      "DELETE FROM files WHERE file_hash = ?1 AND local_path = ?2",
      params![encode_hash_id(file.hash.id), encode_path(&file.local_path)?],
    )?;
    Ok(())
  }
}

fn raw_file_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFile> {
  Ok(RawFile {
    file_hash:  row.get(0)?,
    hash_data:  row.get(1)?,
    local_path: row.get(2)?,
  })
}
