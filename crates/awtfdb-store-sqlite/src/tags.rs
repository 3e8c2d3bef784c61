//! Named-tag and tag-core operations.

use rand::RngCore as _;
use rusqlite::{params, OptionalExtension as _};

use awtfdb_core::{
  digest::digest_bytes,
  id::HashId,
  tag::{NamedTag, TagCore, TagImplication, TAG_CORE_RANDOM_LEN},
};

use crate::{
  encode::{decode_hash_id, encode_hash_id, RawHash},
  store::HashCreateOptions,
  Error, Result, Store,
};

impl Store {
  // ── Creation ──────────────────────────────────────────────────────────────

  /// Create a named tag. With `core` given, the name becomes a synonym of
  /// that existing concept; otherwise a fresh core is synthesised from 128
  /// random bytes. The text must fully match the configured
  /// `tag_name_regex`, when one is set.
  pub fn create_named_tag(
    &self,
    text: &str,
    language: &str,
    core: Option<&TagCore>,
  ) -> Result<NamedTag> {
    self.verify_tag_name(text)?;

    let core = match core {
      Some(existing) => existing.clone(),
      None => self.create_tag_core()?,
    };

    self.conn().execute(
      "INSERT INTO tag_names (tag_text, tag_language, core_hash)
       VALUES (?1, ?2, ?3)",
      params![text, language, encode_hash_id(core.hash.id)],
    )?;
    Ok(NamedTag {
      core,
      text: text.to_string(),
      language: language.to_string(),
    })
  }

  fn create_tag_core(&self) -> Result<TagCore> {
    let mut data = vec![0u8; TAG_CORE_RANDOM_LEN];
    rand::thread_rng().fill_bytes(&mut data);
    let digest = digest_bytes(&data);

    self.with_savepoint("create_tag_core", || {
      let hash = self.fetch_or_create_hash(digest, HashCreateOptions::default())?;
      self.conn().execute(
        "INSERT INTO tag_cores (core_hash, core_data) VALUES (?1, ?2)",
        params![encode_hash_id(hash.id), data],
      )?;
      Ok(TagCore {
        hash,
        data: data.clone(),
      })
    })
  }

  // ── Lookup ────────────────────────────────────────────────────────────────

  pub fn fetch_named_tag(
    &self,
    text: &str,
    language: &str,
  ) -> Result<Option<NamedTag>> {
    let raw: Option<(String, Vec<u8>, Vec<u8>)> = self
      .conn()
      .query_row(
        "SELECT n.core_hash, h.hash_data, c.core_data
         FROM tag_names n
         JOIN hashes h ON h.id = n.core_hash
         JOIN tag_cores c ON c.core_hash = n.core_hash
         WHERE n.tag_text = ?1 AND n.tag_language = ?2",
        params![text, language],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    raw
      .map(|(core_hash, hash_data, core_data)| {
        Ok(NamedTag {
          core:     TagCore {
            hash: RawHash {
              id: core_hash,
              hash_data,
            }
            .into_hash()?,
            data: core_data,
          },
          text:     text.to_string(),
          language: language.to_string(),
        })
      })
      .transpose()
  }

  /// Every name bound to a core (synonyms and translations).
  pub fn fetch_tags_from_core(&self, core: &TagCore) -> Result<Vec<NamedTag>> {
    let mut stmt = self.conn().prepare(
      "SELECT tag_text, tag_language FROM tag_names
       WHERE core_hash = ?1
       ORDER BY tag_text, tag_language",
    )?;
    let names: Vec<(String, String)> = stmt
      .query_map(params![encode_hash_id(core.hash.id)], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })?
      .collect::<rusqlite::Result<_>>()?;

    Ok(
      names
        .into_iter()
        .map(|(text, language)| NamedTag {
          core: core.clone(),
          text,
          language,
        })
        .collect(),
    )
  }

  // ── Removal ───────────────────────────────────────────────────────────────

  /// Delete a tag concept outright: every name sharing its core, the core
  /// row, and the hash row. Tag-file links go with the core via cascade.
  /// Returns the number of names removed.
  pub fn delete_named_tag_all(&self, tag: &NamedTag) -> Result<usize> {
    let core_id = encode_hash_id(tag.core.hash.id);
    self.with_savepoint("delete_tag_all", || {
      let names = self.conn().execute(
        "DELETE FROM tag_names WHERE core_hash = ?1",
        params![core_id],
      )?;
      let cores = self.conn().execute(
        "DELETE FROM tag_cores WHERE core_hash = ?1",
        params![core_id],
      )?;
      if cores != 1 {
        return Err(Error::InconsistentIndex(format!(
          "expected one tag_cores row for {core_id}, deleted {cores}"
        )));
      }
      let hashes = self
        .conn()
        .execute("DELETE FROM hashes WHERE id = ?1", params![core_id])?;
      if hashes != 1 {
        return Err(Error::InconsistentIndex(format!(
          "expected one hashes row for {core_id}, deleted {hashes}"
        )));
      }
      Ok(names)
    })
  }

  // ── Implications ──────────────────────────────────────────────────────────

  /// Declare "child implies parent". Returns the edge's row id — the value
  /// inferred links record as their `parent_source_id`.
  pub fn create_tag_parent(
    &self,
    child: &TagCore,
    parent: &TagCore,
  ) -> Result<i64> {
    self.conn().execute(
      "INSERT INTO tag_implications (child_tag, parent_tag) VALUES (?1, ?2)",
      params![
        encode_hash_id(child.hash.id),
        encode_hash_id(parent.hash.id)
      ],
    )?;
    Ok(self.conn().last_insert_rowid())
  }

  pub fn fetch_tag_implications(&self) -> Result<Vec<TagImplication>> {
    let mut stmt = self.conn().prepare(
      "SELECT row_id, child_tag, parent_tag FROM tag_implications
       ORDER BY row_id",
    )?;
    let raws: Vec<(i64, String, String)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
      .collect::<rusqlite::Result<_>>()?;

    raws
      .into_iter()
      .map(|(row_id, child, parent)| {
        Ok(TagImplication {
          row_id,
          child: decode_hash_id(&child)?,
          parent: decode_hash_id(&parent)?,
        })
      })
      .collect()
  }

  /// The cores currently tagged on a file, without attribution detail.
  pub(crate) fn fetch_tag_cores_for_file(
    &self,
    file_hash: HashId,
  ) -> Result<Vec<HashId>> {
    let mut stmt = self
      .conn()
      .prepare("SELECT core_hash FROM tag_files WHERE file_hash = ?1")?;
    let cores: Vec<String> = stmt
      .query_map(params![encode_hash_id(file_hash)], |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?;
    cores.iter().map(|s| decode_hash_id(s)).collect()
  }
}
