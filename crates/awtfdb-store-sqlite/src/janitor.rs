//! The janitor — offline consistency audit with optional repair.
//!
//! Phases, in order: database-level checks (`integrity_check`,
//! `foreign_key_check`), file rows, tag cores, unused hashes, tag names.
//! Each problem class is counted separately; repair runs the whole audit
//! inside one savepoint so an aborted repair leaves the database untouched.

use std::{
  fs,
  io::ErrorKind,
  path::{Path, PathBuf},
};

use chrono::Utc;
use rusqlite::params;

use awtfdb_core::{
  digest::{digest_bytes, digest_reader, Digest},
  id::HashId,
  report::{
    FileNotFoundEntry, IncorrectHashEntry, JanitorReport, Problem,
    REPORT_VERSION,
  },
};

use crate::{
  encode::{decode_digest, decode_hash_id, encode_digest, encode_hash_id},
  migrations, Error, Result, Store,
};

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct JanitorOptions {
  /// Re-hash file contents, not just stat them.
  pub full: bool,
  /// With `full`, only re-hash files under one of these prefixes.
  /// Empty means every file.
  pub only: Vec<PathBuf>,
  /// Fix what can be fixed; abort on what cannot.
  pub repair: bool,
  /// With `full`, skip files at or above this size.
  pub hash_files_smaller_than: Option<u64>,
  /// Skip the database-level PRAGMA checks.
  pub skip_db: bool,
  /// Skip re-hashing tag core randomness.
  pub skip_tag_cores: bool,
}

// ─── Janitor ─────────────────────────────────────────────────────────────────

pub struct Janitor<'a> {
  store:       &'a Store,
  options:     JanitorOptions,
  from_report: Option<JanitorReport>,
  report:      JanitorReport,
}

/// One `files` row under audit.
struct FileRow {
  file_hash:     HashId,
  local_path:    PathBuf,
  stored_digest: Digest,
}

impl<'a> Janitor<'a> {
  pub fn new(store: &'a Store, options: JanitorOptions) -> Self {
    Self {
      store,
      options,
      from_report: None,
      report: JanitorReport::new(),
    }
  }

  /// The report produced by the last [`run`](Self::run).
  pub fn report(&self) -> &JanitorReport { &self.report }

  /// Load a previous run's report. The file phase will then revisit only
  /// the rows that report lists; anything that broke *after* the report
  /// was taken goes unnoticed until a fresh full run. Reports older than
  /// an hour are rejected.
  pub fn load_report(&mut self, path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)?;
    let report: JanitorReport = serde_json::from_str(&raw)?;
    if report.version != REPORT_VERSION {
      return Err(Error::ConfigFail(format!(
        "unsupported janitor report version {}",
        report.version
      )));
    }
    let now = Utc::now().timestamp();
    if report.is_stale(now) {
      return Err(Error::StaleReport {
        age_secs: now - report.timestamp,
      });
    }
    self.from_report = Some(report);
    Ok(())
  }

  /// Run every phase. With repair enabled the whole run happens inside a
  /// savepoint: an unrepairable problem aborts and rolls every fix back.
  pub fn run(&mut self) -> Result<&JanitorReport> {
    self.report = JanitorReport::new();

    if self.options.repair {
      let store = self.store;
      store.with_savepoint("janitor_repair", || self.phases())?;
    } else {
      self.phases()?;
    }

    self.report.timestamp = Utc::now().timestamp();
    Ok(&self.report)
  }

  fn phases(&mut self) -> Result<()> {
    if !self.options.skip_db {
      tracing::info!("checking database integrity");
      migrations::integrity_check(self.store.conn())?;
      migrations::foreign_key_check(self.store.conn())?;
    }

    tracing::info!("checking file rows");
    self.check_files()?;

    if !self.options.skip_tag_cores {
      tracing::info!("checking tag cores");
      self.check_tag_cores()?;
    }

    tracing::info!("checking for unused hashes");
    self.check_unused_hashes()?;

    tracing::info!("checking tag names");
    self.check_tag_names()?;
    Ok(())
  }

  // ── Phase: files ──────────────────────────────────────────────────────────

  fn check_files(&mut self) -> Result<()> {
    for row in self.file_rows()? {
      self.check_one_file(row)?;
    }
    Ok(())
  }

  /// The rows the file phase visits: a loaded report's rows (re-fetched,
  /// skipping anything already gone from the table), or every row.
  fn file_rows(&self) -> Result<Vec<FileRow>> {
    if let Some(report) = &self.from_report {
      let mut rows = Vec::new();
      let listed = report
        .files_not_found
        .iter()
        .map(|e| (&e.file_hash, &e.local_path))
        .chain(
          report
            .incorrect_hashes
            .iter()
            .map(|e| (&e.file_hash, &e.local_path)),
        );
      for (file_hash, local_path) in listed {
        if let Some(row) = self.fetch_file_row(file_hash, local_path)? {
          rows.push(row);
        }
      }
      return Ok(rows);
    }

    let mut stmt = self.store.conn().prepare(
      "SELECT f.file_hash, f.local_path, h.hash_data
       FROM files f LEFT JOIN hashes h ON h.id = f.file_hash",
    )?;
    let raws: Vec<(String, String, Option<Vec<u8>>)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
      .collect::<rusqlite::Result<_>>()?;

    raws
      .into_iter()
      .map(|(file_hash, local_path, hash_data)| {
        let hash_data = hash_data.ok_or_else(|| {
          Error::InconsistentIndex(format!(
            "files row {file_hash} references a hash that does not exist"
          ))
        })?;
        Ok(FileRow {
          file_hash:     decode_hash_id(&file_hash)?,
          local_path:    PathBuf::from(local_path),
          stored_digest: decode_digest(&hash_data)?,
        })
      })
      .collect()
  }

  fn fetch_file_row(
    &self,
    file_hash: &str,
    local_path: &str,
  ) -> Result<Option<FileRow>> {
    use rusqlite::OptionalExtension as _;

    let raw: Option<(String, String, Vec<u8>)> = self
      .store
      .conn()
      .query_row(
        "SELECT f.file_hash, f.local_path, h.hash_data
         FROM files f JOIN hashes h ON h.id = f.file_hash
         WHERE f.file_hash = ?1 AND f.local_path = ?2",
        params![file_hash, local_path],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    raw
      .map(|(file_hash, local_path, hash_data)| {
        Ok(FileRow {
          file_hash:     decode_hash_id(&file_hash)?,
          local_path:    PathBuf::from(local_path),
          stored_digest: decode_digest(&hash_data)?,
        })
      })
      .transpose()
  }

  fn check_one_file(&mut self, row: FileRow) -> Result<()> {
    let mut handle = match fs::File::open(&row.local_path) {
      Ok(handle) => handle,
      Err(e) if e.kind() == ErrorKind::NotFound => {
        return self.handle_missing_file(row);
      }
      Err(e) => return Err(e.into()),
    };

    if !self.options.full || !self.path_selected(&row.local_path) {
      return Ok(());
    }
    if let Some(limit) = self.options.hash_files_smaller_than {
      if handle.metadata()?.len() >= limit {
        return Ok(());
      }
    }

    let computed = digest_reader(&mut handle)?;
    if computed == row.stored_digest {
      return Ok(());
    }

    tracing::warn!(
      path = %row.local_path.display(),
      "file contents no longer match stored hash"
    );
    self.report.counters.bump(Problem::IncorrectHashFiles);
    self.report.incorrect_hashes.push(IncorrectHashEntry {
      file_hash:  encode_hash_id(row.file_hash),
      local_path: row.local_path.display().to_string(),
      expected:   row.stored_digest.to_string(),
      computed:   computed.to_string(),
    });

    if self.options.repair {
      self.repair_incorrect_hash(&row, &computed)?;
    }
    Ok(())
  }

  /// A path that no longer opens. More than one path on the hash means the
  /// file moved and the stale binding can go; a lone path needs a human.
  fn handle_missing_file(&mut self, row: FileRow) -> Result<()> {
    let siblings: i64 = self.store.conn().query_row(
      "SELECT COUNT(*) FROM files WHERE file_hash = ?1",
      params![encode_hash_id(row.file_hash)],
      |r| r.get(0),
    )?;

    self.report.files_not_found.push(FileNotFoundEntry {
      file_hash:  encode_hash_id(row.file_hash),
      local_path: row.local_path.display().to_string(),
    });

    if siblings > 1 {
      self.report.counters.bump(Problem::FileNotFound);
      if self.options.repair {
        tracing::info!(
          path = %row.local_path.display(),
          "removing stale binding for moved file"
        );
        self.store.conn().execute(
          "DELETE FROM files WHERE file_hash = ?1 AND local_path = ?2",
          params![
            encode_hash_id(row.file_hash),
            row.local_path.display().to_string()
          ],
        )?;
      }
    } else {
      self.report.counters.bump_unrepairable(Problem::FileNotFound);
      if self.options.repair {
        return Err(Error::ManualInterventionRequired {
          file_hash:  encode_hash_id(row.file_hash),
          local_path: row.local_path,
        });
      }
    }
    Ok(())
  }

  /// Contents changed on disk. When the new digest is already indexed the
  /// row is repointed at it; otherwise the digest is rewritten in place on
  /// the existing hash id.
  fn repair_incorrect_hash(
    &mut self,
    row: &FileRow,
    computed: &Digest,
  ) -> Result<()> {
    let path_text = row.local_path.display().to_string();
    match self.store.fetch_hash_by_digest(computed)? {
      Some(existing) => {
        self.store.conn().execute(
          "UPDATE files SET file_hash = ?1
           WHERE file_hash = ?2 AND local_path = ?3",
          params![
            encode_hash_id(existing.id),
            encode_hash_id(row.file_hash),
            path_text
          ],
        )?;
      }
      None => {
        self.store.conn().execute(
          "UPDATE hashes SET hash_data = ?1 WHERE id = ?2",
          params![encode_digest(computed), encode_hash_id(row.file_hash)],
        )?;
      }
    }
    Ok(())
  }

  fn path_selected(&self, path: &Path) -> bool {
    self.options.only.is_empty()
      || self.options.only.iter().any(|prefix| path.starts_with(prefix))
  }

  // ── Phase: tag cores ──────────────────────────────────────────────────────

  fn check_tag_cores(&mut self) -> Result<()> {
    let mut stmt = self.store.conn().prepare(
      "SELECT c.core_hash, c.core_data, h.hash_data
       FROM tag_cores c JOIN hashes h ON h.id = c.core_hash",
    )?;
    let raws: Vec<(String, Vec<u8>, Vec<u8>)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
      .collect::<rusqlite::Result<_>>()?;

    for (core_hash, core_data, hash_data) in raws {
      let stored = decode_digest(&hash_data)?;
      if digest_bytes(&core_data) != stored {
        tracing::warn!(core = %core_hash, "tag core randomness does not hash to its id");
        self
          .report
          .counters
          .bump_unrepairable(Problem::IncorrectHashCores);
      }
    }
    Ok(())
  }

  // ── Phase: unused hashes ──────────────────────────────────────────────────

  fn check_unused_hashes(&mut self) -> Result<()> {
    let mut stmt = self.store.conn().prepare(
      "SELECT id FROM hashes
       WHERE id NOT IN (SELECT core_hash FROM tag_cores)
         AND id NOT IN (SELECT file_hash FROM files)
         AND id NOT IN (SELECT pool_hash FROM pools)",
    )?;
    let unused: Vec<String> = stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?;

    for id in unused {
      self.report.counters.bump(Problem::UnusedHash);
      if self.options.repair {
        tracing::info!(hash = %id, "deleting unused hash");
        self
          .store
          .conn()
          .execute("DELETE FROM hashes WHERE id = ?1", params![id])?;
      }
    }
    Ok(())
  }

  // ── Phase: tag names ──────────────────────────────────────────────────────

  fn check_tag_names(&mut self) -> Result<()> {
    let mut stmt = self
      .store
      .conn()
      .prepare("SELECT tag_text FROM tag_names")?;
    let texts: Vec<String> = stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?;

    for text in texts {
      match self.store.verify_tag_name(&text) {
        Ok(()) => {}
        Err(Error::Core(awtfdb_core::Error::InvalidTagName { .. })) => {
          tracing::warn!(tag = %text, "tag name violates the configured pattern");
          self
            .report
            .counters
            .bump_unrepairable(Problem::InvalidTagName);
          if self.options.repair {
            return Err(Error::UnrepairableTagName { text });
          }
        }
        Err(e) => return Err(e),
      }
    }
    Ok(())
  }
}

// ─── Report I/O ──────────────────────────────────────────────────────────────

/// Persist a report to a uniquely named file under the system temp
/// directory (`/tmp/awtfdb-janitor_<suffix>`), returning its path.
pub fn write_report(report: &JanitorReport) -> Result<PathBuf> {
  let file = tempfile::Builder::new()
    .prefix("awtfdb-janitor_")
    .rand_bytes(10)
    .tempfile()?;
  serde_json::to_writer_pretty(file.as_file(), report)?;
  let (_handle, path) = file.keep().map_err(|e| Error::Io(e.error))?;
  Ok(path)
}
