//! [`Store`] — the open handle over the index database.

use std::{
  cell::RefCell,
  path::{Path, PathBuf},
};

use rusqlite::{params, Connection, OptionalExtension as _};

use awtfdb_core::{
  digest::Digest,
  hash::Hash,
  id::HashId,
  query::{CompiledQuery, QueryArg},
};

use crate::{
  config::CachedConfig,
  encode::{decode_hash_id, encode_digest, encode_hash_id, RawHash},
  migrations, Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The process's handle to one index database.
///
/// Owns the only [`rusqlite::Connection`]; the store is a single-writer
/// design and must not be shared across concurrent writers. Entity values
/// returned by its methods are plain owned data.
pub struct Store {
  conn:               Connection,
  pub(crate) config:  RefCell<Option<CachedConfig>>,
}

impl Store {
  /// Open (or create) the database at `path` and bring its schema up to
  /// date. A behind-schema database is first copied to the sibling backup
  /// path.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = Connection::open(path)
      .map_err(|e| Error::ConfigFail(e.to_string()))?;
    configure(&conn)?;
    migrations::run_pending(&conn, Some(path))?;
    Ok(Self {
      conn,
      config: RefCell::new(None),
    })
  }

  /// Open an in-memory store — useful for testing. No backup file is
  /// produced; there is nothing on disk to copy.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| Error::ConfigFail(e.to_string()))?;
    configure(&conn)?;
    migrations::run_pending(&conn, None)?;
    Ok(Self {
      conn,
      config: RefCell::new(None),
    })
  }

  /// The default on-disk location: `$HOME/awtf.db`.
  pub fn default_db_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| Path::new(&home).join("awtf.db"))
  }

  /// Flush the query planner's statistics and close the connection.
  pub fn close(self) -> Result<()> {
    self
      .conn
      .execute_batch("PRAGMA analysis_limit = 1000; PRAGMA optimize;")?;
    self.conn.close().map_err(|(_conn, e)| Error::Sqlite(e))
  }

  pub(crate) fn conn(&self) -> &Connection { &self.conn }

  /// Run `work` inside a named savepoint: released on success, rolled back
  /// on error so the database is byte-identical to its pre-call state.
  pub(crate) fn with_savepoint<T>(
    &self,
    name: &str,
    work: impl FnOnce() -> Result<T>,
  ) -> Result<T> {
    self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match work() {
      Ok(value) => {
        self.conn.execute_batch(&format!("RELEASE {name}"))?;
        Ok(value)
      }
      Err(e) => {
        let _ = self
          .conn
          .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"));
        Err(e)
      }
    }
  }
}

fn configure(conn: &Connection) -> Result<()> {
  // Journal mode is persistent and set by migration; foreign keys are
  // per-connection and must be enabled every open.
  conn
    .execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")
    .map_err(|e| Error::ConfigFail(e.to_string()))
}

// ─── Hashes ──────────────────────────────────────────────────────────────────

/// Options for [`Store::fetch_or_create_hash`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HashCreateOptions {
  /// When set, a freshly minted id encodes this timestamp instead of now.
  pub file_mtime_ms: Option<u64>,
}

impl Store {
  /// Return the hash row for `digest`, inserting one if it is new.
  pub fn fetch_or_create_hash(
    &self,
    digest: Digest,
    options: HashCreateOptions,
  ) -> Result<Hash> {
    if let Some(existing) = self.fetch_hash_by_digest(&digest)? {
      return Ok(existing);
    }

    let id = match options.file_mtime_ms {
      Some(ms) => HashId::from_unix_ms(ms),
      None => HashId::now(),
    };
    self.conn.execute(
      "INSERT INTO hashes (id, hash_data) VALUES (?1, ?2)",
      params![encode_hash_id(id), encode_digest(&digest)],
    )?;
    Ok(Hash { id, data: digest })
  }

  pub fn fetch_hash(&self, id: HashId) -> Result<Option<Hash>> {
    let raw: Option<RawHash> = self
      .conn
      .query_row(
        "SELECT id, hash_data FROM hashes WHERE id = ?1",
        params![encode_hash_id(id)],
        |row| {
          Ok(RawHash {
            id:        row.get(0)?,
            hash_data: row.get(1)?,
          })
        },
      )
      .optional()?;
    raw.map(RawHash::into_hash).transpose()
  }

  pub fn fetch_hash_by_digest(&self, digest: &Digest) -> Result<Option<Hash>> {
    let raw: Option<RawHash> = self
      .conn
      .query_row(
        "SELECT id, hash_data FROM hashes WHERE hash_data = ?1",
        params![encode_digest(digest)],
        |row| {
          Ok(RawHash {
            id:        row.get(0)?,
            hash_data: row.get(1)?,
          })
        },
      )
      .optional()?;
    raw.map(RawHash::into_hash).transpose()
  }
}

// ─── Query execution ─────────────────────────────────────────────────────────

impl Store {
  /// Resolve a compiled query's arguments into SQL values. Tag texts become
  /// core hash ids (an unknown tag is an error); file digests become file
  /// hash ids (an unknown digest becomes NULL, which matches no row).
  pub fn resolve_query_args(
    &self,
    query: &CompiledQuery,
  ) -> Result<Vec<rusqlite::types::Value>> {
    use rusqlite::types::Value;

    let mut values = Vec::with_capacity(query.args.len());
    for arg in &query.args {
      match arg {
        QueryArg::Tag(text) => {
          let tag = self.fetch_named_tag(text, "en")?.ok_or_else(|| {
            Error::Core(awtfdb_core::Error::UnknownTag(text.clone()))
          })?;
          values.push(Value::Text(encode_hash_id(tag.core.hash.id)));
        }
        QueryArg::FileDigest(digest) => {
          match self.fetch_hash_by_digest(digest)? {
            Some(hash) => values.push(Value::Text(encode_hash_id(hash.id))),
            None => values.push(Value::Null),
          }
        }
      }
    }
    Ok(values)
  }

  /// Resolve and run a compiled query, returning the matching file hash
  /// ids.
  pub fn execute_query(&self, query: &CompiledQuery) -> Result<Vec<HashId>> {
    let values = self.resolve_query_args(query)?;
    let mut stmt = self.conn.prepare(&query.sql)?;
    let ids: Vec<String> = stmt
      .query_map(rusqlite::params_from_iter(values), |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?;
    ids.iter().map(|s| decode_hash_id(s)).collect()
  }
}
