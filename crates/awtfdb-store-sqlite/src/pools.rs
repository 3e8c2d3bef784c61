//! Pool operations — ordered file collections.

use rand::RngCore as _;
use rusqlite::{params, OptionalExtension as _};

use awtfdb_core::{
  digest::digest_bytes,
  id::HashId,
  pool::{Pool, PoolEntry, POOL_CORE_RANDOM_LEN},
};

use crate::{
  encode::{decode_hash_id, encode_hash_id, RawHash},
  store::HashCreateOptions,
  Error, Result, Store,
};

impl Store {
  pub fn create_pool(&self, title: &str) -> Result<Pool> {
    let mut data = vec![0u8; POOL_CORE_RANDOM_LEN];
    rand::thread_rng().fill_bytes(&mut data);
    let digest = digest_bytes(&data);

    self.with_savepoint("create_pool", || {
      let hash = self.fetch_or_create_hash(digest, HashCreateOptions::default())?;
      self.conn().execute(
        "INSERT INTO pools (pool_hash, pool_core_data, title)
         VALUES (?1, ?2, ?3)",
        params![encode_hash_id(hash.id), data, title],
      )?;
      Ok(Pool {
        hash,
        data: data.clone(),
        title: title.to_string(),
      })
    })
  }

  pub fn fetch_pool(&self, id: HashId) -> Result<Option<Pool>> {
    let raw: Option<(String, Vec<u8>, Vec<u8>, String)> = self
      .conn()
      .query_row(
        "SELECT p.pool_hash, h.hash_data, p.pool_core_data, p.title
         FROM pools p JOIN hashes h ON h.id = p.pool_hash
         WHERE p.pool_hash = ?1",
        params![encode_hash_id(id)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    raw
      .map(|(pool_hash, hash_data, data, title)| {
        Ok(Pool {
          hash: RawHash {
            id: pool_hash,
            hash_data,
          }
          .into_hash()?,
          data,
          title,
        })
      })
      .transpose()
  }

  // ── Membership ────────────────────────────────────────────────────────────

  /// Append a file at the end of the pool (`max(entry_index) + 1`, or 0
  /// for an empty pool).
  pub fn pool_add_file(
    &self,
    pool_hash: HashId,
    file_hash: HashId,
  ) -> Result<()> {
    self.require_indexed_file(file_hash)?;
    self.conn().execute(
      "INSERT INTO pool_entries (file_hash, pool_hash, entry_index)
       VALUES (?1, ?2,
               COALESCE((SELECT MAX(entry_index) + 1 FROM pool_entries
                         WHERE pool_hash = ?2), 0))",
      params![encode_hash_id(file_hash), encode_hash_id(pool_hash)],
    )?;
    Ok(())
  }

  /// Insert a file at a position, rewriting the whole pool with fresh
  /// dense indices under a savepoint. An out-of-range position clamps to
  /// the end.
  pub fn pool_add_file_at_index(
    &self,
    pool_hash: HashId,
    file_hash: HashId,
    index: usize,
  ) -> Result<()> {
    self.require_indexed_file(file_hash)?;
    self.with_savepoint("pool_add_at_index", || {
      let mut members: Vec<HashId> = self
        .pool_fetch_entries(pool_hash)?
        .into_iter()
        .map(|e| e.file_hash)
        .collect();
      let index = index.min(members.len());
      members.insert(index, file_hash);

      self.conn().execute(
        "DELETE FROM pool_entries WHERE pool_hash = ?1",
        params![encode_hash_id(pool_hash)],
      )?;
      let mut insert = self.conn().prepare(
        "INSERT INTO pool_entries (file_hash, pool_hash, entry_index)
         VALUES (?1, ?2, ?3)",
      )?;
      for (i, member) in members.iter().enumerate() {
        insert.execute(params![
          encode_hash_id(*member),
          encode_hash_id(pool_hash),
          i as i64
        ])?;
      }
      Ok(())
    })
  }

  /// Drop a file from the pool. Indices are not compacted; readers order
  /// by `entry_index` and tolerate holes.
  pub fn pool_remove_file(
    &self,
    pool_hash: HashId,
    file_hash: HashId,
  ) -> Result<bool> {
    let affected = self.conn().execute(
      "DELETE FROM pool_entries WHERE pool_hash = ?1 AND file_hash = ?2",
      params![encode_hash_id(pool_hash), encode_hash_id(file_hash)],
    )?;
    Ok(affected > 0)
  }

  /// The pool's entries in `entry_index` order.
  pub fn pool_fetch_entries(
    &self,
    pool_hash: HashId,
  ) -> Result<Vec<PoolEntry>> {
    let mut stmt = self.conn().prepare(
      "SELECT file_hash, entry_index FROM pool_entries
       WHERE pool_hash = ?1
       ORDER BY entry_index ASC",
    )?;
    let raws: Vec<(String, i64)> = stmt
      .query_map(params![encode_hash_id(pool_hash)], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })?
      .collect::<rusqlite::Result<_>>()?;

    raws
      .into_iter()
      .map(|(file_hash, entry_index)| {
        Ok(PoolEntry {
          file_hash: decode_hash_id(&file_hash)?,
          entry_index,
        })
      })
      .collect()
  }

  /// Delete a pool outright: entries (via cascade), the pools row, and its
  /// hash row.
  pub fn delete_pool(&self, pool: &Pool) -> Result<()> {
    let pool_id = encode_hash_id(pool.hash.id);
    self.with_savepoint("delete_pool", || {
      let pools = self
        .conn()
        .execute("DELETE FROM pools WHERE pool_hash = ?1", params![pool_id])?;
      if pools != 1 {
        return Err(Error::InconsistentIndex(format!(
          "expected one pools row for {pool_id}, deleted {pools}"
        )));
      }
      let hashes = self
        .conn()
        .execute("DELETE FROM hashes WHERE id = ?1", params![pool_id])?;
      if hashes != 1 {
        return Err(Error::InconsistentIndex(format!(
          "expected one hashes row for {pool_id}, deleted {hashes}"
        )));
      }
      Ok(())
    })
  }

  fn require_indexed_file(&self, file_hash: HashId) -> Result<()> {
    let exists: bool = self.conn().query_row(
      "SELECT EXISTS(SELECT 1 FROM files WHERE file_hash = ?1)",
      params![encode_hash_id(file_hash)],
      |row| row.get(0),
    )?;
    if exists {
      Ok(())
    } else {
      Err(Error::Core(awtfdb_core::Error::UnknownFile(
        file_hash.to_string(),
      )))
    }
  }
}
