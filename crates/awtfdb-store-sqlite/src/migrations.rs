//! Schema migrations.
//!
//! The schema evolves through an ordered, logged sequence of steps. Each
//! step is either a SQL script or a programmatic function, and runs inside
//! its own named savepoint unless flagged non-transactional (the WAL step —
//! journal mode cannot change inside a transaction). Before any pending
//! step runs, the database file is copied to a sibling backup under a short
//! exclusive transaction. After the last step, `PRAGMA integrity_check` and
//! `PRAGMA foreign_key_check` must both come back clean.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};

use awtfdb_core::id::HashId;

use crate::{encode::encode_hash_id, Error, Result};

/// Sibling file the database is copied to before migrating.
pub const BACKUP_FILE_NAME: &str = ".awtf.before-migration.db";

/// Version the schema reaches after every migration has been applied.
pub(crate) const LATEST_VERSION: i64 = 11;

// ─── Migration table ─────────────────────────────────────────────────────────

enum MigrationKind {
  Sql(&'static str),
  Run(fn(&Connection) -> Result<()>),
}

struct Migration {
  version:     i64,
  description: &'static str,
  /// Run inside a savepoint. Off only for steps SQLite refuses to run
  /// inside a transaction.
  transaction: bool,
  kind:        MigrationKind,
}

const MIGRATION_LOGS_DDL: &str = "
CREATE TABLE IF NOT EXISTS migration_logs (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL,
    description TEXT NOT NULL
) STRICT;
";

// The legacy schema (versions 1–7) keyed hashes by INTEGER rowid-style ids;
// version 8 rewrites the whole constraint surface around ULID TEXT ids.
static MIGRATIONS: [Migration; 11] = [
  Migration {
    version:     1,
    description: "initial schema",
    transaction: true,
    kind:        MigrationKind::Sql(
      "
      CREATE TABLE hashes (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          hash_data BLOB NOT NULL UNIQUE
      ) STRICT;

      CREATE TABLE tag_cores (
          core_hash INTEGER PRIMARY KEY
              REFERENCES hashes (id) ON DELETE RESTRICT,
          core_data BLOB NOT NULL
      ) STRICT;

      CREATE TABLE tag_names (
          tag_text TEXT NOT NULL,
          tag_language TEXT NOT NULL,
          core_hash INTEGER NOT NULL
              REFERENCES hashes (id) ON DELETE RESTRICT,
          PRIMARY KEY (tag_text, tag_language, core_hash)
      ) STRICT;

      CREATE TABLE files (
          file_hash INTEGER NOT NULL
              REFERENCES hashes (id) ON DELETE RESTRICT,
          local_path TEXT NOT NULL,
          PRIMARY KEY (file_hash, local_path)
      ) STRICT;

      CREATE TABLE tag_files (
          file_hash INTEGER NOT NULL
              REFERENCES hashes (id) ON DELETE CASCADE,
          core_hash INTEGER NOT NULL
              REFERENCES tag_cores (core_hash) ON DELETE CASCADE,
          PRIMARY KEY (file_hash, core_hash)
      ) STRICT;
      ",
    ),
  },
  Migration {
    version:     2,
    description: "unique constraint on files.local_path",
    transaction: true,
    kind:        MigrationKind::Sql(
      "
      CREATE TABLE files_new (
          file_hash INTEGER NOT NULL
              REFERENCES hashes (id) ON DELETE RESTRICT,
          local_path TEXT NOT NULL UNIQUE,
          PRIMARY KEY (file_hash, local_path)
      ) STRICT;
      INSERT INTO files_new SELECT file_hash, local_path FROM files;
      DROP TABLE files;
      ALTER TABLE files_new RENAME TO files;
      ",
    ),
  },
  Migration {
    version:     3,
    description: "tag implications",
    transaction: true,
    kind:        MigrationKind::Sql(
      "
      CREATE TABLE tag_implications (
          row_id INTEGER PRIMARY KEY AUTOINCREMENT,
          child_tag INTEGER NOT NULL
              REFERENCES tag_cores (core_hash) ON DELETE RESTRICT,
          parent_tag INTEGER NOT NULL
              REFERENCES tag_cores (core_hash) ON DELETE RESTRICT
      ) STRICT;
      ",
    ),
  },
  Migration {
    version:     4,
    description: "pools",
    transaction: true,
    kind:        MigrationKind::Sql(
      "
      CREATE TABLE pools (
          pool_hash INTEGER PRIMARY KEY
              REFERENCES hashes (id) ON DELETE RESTRICT,
          pool_core_data BLOB NOT NULL,
          title TEXT NOT NULL
      ) STRICT;

      CREATE TABLE pool_entries (
          file_hash INTEGER NOT NULL
              REFERENCES hashes (id) ON DELETE CASCADE,
          pool_hash INTEGER NOT NULL
              REFERENCES pools (pool_hash) ON DELETE CASCADE,
          entry_index INTEGER NOT NULL,
          PRIMARY KEY (file_hash, pool_hash),
          UNIQUE (pool_hash, entry_index)
      ) STRICT;
      ",
    ),
  },
  Migration {
    version:     5,
    description: "count metrics tables",
    transaction: true,
    kind:        MigrationKind::Sql(
      "
      CREATE TABLE metrics_count_files (
          timestamp INTEGER NOT NULL,
          value INTEGER NOT NULL
      ) STRICT;
      CREATE TABLE metrics_count_tag_cores (
          timestamp INTEGER NOT NULL,
          value INTEGER NOT NULL
      ) STRICT;
      CREATE TABLE metrics_count_tag_names (
          timestamp INTEGER NOT NULL,
          value INTEGER NOT NULL
      ) STRICT;
      CREATE TABLE metrics_count_tag_files (
          timestamp INTEGER NOT NULL,
          value INTEGER NOT NULL
      ) STRICT;
      ",
    ),
  },
  Migration {
    version:     6,
    description: "tag sources and tag_files source columns",
    transaction: true,
    kind:        MigrationKind::Sql(
      "
      CREATE TABLE tag_sources (
          type INTEGER NOT NULL,
          id INTEGER NOT NULL,
          name TEXT NOT NULL,
          PRIMARY KEY (type, id)
      ) STRICT;
      INSERT INTO tag_sources (type, id, name) VALUES (0, 0, 'manual insertion');
      INSERT INTO tag_sources (type, id, name) VALUES (0, 1, 'tag parenting');

      CREATE TABLE tag_files_new (
          file_hash INTEGER NOT NULL
              REFERENCES hashes (id) ON DELETE CASCADE,
          core_hash INTEGER NOT NULL
              REFERENCES tag_cores (core_hash) ON DELETE CASCADE,
          tag_source_type INTEGER NOT NULL DEFAULT 0,
          tag_source_id INTEGER NOT NULL DEFAULT 0,
          parent_source_id INTEGER,
          PRIMARY KEY (file_hash, core_hash)
      ) STRICT;
      INSERT INTO tag_files_new (file_hash, core_hash)
          SELECT file_hash, core_hash FROM tag_files;
      DROP TABLE tag_files;
      ALTER TABLE tag_files_new RENAME TO tag_files;
      ",
    ),
  },
  Migration {
    version:     7,
    description: "tag usage metrics tables",
    transaction: true,
    kind:        MigrationKind::Sql(
      "
      CREATE TABLE metrics_tag_usage_timestamps (
          timestamp INTEGER PRIMARY KEY
      ) STRICT;
      CREATE TABLE metrics_tag_usage_values (
          timestamp INTEGER NOT NULL
              REFERENCES metrics_tag_usage_timestamps (timestamp)
              ON DELETE CASCADE,
          core_hash INTEGER NOT NULL,
          relationship_count INTEGER NOT NULL
      ) STRICT;
      ",
    ),
  },
  Migration {
    version:     8,
    description: "hash ids from integers to ulids",
    transaction: true,
    kind:        MigrationKind::Run(migrate_ids_to_ulid),
  },
  Migration {
    version:     9,
    description: "library configuration",
    transaction: true,
    kind:        MigrationKind::Sql(
      "
      CREATE TABLE library_configuration (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
      ) STRICT;
      ",
    ),
  },
  Migration {
    version:     10,
    description: "journal mode wal",
    transaction: false,
    kind:        MigrationKind::Sql("PRAGMA journal_mode = WAL;"),
  },
  Migration {
    version:     11,
    description: "secondary indexes",
    transaction: true,
    kind:        MigrationKind::Sql(
      "
      CREATE INDEX tag_files_file_hash_idx ON tag_files (file_hash);
      CREATE INDEX tag_files_core_hash_idx ON tag_files (core_hash);
      CREATE INDEX tag_names_core_hash_idx ON tag_names (core_hash);
      CREATE INDEX metrics_tag_usage_values_core_hash_idx
          ON metrics_tag_usage_values (core_hash);
      ",
    ),
  },
];

// ─── Runner ──────────────────────────────────────────────────────────────────

/// Bring the schema up to the latest version.
pub(crate) fn run_pending(
  conn: &Connection,
  db_path: Option<&Path>,
) -> Result<()> {
  run_up_to(conn, db_path, LATEST_VERSION)
}

/// Bring the schema up to `max_version`. Running on an already-current
/// database is a no-op (no backup, no log rows).
pub(crate) fn run_up_to(
  conn: &Connection,
  db_path: Option<&Path>,
  max_version: i64,
) -> Result<()> {
  conn.execute_batch(MIGRATION_LOGS_DDL)?;

  let current: i64 = conn.query_row(
    "SELECT COALESCE(MAX(version), 0) FROM migration_logs",
    [],
    |row| row.get(0),
  )?;

  let pending: Vec<&Migration> = MIGRATIONS
    .iter()
    .filter(|m| m.version > current && m.version <= max_version)
    .collect();
  if pending.is_empty() {
    return Ok(());
  }

  if let Some(path) = db_path {
    backup_database(conn, path)?;
  }

  for migration in pending {
    apply(conn, migration)?;
  }

  integrity_check(conn)?;
  foreign_key_check(conn)?;
  Ok(())
}

/// Copy the database file to its sibling backup path. The exclusive
/// transaction keeps any other connection from writing mid-copy.
fn backup_database(conn: &Connection, db_path: &Path) -> Result<()> {
  let dir = db_path.parent().unwrap_or_else(|| Path::new("."));
  let backup_path = dir.join(BACKUP_FILE_NAME);
  tracing::info!("backing up database to {}", backup_path.display());

  conn.execute_batch("BEGIN EXCLUSIVE")?;
  let copied = std::fs::copy(db_path, &backup_path);
  let ended = conn.execute_batch("COMMIT");
  copied?;
  ended?;
  Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
  tracing::info!(
    version = migration.version,
    "applying migration: {}",
    migration.description
  );

  let work = |conn: &Connection| -> Result<()> {
    match migration.kind {
      MigrationKind::Sql(sql) => conn.execute_batch(sql)?,
      MigrationKind::Run(f) => f(conn)?,
    }
    conn.execute(
      "INSERT INTO migration_logs (version, applied_at, description)
       VALUES (?1, ?2, ?3)",
      params![migration.version, Utc::now().timestamp(), migration.description],
    )?;
    Ok(())
  };

  if !migration.transaction {
    return work(conn);
  }

  let name = format!("migration_{}", migration.version);
  conn.execute_batch(&format!("SAVEPOINT {name}"))?;
  match work(conn) {
    Ok(()) => {
      conn.execute_batch(&format!("RELEASE {name}"))?;
      Ok(())
    }
    Err(e) => {
      // Roll back only this migration; earlier steps stay applied.
      let _ = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"));
      Err(e)
    }
  }
}

// ─── Post-run checks ─────────────────────────────────────────────────────────

pub(crate) fn integrity_check(conn: &Connection) -> Result<()> {
  let mut stmt = conn.prepare("PRAGMA integrity_check")?;
  let rows: Vec<String> = stmt
    .query_map([], |row| row.get(0))?
    .collect::<rusqlite::Result<_>>()?;
  if rows.len() == 1 && rows[0] == "ok" {
    Ok(())
  } else {
    Err(Error::FailedIntegrityCheck { rows })
  }
}

pub(crate) fn foreign_key_check(conn: &Connection) -> Result<()> {
  let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
  let rows: Vec<String> = stmt
    .query_map([], |row| {
      let table: String = row.get(0)?;
      let rowid: Option<i64> = row.get(1)?;
      let parent: String = row.get(2)?;
      Ok(format!("{table} row {rowid:?} references missing {parent}"))
    })?
    .collect::<rusqlite::Result<_>>()?;
  if rows.is_empty() {
    Ok(())
  } else {
    Err(Error::FailedForeignKeyCheck { rows })
  }
}

// ─── Migration 8: INTEGER → ULID ids ─────────────────────────────────────────

/// Every table keyed on (or referencing) `hashes.id` is rebuilt with TEXT
/// columns, re-pointed through a freshly minted id per hash. Foreign-key
/// enforcement is deferred to the end of the enclosing savepoint, which is
/// what allows the parent table to be dropped and rebuilt first.
fn migrate_ids_to_ulid(conn: &Connection) -> Result<()> {
  conn.execute_batch("PRAGMA defer_foreign_keys = ON")?;

  conn.execute_batch(
    "CREATE TABLE hash_id_map (
         old_id INTEGER PRIMARY KEY,
         new_id TEXT NOT NULL UNIQUE
     ) STRICT;",
  )?;

  {
    let mut select = conn.prepare("SELECT id FROM hashes ORDER BY id ASC")?;
    let old_ids: Vec<i64> = select
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?;

    let mut insert = conn
      .prepare("INSERT INTO hash_id_map (old_id, new_id) VALUES (?1, ?2)")?;
    for old_id in old_ids {
      insert.execute(params![old_id, encode_hash_id(HashId::now())])?;
    }
  }

  conn.execute_batch(ID_MIGRATION_REBUILD)?;
  conn.execute_batch("DROP TABLE hash_id_map;")?;

  // Both checks must pass before the savepoint is released and the rebuild
  // becomes durable.
  integrity_check(conn)?;
  foreign_key_check(conn)?;
  Ok(())
}

const ID_MIGRATION_REBUILD: &str = "
CREATE TABLE hashes_new (
    id TEXT PRIMARY KEY,
    hash_data BLOB NOT NULL UNIQUE CHECK (length(hash_data) = 32)
) STRICT;
INSERT INTO hashes_new (id, hash_data)
    SELECT m.new_id, h.hash_data
    FROM hashes h JOIN hash_id_map m ON m.old_id = h.id;
DROP TABLE hashes;
ALTER TABLE hashes_new RENAME TO hashes;

CREATE TABLE tag_cores_new (
    core_hash TEXT PRIMARY KEY
        REFERENCES hashes (id) ON DELETE RESTRICT,
    core_data BLOB NOT NULL
) STRICT;
INSERT INTO tag_cores_new (core_hash, core_data)
    SELECT m.new_id, c.core_data
    FROM tag_cores c JOIN hash_id_map m ON m.old_id = c.core_hash;
DROP TABLE tag_cores;
ALTER TABLE tag_cores_new RENAME TO tag_cores;

CREATE TABLE tag_names_new (
    tag_text TEXT NOT NULL,
    tag_language TEXT NOT NULL,
    core_hash TEXT NOT NULL
        REFERENCES hashes (id) ON DELETE RESTRICT,
    PRIMARY KEY (tag_text, tag_language, core_hash)
) STRICT;
INSERT INTO tag_names_new (tag_text, tag_language, core_hash)
    SELECT n.tag_text, n.tag_language, m.new_id
    FROM tag_names n JOIN hash_id_map m ON m.old_id = n.core_hash;
DROP TABLE tag_names;
ALTER TABLE tag_names_new RENAME TO tag_names;

CREATE TABLE files_new (
    file_hash TEXT NOT NULL
        REFERENCES hashes (id) ON DELETE RESTRICT,
    local_path TEXT NOT NULL UNIQUE,
    PRIMARY KEY (file_hash, local_path)
) STRICT;
INSERT INTO files_new (file_hash, local_path)
    SELECT m.new_id, f.local_path
    FROM files f JOIN hash_id_map m ON m.old_id = f.file_hash;
DROP TABLE files;
ALTER TABLE files_new RENAME TO files;

CREATE TABLE tag_files_new (
    file_hash TEXT NOT NULL
        REFERENCES hashes (id) ON DELETE CASCADE,
    core_hash TEXT NOT NULL
        REFERENCES tag_cores (core_hash) ON DELETE CASCADE,
    tag_source_type INTEGER NOT NULL DEFAULT 0,
    tag_source_id INTEGER NOT NULL DEFAULT 0,
    parent_source_id INTEGER,
    PRIMARY KEY (file_hash, core_hash)
) STRICT;
INSERT INTO tag_files_new
    (file_hash, core_hash, tag_source_type, tag_source_id, parent_source_id)
    SELECT fm.new_id, cm.new_id,
           t.tag_source_type, t.tag_source_id, t.parent_source_id
    FROM tag_files t
    JOIN hash_id_map fm ON fm.old_id = t.file_hash
    JOIN hash_id_map cm ON cm.old_id = t.core_hash;
DROP TABLE tag_files;
ALTER TABLE tag_files_new RENAME TO tag_files;

CREATE TABLE tag_implications_new (
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    child_tag TEXT NOT NULL
        REFERENCES tag_cores (core_hash) ON DELETE RESTRICT,
    parent_tag TEXT NOT NULL
        REFERENCES tag_cores (core_hash) ON DELETE RESTRICT
) STRICT;
INSERT INTO tag_implications_new (row_id, child_tag, parent_tag)
    SELECT i.row_id, cm.new_id, pm.new_id
    FROM tag_implications i
    JOIN hash_id_map cm ON cm.old_id = i.child_tag
    JOIN hash_id_map pm ON pm.old_id = i.parent_tag;
DROP TABLE tag_implications;
ALTER TABLE tag_implications_new RENAME TO tag_implications;

CREATE TABLE pools_new (
    pool_hash TEXT PRIMARY KEY
        REFERENCES hashes (id) ON DELETE RESTRICT,
    pool_core_data BLOB NOT NULL,
    title TEXT NOT NULL
) STRICT;
INSERT INTO pools_new (pool_hash, pool_core_data, title)
    SELECT m.new_id, p.pool_core_data, p.title
    FROM pools p JOIN hash_id_map m ON m.old_id = p.pool_hash;
DROP TABLE pools;
ALTER TABLE pools_new RENAME TO pools;

CREATE TABLE pool_entries_new (
    file_hash TEXT NOT NULL
        REFERENCES hashes (id) ON DELETE CASCADE,
    pool_hash TEXT NOT NULL
        REFERENCES pools (pool_hash) ON DELETE CASCADE,
    entry_index INTEGER NOT NULL,
    PRIMARY KEY (file_hash, pool_hash),
    UNIQUE (pool_hash, entry_index)
) STRICT;
INSERT INTO pool_entries_new (file_hash, pool_hash, entry_index)
    SELECT fm.new_id, pm.new_id, e.entry_index
    FROM pool_entries e
    JOIN hash_id_map fm ON fm.old_id = e.file_hash
    JOIN hash_id_map pm ON pm.old_id = e.pool_hash;
DROP TABLE pool_entries;
ALTER TABLE pool_entries_new RENAME TO pool_entries;

CREATE TABLE metrics_tag_usage_values_new (
    timestamp INTEGER NOT NULL
        REFERENCES metrics_tag_usage_timestamps (timestamp)
        ON DELETE CASCADE,
    core_hash TEXT NOT NULL,
    relationship_count INTEGER NOT NULL
) STRICT;
INSERT INTO metrics_tag_usage_values_new
    (timestamp, core_hash, relationship_count)
    SELECT v.timestamp, m.new_id, v.relationship_count
    FROM metrics_tag_usage_values v
    JOIN hash_id_map m ON m.old_id = v.core_hash;
DROP TABLE metrics_tag_usage_values;
ALTER TABLE metrics_tag_usage_values_new RENAME TO metrics_tag_usage_values;
";
