//! Integration tests for [`Store`] against in-memory databases, with
//! `tempfile` scratch directories for the operations that touch disk.

use std::{fs, path::PathBuf, time::UNIX_EPOCH};

use tempfile::TempDir;

use awtfdb_core::{
  digest::digest_bytes,
  file::File,
  query,
  report::Problem,
  source::{SourceKind, SourceRef, SystemSource, TagAttribution},
};

use crate::{
  janitor::write_report, migrations, CreateFileOptions, Error, Janitor,
  JanitorOptions, Store, TreeScope, TAG_NAME_REGEX_KEY,
};

fn store() -> Store { Store::open_in_memory().expect("in-memory store") }

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
  let path = dir.path().join(name);
  fs::write(&path, contents).unwrap();
  path
}

fn indexed_file(s: &Store, dir: &TempDir, name: &str, contents: &str) -> File {
  let path = write_file(dir, name, contents);
  s.create_file_from_path(&path, CreateFileOptions::default())
    .unwrap()
}

// ─── Migrations ──────────────────────────────────────────────────────────────

#[test]
fn fresh_store_reaches_latest_version() {
  let s = store();
  let (version, steps): (i64, i64) = s
    .conn()
    .query_row(
      "SELECT COALESCE(MAX(version), 0), COUNT(*) FROM migration_logs",
      [],
      |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .unwrap();
  assert_eq!(version, migrations::LATEST_VERSION);
  assert_eq!(steps, migrations::LATEST_VERSION);
}

#[test]
fn reopening_a_current_store_is_a_noop() {
  let dir = TempDir::new().unwrap();
  let db_path = dir.path().join("awtf.db");

  let s = Store::open(&db_path).unwrap();
  s.close().unwrap();
  assert!(dir.path().join(migrations::BACKUP_FILE_NAME).exists());

  // Wipe the backup so a second migration run would be observable.
  fs::remove_file(dir.path().join(migrations::BACKUP_FILE_NAME)).unwrap();

  let s = Store::open(&db_path).unwrap();
  let steps: i64 = s
    .conn()
    .query_row("SELECT COUNT(*) FROM migration_logs", [], |r| r.get(0))
    .unwrap();
  assert_eq!(steps, migrations::LATEST_VERSION);
  assert!(
    !dir.path().join(migrations::BACKUP_FILE_NAME).exists(),
    "an up-to-date store must not be backed up again"
  );
  s.close().unwrap();
}

#[test]
fn id_migration_rewrites_legacy_integer_ids() {
  let conn = rusqlite::Connection::open_in_memory().unwrap();
  conn.execute_batch("PRAGMA foreign_keys = ON").unwrap();
  migrations::run_up_to(&conn, None, 7).unwrap();

  // Legacy data under INTEGER ids: two tag cores, one file, one pool.
  for byte in 1u8..=4 {
    conn
      .execute(
        "INSERT INTO hashes (hash_data) VALUES (?1)",
        [vec![byte; 32]],
      )
      .unwrap();
  }
  conn
    .execute_batch(
      "INSERT INTO tag_cores (core_hash, core_data) VALUES (1, x'aa');
       INSERT INTO tag_cores (core_hash, core_data) VALUES (3, x'bb');
       INSERT INTO tag_names (tag_text, tag_language, core_hash)
           VALUES ('boat', 'en', 1);
       INSERT INTO files (file_hash, local_path) VALUES (2, '/legacy/file');
       INSERT INTO tag_files (file_hash, core_hash) VALUES (2, 1);
       INSERT INTO tag_implications (child_tag, parent_tag) VALUES (1, 3);
       INSERT INTO pools (pool_hash, pool_core_data, title)
           VALUES (4, x'cc', 'legacy pool');
       INSERT INTO pool_entries (file_hash, pool_hash, entry_index)
           VALUES (2, 4, 0);
       INSERT INTO metrics_tag_usage_timestamps (timestamp) VALUES (100);
       INSERT INTO metrics_tag_usage_values
           (timestamp, core_hash, relationship_count) VALUES (100, 1, 5);",
    )
    .unwrap();

  migrations::run_pending(&conn, None).unwrap();

  // Every hash id is now 26-character text.
  let ids: Vec<String> = conn
    .prepare("SELECT id FROM hashes")
    .unwrap()
    .query_map([], |r| r.get(0))
    .unwrap()
    .collect::<rusqlite::Result<_>>()
    .unwrap();
  assert_eq!(ids.len(), 4);
  assert!(ids.iter().all(|id| id.len() == 26));

  // Cross-table references survived the renumbering.
  let boat_core: String = conn
    .query_row(
      "SELECT core_hash FROM tag_names WHERE tag_text = 'boat'",
      [],
      |r| r.get(0),
    )
    .unwrap();
  let hash_of_core: String = conn
    .query_row(
      "SELECT id FROM hashes WHERE hash_data = ?1",
      [vec![1u8; 32]],
      |r| r.get(0),
    )
    .unwrap();
  assert_eq!(boat_core, hash_of_core);

  let (linked_file, linked_core): (String, String) = conn
    .query_row("SELECT file_hash, core_hash FROM tag_files", [], |r| {
      Ok((r.get(0)?, r.get(1)?))
    })
    .unwrap();
  assert_eq!(linked_core, boat_core);
  let file_hash: String = conn
    .query_row("SELECT file_hash FROM files", [], |r| r.get(0))
    .unwrap();
  assert_eq!(linked_file, file_hash);

  // Implication edge ids are preserved verbatim.
  let row_id: i64 = conn
    .query_row("SELECT row_id FROM tag_implications", [], |r| r.get(0))
    .unwrap();
  assert_eq!(row_id, 1);

  let metrics_core: String = conn
    .query_row(
      "SELECT core_hash FROM metrics_tag_usage_values",
      [],
      |r| r.get(0),
    )
    .unwrap();
  assert_eq!(metrics_core, boat_core);
}

// ─── Hashes ──────────────────────────────────────────────────────────────────

#[test]
fn fetch_or_create_hash_returns_existing_row() {
  let s = store();
  let digest = digest_bytes(b"same content");

  let first = s.fetch_or_create_hash(digest, Default::default()).unwrap();
  let second = s.fetch_or_create_hash(digest, Default::default()).unwrap();
  assert_eq!(first.id, second.id);

  let stored = s.fetch_hash(first.id).unwrap().unwrap();
  assert_eq!(stored.data, digest);
}

#[test]
fn hash_id_can_encode_an_mtime() {
  let s = store();
  let hash = s
    .fetch_or_create_hash(
      digest_bytes(b"mtime carrier"),
      crate::HashCreateOptions {
        file_mtime_ms: Some(1_647_795_491_000),
      },
    )
    .unwrap();
  assert_eq!(hash.id.timestamp_ms(), 1_647_795_491_000);
}

// ─── Named tags ──────────────────────────────────────────────────────────────

#[test]
fn create_and_fetch_named_tag() {
  let s = store();

  let created = s.create_named_tag("test_tag", "en", None).unwrap();
  let fetched = s.fetch_named_tag("test_tag", "en").unwrap().unwrap();
  assert_eq!(fetched.core.hash.data, created.core.hash.data);
  assert_eq!(fetched.core.data, created.core.data);

  let synonym = s
    .create_named_tag("another_test_tag", "en", Some(&created.core))
    .unwrap();
  assert_eq!(synonym.core.hash.id, created.core.hash.id);

  let names = s.fetch_tags_from_core(&created.core).unwrap();
  assert_eq!(names.len(), 2);
}

#[test]
fn distinct_tags_get_distinct_core_data() {
  let s = store();
  let a = s.create_named_tag("alpha", "en", None).unwrap();
  let b = s.create_named_tag("beta", "en", None).unwrap();
  assert_ne!(a.core.data, b.core.data);
  assert_ne!(a.core.hash.data, b.core.hash.data);
  assert_eq!(a.core.data.len(), 128);
}

#[test]
fn core_hash_is_digest_of_core_data() {
  let s = store();
  let tag = s.create_named_tag("hashed", "en", None).unwrap();
  assert_eq!(digest_bytes(&tag.core.data), tag.core.hash.data);
}

#[test]
fn delete_named_tag_all_removes_names_core_and_hash() {
  let s = store();
  let tag = s.create_named_tag("doomed", "en", None).unwrap();
  s.create_named_tag("doomed_alias", "en", Some(&tag.core))
    .unwrap();

  let removed = s.delete_named_tag_all(&tag).unwrap();
  assert_eq!(removed, 2);
  assert!(s.fetch_named_tag("doomed", "en").unwrap().is_none());
  assert!(s.fetch_named_tag("doomed_alias", "en").unwrap().is_none());
  assert!(s.fetch_hash(tag.core.hash.id).unwrap().is_none());
}

// ─── Files ───────────────────────────────────────────────────────────────────

#[test]
fn create_tag_and_remove_file() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "awooga.txt", "awooga");
  let tag = s.create_named_tag("awooga_tag", "en", None).unwrap();

  s.add_tag(file.hash.id, tag.core.hash.id, None).unwrap();
  let tags = s.fetch_tags(file.hash.id).unwrap();
  assert!(tags.iter().any(|t| t.core == tag.core.hash.id));

  s.remove_tag(file.hash.id, tag.core.hash.id).unwrap();
  let tags = s.fetch_tags(file.hash.id).unwrap();
  assert!(!tags.iter().any(|t| t.core == tag.core.hash.id));
}

#[test]
fn reindexing_the_same_path_reuses_the_row() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let path = write_file(&dir, "stable.txt", "stable contents");

  let first = s
    .create_file_from_path(&path, CreateFileOptions::default())
    .unwrap();
  let second = s
    .create_file_from_path(&path, CreateFileOptions::default())
    .unwrap();
  assert_eq!(first.hash.id, second.hash.id);

  let rows: i64 = s
    .conn()
    .query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))
    .unwrap();
  assert_eq!(rows, 1);
}

#[test]
fn file_mtime_lands_in_the_hash_id() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let path = write_file(&dir, "dated.txt", "dated");
  let mtime_ms = fs::metadata(&path)
    .unwrap()
    .modified()
    .unwrap()
    .duration_since(UNIX_EPOCH)
    .unwrap()
    .as_millis() as u64;

  let file = s
    .create_file_from_path(
      &path,
      CreateFileOptions {
        use_file_mtime: true,
      },
    )
    .unwrap();
  assert_eq!(file.hash.id.timestamp_ms(), mtime_ms);
}

#[test]
fn fetch_file_variants_agree() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "findme.txt", "find me");

  let by_id = s.fetch_file(file.hash.id).unwrap().unwrap();
  assert_eq!(by_id, file);
  let exact = s
    .fetch_file_exact(file.hash.id, &file.local_path)
    .unwrap()
    .unwrap();
  assert_eq!(exact, file);
  let by_path = s.fetch_file_by_path(&file.local_path).unwrap().unwrap();
  assert_eq!(by_path, file);
  let by_digest = s.fetch_file_by_digest(&file.hash.data).unwrap().unwrap();
  assert_eq!(by_digest, file);
}

#[test]
fn set_local_path_rebinds_atomically() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let mut file = indexed_file(&s, &dir, "old_name.txt", "movable");
  let old_path = file.local_path.clone();
  let new_path = dir.path().join("new_name.txt");

  s.set_local_path(&mut file, new_path.clone()).unwrap();
  assert_eq!(file.local_path, new_path);
  assert!(s.fetch_file_by_path(&old_path).unwrap().is_none());
  assert!(s.fetch_file_by_path(&new_path).unwrap().is_some());
}

#[test]
fn delete_file_keeps_the_hash_behind() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "gone.txt", "gone soon");

  s.delete_file(&file).unwrap();
  assert!(s.fetch_file(file.hash.id).unwrap().is_none());
  assert!(s.fetch_hash(file.hash.id).unwrap().is_some());
}

#[test]
fn duplicate_tag_link_is_a_silent_noop() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "double.txt", "double");
  let tag = s.create_named_tag("once", "en", None).unwrap();

  assert!(s.add_tag(file.hash.id, tag.core.hash.id, None).unwrap());
  assert!(!s.add_tag(file.hash.id, tag.core.hash.id, None).unwrap());
  assert_eq!(s.fetch_tags(file.hash.id).unwrap().len(), 1);
}

#[test]
#[should_panic(expected = "parent_source_id is required")]
fn parenting_attribution_requires_an_edge_id() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "strict.txt", "strict");
  let tag = s.create_named_tag("strict", "en", None).unwrap();

  let _ = s.add_tag(
    file.hash.id,
    tag.core.hash.id,
    Some(TagAttribution {
      source:           SourceRef::System(SystemSource::TagParenting),
      parent_source_id: None,
    }),
  );
}

// ─── Tag-tree propagation ────────────────────────────────────────────────────

#[test]
fn parent_closure_is_transitive_and_attributed() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "closed.txt", "closure");

  let child = s.create_named_tag("child", "en", None).unwrap();
  let parent1 = s.create_named_tag("parent1", "en", None).unwrap();
  let parent2 = s.create_named_tag("parent2", "en", None).unwrap();
  let parent3 = s.create_named_tag("parent3", "en", None).unwrap();

  let r1 = s.create_tag_parent(&child.core, &parent1.core).unwrap();
  let r2 = s.create_tag_parent(&child.core, &parent2.core).unwrap();
  let r3 = s.create_tag_parent(&parent2.core, &parent3.core).unwrap();

  s.add_tag(file.hash.id, child.core.hash.id, None).unwrap();
  s.process_tag_tree(TreeScope::AllFiles).unwrap();

  let tags = s.fetch_tags(file.hash.id).unwrap();
  assert_eq!(tags.len(), 4);

  let attribution_of = |core| {
    tags
      .iter()
      .find(|t| t.core == core)
      .expect("expected tag on file")
      .attribution
  };
  assert_eq!(
    attribution_of(child.core.hash.id).source,
    SourceRef::System(SystemSource::ManualInsertion)
  );
  for (tag, edge) in [(&parent1, r1), (&parent2, r2), (&parent3, r3)] {
    let attribution = attribution_of(tag.core.hash.id);
    assert_eq!(
      attribution.source,
      SourceRef::System(SystemSource::TagParenting)
    );
    assert_eq!(attribution.parent_source_id, Some(edge));
  }
}

#[test]
fn propagation_is_idempotent() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "idem.txt", "idempotent");

  let child = s.create_named_tag("kid", "en", None).unwrap();
  let parent = s.create_named_tag("adult", "en", None).unwrap();
  s.create_tag_parent(&child.core, &parent.core).unwrap();
  s.add_tag(file.hash.id, child.core.hash.id, None).unwrap();

  let first = s.process_tag_tree(TreeScope::AllFiles).unwrap();
  assert_eq!(first.links_added, 1);
  let second = s.process_tag_tree(TreeScope::AllFiles).unwrap();
  assert_eq!(second.links_added, 0);
}

#[test]
fn implication_cycles_terminate() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "cycle.txt", "cyclic");

  let a = s.create_named_tag("cyc_a", "en", None).unwrap();
  let b = s.create_named_tag("cyc_b", "en", None).unwrap();
  s.create_tag_parent(&a.core, &b.core).unwrap();
  s.create_tag_parent(&b.core, &a.core).unwrap();

  s.add_tag(file.hash.id, a.core.hash.id, None).unwrap();
  s.process_tag_tree(TreeScope::AllFiles).unwrap();

  let tags = s.fetch_tags(file.hash.id).unwrap();
  assert_eq!(tags.len(), 2);
}

#[test]
fn scoped_propagation_leaves_other_files_alone() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let in_scope = indexed_file(&s, &dir, "in.txt", "inside");
  let out_of_scope = indexed_file(&s, &dir, "out.txt", "outside");

  let child = s.create_named_tag("scoped_child", "en", None).unwrap();
  let parent = s.create_named_tag("scoped_parent", "en", None).unwrap();
  s.create_tag_parent(&child.core, &parent.core).unwrap();
  s.add_tag(in_scope.hash.id, child.core.hash.id, None).unwrap();
  s.add_tag(out_of_scope.hash.id, child.core.hash.id, None)
    .unwrap();

  s.process_tag_tree(TreeScope::Files(&[in_scope.hash.id]))
    .unwrap();

  assert_eq!(s.fetch_tags(in_scope.hash.id).unwrap().len(), 2);
  assert_eq!(s.fetch_tags(out_of_scope.hash.id).unwrap().len(), 1);
}

// ─── Pools ───────────────────────────────────────────────────────────────────

#[test]
fn pool_ordering_survives_removal_and_reinsertion() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let f1 = indexed_file(&s, &dir, "p1.txt", "one");
  let f2 = indexed_file(&s, &dir, "p2.txt", "two");
  let f3 = indexed_file(&s, &dir, "p3.txt", "three");

  let pool = s.create_pool("ordered pool").unwrap();
  s.pool_add_file(pool.hash.id, f3.hash.id).unwrap();
  s.pool_add_file(pool.hash.id, f1.hash.id).unwrap();
  s.pool_add_file(pool.hash.id, f2.hash.id).unwrap();

  let members = |s: &Store| {
    s.pool_fetch_entries(pool.hash.id)
      .unwrap()
      .into_iter()
      .map(|e| e.file_hash)
      .collect::<Vec<_>>()
  };
  assert_eq!(members(&s), vec![f3.hash.id, f1.hash.id, f2.hash.id]);

  s.pool_remove_file(pool.hash.id, f1.hash.id).unwrap();
  assert_eq!(members(&s), vec![f3.hash.id, f2.hash.id]);

  s.pool_add_file_at_index(pool.hash.id, f1.hash.id, 0).unwrap();
  assert_eq!(members(&s), vec![f1.hash.id, f3.hash.id, f2.hash.id]);

  // Indices are strictly increasing after any sequence of edits.
  let entries = s.pool_fetch_entries(pool.hash.id).unwrap();
  assert!(entries.windows(2).all(|w| w[0].entry_index < w[1].entry_index));
}

#[test]
fn pool_rejects_unindexed_files() {
  let s = store();
  let pool = s.create_pool("empty pool").unwrap();
  let err = s
    .pool_add_file(pool.hash.id, awtfdb_core::id::HashId::now())
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(awtfdb_core::Error::UnknownFile(_))
  ));
}

#[test]
fn delete_pool_removes_entries_and_hash() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "pooled.txt", "pooled");

  let pool = s.create_pool("short lived").unwrap();
  s.pool_add_file(pool.hash.id, file.hash.id).unwrap();
  s.delete_pool(&pool).unwrap();

  assert!(s.fetch_pool(pool.hash.id).unwrap().is_none());
  assert!(s.fetch_hash(pool.hash.id).unwrap().is_none());
  let entries: i64 = s
    .conn()
    .query_row("SELECT COUNT(*) FROM pool_entries", [], |r| r.get(0))
    .unwrap();
  assert_eq!(entries, 0);
}

// ─── Tag-name regex ──────────────────────────────────────────────────────────

#[test]
fn tag_name_regex_requires_a_full_match() {
  let s = store();
  s.set_library_config(TAG_NAME_REGEX_KEY, "[a-zA-Z0-9_]+")
    .unwrap();

  let err = s.create_named_tag("my test tag", "en", None).unwrap_err();
  let Error::Core(awtfdb_core::Error::InvalidTagName {
    pattern,
    text,
    matched,
  }) = err
  else {
    panic!("expected InvalidTagName, got {err:?}")
  };
  assert_eq!(pattern, "[a-zA-Z0-9_]+");
  assert_eq!(text, "my test tag");
  assert_eq!(matched.as_deref(), Some("my"));

  s.create_named_tag("correct_tag_source", "en", None).unwrap();
}

#[test]
fn updating_the_regex_invalidates_the_cache() {
  let s = store();
  s.set_library_config(TAG_NAME_REGEX_KEY, "[a-z]+").unwrap();
  s.create_named_tag("lower", "en", None).unwrap();
  assert!(s.create_named_tag("UPPER", "en", None).is_err());

  s.set_library_config(TAG_NAME_REGEX_KEY, "[A-Z]+").unwrap();
  s.create_named_tag("UPPER", "en", None).unwrap();
}

#[test]
fn unconfigured_regex_accepts_anything() {
  let s = store();
  s.create_named_tag("anything goes: even spaces!", "en", None)
    .unwrap();
}

// ─── Tag sources ─────────────────────────────────────────────────────────────

#[test]
fn external_source_ids_are_allocated_monotonically() {
  let s = store();
  let first = s.create_tag_source("booru import").unwrap();
  let second = s.create_tag_source("ml tagger").unwrap();
  assert_eq!(first.source, SourceRef::External(0));
  assert_eq!(second.source, SourceRef::External(1));

  let fetched = s
    .fetch_tag_source(SourceKind::External, 1)
    .unwrap()
    .unwrap();
  assert_eq!(fetched.name, "ml tagger");
}

#[test]
fn system_sources_are_preseeded_and_validated() {
  let s = store();
  let manual = s.fetch_tag_source(SourceKind::System, 0).unwrap().unwrap();
  assert_eq!(manual.name, "manual insertion");
  let parenting = s.fetch_tag_source(SourceKind::System, 1).unwrap().unwrap();
  assert_eq!(parenting.name, "tag parenting");

  // Ids outside the enum are rejected before the table is consulted.
  assert!(s.fetch_tag_source(SourceKind::System, 9).unwrap().is_none());
}

#[test]
fn external_sources_can_be_deleted() {
  let s = store();
  let source = s.create_tag_source("transient").unwrap();
  s.delete_tag_source(&source).unwrap();
  assert!(s.fetch_tag_source(SourceKind::External, 0).unwrap().is_none());
}

#[test]
fn external_attribution_round_trips_on_links() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "attributed.txt", "attributed");
  let tag = s.create_named_tag("attributed", "en", None).unwrap();
  let source = s.create_tag_source("importer").unwrap();

  s.add_tag(
    file.hash.id,
    tag.core.hash.id,
    Some(TagAttribution {
      source:           source.source,
      parent_source_id: None,
    }),
  )
  .unwrap();

  let tags = s.fetch_tags(file.hash.id).unwrap();
  assert_eq!(tags[0].attribution.source, SourceRef::External(0));
}

// ─── Query round-trip ────────────────────────────────────────────────────────

#[test]
fn boolean_queries_select_the_right_files() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let f1 = indexed_file(&s, &dir, "q1.txt", "query one");
  let f2 = indexed_file(&s, &dir, "q2.txt", "query two");

  let a = s.create_named_tag("a", "en", None).unwrap();
  let b = s.create_named_tag("b", "en", None).unwrap();
  s.add_tag(f1.hash.id, a.core.hash.id, None).unwrap();
  s.add_tag(f1.hash.id, b.core.hash.id, None).unwrap();
  s.add_tag(f2.hash.id, a.core.hash.id, None).unwrap();

  let run = |input: &str| {
    let mut ids = s.execute_query(&query::compile(input).unwrap()).unwrap();
    ids.sort();
    ids
  };
  let mut both = vec![f1.hash.id, f2.hash.id];
  both.sort();

  assert_eq!(run("a"), both);
  assert_eq!(run("a b"), vec![f1.hash.id]);
  assert_eq!(run("a -b"), vec![f2.hash.id]);
  assert_eq!(run("b | a"), both);
  assert_eq!(run("system:low_tags:2"), vec![f2.hash.id]);
}

#[test]
fn hash_scoped_queries_select_one_file() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let f1 = indexed_file(&s, &dir, "h1.txt", "hash target");
  let tag = s.create_named_tag("tagged", "en", None).unwrap();
  s.add_tag(f1.hash.id, tag.core.hash.id, None).unwrap();

  let hits = s
    .execute_query(&query::compile(&format!("hash:{}", f1.hash.data)).unwrap())
    .unwrap();
  assert_eq!(hits, vec![f1.hash.id]);

  // An unknown digest resolves to a placeholder and matches nothing.
  let unknown = digest_bytes(b"never indexed");
  let misses = s
    .execute_query(&query::compile(&format!("hash:{unknown}")).unwrap())
    .unwrap();
  assert!(misses.is_empty());
}

#[test]
fn unknown_tags_are_an_execution_error() {
  let s = store();
  let err = s
    .execute_query(&query::compile("never_created").unwrap())
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(awtfdb_core::Error::UnknownTag(t)) if t == "never_created"
  ));
}

// ─── Janitor ─────────────────────────────────────────────────────────────────

fn run_janitor(s: &Store, options: JanitorOptions) -> awtfdb_core::report::JanitorReport {
  let mut worker = Janitor::new(s, options);
  worker.run().unwrap().clone()
}

#[test]
fn clean_store_reports_no_problems() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "fine.txt", "fine");
  let tag = s.create_named_tag("fine", "en", None).unwrap();
  s.add_tag(file.hash.id, tag.core.hash.id, None).unwrap();

  let report = run_janitor(&s, JanitorOptions::default());
  assert_eq!(report.counters.total_problems(), 0);
}

#[test]
fn unused_hashes_are_swept_and_repair_is_idempotent() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "sweep.txt", "sweep me");
  s.delete_file(&file).unwrap();

  let report = run_janitor(&s, JanitorOptions::default());
  assert_eq!(report.counters.get(Problem::UnusedHash).total, 1);

  let report = run_janitor(
    &s,
    JanitorOptions {
      repair: true,
      ..Default::default()
    },
  );
  assert_eq!(report.counters.get(Problem::UnusedHash).total, 1);
  assert!(s.fetch_hash(file.hash.id).unwrap().is_none());

  // A second repair pass finds nothing left to fix.
  let report = run_janitor(
    &s,
    JanitorOptions {
      repair: true,
      ..Default::default()
    },
  );
  assert_eq!(report.counters.total_problems(), 0);
}

#[test]
fn moved_file_with_sibling_binding_is_repairable() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let kept = indexed_file(&s, &dir, "kept.txt", "shared bytes");
  let moved = indexed_file(&s, &dir, "moved.txt", "shared bytes");
  assert_eq!(kept.hash.id, moved.hash.id);

  fs::remove_file(&moved.local_path).unwrap();

  let report = run_janitor(
    &s,
    JanitorOptions {
      repair: true,
      ..Default::default()
    },
  );
  assert_eq!(report.counters.get(Problem::FileNotFound).total, 1);
  assert_eq!(report.counters.get(Problem::FileNotFound).unrepairable, 0);
  assert!(s.fetch_file_by_path(&moved.local_path).unwrap().is_none());
  assert!(s.fetch_file_by_path(&kept.local_path).unwrap().is_some());

  let report = run_janitor(
    &s,
    JanitorOptions {
      repair: true,
      ..Default::default()
    },
  );
  assert_eq!(report.counters.total_problems(), 0);
}

#[test]
fn lone_missing_file_aborts_repair() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "lonely.txt", "unique bytes");
  fs::remove_file(&file.local_path).unwrap();

  // Audit mode counts it as unrepairable.
  let report = run_janitor(&s, JanitorOptions::default());
  assert_eq!(report.counters.get(Problem::FileNotFound).unrepairable, 1);

  // Repair mode refuses to guess.
  let mut worker = Janitor::new(
    &s,
    JanitorOptions {
      repair: true,
      ..Default::default()
    },
  );
  let err = worker.run().unwrap_err();
  assert!(matches!(err, Error::ManualInterventionRequired { .. }));
  drop(worker);

  // The aborted repair rolled back: the row is still there.
  assert!(s.fetch_file_by_path(&file.local_path).unwrap().is_some());
}

#[test]
fn rewritten_file_gets_its_hash_updated_in_place() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "mutated.txt", "original bytes");
  fs::write(&file.local_path, "mutated bytes").unwrap();

  let report = run_janitor(
    &s,
    JanitorOptions {
      full: true,
      repair: true,
      ..Default::default()
    },
  );
  assert_eq!(report.counters.get(Problem::IncorrectHashFiles).total, 1);

  // The hash row kept its id but now carries the recomputed digest.
  let stored = s.fetch_hash(file.hash.id).unwrap().unwrap();
  assert_eq!(stored.data, digest_bytes(b"mutated bytes"));

  let report = run_janitor(
    &s,
    JanitorOptions {
      full: true,
      repair: true,
      ..Default::default()
    },
  );
  assert_eq!(report.counters.total_problems(), 0);
}

#[test]
fn rewritten_file_repoints_to_an_existing_hash() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let original = indexed_file(&s, &dir, "canonical.txt", "canonical bytes");
  let copycat = indexed_file(&s, &dir, "copycat.txt", "divergent bytes");
  fs::write(&copycat.local_path, "canonical bytes").unwrap();

  run_janitor(
    &s,
    JanitorOptions {
      full: true,
      repair: true,
      ..Default::default()
    },
  );

  let repointed = s.fetch_file_by_path(&copycat.local_path).unwrap().unwrap();
  assert_eq!(repointed.hash.id, original.hash.id);
}

#[test]
fn only_prefixes_scope_the_full_phase() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let watched = indexed_file(&s, &dir, "watched.txt", "watched");
  fs::write(&watched.local_path, "changed behind our back").unwrap();

  let elsewhere = TempDir::new().unwrap();
  let report = run_janitor(
    &s,
    JanitorOptions {
      full: true,
      only: vec![fs::canonicalize(elsewhere.path()).unwrap()],
      ..Default::default()
    },
  );
  assert_eq!(report.counters.get(Problem::IncorrectHashFiles).total, 0);

  let report = run_janitor(
    &s,
    JanitorOptions {
      full: true,
      only: vec![fs::canonicalize(dir.path()).unwrap()],
      ..Default::default()
    },
  );
  assert_eq!(report.counters.get(Problem::IncorrectHashFiles).total, 1);
}

#[test]
fn size_limit_skips_large_files() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "sized.txt", "0123456789");
  fs::write(&file.local_path, "9876543210").unwrap();

  let report = run_janitor(
    &s,
    JanitorOptions {
      full: true,
      hash_files_smaller_than: Some(5),
      ..Default::default()
    },
  );
  assert_eq!(report.counters.get(Problem::IncorrectHashFiles).total, 0);

  let report = run_janitor(
    &s,
    JanitorOptions {
      full: true,
      hash_files_smaller_than: Some(1024),
      ..Default::default()
    },
  );
  assert_eq!(report.counters.get(Problem::IncorrectHashFiles).total, 1);
}

#[test]
fn corrupted_tag_core_is_unrepairable() {
  let s = store();
  let tag = s.create_named_tag("corrupt_me", "en", None).unwrap();
  s.conn()
    .execute(
      "UPDATE tag_cores SET core_data = x'00' WHERE core_hash = ?1",
      [tag.core.hash.id.to_string()],
    )
    .unwrap();

  let report = run_janitor(&s, JanitorOptions::default());
  assert_eq!(
    report.counters.get(Problem::IncorrectHashCores).unrepairable,
    1
  );

  let report = run_janitor(
    &s,
    JanitorOptions {
      skip_tag_cores: true,
      ..Default::default()
    },
  );
  assert_eq!(report.counters.get(Problem::IncorrectHashCores).total, 0);
}

#[test]
fn invalid_tag_names_abort_repair() {
  let s = store();
  s.create_named_tag("has spaces", "en", None).unwrap();
  s.set_library_config(TAG_NAME_REGEX_KEY, "[a-z_]+").unwrap();

  let report = run_janitor(&s, JanitorOptions::default());
  assert_eq!(report.counters.get(Problem::InvalidTagName).unrepairable, 1);

  let mut worker = Janitor::new(
    &s,
    JanitorOptions {
      repair: true,
      ..Default::default()
    },
  );
  let err = worker.run().unwrap_err();
  assert!(
    matches!(err, Error::UnrepairableTagName { ref text } if text == "has spaces")
  );
}

#[test]
fn report_round_trips_through_disk() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let file = indexed_file(&s, &dir, "reported.txt", "reported");
  s.delete_file(&file).unwrap();

  let report = run_janitor(&s, JanitorOptions::default());
  assert!(report.counters.total_problems() > 0);

  let path = write_report(&report).unwrap();
  assert!(path
    .file_name()
    .unwrap()
    .to_string_lossy()
    .starts_with("awtfdb-janitor_"));

  let mut worker = Janitor::new(&s, JanitorOptions::default());
  worker.load_report(&path).unwrap();
  fs::remove_file(&path).unwrap();
}

#[test]
fn stale_reports_are_rejected() {
  let s = store();
  let mut report = awtfdb_core::report::JanitorReport::new();
  report.timestamp = 1_000; // long past the one-hour window
  let path = write_report(&report).unwrap();

  let mut worker = Janitor::new(&s, JanitorOptions::default());
  let err = worker.load_report(&path).unwrap_err();
  assert!(matches!(err, Error::StaleReport { .. }));
  fs::remove_file(&path).unwrap();
}

#[test]
fn from_report_mode_only_revisits_listed_rows() {
  let s = store();
  let dir = TempDir::new().unwrap();
  let first = indexed_file(&s, &dir, "first.txt", "first bytes");
  let second = indexed_file(&s, &dir, "second.txt", "second bytes");

  fs::remove_file(&first.local_path).unwrap();
  let report = run_janitor(&s, JanitorOptions::default());
  assert_eq!(report.files_not_found.len(), 1);
  let path = write_report(&report).unwrap();

  // `second` breaks after the report was taken; a from-report run does
  // not see it.
  fs::remove_file(&second.local_path).unwrap();
  let mut worker = Janitor::new(&s, JanitorOptions::default());
  worker.load_report(&path).unwrap();
  let revisit = worker.run().unwrap();
  assert_eq!(revisit.files_not_found.len(), 1);
  assert_eq!(
    revisit.files_not_found[0].local_path,
    first.local_path.display().to_string()
  );
  fs::remove_file(&path).unwrap();
}
