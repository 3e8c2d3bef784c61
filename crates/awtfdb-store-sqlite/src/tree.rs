//! Tag-tree propagation.
//!
//! For every file and every implication edge `(child, parent)`, a file
//! tagged with `child` must also carry `parent`, attributed to the edge
//! that caused it. Propagation runs to a fixed point over an in-memory
//! edge map, so implication chains (and even cycles) converge: the working
//! set can only grow within the finite set of `(parent, edge)` pairs.

use std::collections::{HashMap, HashSet};

use awtfdb_core::{id::HashId, source::TagAttribution};

use crate::{encode::decode_hash_id, Result, Store};

/// Which files a propagation pass visits.
#[derive(Debug, Clone, Copy)]
pub enum TreeScope<'a> {
  AllFiles,
  Files(&'a [HashId]),
}

/// What a propagation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeOutcome {
  pub files_visited: u64,
  pub links_added:   u64,
}

impl Store {
  /// Materialise parent-tag implications onto files until nothing changes.
  ///
  /// When two edges imply the same parent on one file, the first insert
  /// wins and the second is a no-op, so `parent_source_id` records
  /// whichever edge landed first.
  pub fn process_tag_tree(&self, scope: TreeScope<'_>) -> Result<TreeOutcome> {
    let mut edges: HashMap<HashId, Vec<(HashId, i64)>> = HashMap::new();
    for edge in self.fetch_tag_implications()? {
      edges
        .entry(edge.child)
        .or_default()
        .push((edge.parent, edge.row_id));
    }

    let files: Vec<HashId> = match scope {
      TreeScope::AllFiles => {
        let mut stmt = self
          .conn()
          .prepare("SELECT DISTINCT file_hash FROM files")?;
        let ids: Vec<String> = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<_>>()?;
        ids
          .iter()
          .map(|s| decode_hash_id(s))
          .collect::<Result<_>>()?
      }
      TreeScope::Files(list) => list.to_vec(),
    };

    let mut outcome = TreeOutcome::default();
    self.with_savepoint("tag_tree", || {
      for file_hash in files {
        outcome.files_visited += 1;
        outcome.links_added += self.propagate_file(file_hash, &edges)?;
      }
      Ok(())
    })?;

    tracing::debug!(
      files = outcome.files_visited,
      links = outcome.links_added,
      "tag tree propagated"
    );
    Ok(outcome)
  }

  fn propagate_file(
    &self,
    file_hash: HashId,
    edges: &HashMap<HashId, Vec<(HashId, i64)>>,
  ) -> Result<u64> {
    let file_tags = self.fetch_tag_cores_for_file(file_hash)?;

    // The working set holds (parent, causing edge row id) pairs. Each pass
    // expands from the file's own tags and from everything found so far;
    // a pass that adds nothing means the closure is complete.
    let mut working: HashSet<(HashId, i64)> = HashSet::new();
    loop {
      let before = working.len();
      for tag in &file_tags {
        if let Some(parents) = edges.get(tag) {
          working.extend(parents.iter().copied());
        }
      }
      let reached: Vec<HashId> = working.iter().map(|(p, _)| *p).collect();
      for parent in reached {
        if let Some(parents) = edges.get(&parent) {
          working.extend(parents.iter().copied());
        }
      }
      if working.len() == before {
        break;
      }
    }

    let present: HashSet<HashId> = file_tags.into_iter().collect();
    let mut added = 0;
    for (parent, edge_row_id) in working {
      if present.contains(&parent) {
        continue;
      }
      if self.add_tag(
        file_hash,
        parent,
        Some(TagAttribution::parented_by(edge_row_id)),
      )? {
        added += 1;
      }
    }
    Ok(added)
  }
}
