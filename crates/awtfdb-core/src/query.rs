//! The tag-query mini-language → SQL compiler.
//!
//! Pipeline:
//!   raw &str
//!     └─ scan()            → one token per pass, fixed regex priority
//!          └─ compile()    → SQL fragments + positional arguments
//!
//! The compiler never touches the database. Tag texts and file digests come
//! back as [`QueryArg`]s for the executor to resolve into hash ids; an
//! unknown tag is an executor-level error, an unknown file digest becomes a
//! placeholder so the query returns zero rows.

use std::sync::LazyLock;

use regex::Regex;

use crate::{
  digest::Digest,
  error::{Error, Result},
};

// ─── Compiled output ─────────────────────────────────────────────────────────

/// A positional argument produced by compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryArg {
  /// Tag text, to be resolved to a core hash id.
  Tag(String),
  /// Raw 32-byte digest selecting a single file, to be resolved to a file
  /// hash id.
  FileDigest(Digest),
}

/// The result of compiling a query: a SQL statement over `tag_files` plus
/// its positional arguments, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
  pub sql:  String,
  pub args: Vec<QueryArg>,
}

// ─── Scanner ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
  RawTag,
  Or,
  Not,
  And,
  Tag,
}

// Tried strictly in this order at every offset. `Or` must run before `And`
// and `Not` because all three start with a space.
static RAW_TAG_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"^"[^"]*""#).unwrap());
static OR_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^ *\| *").unwrap());
static NOT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ +-").unwrap());
static AND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ +").unwrap());
static TAG_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_\-:;&*()]+").unwrap());

fn scan(rest: &str) -> Option<(TokenKind, regex::Match<'_>)> {
  let table: [(TokenKind, &Regex); 5] = [
    (TokenKind::RawTag, &RAW_TAG_RE),
    (TokenKind::Or, &OR_RE),
    (TokenKind::Not, &NOT_RE),
    (TokenKind::And, &AND_RE),
    (TokenKind::Tag, &TAG_RE),
  ];
  for (kind, re) in table {
    if let Some(m) = re.find(rest) {
      return Some((kind, m));
    }
  }
  None
}

// ─── Compiler ────────────────────────────────────────────────────────────────

const SELECT_BASE: &str = "select distinct file_hash from tag_files";
const AND_FRAGMENT: &str = " intersect select file_hash from tag_files where";
const NOT_FRAGMENT: &str = " except select file_hash from tag_files where";

/// Compile `input` into SQL plus positional arguments.
///
/// Errors carry the byte offset the scanner had reached:
/// [`Error::UnexpectedCharacter`] when no token matches, and
/// [`Error::InvalidHashScopedTag`] when a `hash:` tag does not carry exactly
/// 64 hex characters.
pub fn compile(input: &str) -> Result<CompiledQuery> {
  let mut sql = String::from(SELECT_BASE);
  let mut args: Vec<QueryArg> = Vec::new();
  let mut offset = 0usize;
  let mut in_where = false;
  let mut has_term = false;

  while offset < input.len() {
    let (kind, m) = scan(&input[offset..])
      .ok_or(Error::UnexpectedCharacter { offset })?;
    let token = m.as_str();
    offset += m.end();

    if !in_where {
      sql.push_str(" where");
      in_where = true;
    }

    match kind {
      TokenKind::Or => sql.push_str(" or"),
      TokenKind::And => sql.push_str(AND_FRAGMENT),
      TokenKind::Not => {
        if !has_term {
          sql.push_str(" true");
        }
        sql.push_str(NOT_FRAGMENT);
      }
      TokenKind::RawTag => {
        sql.push_str(" core_hash = ?");
        args.push(QueryArg::Tag(token[1..token.len() - 1].to_string()));
        has_term = true;
      }
      TokenKind::Tag => {
        compile_plain_tag(token, offset, &mut sql, &mut args)?;
        has_term = true;
      }
    }
  }

  Ok(CompiledQuery { sql, args })
}

/// Handle a bare tag token, which may be one of the special scoped forms.
/// `end_offset` is the scanner position just past the token.
fn compile_plain_tag(
  token: &str,
  end_offset: usize,
  sql: &mut String,
  args: &mut Vec<QueryArg>,
) -> Result<()> {
  if let Some(hex_part) = token.strip_prefix("hash:") {
    let digest: Digest = hex_part
      .parse()
      .map_err(|_| Error::InvalidHashScopedTag { offset: end_offset })?;
    sql.push_str(" file_hash = ?");
    args.push(QueryArg::FileDigest(digest));
  } else if let Some(count_part) = token.strip_prefix("system:low_tags:") {
    // The count is part of the language, not a runtime argument; a bad
    // count means the token as a whole is not a valid query word.
    let count: u64 = count_part.parse().map_err(|_| {
      Error::UnexpectedCharacter {
        offset: end_offset - token.len(),
      }
    })?;
    sql.push_str(&format!(
      " (select count(*) from tag_files tf2 \
       where tf2.file_hash = tag_files.file_hash) < {count}"
    ));
  } else if token == "system:random" {
    sql.push_str(
      " core_hash = \
       (select core_hash from tag_names order by random() limit 1)",
    );
  } else {
    sql.push_str(" core_hash = ?");
    args.push(QueryArg::Tag(token.to_string()));
  }
  Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
