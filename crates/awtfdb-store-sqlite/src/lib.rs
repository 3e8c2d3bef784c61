//! SQLite backend for the awtfdb file-tagging index.
//!
//! A [`Store`] owns the process's single [`rusqlite::Connection`]. All work
//! is synchronous on the caller's thread: domain operations wrap
//! multi-statement writes in savepoints, and the long operations
//! (migrations, janitor, tag-tree propagation) run under savepoints or an
//! exclusive transaction so a failure leaves the database untouched.

mod config;
mod encode;
mod files;
mod migrations;
mod pools;
mod sources;
mod store;
mod tags;

pub mod error;
pub mod janitor;
pub mod tree;

pub use config::TAG_NAME_REGEX_KEY;
pub use error::{Error, Result};
pub use files::CreateFileOptions;
pub use janitor::{Janitor, JanitorOptions};
pub use store::{HashCreateOptions, Store};
pub use tree::{TreeOutcome, TreeScope};

#[cfg(test)]
mod tests;
