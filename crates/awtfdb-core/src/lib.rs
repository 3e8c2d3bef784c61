//! Core types and query compiler for the awtfdb file-tagging index.
//!
//! This crate is deliberately free of database dependencies. It defines the
//! identity scheme (time-ordered hash ids, keyed Blake3 digests), the domain
//! entities, the tag-query mini-language compiler, and the janitor report
//! document. The storage layer lives in `awtfdb-store-sqlite`; all other
//! crates depend on this one.

pub mod bytesize;
pub mod digest;
pub mod error;
pub mod file;
pub mod hash;
pub mod id;
pub mod pool;
pub mod query;
pub mod report;
pub mod source;
pub mod tag;

pub use error::{Error, Result};
