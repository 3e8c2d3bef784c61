//! Library configuration — the key/value bag behind tag-name validation.
//!
//! Configuration is loaded lazily and the compiled `tag_name_regex` is
//! cached on the store handle; updating a key invalidates the cache.

use regex::Regex;
use rusqlite::{params, OptionalExtension as _};

use crate::{Error, Result, Store};

/// The only configuration key currently defined. Other keys are reserved.
pub const TAG_NAME_REGEX_KEY: &str = "tag_name_regex";

/// Parsed configuration state cached on the store handle.
pub(crate) struct CachedConfig {
  pub tag_name_regex: Option<Regex>,
}

impl Store {
  fn load_config(&self) -> Result<CachedConfig> {
    let pattern: Option<String> = self
      .conn()
      .query_row(
        "SELECT value FROM library_configuration WHERE key = ?1",
        params![TAG_NAME_REGEX_KEY],
        |row| row.get(0),
      )
      .optional()?;

    let tag_name_regex = pattern
      .map(|p| Regex::new(&p).map_err(|e| Error::InvalidRegex(e.to_string())))
      .transpose()?;
    Ok(CachedConfig { tag_name_regex })
  }

  fn with_config<T>(
    &self,
    f: impl FnOnce(&CachedConfig) -> Result<T>,
  ) -> Result<T> {
    let mut slot = self.config.borrow_mut();
    if slot.is_none() {
      *slot = Some(self.load_config()?);
    }
    f(slot.as_ref().expect("config cache was just filled"))
  }

  /// Upsert a configuration key and drop the cached parse.
  pub fn set_library_config(&self, key: &str, value: &str) -> Result<()> {
    self.conn().execute(
      "INSERT INTO library_configuration (key, value) VALUES (?1, ?2)
       ON CONFLICT (key) DO UPDATE SET value = excluded.value",
      params![key, value],
    )?;
    self.config.replace(None);
    Ok(())
  }

  /// The configured tag-name pattern, if any.
  pub fn tag_name_regex(&self) -> Result<Option<String>> {
    self.with_config(|config| {
      Ok(
        config
          .tag_name_regex
          .as_ref()
          .map(|re| re.as_str().to_string()),
      )
    })
  }

  /// Validate a candidate tag name against the configured pattern. The
  /// pattern must match the entire text; a partial match is reported with
  /// the subspan the pattern did accept.
  pub fn verify_tag_name(&self, text: &str) -> Result<()> {
    self.with_config(|config| {
      let Some(re) = &config.tag_name_regex else {
        return Ok(());
      };
      match re.find(text) {
        Some(m) if m.start() == 0 && m.end() == text.len() => Ok(()),
        matched => Err(Error::Core(awtfdb_core::Error::InvalidTagName {
          pattern: re.as_str().to_string(),
          text:    text.to_string(),
          matched: matched.map(|m| m.as_str().to_string()),
        })),
      }
    })
  }
}
