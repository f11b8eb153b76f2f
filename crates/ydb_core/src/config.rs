//! Environment configuration and the `DB_CONFIG` file.

use crate::error::{YdbError, YdbResult};
use std::path::{Path, PathBuf};

/// Name of the per-environment configuration file.
pub const DB_CONFIG_FILE: &str = "DB_CONFIG";

/// Cache budget used when `set_cachesize` is never called.
pub const DEFAULT_CACHE_SIZE: u64 = 32 * 1024 * 1024;

/// Configuration of an environment.
///
/// Directories are kept as given; relative ones are resolved against the
/// home directory when the environment opens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
    /// Temporary directory override.
    pub tmp_dir: Option<PathBuf>,
    /// Log directory, defaults to the home directory.
    pub lg_dir: Option<PathBuf>,
    /// Cache budget as `(gbytes, bytes)`, if explicitly set.
    pub cache: Option<(u32, u32)>,
    /// Prefix prepended to error messages.
    pub errpfx: Option<String>,
    /// Keep every file in process memory.
    pub in_memory: bool,
}

impl EnvConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data directory.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the temporary directory.
    #[must_use]
    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    /// Sets the log directory.
    #[must_use]
    pub fn lg_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lg_dir = Some(dir.into());
        self
    }

    /// Sets the cache budget.
    #[must_use]
    pub const fn cache_size(mut self, gbytes: u32, bytes: u32) -> Self {
        self.cache = Some((gbytes, bytes));
        self
    }

    /// Sets the error prefix.
    #[must_use]
    pub fn errpfx(mut self, prefix: impl Into<String>) -> Self {
        self.errpfx = Some(prefix.into());
        self
    }

    /// Keeps every file in process memory.
    #[must_use]
    pub const fn in_memory(mut self, value: bool) -> Self {
        self.in_memory = value;
        self
    }

    /// Returns the cache budget in bytes.
    #[must_use]
    pub fn cache_bytes(&self) -> u64 {
        match self.cache {
            Some((gbytes, bytes)) => (u64::from(gbytes) << 30) + u64::from(bytes),
            None => DEFAULT_CACHE_SIZE,
        }
    }

    /// Applies the directives of a `DB_CONFIG` file to this configuration.
    ///
    /// Lines are trimmed; blank lines and lines starting with `#` are
    /// skipped. The command is the first whitespace-delimited token and the
    /// value is the rest of the line, trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`YdbError::ConfigParse`] for an unknown command or a
    /// directive without a value. The configuration may be partially
    /// updated; callers apply it to a scratch copy.
    pub fn apply_db_config(&mut self, text: &str) -> YdbResult<()> {
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (command, value) = match line.split_once(char::is_whitespace) {
                Some((command, value)) => (command, value.trim()),
                None => (line, ""),
            };
            let target = match command {
                "set_data_dir" => &mut self.data_dir,
                "set_tmp_dir" => &mut self.tmp_dir,
                "set_lg_dir" => &mut self.lg_dir,
                other => {
                    return Err(YdbError::ConfigParse {
                        line: index + 1,
                        message: format!("unknown command {other:?}"),
                    })
                }
            };
            if value.is_empty() {
                return Err(YdbError::ConfigParse {
                    line: index + 1,
                    message: format!("{command} requires a value"),
                });
            }
            *target = Some(PathBuf::from(value));
        }
        Ok(())
    }
}

/// Parses `DB_CONFIG` text on top of `base`, returning the merged result.
///
/// `base` itself is never modified, so a failed parse leaves no trace.
pub fn parse_db_config(base: &EnvConfig, text: &str) -> YdbResult<EnvConfig> {
    let mut scratch = base.clone();
    scratch.apply_db_config(text)?;
    Ok(scratch)
}

/// Joins `name` to `dir` the way every environment path is built.
///
/// An absolute `name` is returned unchanged.
#[must_use]
pub fn resolve_dir(dir: &Path, name: &Path) -> PathBuf {
    if name.is_absolute() {
        name.to_path_buf()
    } else {
        dir.join(name)
    }
}
