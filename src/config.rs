//! Database location resolution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Environment variable overriding the database location.
pub const DATABASE_ENV: &str = "ROLODEX_DB";

/// Runtime configuration for the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
}

impl Config {
    /// Resolves the configuration.
    ///
    /// The database path comes from `cli_database` if given, then from the
    /// `ROLODEX_DB` environment variable, then from [`default_database_path`].
    /// Blank values count as unset.
    pub fn resolve(cli_database: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(DATABASE_ENV)
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty());

        let database_path = match (cli_database, from_env) {
            (Some(path), _) if !path.as_os_str().is_empty() => path.to_path_buf(),
            (_, Some(path)) => path,
            _ => default_database_path()?,
        };

        tracing::debug!(path = %database_path.display(), "resolved database path");
        Ok(Self { database_path })
    }
}

/// Gets the cross-platform default database path.
///
/// Returns the path as `{data_dir}/rolodex/contacts.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
///
/// # Errors
///
/// Returns an error if the data directory cannot be determined.
pub fn default_database_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join("rolodex").join("contacts.db"))
}

/// Ensures the parent directory of the database file exists.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}
