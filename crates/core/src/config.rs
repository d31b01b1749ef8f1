use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::DEFAULT_PAGE_SIZE;

pub const DEFAULT_READ_BATCH_SIZE: usize = 50;

/// Settings shared by every command. Fields missing from a config file keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub catalog_path: PathBuf,
    /// The exiftool executable, a bare name is looked up on `PATH`.
    pub exiftool_path: PathBuf,
    /// Images per exiftool write call during sync.
    pub sync_page_size: usize,
    /// Images per exiftool read call during indexing.
    pub read_batch_size: usize,
    /// Size of the hashing thread pool, rayon's default when unset.
    pub hash_threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: default_dir().join("catalog.db"),
            exiftool_path: PathBuf::from("exiftool"),
            sync_page_size: DEFAULT_PAGE_SIZE,
            read_batch_size: DEFAULT_READ_BATCH_SIZE,
            hash_threads: None,
        }
    }
}

/// `~/.scanvault`, or `./.scanvault` without a home directory.
pub fn default_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".scanvault")
}

pub fn default_config_path() -> PathBuf {
    default_dir().join("config.toml")
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, which must exist, or the default config file when it
    /// does. Without either the defaults are returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) if !path.is_file() => {
                return Err(Error::Config(format!("config file not found: {}", path.display())));
            }
            Some(path) => path.to_path_buf(),
            None => {
                let default = default_config_path();
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_page_size == 0 {
            return Err(Error::Config("sync_page_size must be at least 1".to_string()));
        }
        if self.read_batch_size == 0 {
            return Err(Error::Config("read_batch_size must be at least 1".to_string()));
        }
        if self.hash_threads == Some(0) {
            return Err(Error::Config("hash_threads must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.catalog_path.ends_with(".scanvault/catalog.db"));
        assert_eq!(config.exiftool_path, PathBuf::from("exiftool"));
        assert_eq!(config.sync_page_size, 10);
        assert_eq!(config.read_batch_size, 50);
        assert_eq!(config.hash_threads, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            exiftool_path = "/opt/exiftool/exiftool"
            sync_page_size = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.exiftool_path, PathBuf::from("/opt/exiftool/exiftool"));
        assert_eq!(config.sync_page_size, 25);
        assert_eq!(config.read_batch_size, DEFAULT_READ_BATCH_SIZE);
    }

    #[test]
    fn test_rejects_unknown_and_invalid() {
        assert!(matches!(Config::from_toml_str("colour = \"blue\""), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml_str("sync_page_size = 0"), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml_str("hash_threads = 0"), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "catalog_path = \"/data/catalog.db\"\nhash_threads = 4\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.catalog_path, PathBuf::from("/data/catalog.db"));
        assert_eq!(config.hash_threads, Some(4));

        let missing = tmp.path().join("missing.toml");
        assert!(matches!(Config::load(Some(&missing)), Err(Error::Config(_))));
    }
}
