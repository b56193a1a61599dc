use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Store configuration
///
/// Maps onto the engine options used when the four sub-databases are
/// opened. All fields have conservative defaults; `create_if_missing`
/// is off so opening a path that was never initialized is an error
/// unless the caller asks for creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Create the databases if they do not exist yet
    pub create_if_missing: bool,
    /// Use LZ4 block compression inside the engine
    pub lz4_compression: bool,
    /// Maximum number of open files per database (engine default if None)
    pub max_open_files: Option<i32>,
    /// Write buffer size in bytes per database (engine default if None)
    pub write_buffer_size: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            create_if_missing: false,
            lz4_compression: true,
            max_open_files: None,
            write_buffer_size: None,
        }
    }
}

impl StoreConfig {
    /// Config that creates missing databases, for first-time setup
    pub fn create() -> Self {
        StoreConfig {
            create_if_missing: true,
            ..Default::default()
        }
    }

    /// Base engine options shared by all four sub-databases
    ///
    /// Column families are always created on demand so first open and
    /// reopen go through the same path.
    pub(crate) fn engine_options(&self) -> rocksdb::Options {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(self.create_if_missing);
        opts.create_missing_column_families(true);
        if self.lz4_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }
        if let Some(max_open_files) = self.max_open_files {
            opts.set_max_open_files(max_open_files);
        }
        if let Some(write_buffer_size) = self.write_buffer_size {
            opts.set_write_buffer_size(write_buffer_size);
        }
        opts
    }

    /// Load config from a TOML file
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(StoreConfig::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(!config.create_if_missing);
        assert!(config.lz4_compression);
        assert!(config.max_open_files.is_none());
        assert!(config.write_buffer_size.is_none());
    }

    #[test]
    fn test_create_helper() {
        assert!(StoreConfig::create().create_if_missing);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::load(dir.path().join("nope.toml")).unwrap();
        assert!(!config.create_if_missing);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "create_if_missing = true").unwrap();
        writeln!(file, "max_open_files = 512").unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert!(config.create_if_missing);
        assert_eq!(config.max_open_files, Some(512));
        // untouched fields keep their defaults
        assert!(config.lz4_compression);
    }

    #[test]
    fn test_load_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        fs::write(&path, "create_if_missing = \"yes\"").unwrap();
        assert!(StoreConfig::load(&path).is_err());
    }
}
