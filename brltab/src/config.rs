use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_OUTPUT_CAPACITY, DEFAULT_TABLES_DIRECTORY};
use crate::error::TableError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TableConfig {
    /// Root under which each table kind has its own subdirectory.
    pub tables_directory: PathBuf,
    /// Cells a translation may produce before it stops with `BufferFull`.
    pub output_capacity: usize,
    pub expand_current_word: bool,
    /// Upper bound on the size of a compiled table blob.
    pub arena_limit: Option<usize>,
}

impl Default for TableConfig {
    fn default() -> TableConfig {
        TableConfig {
            tables_directory: PathBuf::from(DEFAULT_TABLES_DIRECTORY),
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            expand_current_word: false,
            arena_limit: None,
        }
    }
}

impl TableConfig {
    pub fn new(tables_directory: impl Into<PathBuf>) -> TableConfig {
        TableConfig {
            tables_directory: tables_directory.into(),
            ..TableConfig::default()
        }
    }

    /// Read a JSON configuration file. Missing fields keep their defaults.
    pub fn from_path(path: &Path) -> Result<TableConfig, TableError> {
        let file = std::fs::File::open(path).map_err(|e| TableError::load(path, e))?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| TableError::Config {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json() {
        let cfg: TableConfig =
            serde_json::from_str(r#"{ "tables_directory": "/usr/share/brltty" }"#).unwrap();
        assert_eq!(cfg.tables_directory, PathBuf::from("/usr/share/brltty"));
        assert_eq!(cfg.output_capacity, DEFAULT_OUTPUT_CAPACITY);
        assert!(!cfg.expand_current_word);
        assert_eq!(cfg.arena_limit, None);
    }

    #[test]
    fn from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brltab.json");
        std::fs::write(&path, r#"{ "output_capacity": 40, "expand_current_word": true }"#)
            .unwrap();

        let cfg = TableConfig::from_path(&path).unwrap();
        assert_eq!(cfg.output_capacity, 40);
        assert!(cfg.expand_current_word);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            TableConfig::from_path(&path),
            Err(TableError::Config { .. })
        ));
        assert!(matches!(
            TableConfig::from_path(&dir.path().join("missing.json")),
            Err(TableError::Load { .. })
        ));
    }
}
