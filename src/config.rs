use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::Path;

pub const DATA_URL: &str = "https://microsoftedge.github.io/Demos/json-dummy-data/5MB.json";
pub const ROWS_PER_PAGE: usize = 50;
pub const DATASET_KEY: &str = "table-dataset";
pub const ADDED_ROWS_KEY: &str = "table-editor-added-rows";
pub const DELETED_ROWS_KEY: &str = "table-editor-deleted-rows";
pub const EDITS_KEY: &str = "table-editor-edits";
const STORAGE_DIR: &str = "database";
const SMALL_STORE_LIMIT: usize = 5 * 1024 * 1024;

/// Field values given to rows created with "Add row".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewRowDefaults {
    pub language: String,
    pub version: String,
    pub state: String,
}

impl Default for NewRowDefaults {
    fn default() -> Self {
        Self {
            language: "Fairfield".to_string(),
            version: "1.0.0".to_string(),
            state: "to contact".to_string(),
        }
    }
}

/// Editor settings. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub data_url: String,
    pub rows_per_page: usize,
    pub dataset_key: String,
    pub added_rows_key: String,
    pub deleted_rows_key: String,
    pub edits_key: String,
    /// Directory holding the blob store and the small local store.
    pub storage_dir: String,
    pub small_store_limit_bytes: usize,
    /// Columns offered in the filter, sort and fields menus.
    pub columns: Vec<String>,
    /// Columns shown when the editor opens.
    pub visible_columns: Vec<String>,
    pub new_row: NewRowDefaults,
}

impl Default for EditorConfig {
    fn default() -> Self {
        let columns: Vec<String> = ["id", "name", "language", "version", "State", "Created Date"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        Self {
            data_url: DATA_URL.to_string(),
            rows_per_page: ROWS_PER_PAGE,
            dataset_key: DATASET_KEY.to_string(),
            added_rows_key: ADDED_ROWS_KEY.to_string(),
            deleted_rows_key: DELETED_ROWS_KEY.to_string(),
            edits_key: EDITS_KEY.to_string(),
            storage_dir: STORAGE_DIR.to_string(),
            small_store_limit_bytes: SMALL_STORE_LIMIT,
            visible_columns: columns.clone(),
            columns,
            new_row: NewRowDefaults::default(),
        }
    }
}

impl EditorConfig {
    /// Reads a JSON config file.
    ///
    /// A page size of zero would stall pagination, so it is bumped to one.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let contents = fs::read_to_string(path)?;
        let mut config: EditorConfig = serde_json::from_str(&contents)?;
        config.rows_per_page = config.rows_per_page.max(1);
        Ok(config)
    }

    pub fn blob_dir(&self) -> std::path::PathBuf {
        Path::new(&self.storage_dir).join("blobs")
    }

    pub fn local_store_path(&self) -> std::path::PathBuf {
        Path::new(&self.storage_dir).join("local.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rows_per_page": 0, "new_row": {{"language": "Rust"}}}}"#).unwrap();

        let config = EditorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rows_per_page, 1);
        assert_eq!(config.new_row.language, "Rust");
        assert_eq!(config.new_row.version, "1.0.0");
        assert_eq!(config.dataset_key, DATASET_KEY);
        assert_eq!(config.visible_columns.len(), 6);
    }
}
