#![cfg(not(tarpaulin_include))]

use std::env;
use std::sync::Arc;

use log::info;
use table_editor::app;
use table_editor::loader::{DatasetLoader, HttpSource};
use table_editor::store::{BlobStore, LocalStore};
use table_editor::view::DataView;
use table_editor::{EditorConfig, TableEditor};

/// Main entry point for the table editor server
///
/// Opens both stores under the configured storage directory, loads the
/// dataset (from cache when possible) and serves the HTTP API.
///
/// # Arguments
/// * Command line arguments: `[port] [config.json]`
///
/// # Default Configuration
/// * Port 8000 and the built-in [`EditorConfig`] defaults
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut port: u16 = 8000;
    if args.len() >= 2 {
        port = args[1].parse().unwrap_or(8000);
    }

    let config = match args.get(2) {
        Some(path) => EditorConfig::from_file(path)?,
        None => EditorConfig::default(),
    };
    info!("Using storage directory '{}'", config.storage_dir);

    let blobs = Arc::new(BlobStore::open(config.blob_dir())?);
    let logs = Arc::new(LocalStore::open(
        config.local_store_path(),
        config.small_store_limit_bytes,
    )?);
    let source = Arc::new(HttpSource::new(config.data_url.clone()));
    let loader = Arc::new(DatasetLoader::new(
        source,
        blobs,
        config.dataset_key.clone(),
    ));

    let all_columns = config.columns.clone();
    let visible_columns = config.visible_columns.clone();
    let view = DataView::new(Arc::new(config), loader, logs);
    let editor = TableEditor::new(view, all_columns, visible_columns);

    app::run(editor, port, "static").await
}
