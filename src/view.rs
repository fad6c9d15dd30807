use chrono::Local;
use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::EditorConfig;
use crate::error::{FetchError, ViewError};
use crate::loader::DatasetLoader;
use crate::pipeline::{PipelineInput, SortOrder, ViewParams, materialize, merge_edits};
use crate::record::{DATE_LAYOUT, FieldValue, Fields, Record, RowId};
use crate::store::KeyValueStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "message", rename_all = "lowercase")]
pub enum Phase {
    Uninitialized,
    Loading,
    Ready,
    /// The dataset could not be fetched; `start` may be called again.
    Failed(String),
}

/// The data view engine.
///
/// Owns the dataset snapshot, the addition and deletion logs and the edit
/// overlay, and keeps a materialized, page-windowed view over them. Every
/// parameter change and every mutation re-runs the whole pipeline and resets
/// the window to the first page.
///
/// Rows created with [`DataView::add_row`] stay pinned at the top of the view,
/// whatever the search, filter or sort, until the next parameter change.
pub struct DataView {
    config: Arc<EditorConfig>,
    loader: Arc<DatasetLoader>,
    logs: Arc<dyn KeyValueStore>,
    phase: Phase,
    snapshot: Arc<Vec<Record>>,
    source_ids: HashMap<RowId, FieldValue>,
    additions: Vec<Record>,
    deletions: Vec<RowId>,
    edits: HashMap<RowId, Fields>,
    params: ViewParams,
    pinned: Vec<RowId>,
    rows: Vec<Record>,
    window: usize,
}

impl DataView {
    pub fn new(
        config: Arc<EditorConfig>,
        loader: Arc<DatasetLoader>,
        logs: Arc<dyn KeyValueStore>,
    ) -> Self {
        DataView {
            config,
            loader,
            logs,
            phase: Phase::Uninitialized,
            snapshot: Arc::new(Vec::new()),
            source_ids: HashMap::new(),
            additions: Vec::new(),
            deletions: Vec::new(),
            edits: HashMap::new(),
            params: ViewParams::default(),
            pinned: Vec::new(),
            rows: Vec::new(),
            window: 0,
        }
    }

    /// Restores the persisted logs and loads the dataset.
    ///
    /// A no-op once Ready. On failure the view moves to [`Phase::Failed`] and
    /// the error is returned; calling `start` again retries.
    pub async fn start(&mut self) -> Result<(), ViewError> {
        let loader = match self.begin_start().await {
            Some(loader) => loader,
            None => return Ok(()),
        };
        let result = loader.load().await;
        self.finish_start(result)
    }

    /// First half of [`DataView::start`]: moves to [`Phase::Loading`] and
    /// restores the logs.
    ///
    /// # Returns
    /// * `Some(loader)` - The loader to await, possibly without holding any
    ///   lock on the view
    /// * `None` - The view is already Ready
    pub async fn begin_start(&mut self) -> Option<Arc<DatasetLoader>> {
        if self.phase == Phase::Ready {
            return None;
        }
        self.phase = Phase::Loading;
        self.restore_logs().await;
        Some(self.loader.clone())
    }

    /// Second half of [`DataView::start`]: installs the loaded snapshot or
    /// records the failure.
    ///
    /// A result arriving after the view became Ready (a second, overlapping
    /// start) is ignored.
    ///
    /// # Arguments
    /// * `result` - Outcome of [`DatasetLoader::load`]
    pub fn finish_start(
        &mut self,
        result: Result<Arc<Vec<Record>>, FetchError>,
    ) -> Result<(), ViewError> {
        if self.phase == Phase::Ready {
            return Ok(());
        }
        match result {
            Ok(snapshot) => {
                self.install(snapshot);
                Ok(())
            }
            Err(e) => {
                warn!("Dataset load failed: {}", e);
                self.phase = Phase::Failed(e.to_string());
                Err(e.into())
            }
        }
    }

    fn install(&mut self, snapshot: Arc<Vec<Record>>) {
        self.source_ids = snapshot
            .iter()
            .filter_map(|r| r.source_id().map(|id| (r.internal_id.clone(), id.clone())))
            .collect();
        self.snapshot = snapshot;
        self.phase = Phase::Ready;
        info!(
            "View ready: {} rows, {} added, {} deleted, {} edited",
            self.snapshot.len(),
            self.additions.len(),
            self.deletions.len(),
            self.edits.len()
        );
        self.recompute();
    }

    async fn restore_logs(&mut self) {
        self.additions = self.read_log(&self.config.added_rows_key).await;
        self.deletions = self.read_log(&self.config.deleted_rows_key).await;
        self.edits = self.read_log(&self.config.edits_key).await;
    }

    async fn read_log<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.logs.get(key).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Ignoring unreadable log '{}': {}", key, e);
                T::default()
            }),
            Ok(None) => T::default(),
            Err(e) => {
                warn!("Failed to read log '{}': {}", key, e);
                T::default()
            }
        }
    }

    async fn write_log<T: Serialize + Sync>(&self, key: &str, log: &T) {
        let value = match serde_json::to_value(log) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode log '{}': {}", key, e);
                return;
            }
        };
        match self.logs.put(key, &value).await {
            Ok(()) => debug!("Persisted log '{}'", key),
            Err(e) => warn!("Failed to persist log '{}': {}", key, e),
        }
    }

    /// Re-runs the pipeline and resets the window to the first page.
    pub fn recompute(&mut self) {
        if self.phase != Phase::Ready {
            return;
        }

        let deletions: HashSet<RowId> = self.deletions.iter().cloned().collect();
        let input = PipelineInput {
            snapshot: &self.snapshot,
            additions: &self.additions,
            deletions: &deletions,
            edits: &self.edits,
        };
        let mut rows = materialize(&input, &self.params);

        if !self.pinned.is_empty() {
            rows.retain(|r| !self.pinned.contains(&r.internal_id));
            let head: Vec<Record> = self
                .pinned
                .iter()
                .filter_map(|id| self.additions.iter().find(|r| &r.internal_id == id))
                .map(|r| merge_edits(r, &self.edits))
                .collect();
            rows.splice(0..0, head);
        }

        self.rows = rows;
        self.window = self.rows.len().min(self.config.rows_per_page);
        debug!(
            "Recomputed view: {} rows, window {}",
            self.rows.len(),
            self.window
        );
    }

    /// Extends the window by one page, capped at the view length.
    ///
    /// # Returns
    /// * `bool` - Whether the window grew; false before Ready or when every
    ///   row is already paged in
    pub fn load_more(&mut self) -> bool {
        if self.phase != Phase::Ready || self.window >= self.rows.len() {
            return false;
        }
        self.window = (self.window + self.config.rows_per_page).min(self.rows.len());
        true
    }

    fn ensure_ready(&self) -> Result<(), ViewError> {
        if self.phase == Phase::Ready {
            Ok(())
        } else {
            Err(ViewError::NotReady)
        }
    }

    fn next_local_id(&self) -> RowId {
        let mut millis = Local::now().timestamp_millis();
        loop {
            let id = RowId::local(millis);
            if !self.additions.iter().any(|r| r.internal_id == id) {
                return id;
            }
            millis += 1;
        }
    }

    /// Creates an empty row at the top of the view.
    ///
    /// # Returns
    /// * `Result<RowId, ViewError>` - The new `new-<millis>` id
    pub async fn add_row(&mut self) -> Result<RowId, ViewError> {
        self.ensure_ready()?;

        let id = self.next_local_id();
        let defaults = &self.config.new_row;
        let mut row = Record::new(id.clone(), Fields::new());
        row.set("id", id.as_str());
        row.set("name", "");
        row.set("Primary", "");
        row.set("bio", "");
        row.set("language", defaults.language.as_str());
        row.set("version", defaults.version.as_str());
        row.set("State", defaults.state.as_str());
        row.set("Created Date", Local::now().format(DATE_LAYOUT).to_string());

        self.additions.insert(0, row);
        self.pinned.insert(0, id.clone());
        self.recompute();

        self.write_log(&self.config.added_rows_key, &self.additions)
            .await;
        info!("Added row {}", id);
        Ok(id)
    }

    /// Merges `partial` into the row's edit overlay (last write wins).
    ///
    /// Callers validate first; nothing is rejected here.
    ///
    /// # Arguments
    /// * `id` - Internal id of the row
    /// * `partial` - Changed fields only
    pub async fn update_row(&mut self, id: &RowId, partial: Fields) -> Result<(), ViewError> {
        self.ensure_ready()?;

        self.edits.entry(id.clone()).or_default().extend(partial.clone());
        let mut added_changed = false;
        if id.is_local() {
            if let Some(row) = self.additions.iter_mut().find(|r| &r.internal_id == id) {
                row.merge(&partial);
                added_changed = true;
            }
        }
        self.recompute();

        if added_changed {
            self.write_log(&self.config.added_rows_key, &self.additions)
                .await;
        }
        self.write_log(&self.config.edits_key, &self.edits).await;
        self.patch_snapshot(|rows| match rows.iter_mut().find(|r| &r.internal_id == id) {
            Some(row) => {
                row.merge(&partial);
                true
            }
            None => false,
        })
        .await;
        Ok(())
    }

    /// Removes a row from the view.
    ///
    /// Added rows leave the addition log; remote rows are recorded in the
    /// deletion log. Either way the row's edits are dropped.
    ///
    /// # Arguments
    /// * `id` - Internal id of the row
    ///
    /// # Returns
    /// * `Result<(), ViewError>` - `NotReady` before the dataset is loaded
    pub async fn delete_row(&mut self, id: &RowId) -> Result<(), ViewError> {
        self.ensure_ready()?;

        let was_added = id.is_local();
        if was_added {
            self.additions.retain(|r| &r.internal_id != id);
            self.pinned.retain(|p| p != id);
        } else if !self.deletions.contains(id) {
            self.deletions.push(id.clone());
        }
        let had_edits = self.edits.remove(id).is_some();
        self.recompute();

        if had_edits {
            self.write_log(&self.config.edits_key, &self.edits).await;
        }

        if was_added {
            self.write_log(&self.config.added_rows_key, &self.additions)
                .await;
        } else {
            self.write_log(&self.config.deleted_rows_key, &self.deletions)
                .await;
        }
        self.patch_snapshot(|rows| {
            let before = rows.len();
            rows.retain(|r| &r.internal_id != id);
            rows.len() != before
        })
        .await;
        info!("Deleted row {}", id);
        Ok(())
    }

    /// Applies `patch` to the durable snapshot, if there is one, and writes it
    /// back when `patch` reports a change.
    async fn patch_snapshot<F>(&self, patch: F)
    where
        F: FnOnce(&mut Vec<Record>) -> bool + Send,
    {
        let cache = self.loader.cache();
        let key = self.loader.dataset_key();
        let value = match cache.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read cached dataset for patching: {}", e);
                return;
            }
        };
        let mut rows: Vec<Record> = match serde_json::from_value(value) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Cached dataset is unreadable, not patching: {}", e);
                return;
            }
        };
        if !patch(&mut rows) {
            return;
        }
        let result = match serde_json::to_value(&rows) {
            Ok(value) => cache.put(key, &value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!("Failed to store patched dataset: {}", e);
        }
    }

    /// Flushes both stores. Failures are logged.
    pub async fn shutdown(&self) {
        if let Err(e) = self.logs.flush().await {
            warn!("Failed to flush log store: {}", e);
        }
        if let Err(e) = self.loader.cache().flush().await {
            warn!("Failed to flush dataset store: {}", e);
        }
    }

    /// Sets the search text. Leading and trailing whitespace is ignored.
    ///
    /// # Arguments
    /// * `search` - Text matched case-insensitively against every field
    pub fn set_search(&mut self, search: &str) {
        let search = search.trim();
        if self.params.search != search {
            self.params.search = search.to_string();
            self.params_changed();
        }
    }

    /// Sets the filter column and value.
    ///
    /// # Arguments
    /// * `column` - Column to filter on; `None` clears the filter
    /// * `value` - Case-insensitive substring; blank disables the filter
    pub fn set_filter(&mut self, column: Option<String>, value: &str) {
        let value = value.trim().to_string();
        let value = if column.is_some() { value } else { String::new() };
        if self.params.filter_column != column || self.params.filter_value != value {
            self.params.filter_column = column;
            self.params.filter_value = value;
            self.params_changed();
        }
    }

    /// Sets the sort column and direction.
    ///
    /// # Arguments
    /// * `column` - Column to sort by; `None` keeps pipeline order
    /// * `order` - Ascending or descending
    pub fn set_sort(&mut self, column: Option<String>, order: SortOrder) {
        if self.params.sort_column != column || self.params.sort_order != order {
            self.params.sort_column = column;
            self.params.sort_order = order;
            self.params_changed();
        }
    }

    fn params_changed(&mut self) {
        self.pinned.clear();
        self.recompute();
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn params(&self) -> &ViewParams {
        &self.params
    }

    /// The rows currently paged in.
    pub fn window(&self) -> &[Record] {
        &self.rows[..self.window]
    }

    /// The whole materialized view.
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn window_len(&self) -> usize {
        self.window
    }

    pub fn view_len(&self) -> usize {
        self.rows.len()
    }

    /// True while rows remain beyond the window.
    pub fn has_more(&self) -> bool {
        self.window < self.rows.len()
    }

    /// The edit overlay, keyed by internal id.
    pub fn edits(&self) -> &HashMap<RowId, Fields> {
        &self.edits
    }

    pub fn additions(&self) -> &[Record] {
        &self.additions
    }

    pub fn deletions(&self) -> &[RowId] {
        &self.deletions
    }

    /// The dataset's own `id` for a remote row.
    pub fn source_id(&self, id: &RowId) -> Option<&FieldValue> {
        self.source_ids.get(id)
    }

    /// What a cell shows: the overlay value, else the row value, else "".
    pub fn display_value(&self, row: &Record, column: &str) -> String {
        self.edits
            .get(&row.internal_id)
            .and_then(|patch| patch.get(column))
            .filter(|v| !v.is_absent())
            .or_else(|| row.get(column))
            .map(FieldValue::display)
            .unwrap_or_default()
    }
}
