//! Presentation-side controller for the grid.
//!
//! Holds what the user is looking at (visible columns, the cell being edited,
//! the raw search and filter inputs) and turns user actions into calls on the
//! [`DataView`]. It never touches the engine's logs directly.

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::ViewError;
use crate::pipeline::SortOrder;
use crate::record::{Fields, RowId};
use crate::validation::validate_field;
use crate::view::{DataView, Phase};

/// Distance from the bottom, in pixels, at which the next page is requested.
pub const SCROLL_THRESHOLD: f64 = 500.0;

/// Badge tone for a `State` value.
pub fn state_badge(state: &str) -> &'static str {
    match state {
        "new customer" => "red",
        "served" => "blue",
        "to contact" => "yellow",
        _ => "gray",
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EditingCell {
    pub row: RowId,
    pub column: String,
    pub draft: String,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GridCell {
    pub column: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<&'static str>,
    pub editing: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct GridRow {
    /// 1-based position in the view.
    pub number: usize,
    pub internal_id: RowId,
    pub cells: Vec<GridCell>,
}

/// Everything needed to draw the grid once.
#[derive(Clone, Debug, Serialize)]
pub struct GridPage {
    pub phase: Phase,
    pub loading: bool,
    pub has_more: bool,
    pub total: usize,
    pub columns: Vec<String>,
    pub rows: Vec<GridRow>,
    pub search: String,
    pub filter_column: Option<String>,
    pub filter_value: String,
    pub sort_column: Option<String>,
    pub sort_order: SortOrder,
    pub editing: Option<EditingCell>,
}

pub struct TableEditor {
    view: DataView,
    all_columns: Vec<String>,
    visible_columns: Vec<String>,
    search: String,
    filter_column: Option<String>,
    filter_value: String,
    editing: Option<EditingCell>,
}

impl TableEditor {
    pub fn new(view: DataView, all_columns: Vec<String>, visible_columns: Vec<String>) -> Self {
        TableEditor {
            view,
            all_columns,
            visible_columns,
            search: String::new(),
            filter_column: None,
            filter_value: String::new(),
            editing: None,
        }
    }

    pub async fn start(&mut self) -> Result<(), ViewError> {
        self.view.start().await
    }

    /// Loads the dataset for an editor shared behind a lock.
    ///
    /// The lock is held only to enter and leave the loading phase, never
    /// across the fetch, so other callers can render the grid (and see
    /// `loading`) in the meantime.
    ///
    /// # Arguments
    /// * `editor` - The shared editor
    ///
    /// # Returns
    /// * `Result<(), ViewError>` - `Ok` once Ready, or the fetch error
    pub async fn start_shared(editor: &Mutex<TableEditor>) -> Result<(), ViewError> {
        let loader = match editor.lock().await.view.begin_start().await {
            Some(loader) => loader,
            None => return Ok(()),
        };
        let result = loader.load().await;
        editor.lock().await.view.finish_start(result)
    }

    pub fn view(&self) -> &DataView {
        &self.view
    }

    pub fn all_columns(&self) -> &[String] {
        &self.all_columns
    }

    pub fn visible_columns(&self) -> &[String] {
        &self.visible_columns
    }

    pub fn editing(&self) -> Option<&EditingCell> {
        self.editing.as_ref()
    }

    /// Raw search box text; the view sees it trimmed.
    pub fn set_search(&mut self, text: &str) {
        self.search = text.to_string();
        self.view.set_search(text);
    }

    /// Picks the filter column; the filter value starts over empty.
    pub fn choose_filter_column(&mut self, column: &str) {
        self.filter_column = Some(column.to_string());
        self.filter_value.clear();
        self.view.set_filter(self.filter_column.clone(), "");
    }

    pub fn set_filter_value(&mut self, value: &str) {
        self.filter_value = value.to_string();
        self.view
            .set_filter(self.filter_column.clone(), &self.filter_value);
    }

    pub fn clear_filter(&mut self) {
        self.filter_column = None;
        self.filter_value.clear();
        self.view.set_filter(None, "");
    }

    /// Sorts by a column.
    ///
    /// Picking the active sort column flips the direction; any other column
    /// starts ascending.
    ///
    /// # Arguments
    /// * `column` - Column to sort by
    pub fn choose_sort_column(&mut self, column: &str) {
        let params = self.view.params();
        let order = if params.sort_column.as_deref() == Some(column) {
            params.sort_order.toggled()
        } else {
            SortOrder::Asc
        };
        self.view.set_sort(Some(column.to_string()), order);
    }

    pub fn clear_sort(&mut self) {
        self.view.set_sort(None, SortOrder::Asc);
    }

    /// Shows or hides a column. Re-shown columns go to the end.
    pub fn toggle_column(&mut self, column: &str) {
        if let Some(pos) = self.visible_columns.iter().position(|c| c == column) {
            self.visible_columns.remove(pos);
        } else {
            self.visible_columns.push(column.to_string());
        }
    }

    /// Requests the next page when the viewport is near the bottom.
    ///
    /// # Arguments
    /// * `scroll_top` - Current scroll offset of the grid
    /// * `scroll_height` - Full scrollable height
    /// * `client_height` - Visible height
    ///
    /// # Returns
    /// * `bool` - Whether the window grew
    pub fn on_scroll(&mut self, scroll_top: f64, scroll_height: f64, client_height: f64) -> bool {
        let near_bottom = scroll_height - scroll_top <= client_height + SCROLL_THRESHOLD;
        if near_bottom && self.view.has_more() && !self.view.is_loading() {
            self.view.load_more()
        } else {
            false
        }
    }

    pub fn load_more(&mut self) -> bool {
        self.view.load_more()
    }

    /// Opens a cell for editing with its displayed value as the draft.
    ///
    /// # Arguments
    /// * `row` - Internal id of the row
    /// * `column` - Column of the cell
    ///
    /// # Returns
    /// * `bool` - False if the row is not in the current window
    pub fn start_edit(&mut self, row: &RowId, column: &str) -> bool {
        let record = match self.view.window().iter().find(|r| &r.internal_id == row) {
            Some(record) => record,
            None => return false,
        };
        let draft = self.view.display_value(record, column);
        self.editing = Some(EditingCell {
            row: row.clone(),
            column: column.to_string(),
            draft,
            error: None,
        });
        true
    }

    /// Replaces the draft of the open cell and clears its error.
    pub fn set_draft(&mut self, text: &str) {
        if let Some(cell) = self.editing.as_mut() {
            cell.draft = text.to_string();
            cell.error = None;
        }
    }

    /// Validates the draft and, if it passes, writes it to the row.
    ///
    /// On a validation failure the cell stays open with the message attached
    /// and `Ok(Some(message))` is returned. `Ok(None)` means committed or
    /// nothing was being edited.
    pub async fn commit_edit(&mut self) -> Result<Option<String>, ViewError> {
        let cell = match self.editing.as_mut() {
            Some(cell) => cell,
            None => return Ok(None),
        };

        let result = validate_field(&cell.column, &cell.draft);
        if !result.valid {
            cell.error = result.message.clone();
            return Ok(result.message);
        }

        let row = cell.row.clone();
        let mut partial = Fields::new();
        partial.insert(cell.column.clone(), cell.draft.clone().into());
        self.view.update_row(&row, partial).await?;
        self.editing = None;
        Ok(None)
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub async fn add_row(&mut self) -> Result<RowId, ViewError> {
        self.view.add_row().await
    }

    /// Validated single-cell update, for callers without an edit session.
    pub async fn update_cell(
        &mut self,
        row: &RowId,
        column: &str,
        value: &str,
    ) -> Result<Option<String>, ViewError> {
        let result = validate_field(column, value);
        if !result.valid {
            return Ok(result.message);
        }
        let mut partial = Fields::new();
        partial.insert(column.to_string(), value.into());
        self.view.update_row(row, partial).await?;
        Ok(None)
    }

    pub async fn delete_row(&mut self, row: &RowId) -> Result<(), ViewError> {
        if self.editing.as_ref().is_some_and(|c| &c.row == row) {
            self.editing = None;
        }
        self.view.delete_row(row).await
    }

    /// Current page of the grid, restricted to the visible columns.
    ///
    /// Rows are numbered from 1 in view order; `State` cells carry a badge
    /// tone.
    ///
    /// # Returns
    /// * `GridPage` - Everything the page needs to draw the grid
    pub fn render(&self) -> GridPage {
        let rows = self
            .view
            .window()
            .iter()
            .enumerate()
            .map(|(idx, record)| GridRow {
                number: idx + 1,
                internal_id: record.internal_id.clone(),
                cells: self
                    .visible_columns
                    .iter()
                    .map(|column| {
                        let value = self.view.display_value(record, column);
                        let badge = (column.eq_ignore_ascii_case("state") && !value.is_empty())
                            .then(|| state_badge(&value));
                        let editing = self
                            .editing
                            .as_ref()
                            .is_some_and(|c| c.row == record.internal_id && &c.column == column);
                        GridCell {
                            column: column.clone(),
                            value,
                            badge,
                            editing,
                        }
                    })
                    .collect(),
            })
            .collect();

        let params = self.view.params();
        GridPage {
            phase: self.view.phase().clone(),
            loading: self.view.is_loading(),
            has_more: self.view.has_more(),
            total: self.view.view_len(),
            columns: self.visible_columns.clone(),
            rows,
            search: self.search.clone(),
            filter_column: self.filter_column.clone(),
            filter_value: self.filter_value.clone(),
            sort_column: params.sort_column.clone(),
            sort_order: params.sort_order,
            editing: self.editing.clone(),
        }
    }

    /// The whole view (not just the window) as CSV, visible columns only.
    pub fn export_csv(&self) -> Result<String, Box<dyn std::error::Error>> {
        crate::downloader::to_csv(&self.visible_columns, self.view.rows())
    }

    #[cfg(feature = "web")]
    pub fn export_xlsx(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        crate::downloader::to_xlsx(&self.visible_columns, self.view.rows())
    }

    pub async fn shutdown(&self) {
        self.view.shutdown().await;
    }
}
