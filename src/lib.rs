/*!
# Table Editor

An editable, paginated view over a large remote JSON dataset, built in Rust.

## Overview

The dataset (tens of thousands of flat records) is fetched once, gap-filled,
given stable internal ids and cached durably. Every later session starts from
the cache. User changes never rewrite the fetched data in place: they live in
three small logs (added rows, deleted ids, per-row edits) that are replayed on
top of the snapshot every time the view is recomputed.

## Architecture

### Data Layer
- **record**: Field values, row ids and records
- **filler**: Fills in missing `State` and `Created Date` values
- **store**: Async key-value stores (in-memory, gzip blob files, quota-limited JSON)
- **loader**: Read-through dataset loader with one in-flight fetch per session

### Engine
- **pipeline**: Search, filter, sort and edit merge over the snapshot and logs
- **view**: Lifecycle, the logs, pagination and the mutation operations
- **validation**: Per-field rules applied before an edit is committed

### Presentation
- **editor**: Column visibility, the cell being edited, infinite scroll
- **downloader**: CSV and XLSX export of the current view
- **app**: HTTP API (requires the `web` feature)

## Pipeline Order

1. Drop deleted remote rows
2. Prepend added rows
3. Case-insensitive substring search over every field
4. Column filter
5. Stable sort (numbers numerically, everything else by locale-aware comparison)
6. Merge the edit overlay

The window is a prefix of the result; `load_more` grows it one page at a time
and any change resets it to the first page.
*/

#[cfg(feature = "web")]
pub mod app;
pub mod config;
pub mod downloader;
pub mod editor;
pub mod error;
pub mod filler;
pub mod loader;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod validation;
pub mod view;

pub use config::EditorConfig;
pub use editor::TableEditor;
pub use error::{FetchError, StoreError, ViewError};
pub use loader::{DatasetLoader, DatasetSource};
pub use pipeline::{SortOrder, ViewParams};
pub use record::{FieldValue, Fields, Record, RowId};
pub use store::{BlobStore, KeyValueStore, LocalStore, MemoryStore};
pub use view::{DataView, Phase};
