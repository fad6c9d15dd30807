#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use table_editor::error::{FetchError, StoreError, StoreResult};
use table_editor::loader::{DatasetLoader, DatasetSource};
use table_editor::store::KeyValueStore;
use table_editor::view::DataView;
use table_editor::EditorConfig;

/// Serves a fixed payload, counting calls. The first `failures` calls fail.
pub struct ScriptedSource {
    payload: Value,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(payload: Value) -> Arc<Self> {
        Self::failing(payload, 0)
    }

    pub fn failing(payload: Value, failures: usize) -> Arc<Self> {
        Arc::new(ScriptedSource {
            payload,
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetSource for ScriptedSource {
    async fn fetch(&self) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(FetchError::Other("connection reset".to_string()));
        }
        Ok(self.payload.clone())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Holds every fetch until [`GatedSource::release`] is called.
pub struct GatedSource {
    payload: Value,
    gate: Notify,
}

impl GatedSource {
    pub fn new(payload: Value) -> Arc<Self> {
        Arc::new(GatedSource {
            payload,
            gate: Notify::new(),
        })
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl DatasetSource for GatedSource {
    async fn fetch(&self) -> Result<Value, FetchError> {
        self.gate.notified().await;
        Ok(self.payload.clone())
    }

    fn describe(&self) -> String {
        "gated".to_string()
    }
}

/// A store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<Value>> {
        Err(StoreError::Poisoned)
    }

    async fn put(&self, _key: &str, _value: &Value) -> StoreResult<()> {
        Err(StoreError::Poisoned)
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::Poisoned)
    }
}

pub fn config(rows_per_page: usize) -> Arc<EditorConfig> {
    Arc::new(EditorConfig {
        rows_per_page,
        ..EditorConfig::default()
    })
}

pub fn view_over(
    config: Arc<EditorConfig>,
    source: Arc<dyn DatasetSource>,
    cache: Arc<dyn KeyValueStore>,
    logs: Arc<dyn KeyValueStore>,
) -> DataView {
    let loader = Arc::new(DatasetLoader::new(
        source,
        cache,
        config.dataset_key.clone(),
    ));
    DataView::new(config, loader, logs)
}

/// `count` rows with ids `a0..`, names `name-<i>` and a fixed State.
pub fn people(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| {
                serde_json::json!({
                    "id": format!("a{}", i),
                    "name": format!("name-{}", i),
                    "language": "Go",
                    "version": "1.0.0",
                    "State": "served",
                    "Created Date": "2023-04-05 10:11:12",
                })
            })
            .collect(),
    )
}
