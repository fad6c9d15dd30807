use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::FetchError;
use crate::filler::fill_missing_fields;
use crate::record::{FieldValue, Fields, Record, assign_remote_ids};
use crate::store::KeyValueStore;

pub const METADATA_KEY: &str = "cache-metadata";

/// Where the raw dataset comes from on a cache miss.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, FetchError>;

    /// Human readable origin, recorded in the cache metadata.
    fn describe(&self) -> String;
}

/// Fetches the dataset with a single HTTP GET.
#[cfg(feature = "web")]
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

#[cfg(feature = "web")]
impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        HttpSource {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "web")]
#[async_trait]
impl DatasetSource for HttpSource {
    async fn fetch(&self) -> Result<Value, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Pulls the row list out of a raw payload.
///
/// Accepts a bare array or an object with a `data` array; anything else yields
/// nothing. Entries that are not objects become empty rows so every row keeps
/// its position in the payload.
pub fn parse_payload(payload: Value) -> Vec<Fields> {
    let rows = match payload {
        Value::Array(rows) => rows,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    rows.into_iter()
        .map(|row| match row {
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (k, FieldValue::from(v)))
                .collect::<Fields>(),
            _ => Fields::new(),
        })
        .collect()
}

/// Small document stored next to the dataset describing where it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub fetched_at: String,
    pub source: String,
    pub row_count: usize,
}

/// Read-through loader for the dataset snapshot.
///
/// The first successful load is kept for the session; concurrent callers share
/// one in-flight fetch. A failed load leaves nothing behind, so calling
/// [`DatasetLoader::load`] again retries.
pub struct DatasetLoader {
    source: Arc<dyn DatasetSource>,
    cache: Arc<dyn KeyValueStore>,
    dataset_key: String,
    snapshot: OnceCell<Arc<Vec<Record>>>,
}

impl DatasetLoader {
    pub fn new(
        source: Arc<dyn DatasetSource>,
        cache: Arc<dyn KeyValueStore>,
        dataset_key: impl Into<String>,
    ) -> Self {
        DatasetLoader {
            source,
            cache,
            dataset_key: dataset_key.into(),
            snapshot: OnceCell::new(),
        }
    }

    pub fn dataset_key(&self) -> &str {
        &self.dataset_key
    }

    /// The large-object store holding the snapshot.
    pub fn cache(&self) -> &Arc<dyn KeyValueStore> {
        &self.cache
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.initialized()
    }

    pub async fn load(&self) -> Result<Arc<Vec<Record>>, FetchError> {
        self.snapshot
            .get_or_try_init(|| self.load_uncached())
            .await
            .cloned()
    }

    async fn load_uncached(&self) -> Result<Arc<Vec<Record>>, FetchError> {
        if let Some(rows) = self.cached_rows().await {
            info!("Loaded dataset from cache ({} rows)", rows.len());
            return Ok(Arc::new(rows));
        }

        info!("Fetching dataset from {}...", self.source.describe());
        let payload = self.source.fetch().await?;
        let raw = parse_payload(payload);
        let filled = fill_missing_fields(raw, &mut rand::thread_rng());
        let rows = assign_remote_ids(filled);

        match serde_json::to_value(&rows) {
            Ok(value) => match self.cache.put(&self.dataset_key, &value).await {
                Ok(()) => info!("Dataset stored in cache ({} rows)", rows.len()),
                Err(e) => warn!("Failed to store dataset in cache: {}", e),
            },
            Err(e) => warn!("Failed to encode dataset for cache: {}", e),
        }
        self.write_metadata(rows.len()).await;

        Ok(Arc::new(rows))
    }

    async fn cached_rows(&self) -> Option<Vec<Record>> {
        let value = match self.cache.get(&self.dataset_key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to retrieve dataset from cache: {}", e);
                return None;
            }
        };
        match serde_json::from_value::<Vec<Record>>(value) {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!("Cached dataset is unreadable, refetching: {}", e);
                None
            }
        }
    }

    async fn write_metadata(&self, row_count: usize) {
        let metadata = CacheMetadata {
            fetched_at: chrono::Local::now()
                .format(crate::record::DATE_LAYOUT)
                .to_string(),
            source: self.source.describe(),
            row_count,
        };
        if let Err(e) = set_cache_metadata(self.cache.as_ref(), &metadata).await {
            warn!("Failed to store metadata: {}", e);
        }
    }
}

pub async fn has_data_cache(cache: &dyn KeyValueStore, dataset_key: &str) -> bool {
    match cache.get(dataset_key).await {
        Ok(value) => value.is_some(),
        Err(e) => {
            warn!("Failed to check cache: {}", e);
            false
        }
    }
}

/// Drops the cached dataset and its metadata; the next session refetches.
pub async fn clear_data_cache(cache: &dyn KeyValueStore, dataset_key: &str) -> bool {
    let mut ok = true;
    for key in [dataset_key, METADATA_KEY] {
        if let Err(e) = cache.delete(key).await {
            warn!("Failed to clear '{}': {}", key, e);
            ok = false;
        }
    }
    ok
}

pub async fn get_cache_metadata(cache: &dyn KeyValueStore) -> Option<CacheMetadata> {
    match cache.get(METADATA_KEY).await {
        Ok(Some(value)) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

pub async fn set_cache_metadata(
    cache: &dyn KeyValueStore,
    metadata: &CacheMetadata,
) -> Result<(), crate::error::StoreError> {
    let value = serde_json::to_value(metadata)?;
    cache.put(METADATA_KEY, &value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_shapes() {
        let bare = parse_payload(json!([{"id": "a1"}, {"id": "a2"}]));
        assert_eq!(bare.len(), 2);
        assert_eq!(bare[1].get("id"), Some(&FieldValue::text("a2")));

        let wrapped = parse_payload(json!({"data": [{"id": "b1"}]}));
        assert_eq!(wrapped.len(), 1);

        assert!(parse_payload(json!({"rows": []})).is_empty());
        assert!(parse_payload(json!("nope")).is_empty());
    }

    #[test]
    fn stray_entries_keep_their_slot() {
        let rows = assign_remote_ids(parse_payload(json!([{"id": "a"}, 3, null, {"id": "b"}])));
        let ids: Vec<&str> = rows.iter().map(|r| r.internal_id.as_str()).collect();
        assert_eq!(ids, vec!["row-0", "row-1", "row-2", "row-3"]);
        assert!(rows[1].fields.is_empty());
        assert_eq!(rows[3].source_id(), Some(&FieldValue::text("b")));
    }
}
