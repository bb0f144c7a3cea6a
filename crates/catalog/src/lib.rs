//! Durable storage for the last known user location.
//!
//! A single record lives under [`USER_LOCATION_KEY`] as `{"lat":..,"lon":..}`.
//! Writers overwrite it wholesale; the last write wins.

use std::path::{Path, PathBuf};

use foundation::LatLon;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const USER_LOCATION_KEY: &str = "userLocation";

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLocation {
    pub lat: f64,
    pub lon: f64,
}

impl From<LatLon> for StoredLocation {
    fn from(p: LatLon) -> Self {
        Self { lat: p.lat, lon: p.lon }
    }
}

impl From<StoredLocation> for LatLon {
    fn from(s: StoredLocation) -> Self {
        LatLon::new(s.lat, s.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("browser storage unavailable")]
    StorageUnavailable,
    #[error("stored location corrupt: {0}")]
    Corrupt(String),
    #[error("location storage error: {0}")]
    Io(String),
}

pub trait LocationStore: Send {
    fn load(&self) -> Result<Option<LatLon>, StoreError>;
    fn save(&mut self, location: LatLon) -> Result<(), StoreError>;
}

/// Parses a stored record. Blank text counts as absent; out-of-range
/// coordinates count as corrupt.
pub fn decode_location(raw: &str) -> Result<Option<LatLon>, StoreError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let stored = serde_json::from_str::<StoredLocation>(raw)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let location = LatLon::from(stored);
    if !location.is_valid() {
        return Err(StoreError::Corrupt(format!("out of range: {location}")));
    }
    Ok(Some(location))
}

pub fn encode_location(location: LatLon) -> Result<String, StoreError> {
    serde_json::to_string(&StoredLocation::from(location)).map_err(|e| StoreError::Io(e.to_string()))
}

#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    raw: Option<String>,
    writes: usize,
}

impl InMemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(location: LatLon) -> Self {
        Self {
            raw: encode_location(location).ok(),
            writes: 0,
        }
    }

    /// Seeds the raw record, e.g. to simulate a corrupt value.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
            writes: 0,
        }
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl LocationStore for InMemoryLocationStore {
    fn load(&self) -> Result<Option<LatLon>, StoreError> {
        match &self.raw {
            Some(raw) => decode_location(raw),
            None => Ok(None),
        }
    }

    fn save(&mut self, location: LatLon) -> Result<(), StoreError> {
        self.raw = Some(encode_location(location)?);
        self.writes += 1;
        Ok(())
    }
}

/// JSON object file holding the record under its key, for native runs.
#[derive(Debug, Clone)]
pub struct JsonFileLocationStore {
    path: PathBuf,
}

impl JsonFileLocationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_object(&self) -> Result<serde_json::Map<String, serde_json::Value>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(serde_json::Map::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| StoreError::Corrupt(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(serde_json::Map::new()),
            Err(e) => Err(StoreError::Io(format!("read {}: {e}", self.path.display()))),
        }
    }
}

impl LocationStore for JsonFileLocationStore {
    fn load(&self) -> Result<Option<LatLon>, StoreError> {
        let object = self.read_object()?;
        let Some(value) = object.get(USER_LOCATION_KEY) else {
            return Ok(None);
        };
        // localStorage keeps values as strings; accept both shapes
        match value {
            serde_json::Value::String(raw) => decode_location(raw),
            other => decode_location(&other.to_string()),
        }
    }

    fn save(&mut self, location: LatLon) -> Result<(), StoreError> {
        let mut object = match self.read_object() {
            Ok(object) => object,
            Err(StoreError::Corrupt(msg)) => {
                debug!(path = %self.path.display(), %msg, "replacing corrupt location file");
                serde_json::Map::new()
            }
            Err(e) => return Err(e),
        };
        object.insert(
            USER_LOCATION_KEY.to_string(),
            serde_json::Value::String(encode_location(location)?),
        );

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create {}: {e}", parent.display())))?;
        }
        let text = serde_json::to_string_pretty(&object).map_err(|e| StoreError::Io(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|e| StoreError::Io(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::Io(format!("rename to {}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_storage {
    use super::{LocationStore, StoreError, USER_LOCATION_KEY, decode_location, encode_location};
    use foundation::LatLon;

    /// `window.localStorage` backed store.
    #[derive(Debug, Default)]
    pub struct LocalStorageLocationStore;

    impl LocalStorageLocationStore {
        pub fn new() -> Result<Self, StoreError> {
            window_local_storage()?;
            Ok(Self)
        }
    }

    impl LocationStore for LocalStorageLocationStore {
        fn load(&self) -> Result<Option<LatLon>, StoreError> {
            let storage = window_local_storage()?;
            let raw = storage
                .get_item(USER_LOCATION_KEY)
                .map_err(|e| StoreError::Io(format!("get_item failed: {:?}", e)))?;
            match raw {
                Some(raw) => decode_location(&raw),
                None => Ok(None),
            }
        }

        fn save(&mut self, location: LatLon) -> Result<(), StoreError> {
            let storage = window_local_storage()?;
            storage
                .set_item(USER_LOCATION_KEY, &encode_location(location)?)
                .map_err(|e| StoreError::Io(format!("set_item failed: {:?}", e)))
        }
    }

    fn window_local_storage() -> Result<web_sys::Storage, StoreError> {
        let win = web_sys::window().ok_or(StoreError::StorageUnavailable)?;
        win.local_storage()
            .map_err(|e| StoreError::Io(format!("localStorage error: {:?}", e)))?
            .ok_or(StoreError::StorageUnavailable)
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_storage::LocalStorageLocationStore;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct LocalStorageLocationStore;

#[cfg(not(target_arch = "wasm32"))]
impl LocalStorageLocationStore {
    pub fn new() -> Result<Self, StoreError> {
        Err(StoreError::StorageUnavailable)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl LocationStore for LocalStorageLocationStore {
    fn load(&self) -> Result<Option<LatLon>, StoreError> {
        Err(StoreError::StorageUnavailable)
    }

    fn save(&mut self, _location: LatLon) -> Result<(), StoreError> {
        Err(StoreError::StorageUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        InMemoryLocationStore, JsonFileLocationStore, LocalStorageLocationStore, LocationStore,
        StoreError, USER_LOCATION_KEY, decode_location, encode_location,
    };
    use foundation::LatLon;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn record_shape_is_lat_lon_object() {
        let raw = encode_location(LatLon::new(22.3934, 91.821)).expect("encode");
        assert_eq!(raw, r#"{"lat":22.3934,"lon":91.821}"#);
        assert_eq!(decode_location(&raw), Ok(Some(LatLon::new(22.3934, 91.821))));
    }

    #[test]
    fn blank_is_absent_and_garbage_is_corrupt() {
        assert_eq!(decode_location("  "), Ok(None));
        assert!(matches!(decode_location("{lat"), Err(StoreError::Corrupt(_))));
        assert!(matches!(
            decode_location(r#"{"lat":123.0,"lon":0.0}"#),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn in_memory_last_write_wins() {
        let mut store = InMemoryLocationStore::new();
        assert_eq!(store.load(), Ok(None));
        store.save(LatLon::new(1.0, 2.0)).expect("save");
        store.save(LatLon::new(3.0, 4.0)).expect("save");
        assert_eq!(store.load(), Ok(Some(LatLon::new(3.0, 4.0))));
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn json_file_round_trips_under_the_key() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("store.json");
        let mut store = JsonFileLocationStore::new(&path);
        assert_eq!(store.load(), Ok(None));

        store.save(LatLon::new(23.8103, 90.4125)).expect("save");
        assert_eq!(store.load(), Ok(Some(LatLon::new(23.8103, 90.4125))));

        let text = std::fs::read_to_string(&path).expect("read back");
        let object: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert!(object.get(USER_LOCATION_KEY).is_some());
    }

    #[test]
    fn json_file_save_replaces_corrupt_contents() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").expect("seed");
        let mut store = JsonFileLocationStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));

        store.save(LatLon::new(1.0, 1.0)).expect("save");
        assert_eq!(store.load(), Ok(Some(LatLon::new(1.0, 1.0))));
    }

    #[test]
    fn local_storage_is_unavailable_natively() {
        assert!(matches!(
            LocalStorageLocationStore::new(),
            Err(StoreError::StorageUnavailable)
        ));
    }
}
