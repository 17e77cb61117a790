use crate::io::output::write_atomic;
use crate::types::{PrepError, PrepResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// One tile identity and where it was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub tile_id: String,
    pub path: PathBuf,
    pub recorded_at: DateTime<Utc>,
}

/// Side-channel that learns the path each tile was written to
pub trait CatalogSink: Send + Sync {
    fn record(&self, tile_id: &str, path: &Path) -> PrepResult<()>;
}

fn locked<T>(m: &Mutex<T>) -> PrepResult<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| PrepError::Raster("catalog lock poisoned".to_string()))
}

/// Catalog held in memory
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    records: Mutex<Vec<CatalogRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CatalogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Most recent path recorded for `tile_id`
    pub fn path_of(&self, tile_id: &str) -> Option<PathBuf> {
        self.records
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|r| r.tile_id == tile_id)
            .map(|r| r.path.clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CatalogSink for MemoryCatalog {
    fn record(&self, tile_id: &str, path: &Path) -> PrepResult<()> {
        locked(&self.records)?.push(CatalogRecord {
            tile_id: tile_id.to_string(),
            path: path.to_path_buf(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}

/// Catalog persisted as a JSON manifest.
///
/// Records accumulate in memory; [`JsonCatalog::flush`] rewrites the
/// manifest atomically.
#[derive(Debug)]
pub struct JsonCatalog {
    path: PathBuf,
    records: Mutex<Vec<CatalogRecord>>,
}

impl JsonCatalog {
    /// Open a manifest, loading existing records if the file exists
    pub fn open<P: AsRef<Path>>(path: P) -> PrepResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records: Vec<CatalogRecord> = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            Vec::new()
        };
        log::debug!("Opened catalog {} ({} records)", path.display(), records.len());
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> PrepResult<Vec<CatalogRecord>> {
        Ok(locked(&self.records)?.clone())
    }

    pub fn flush(&self) -> PrepResult<()> {
        let records = locked(&self.records)?;
        let bytes = serde_json::to_vec_pretty(&*records)?;
        write_atomic(&self.path, &bytes)?;
        log::info!("Catalog {} holds {} records", self.path.display(), records.len());
        Ok(())
    }
}

impl CatalogSink for JsonCatalog {
    fn record(&self, tile_id: &str, path: &Path) -> PrepResult<()> {
        locked(&self.records)?.push(CatalogRecord {
            tile_id: tile_id.to_string(),
            path: path.to_path_buf(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}
