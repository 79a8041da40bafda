use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Local source path -> destination paths inside the image.
pub type SyncMap = HashMap<String, Vec<String>>;

pub type InsecureRegistries = BTreeSet<String>;

/// Build settings the sync map is resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactConfig {
    pub image_name: String,
}

#[derive(Debug, Error)]
pub enum SyncMapError {
    #[error("open {path}: {error}")]
    Io { path: String, error: csv::Error },

    #[error("parse {path}: {error}")]
    Parse { path: String, error: csv::Error },

    #[error("no sync entries for image {image:?}")]
    NoEntries { image: String },
}

/// Resolves which local files end up where inside a built image.
pub trait SyncMapResolver {
    fn sync_map(
        &self,
        config: &ArtifactConfig,
        insecure_registries: &InsecureRegistries,
    ) -> Result<SyncMap, SyncMapError>;
}

/// One `image,local,remote` row of a sync map file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncRecord {
    pub image: String,
    pub local: String,
    pub remote: String,
}

/// Sync map read from a CSV file with an `image,local,remote` header.
#[derive(Debug, Clone)]
pub struct CsvSyncMapResolver {
    path: PathBuf,
}

impl CsvSyncMapResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_records(&self) -> Result<Vec<SyncRecord>, SyncMapError> {
        let display = self.path.display().to_string();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|error| SyncMapError::Io {
                path: display.clone(),
                error,
            })?;

        let mut out = Vec::new();
        for row in reader.deserialize() {
            let record: SyncRecord = row.map_err(|error| SyncMapError::Parse {
                path: display.clone(),
                error,
            })?;
            out.push(record);
        }
        Ok(out)
    }

    /// Distinct images named in the file, in first-seen order.
    pub fn images(&self) -> Result<Vec<String>, SyncMapError> {
        let mut seen = BTreeSet::new();
        Ok(self
            .read_records()?
            .into_iter()
            .filter(|r| seen.insert(r.image.clone()))
            .map(|r| r.image)
            .collect())
    }
}

impl SyncMapResolver for CsvSyncMapResolver {
    fn sync_map(
        &self,
        config: &ArtifactConfig,
        _insecure_registries: &InsecureRegistries,
    ) -> Result<SyncMap, SyncMapError> {
        let mut map = SyncMap::new();
        for rec in self.read_records()? {
            if rec.image == config.image_name {
                map.entry(rec.local).or_default().push(rec.remote);
            }
        }
        if map.is_empty() {
            return Err(SyncMapError::NoEntries {
                image: config.image_name.clone(),
            });
        }
        Ok(map)
    }
}
