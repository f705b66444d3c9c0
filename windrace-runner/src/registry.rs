//! Dataset version registry — a JSON file listing the dataset versions
//! experiments ran against.
//!
//! File layout: `{"dataset_versions": [ {...}, ... ]}`. Registering an id that
//! is already present replaces that entry in place; new ids are appended.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetVersion {
    pub dataset_version_id: String,
    pub site_ids: Vec<String>,
    pub time_start: String,
    pub time_end: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
}

impl DatasetVersion {
    pub fn new(
        id: &str,
        site_ids: Vec<String>,
        time_start: impl Into<String>,
        time_end: impl Into<String>,
    ) -> Self {
        Self {
            dataset_version_id: id.to_string(),
            site_ids,
            time_start: time_start.into(),
            time_end: time_end.into(),
            created_at: None,
            notes: String::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    dataset_versions: Vec<DatasetVersion>,
}

#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    path: PathBuf,
}

impl DatasetRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All registered versions; empty when the file does not exist yet.
    pub fn load(&self) -> Result<Vec<DatasetVersion>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let file: RegistryFile = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(file.dataset_versions)
    }

    pub fn get(&self, id: &str) -> Result<Option<DatasetVersion>> {
        Ok(self
            .load()?
            .into_iter()
            .find(|v| v.dataset_version_id == id))
    }

    /// Stamp `created_at` and persist the version. Returns the stored record.
    pub fn register(&self, version: &DatasetVersion) -> Result<DatasetVersion> {
        let mut record = version.clone();
        record.created_at = Some(Utc::now());

        let mut versions = self.load()?;
        match versions
            .iter_mut()
            .find(|v| v.dataset_version_id == record.dataset_version_id)
        {
            Some(existing) => *existing = record.clone(),
            None => versions.push(record.clone()),
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&RegistryFile {
            dataset_versions: versions,
        })?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        debug!(id = %record.dataset_version_id, path = %self.path.display(), "dataset version registered");
        Ok(record)
    }
}
