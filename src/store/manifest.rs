//! Declaration manifests.
//!
//! A manifest is a TOML file listing declarations. Syncing it into a
//! [`MemoryStore`] creates or updates every valid entry and deletes stored
//! declarations the manifest no longer lists.
//!
//! ```toml
//! [[declaration]]
//! namespace = "payments"
//! name = "api"
//! bufferSize = 20
//! queryInterval = 15
//! healthcheckEndpoints = ["https://api.payments.svc/healthz"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::resource::{validate_spec, DeclarationSpec, ObjectKey};
use crate::store::{MemoryStore, ObjectStore};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate declaration {0}")]
    Duplicate(ObjectKey),
}

/// One declaration entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestEntry {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(flatten)]
    pub spec: DeclarationSpec,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl ManifestEntry {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

/// Parsed manifest file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(default, rename = "declaration")]
    pub declarations: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(content)?;

        let mut seen = HashSet::new();
        for entry in &manifest.declarations {
            if !seen.insert(entry.key()) {
                return Err(ManifestError::Duplicate(entry.key()));
            }
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

/// Outcome of a manifest sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub applied: usize,
    pub rejected: usize,
    pub deleted: usize,
}

/// Apply `manifest` to `store`.
///
/// Invalid entries are skipped and, if already stored, left untouched.
pub async fn sync_manifest(store: &MemoryStore, manifest: &Manifest) -> SyncSummary {
    let mut summary = SyncSummary::default();
    let mut listed = HashSet::new();

    for entry in &manifest.declarations {
        let key = entry.key();
        listed.insert(key.clone());

        if let Err(errors) = validate_spec(&entry.spec) {
            let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
            tracing::warn!(key = %key, errors = ?reasons, "Skipping invalid declaration");
            summary.rejected += 1;
            continue;
        }

        store.apply(&key, entry.spec.clone());
        summary.applied += 1;
    }

    let existing = match store.list(None).await {
        Ok(objects) => objects,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list declarations for pruning");
            return summary;
        }
    };
    for object in existing {
        let key = object.key();
        if !listed.contains(&key) && store.delete(&key).is_ok() {
            summary.deleted += 1;
        }
    }

    tracing::info!(
        applied = summary.applied,
        rejected = summary.rejected,
        deleted = summary.deleted,
        "Manifest synced"
    );
    summary
}
