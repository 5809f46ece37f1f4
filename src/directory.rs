use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use absensi_match::{Embedding, EnrolledIdentity};

use crate::storage::{validate_identity_id, FaceStore};

/// A user row as exposed by the directory: `{id, nama, role, nisn, embedding}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub id: String,
    pub nama: String,
    pub role: String,
    #[serde(default)]
    pub nisn: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl DirectoryRecord {
    fn to_identity(&self, embedding: Vec<f32>) -> EnrolledIdentity {
        EnrolledIdentity {
            identity_id: self.id.clone(),
            display_name: self.nama.clone(),
            role: self.role.clone(),
            nisn: self.nisn.clone(),
            embedding: Some(Embedding::new(embedding)),
        }
    }
}

/// Read-only source of match candidates.
pub trait UserDirectory {
    /// Snapshot of every identity that has at least one embedding, in a
    /// stable order.
    fn enrolled_identities(&self) -> Result<Vec<EnrolledIdentity>>;
}

/// Directory backed by a JSON array of [`DirectoryRecord`], expanded with the
/// faces held in a [`FaceStore`].
pub struct FileDirectory<S> {
    path: PathBuf,
    store: S,
}

impl<S: FaceStore> FileDirectory<S> {
    pub fn new(path: impl Into<PathBuf>, store: S) -> Self {
        Self {
            path: path.into(),
            store,
        }
    }

    pub fn records(&self) -> Result<Vec<DirectoryRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading directory {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing directory {}", self.path.display()))
    }
}

impl<S: FaceStore> UserDirectory for FileDirectory<S> {
    fn enrolled_identities(&self) -> Result<Vec<EnrolledIdentity>> {
        let mut identities = Vec::new();
        for record in self.records()? {
            if let Some(embedding) = record.embedding.clone() {
                identities.push(record.to_identity(embedding));
            }
            if let Err(e) = validate_identity_id(&record.id) {
                warn!("skipping stored faces for directory row: {e}");
                continue;
            }
            let stored = self
                .store
                .load(&record.id)
                .with_context(|| format!("loading faces for {}", record.id))?;
            debug!("{}: {} stored face(s)", record.id, stored.len());
            identities.extend(stored.into_iter().map(|f| record.to_identity(f.embedding)));
        }
        Ok(identities)
    }
}

/// Fixed in-memory snapshot.
impl UserDirectory for Vec<EnrolledIdentity> {
    fn enrolled_identities(&self) -> Result<Vec<EnrolledIdentity>> {
        Ok(self
            .iter()
            .filter(|identity| identity.embedding.is_some())
            .cloned()
            .collect())
    }
}
