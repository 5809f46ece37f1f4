use anyhow::{Context, Result};
use fs2::FileExt;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

use absensi_match::Embedding;

const FACES_FILE: &str = "faces.bin";
const LOCK_FILE: &str = "faces.lock";

/// One captured embedding for an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub enrolled_at_unix: u64,
}

/// Persistence for enrolled embeddings, keyed by identity id.
pub trait FaceStore {
    fn load(&self, identity_id: &str) -> Result<Vec<FaceRecord>>;
    /// Add `record` and return how many faces the identity now has.
    fn append(&self, identity_id: &str, record: FaceRecord) -> Result<usize>;
    fn purge(&self, identity_id: &str) -> Result<()>;
}

/// Filesystem store: `<prefix>/<identity_id>/faces.bin`, postcard encoded.
#[derive(Debug, Clone)]
pub struct PostcardStore {
    prefix: PathBuf,
}

impl PostcardStore {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn user_store_path(&self, identity_id: &str) -> Result<PathBuf> {
        validate_identity_id(identity_id)?;
        Ok(self.prefix.join(identity_id))
    }
}

/// Identity ids name a directory under the store prefix.
pub fn validate_identity_id(identity_id: &str) -> Result<()> {
    if identity_id.is_empty()
        || identity_id == "."
        || identity_id == ".."
        || identity_id.contains(['/', '\\'])
    {
        anyhow::bail!("invalid identity id {identity_id:?}");
    }
    Ok(())
}

impl FaceStore for PostcardStore {
    fn load(&self, identity_id: &str) -> Result<Vec<FaceRecord>> {
        let file = self.user_store_path(identity_id)?.join(FACES_FILE);

        if !file.exists() {
            return Ok(vec![]);
        }

        let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
        postcard::from_bytes(&data).with_context(|| format!("decoding {}", file.display()))
    }

    fn append(&self, identity_id: &str, record: FaceRecord) -> Result<usize> {
        let path = self.user_store_path(identity_id)?;
        std::fs::create_dir_all(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        let _lock = lock_identity(&path)?;

        let mut records = self.load(identity_id)?;
        if let Some(first) = records.first() {
            if first.embedding.len() != record.embedding.len() {
                anyhow::bail!(
                    "embedding length mismatch for {}: stored faces have {} values, got {}",
                    identity_id,
                    first.embedding.len(),
                    record.embedding.len()
                );
            }
        }
        records.push(record);
        write_records(&path.join(FACES_FILE), &records)?;
        Ok(records.len())
    }

    fn purge(&self, identity_id: &str) -> Result<()> {
        let path = self.user_store_path(identity_id)?;
        if path.exists() {
            let _lock = lock_identity(&path)?;
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }
}

/// Exclusive per-identity lock, released when the file is dropped.
fn lock_identity(dir: &Path) -> Result<File> {
    let lock_path = dir.join(LOCK_FILE);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("opening {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .with_context(|| format!("locking {}", lock_path.display()))?;
    debug!("locked {}", lock_path.display());
    Ok(lock_file)
}

/// Replace `file` through a synced temp file in the same directory so
/// readers see either the old or the new record list.
fn write_records(file: &Path, records: &[FaceRecord]) -> Result<()> {
    let parent = file.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;
    {
        let handle = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *handle);
            writer.write_all(&postcard::to_allocvec(records)?)?;
            writer
                .flush()
                .with_context(|| format!("writing {}", file.display()))?;
        }
        handle
            .sync_all()
            .with_context(|| format!("syncing {}", file.display()))?;
    }
    tmp.persist(file)
        .map_err(|err| err.error)
        .with_context(|| format!("replacing {}", file.display()))?;
    Ok(())
}

/// Store `embedding` as an additional face for `identity_id` and return the
/// new record id.
pub fn enroll(store: &dyn FaceStore, identity_id: &str, embedding: &Embedding) -> Result<String> {
    if embedding.is_empty() {
        anyhow::bail!("embedding is empty");
    }
    if !embedding.is_finite() {
        anyhow::bail!("embedding contains non-finite values");
    }

    let record = FaceRecord {
        id: uuid::Uuid::new_v4().to_string(),
        embedding: embedding.to_vec(),
        enrolled_at_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
    };
    let id = record.id.clone();
    let stored = store
        .append(identity_id, record)
        .with_context(|| format!("saving face record for {identity_id}"))?;

    info!("enrolled face {} for {} ({} stored)", id, identity_id, stored);
    Ok(id)
}
