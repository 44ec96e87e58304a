//! Claim Preparation file (spec component C5)
//!
//! The node plugin's record of what it told the kubelet to inject for
//! every claim it has prepared, persisted to disk so a restart can
//! re-serve `NodePrepareResources` idempotently without re-deriving the
//! answer from the ASR. Spec §6: a single JSON document at
//! `<pluginDir>/preparedClaims.json`, a top-level object keyed by claim
//! UID whose values are arrays of `PreparedDeviceRef`. Written with a
//! write-tmp-then-rename so a crash mid-write never leaves a torn file
//! behind, and with file mode 0600 since the CDI device IDs it carries
//! are host-local device handles. An in-process mutex serializes the
//! read-modify-write around the single file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedDeviceRef {
    pub request_name: String,
    pub pool_name: String,
    pub device_name: String,
    pub cdi_device_ids: Vec<String>,
}

/// Wraps a claim's prepared devices. Serializes as a bare array (spec
/// §6: "values are arrays of `PreparedDeviceRef` objects"), not as an
/// object with a `devices` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimPreparation {
    pub devices: Vec<PreparedDeviceRef>,
}

type Document = BTreeMap<String, ClaimPreparation>;

pub struct ClaimPreparationStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ClaimPreparationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), lock: Mutex::new(()) }
    }

    fn path(&self) -> PathBuf {
        self.dir.join("preparedClaims.json")
    }

    async fn read_document(&self) -> Result<Document> {
        let path = self.path();
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(Error::ClaimPreparationIo(format!("reading {}: {e}", path.display()))),
        }
    }

    async fn write_document(&self, document: &Document) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::ClaimPreparationIo(format!("creating {}: {e}", self.dir.display())))?;

        let final_path = self.path();
        let tmp_path = self.dir.join(".preparedClaims.json.tmp");
        let bytes = serde_json::to_vec_pretty(document)?;

        write_with_mode(&tmp_path, &bytes, 0o600).await?;

        fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| Error::ClaimPreparationIo(format!("renaming into {}: {e}", final_path.display())))?;

        Ok(())
    }

    pub async fn load(&self, claim_uid: &str) -> Result<Option<ClaimPreparation>> {
        let _guard = self.lock.lock().await;
        let document = self.read_document().await?;
        Ok(document.get(claim_uid).cloned())
    }

    /// Atomically replace this claim's entry in the shared document.
    pub async fn store(&self, claim_uid: &str, prep: &ClaimPreparation) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(claim_uid.to_string(), prep.clone());
        self.write_document(&document).await
    }

    pub async fn remove(&self, claim_uid: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        if document.remove(claim_uid).is_some() {
            self.write_document(&document).await?;
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn write_with_mode(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .await
        .map_err(|e| Error::ClaimPreparationIo(format!("opening {}: {e}", path.display())))?;
    file.write_all(bytes)
        .await
        .map_err(|e| Error::ClaimPreparationIo(format!("writing {}: {e}", path.display())))?;
    file.sync_all()
        .await
        .map_err(|e| Error::ClaimPreparationIo(format!("syncing {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(not(unix))]
async fn write_with_mode(path: &Path, bytes: &[u8], _mode: u32) -> Result<()> {
    fs::write(path, bytes)
        .await
        .map_err(|e| Error::ClaimPreparationIo(format!("writing {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ClaimPreparation {
        ClaimPreparation {
            devices: vec![PreparedDeviceRef {
                request_name: "req-a".into(),
                pool_name: "node-1".into(),
                device_name: "gpu-0".into(),
                cdi_device_ids: vec!["nvidia.com/gpu=0".into()],
            }],
        }
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ClaimPreparationStore::new(dir.path());
        let prep = sample();
        store.store("claim-a", &prep).await.unwrap();
        let loaded = store.load("claim-a").await.unwrap().unwrap();
        assert_eq!(loaded, prep);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = ClaimPreparationStore::new(dir.path());
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = ClaimPreparationStore::new(dir.path());
        store.remove("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn multiple_claims_share_one_document() {
        let dir = TempDir::new().unwrap();
        let store = ClaimPreparationStore::new(dir.path());
        store.store("claim-a", &sample()).await.unwrap();
        store.store("claim-b", &sample()).await.unwrap();

        assert!(dir.path().join("preparedClaims.json").exists());
        assert!(store.load("claim-a").await.unwrap().is_some());
        assert!(store.load("claim-b").await.unwrap().is_some());

        store.remove("claim-a").await.unwrap();
        assert!(store.load("claim-a").await.unwrap().is_none());
        assert!(store.load("claim-b").await.unwrap().is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stored_file_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = ClaimPreparationStore::new(dir.path());
        store.store("claim-a", &ClaimPreparation::default()).await.unwrap();
        let meta = std::fs::metadata(dir.path().join("preparedClaims.json")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
