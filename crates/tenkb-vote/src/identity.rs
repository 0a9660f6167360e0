//! Anonymous voter identity: local persistence and lazy issuance.
//!
//! At most one voter id is stored at a time. Absence is a valid state meaning
//! "not issued yet"; losing the stored id is indistinguishable from being a
//! new voter.

use crate::error::{Error, Result};
use crate::models::VoterId;
use crate::transport::VoteTransport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Local storage slot for the voter id.
pub trait IdentityStore: Send + Sync {
    /// Stored id, or `None` if nothing was stored yet.
    fn load(&self) -> Result<Option<VoterId>>;

    /// Replace the stored id.
    fn save(&self, id: &VoterId) -> Result<()>;

    /// Forget the stored id.
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    voter_id: VoterId,
}

/// Voter id kept in a small JSON file.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Store backed by the file at `path`. The file is created on first save.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<VoterId>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredIdentity = serde_json::from_slice(&data)?;
        if stored.voter_id.as_str().is_empty() {
            return Err(Error::Storage(format!(
                "empty voter id stored in {}",
                self.path.display()
            )));
        }
        Ok(Some(stored.voter_id))
    }

    fn save(&self, id: &VoterId) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let value = serde_json::to_vec(&StoredIdentity {
            voter_id: id.clone(),
        })?;

        // Replace atomically; readers never see a partial file.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Voter id held in memory only.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<VoterId>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `id`.
    pub fn with_identity(id: VoterId) -> Self {
        Self {
            slot: Mutex::new(Some(id)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<VoterId>>> {
        self.slot
            .lock()
            .map_err(|_| Error::Storage("identity slot poisoned".into()))
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<VoterId>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, id: &VoterId) -> Result<()> {
        *self.lock()? = Some(id.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}

/// Hands out the voter id, issuing one through the transport when needed.
///
/// Acquisition is serialized: overlapping callers wait on the same issuance
/// instead of minting one id each.
pub struct IdentityProvider {
    store: Arc<dyn IdentityStore>,
    transport: Arc<dyn VoteTransport>,
    cached: tokio::sync::Mutex<Option<VoterId>>,
}

impl IdentityProvider {
    pub fn new(store: Arc<dyn IdentityStore>, transport: Arc<dyn VoteTransport>) -> Self {
        Self {
            store,
            transport,
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// Current id without issuing a new one.
    pub async fn current(&self) -> Option<VoterId> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = self.load_stored();
        }
        cached.clone()
    }

    /// Stored id, or a freshly issued one if none exists or `force` is set.
    ///
    /// A newly issued id is persisted before it is returned. If persisting
    /// fails the id is still used for the rest of this session.
    pub async fn get_identity(&self, force: bool) -> Result<VoterId> {
        let mut cached = self.cached.lock().await;

        if !force {
            if cached.is_none() {
                *cached = self.load_stored();
            }
            if let Some(id) = cached.as_ref() {
                return Ok(id.clone());
            }
        }

        let id = self.transport.issue_identity().await?;
        info!("issued voter id {id}");

        if let Err(e) = self.store.save(&id) {
            warn!("unable to persist voter id: {e}");
        }

        *cached = Some(id.clone());
        Ok(id)
    }

    /// Forget the voter id, locally and in the store.
    pub async fn clear(&self) -> Result<()> {
        let mut cached = self.cached.lock().await;
        *cached = None;
        self.store.clear()
    }

    fn load_stored(&self) -> Option<VoterId> {
        match self.store.load() {
            Ok(id) => id,
            Err(e) => {
                warn!("unable to read stored voter id, treating as absent: {e}");
                None
            }
        }
    }
}
