//! One JSON document per concern in a data directory.
//!
//! Writes go to a temporary sibling file first and are renamed into place,
//! so a crash mid-write leaves the previous version intact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tally_ledger::LedgerState;
use tally_network::KnownPeers;
use tally_types::{KeyPair, PublicKey};
use tracing::debug;

use crate::{IdentityStore, LedgerStore, PeerStore, StoreError, VoterRegistry};

pub const LEDGER_FILE: &str = "ledger.json";
pub const PEERS_FILE: &str = "peers.json";
pub const IDENTITY_FILE: &str = "identity.json";
pub const VOTERS_FILE: &str = "registered_voters.json";

pub struct JsonFileStore {
    dir: PathBuf,
    /// Serializes read-modify-write of the voter registry.
    voters_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            voters_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let path = self.dir.join(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                file: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!(file = %path.display(), "saved");
        Ok(())
    }
}

impl LedgerStore for JsonFileStore {
    fn load_ledger_state(&self) -> Result<Option<LedgerState>, StoreError> {
        self.read_json(LEDGER_FILE)
    }

    fn save_ledger_state(&self, state: &LedgerState) -> Result<(), StoreError> {
        self.write_json(LEDGER_FILE, state)
    }
}

impl PeerStore for JsonFileStore {
    fn load_peer_list(&self) -> Result<Option<KnownPeers>, StoreError> {
        self.read_json(PEERS_FILE)
    }

    fn save_peer_list(&self, peers: &KnownPeers) -> Result<(), StoreError> {
        self.write_json(PEERS_FILE, peers)
    }
}

impl IdentityStore for JsonFileStore {
    fn load_identity(&self) -> Result<Option<KeyPair>, StoreError> {
        self.read_json(IDENTITY_FILE)
    }

    fn save_identity(&self, keys: &KeyPair) -> Result<(), StoreError> {
        self.write_json(IDENTITY_FILE, keys)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(self.dir.join(IDENTITY_FILE), fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl VoterRegistry for JsonFileStore {
    fn load_registered_voters(&self) -> Result<Vec<PublicKey>, StoreError> {
        Ok(self.read_json(VOTERS_FILE)?.unwrap_or_default())
    }

    fn add_registered_voter(&self, voter: &PublicKey) -> Result<bool, StoreError> {
        let _guard = self
            .voters_lock
            .lock()
            .map_err(|_| StoreError::Io("voter registry lock poisoned".into()))?;
        let mut voters = self.load_registered_voters()?;
        if voters.contains(voter) {
            return Ok(false);
        }
        voters.push(voter.clone());
        self.write_json(VOTERS_FILE, &voters)?;
        Ok(true)
    }
}
