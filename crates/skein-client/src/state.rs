//! Persisted client state and the stores that hold it.
//!
//! The state is one document: the signed-in account, accounts archived by
//! earlier sign-outs, the server list and the result cache. Every mutation is
//! a load, modify, save cycle performed by [`Client`](crate::Client) while it
//! holds the matching lock.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use skein_sync::CacheEntry;
use skein_types::{PostHead, SignedEvent, System, TypeResult, WireMessage};
use tempfile::NamedTempFile;

use crate::error::{ClientError, ClientResult};

/// One identity's write head plus every event it authored from this client.
#[derive(Debug, Serialize, Deserialize)]
pub struct Account {
    pub head: PostHead,
    /// Hex-encoded `SignedEvent` bytes, oldest first.
    post_log: Vec<String>,
}

impl Account {
    pub fn new(head: PostHead, created: &[SignedEvent]) -> TypeResult<Self> {
        let mut account = Self {
            head,
            post_log: Vec::new(),
        };
        for signed in created {
            account.record(signed)?;
        }
        Ok(account)
    }

    pub fn system(&self) -> &System {
        &self.head.system
    }

    pub fn record(&mut self, signed: &SignedEvent) -> TypeResult<()> {
        self.post_log.push(hex::encode(signed.encode()?));
        Ok(())
    }

    pub fn logged(&self) -> usize {
        self.post_log.len()
    }

    /// The last `count` authored events, oldest first.
    pub fn history(&self, count: usize) -> ClientResult<Vec<SignedEvent>> {
        let skip = self.post_log.len().saturating_sub(count);
        self.post_log[skip..]
            .iter()
            .map(|entry| {
                let bytes = hex::decode(entry).map_err(|e| ClientError::Storage(e.to_string()))?;
                SignedEvent::decode(&bytes).map_err(|e| ClientError::Storage(e.to_string()))
            })
            .collect()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientState {
    pub current: Option<Account>,
    /// Signed-out accounts keyed by hex system key.
    pub archived: BTreeMap<String, Account>,
    /// `None` until the list is first changed; the configured servers apply.
    pub servers: Option<Vec<String>>,
    pub cache: HashMap<String, CacheEntry>,
}

impl ClientState {
    pub fn current_system(&self) -> Option<&System> {
        self.current.as_ref().map(Account::system)
    }

    /// Move the current account, if any, into the archive.
    pub fn archive_current(&mut self) -> Option<System> {
        let account = self.current.take()?;
        let system = account.system().clone();
        self.archived.insert(system.to_hex(), account);
        Some(system)
    }

    /// Make an archived account current, archiving whoever was signed in.
    /// Returns `false` when `system` has no archived account.
    pub fn restore(&mut self, system: &System) -> bool {
        let Some(account) = self.archived.remove(&system.to_hex()) else {
            return false;
        };
        self.archive_current();
        self.current = Some(account);
        true
    }

    /// Make a freshly bootstrapped account current.
    pub fn activate(&mut self, account: Account) {
        self.archive_current();
        self.archived.remove(&account.system().to_hex());
        self.current = Some(account);
    }
}

/// Durable storage for [`ClientState`].
pub trait StateStore: Send + Sync {
    fn load(&self) -> ClientResult<ClientState>;

    fn save(&self, state: &ClientState) -> ClientResult<()>;
}

/// Keeps the serialized state in memory. Useful for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    snapshot: RwLock<Option<String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self) -> ClientResult<ClientState> {
        match self.snapshot.read().expect("lock poisoned").as_deref() {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(ClientState::default()),
        }
    }

    fn save(&self, state: &ClientState) -> ClientResult<()> {
        let json = serde_json::to_string(state)?;
        *self.snapshot.write().expect("lock poisoned") = Some(json);
        Ok(())
    }
}

/// A single JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> ClientResult<ClientState> {
        if !self.path.exists() {
            return Ok(ClientState::default());
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, state: &ClientState) -> ClientResult<()> {
        fs::create_dir_all(self.dir())?;
        let mut file = NamedTempFile::new_in(self.dir())?;
        serde_json::to_writer_pretty(&mut file, state)?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
