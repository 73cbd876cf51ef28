//! Durable key/value storage for the message log and the selected model.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::observability::{STORE_LOAD_FALLBACKS, STORE_WRITE_ERRORS};
use crate::reconcile::LogObserver;
use crate::types::{Message, ModelVariant};

/// Key holding the JSON array of messages.
pub const MESSAGES_KEY: &str = "spurify.messages";

/// Key holding the selected model identifier.
pub const MODEL_KEY: &str = "spurify.model";

/// Synchronous string storage keyed by name.
pub trait KeyValueStore: Send + Sync {
    /// Read the value for `key`, or `None` if nothing was ever written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Durably replace the value for `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as one file in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`.  The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(format!("reading {}", path.display()), err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| Error::io(format!("creating {}", self.dir.display()), err))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        write().map_err(|err| Error::io(format!("writing {}", path.display()), err))
    }
}

/// Keeps values in memory.  Cloned handles share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Typed access to the persisted conversation state.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the message log.  Missing, unreadable or malformed state yields an empty log.
    pub fn load_messages(&self) -> Vec<Message> {
        match self.store.get(MESSAGES_KEY) {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(messages) => messages,
                Err(err) => {
                    STORE_LOAD_FALLBACKS.click();
                    tracing::warn!(error = %err, "discarding malformed message log");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                STORE_LOAD_FALLBACKS.click();
                tracing::warn!(error = %err, "could not read message log");
                Vec::new()
            }
        }
    }

    /// Load the selected model.  Missing or unrecognized state yields the default model.
    pub fn load_model(&self) -> ModelVariant {
        match self.store.get(MODEL_KEY) {
            Ok(Some(id)) => id.trim().parse().unwrap_or_else(|err: String| {
                STORE_LOAD_FALLBACKS.click();
                tracing::warn!(error = %err, "discarding unknown model selection");
                ModelVariant::default()
            }),
            Ok(None) => ModelVariant::default(),
            Err(err) => {
                STORE_LOAD_FALLBACKS.click();
                tracing::warn!(error = %err, "could not read model selection");
                ModelVariant::default()
            }
        }
    }

    pub fn save_messages(&self, messages: &[Message]) -> Result<()> {
        let json = serde_json::to_string(messages)?;
        self.store.set(MESSAGES_KEY, &json)
    }

    pub fn save_model(&self, model: ModelVariant) -> Result<()> {
        self.store.set(MODEL_KEY, model.id())
    }
}

/// Hands log snapshots to a background writer.
///
/// The writer saves on the blocking pool and only ever saves the newest snapshot, so a slow
/// store never holds up the log.  Write failures are logged and counted; the in-memory log
/// stays authoritative.
pub struct PersistOnChange {
    latest: watch::Sender<Arc<Vec<Message>>>,
}

impl PersistOnChange {
    /// Spawn the writer on the current Tokio runtime.  `stored` is taken as already saved.
    ///
    /// The writer finishes once this observer is dropped and the last snapshot is saved.
    pub fn spawn(persistence: Persistence, stored: Arc<Vec<Message>>) -> (Self, JoinHandle<()>) {
        let (latest, mut rx) = watch::channel(stored);
        let writer = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = Arc::clone(&rx.borrow_and_update());
                let persistence = persistence.clone();
                let saved =
                    tokio::task::spawn_blocking(move || persistence.save_messages(&snapshot)).await;
                let err = match saved {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => err.to_string(),
                    Err(err) => err.to_string(),
                };
                STORE_WRITE_ERRORS.click();
                tracing::error!(error = %err, "failed to persist message log");
            }
            tracing::debug!("message log writer stopped");
        });
        (Self { latest }, writer)
    }
}

impl LogObserver for PersistOnChange {
    fn log_changed(&mut self, messages: &Arc<Vec<Message>>) {
        self.latest.send_replace(Arc::clone(messages));
    }
}
