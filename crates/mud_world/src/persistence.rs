//! Persistence collaborator.
//!
//! The store never talks to disk directly. It goes through a [`Persistence`]
//! implementation, and every write is funnelled through a single
//! [`PersistenceQueue`] writer task so that writes to one entity land in the
//! order they were issued, without any lock held across I/O. The store hands
//! out ids itself, starting from [`Persistence::next_id`], so new entities are
//! staged like any other write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mud_entity::{EntityId, EntityRecord, IdAllocator};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::PersistenceError;

/// Storage backend for entity records.
#[async_trait]
pub trait Persistence: Send + Sync + std::fmt::Debug {
    /// Every stored record, keyed by id.
    async fn load_all(&self) -> Result<Vec<(EntityId, EntityRecord)>, PersistenceError>;

    /// Store a new record and return the id assigned to it.
    async fn insert(&self, record: &EntityRecord) -> Result<EntityId, PersistenceError>;

    /// Overwrite the record stored under `id`, creating it if absent. The id
    /// is retired for good either way.
    async fn update(&self, id: EntityId, record: &EntityRecord) -> Result<(), PersistenceError>;

    /// The lowest id never handed out or stored.
    async fn next_id(&self) -> Result<u64, PersistenceError>;

    /// Remove the record stored under `id`. Deleting an absent id is not an error.
    async fn delete(&self, id: EntityId) -> Result<(), PersistenceError>;
}

// ── In-memory backend ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<EntityId, EntityRecord>,
    ids: IdAllocator,
}

/// Keeps records in memory. Used by tests and throwaway worlds.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    state: Mutex<MemoryState>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// A copy of the record stored under `id`, if any.
    pub async fn record(&self, id: EntityId) -> Option<EntityRecord> {
        self.state.lock().await.records.get(&id).cloned()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load_all(&self) -> Result<Vec<(EntityId, EntityRecord)>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect())
    }

    async fn insert(&self, record: &EntityRecord) -> Result<EntityId, PersistenceError> {
        let mut state = self.state.lock().await;
        let id = state.ids.allocate();
        state.records.insert(id, record.clone());
        Ok(id)
    }

    async fn update(&self, id: EntityId, record: &EntityRecord) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        state.ids.observe(id);
        state.records.insert(id, record.clone());
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<(), PersistenceError> {
        self.state.lock().await.records.remove(&id);
        Ok(())
    }

    async fn next_id(&self) -> Result<u64, PersistenceError> {
        Ok(self.state.lock().await.ids.peek())
    }
}

// ── JSON directory backend ──────────────────────────────────────────────────

const META_FILE: &str = "meta.json";
const ENTITY_DIR: &str = "entities";

#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    next_id: u64,
}

/// One pretty-printed JSON document per entity under `<root>/entities/`, plus
/// `<root>/meta.json` holding the next id so deleted ids stay retired across
/// restarts.
#[derive(Debug)]
pub struct JsonDirPersistence {
    root: PathBuf,
    ids: Mutex<IdAllocator>,
}

impl JsonDirPersistence {
    /// Open (creating if needed) the data directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] if the directories cannot be created
    /// and [`PersistenceError::Json`] if `meta.json` is malformed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        let entities = root.join(ENTITY_DIR);
        tokio::fs::create_dir_all(&entities)
            .await
            .map_err(|source| io_error(&entities, source))?;

        let meta_path = root.join(META_FILE);
        let next_id = match tokio::fs::read(&meta_path).await {
            Ok(bytes) => {
                let meta: Meta = serde_json::from_slice(&bytes)
                    .map_err(|source| json_error(&meta_path, source))?;
                meta.next_id
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 1,
            Err(source) => return Err(io_error(&meta_path, source)),
        };

        info!(root = %root.display(), next_id, "opened entity directory");
        Ok(Self {
            root,
            ids: Mutex::new(IdAllocator::starting_at(next_id)),
        })
    }

    fn entity_path(&self, id: EntityId) -> PathBuf {
        self.root.join(ENTITY_DIR).join(format!("{}.json", id.id()))
    }

    async fn write_meta(&self, ids: &IdAllocator) -> Result<(), PersistenceError> {
        let meta = Meta {
            next_id: ids.peek(),
        };
        let path = self.root.join(META_FILE);
        let bytes = serde_json::to_vec_pretty(&meta).map_err(|source| json_error(&path, source))?;
        write_atomic(&path, &bytes).await
    }

    async fn write_record(&self, id: EntityId, record: &EntityRecord) -> Result<(), PersistenceError> {
        let path = self.entity_path(id);
        let bytes =
            serde_json::to_vec_pretty(record).map_err(|source| json_error(&path, source))?;
        write_atomic(&path, &bytes).await
    }
}

#[async_trait]
impl Persistence for JsonDirPersistence {
    async fn load_all(&self) -> Result<Vec<(EntityId, EntityRecord)>, PersistenceError> {
        let dir = self.root.join(ENTITY_DIR);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| io_error(&dir, source))?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&dir, source))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            else {
                debug!(path = %path.display(), "skipping file without an id name");
                continue;
            };
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| io_error(&path, source))?;
            let record: EntityRecord =
                serde_json::from_slice(&bytes).map_err(|source| json_error(&path, source))?;
            records.push((EntityId(id), record));
        }
        records.sort_by_key(|(id, _)| *id);

        // A meta file lagging behind the documents must not reissue their ids.
        let mut ids = self.ids.lock().await;
        let before = ids.peek();
        for (id, _) in &records {
            ids.observe(*id);
        }
        if ids.peek() != before {
            self.write_meta(&ids).await?;
        }

        Ok(records)
    }

    async fn insert(&self, record: &EntityRecord) -> Result<EntityId, PersistenceError> {
        let mut ids = self.ids.lock().await;
        let id = ids.allocate();
        self.write_meta(&ids).await?;
        self.write_record(id, record).await?;
        Ok(id)
    }

    async fn update(&self, id: EntityId, record: &EntityRecord) -> Result<(), PersistenceError> {
        {
            let mut ids = self.ids.lock().await;
            if id.id() >= ids.peek() {
                ids.observe(id);
                self.write_meta(&ids).await?;
            }
        }
        self.write_record(id, record).await
    }

    async fn delete(&self, id: EntityId) -> Result<(), PersistenceError> {
        let path = self.entity_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    async fn next_id(&self) -> Result<u64, PersistenceError> {
        Ok(self.ids.lock().await.peek())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|source| io_error(&tmp, source))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> PersistenceError {
    PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    }
}

// ── Writer queue ────────────────────────────────────────────────────────────

/// A single staged write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Update(EntityId, EntityRecord),
    Delete(EntityId),
}

impl WriteOp {
    #[must_use]
    pub fn entity(&self) -> EntityId {
        match self {
            WriteOp::Update(id, _) | WriteOp::Delete(id) => *id,
        }
    }
}

#[derive(Debug)]
struct Batch {
    ops: Vec<WriteOp>,
    done: oneshot::Sender<Result<(), PersistenceError>>,
}

/// Resolves once a submitted batch has been applied.
#[derive(Debug)]
pub struct WriteTicket {
    rx: oneshot::Receiver<Result<(), PersistenceError>>,
}

impl WriteTicket {
    /// A ticket for an empty batch, already complete.
    #[must_use]
    pub fn ready() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(()));
        Self { rx }
    }

    /// Wait until the batch is durable.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while applying the batch, or
    /// [`PersistenceError::WriterStopped`] if the writer went away.
    pub async fn wait(self) -> Result<(), PersistenceError> {
        self.rx
            .await
            .map_err(|_| PersistenceError::WriterStopped)?
    }
}

/// FIFO front-end to a [`Persistence`] backend.
///
/// Batches are applied one at a time in submission order by a background
/// task.
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    backend: Arc<dyn Persistence>,
    tx: mpsc::UnboundedSender<Batch>,
}

impl PersistenceQueue {
    /// Spawn the writer task. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(backend: Arc<dyn Persistence>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(Arc::clone(&backend), rx));
        Self { backend, tx }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Persistence> {
        &self.backend
    }

    /// Queue `ops` for writing.
    pub fn submit(&self, ops: Vec<WriteOp>) -> WriteTicket {
        if ops.is_empty() {
            return WriteTicket::ready();
        }
        let (done, rx) = oneshot::channel();
        if let Err(rejected) = self.tx.send(Batch { ops, done }) {
            let _ = rejected.0.done.send(Err(PersistenceError::WriterStopped));
        }
        WriteTicket { rx }
    }
}

async fn run_writer(backend: Arc<dyn Persistence>, mut rx: mpsc::UnboundedReceiver<Batch>) {
    while let Some(batch) = rx.recv().await {
        let mut outcome = Ok(());
        for op in &batch.ops {
            let result = match op {
                WriteOp::Update(id, record) => backend.update(*id, record).await,
                WriteOp::Delete(id) => backend.delete(*id).await,
            };
            if let Err(err) = result {
                error!(entity = %op.entity(), error = %err, "write failed");
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        debug!(ops = batch.ops.len(), ok = outcome.is_ok(), "batch applied");
        // The submitter may have stopped waiting; that is fine.
        let _ = batch.done.send(outcome);
    }
    debug!("persistence writer stopped");
}
