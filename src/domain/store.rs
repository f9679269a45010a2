use crate::domain::catalog::{CallRecord, Catalog, EntityRecord, FileRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionResult, TransactionError, Transactional};
use sled::{Db, IVec, Tree};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("catalog database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("catalog row codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("catalog transaction aborted")]
    Aborted,
}

/// Durable side of the catalog.
/// Implementations must be thread-safe (Send + Sync).
pub trait CatalogBackend: Send + Sync {
    /// Load the last committed catalog.
    fn load(&self) -> Result<Catalog, StoreError>;
    /// Atomically replace the persisted catalog with `catalog`.
    fn persist(&self, catalog: &Catalog) -> Result<(), StoreError>;
}

/// Catalog store with one commit per pipeline phase.
pub struct CatalogStore<B: CatalogBackend> {
    backend: B,
    committed: Catalog,
}

impl<B: CatalogBackend> CatalogStore<B> {
    pub fn open(backend: B) -> Result<Self, StoreError> {
        let committed = backend.load()?;
        Ok(Self { backend, committed })
    }

    /// Read access to the committed tables.
    pub fn catalog(&self) -> &Catalog {
        &self.committed
    }

    /// Truncate all three tables in one commit.
    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        let empty = Catalog::new();
        self.backend.persist(&empty)?;
        self.committed = empty;
        Ok(())
    }

    /// Run one phase against a staged copy of the catalog.
    ///
    /// The staged tables become visible only if `phase` succeeds and the
    /// backend commits them; otherwise the committed state is untouched.
    pub fn transaction<T, E, F>(&mut self, phase: F) -> Result<T, E>
    where
        F: FnOnce(&mut Catalog) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut staged = self.committed.clone();
        let out = phase(&mut staged)?;
        self.backend.persist(&staged).map_err(E::from)?;
        self.committed = staged;
        Ok(out)
    }
}

// ============================================================================
// MemoryBackend - nothing outlives the process
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryBackend;

impl CatalogBackend for MemoryBackend {
    fn load(&self) -> Result<Catalog, StoreError> {
        Ok(Catalog::new())
    }

    fn persist(&self, _catalog: &Catalog) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SledBackend - catalog kept on disk for later runs
// ============================================================================

pub struct SledBackend {
    db: Db,
    files_tree: Tree,
    entities_tree: Tree,
    calls_tree: Tree,
}

type Rows = Vec<(Vec<u8>, Vec<u8>)>;

impl SledBackend {
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let files_tree = db.open_tree("files")?;
        let entities_tree = db.open_tree("entities")?;
        let calls_tree = db.open_tree("calls")?;

        Ok(Self {
            db,
            files_tree,
            entities_tree,
            calls_tree,
        })
    }

    fn row_key(id: u64) -> Vec<u8> {
        id.to_be_bytes().to_vec()
    }

    fn encode<T: Serialize>(rows: impl Iterator<Item = (u64, T)>) -> Result<Rows, StoreError> {
        rows.map(|(id, row)| -> Result<_, StoreError> {
            Ok((Self::row_key(id), bincode::serialize(&row)?))
        })
        .collect()
    }

    fn decode<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>, StoreError> {
        // Big-endian keys iterate in id order.
        tree.iter()
            .values()
            .map(|value| -> Result<T, StoreError> { Ok(bincode::deserialize(&value?)?) })
            .collect()
    }

    fn existing_keys(tree: &Tree) -> Result<Vec<IVec>, StoreError> {
        Ok(tree.iter().keys().collect::<Result<Vec<_>, _>>()?)
    }
}

impl CatalogBackend for SledBackend {
    fn load(&self) -> Result<Catalog, StoreError> {
        let files: Vec<FileRecord> = Self::decode(&self.files_tree)?;
        let entities: Vec<EntityRecord> = Self::decode(&self.entities_tree)?;
        let calls: Vec<CallRecord> = Self::decode(&self.calls_tree)?;
        Ok(Catalog::from_rows(files, entities, calls))
    }

    fn persist(&self, catalog: &Catalog) -> Result<(), StoreError> {
        let files = Self::encode(catalog.list_files().iter().map(|f| (f.id.0, f)))?;
        let entities = Self::encode(catalog.list_entities().iter().map(|e| (e.id.0, e)))?;
        let calls = Self::encode(catalog.list_calls().iter().map(|c| (c.id.0, c)))?;

        let stale = [
            Self::existing_keys(&self.files_tree)?,
            Self::existing_keys(&self.entities_tree)?,
            Self::existing_keys(&self.calls_tree)?,
        ];

        let result = (&self.files_tree, &self.entities_tree, &self.calls_tree).transaction(
            |(files_tx, entities_tx, calls_tx)| -> ConflictableTransactionResult<(), ()> {
                let trees = [files_tx, entities_tx, calls_tx];
                for (tree, keys) in trees.iter().zip(stale.iter()) {
                    for key in keys {
                        tree.remove(key.clone())?;
                    }
                }
                for (tree, rows) in trees.iter().zip([&files, &entities, &calls]) {
                    for (key, value) in rows {
                        tree.insert(key.clone(), value.clone())?;
                    }
                }
                Ok(())
            },
        );

        match result {
            Ok(()) => {
                self.db.flush()?;
                Ok(())
            }
            Err(TransactionError::Storage(e)) => Err(StoreError::Sled(e)),
            Err(TransactionError::Abort(())) => Err(StoreError::Aborted),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
