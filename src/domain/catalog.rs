//! Catalog tables: files, declared entities and the calls between them.
//!
//! The catalog is pure data access. It enforces the uniqueness rules of the
//! tables (one file per import path, one entity per `(name, import_path)`)
//! by lookup-or-create and never reports them as errors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a declared symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Module,
    Class,
    Function,
    Method,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Class => "class",
            EntityKind::Function => "function",
            EntityKind::Method => "method",
        }
    }

    /// Suffix appended to the display name: `:` for classes, `()` for functions.
    pub fn decoration(&self) -> &'static str {
        match self {
            EntityKind::Class => ":",
            EntityKind::Function => "()",
            EntityKind::Method | EntityKind::Module => "",
        }
    }

    /// Kinds that own an executable body.
    pub fn is_executable(&self) -> bool {
        matches!(self, EntityKind::Function | EntityKind::Method)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one call site: `"<caller>.<sequence>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionKey(String);

impl CollisionKey {
    pub fn new(caller: EntityId, sequence: usize) -> Self {
        Self(format!("{}.{}", caller, sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub full_path: String,
    pub import_path: String,
    pub mod_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub file_id: FileId,
    pub name: String,
    pub kind: EntityKind,
    /// Dotted path of the container, not including `name`.
    pub import_path: String,
    pub member_of_class: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallId,
    pub caller: EntityId,
    pub callee: EntityId,
    pub collision_key: CollisionKey,
}

/// Entity to be registered with [`Catalog::add_entity`].
#[derive(Debug, Clone)]
pub struct NewEntity<'a> {
    pub file_id: FileId,
    pub name: &'a str,
    pub kind: EntityKind,
    pub import_path: &'a str,
    pub member_of_class: Option<EntityId>,
}

/// Outcome of an entity registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created(EntityId),
    Existing(EntityId),
}

impl Registration {
    pub fn id(&self) -> EntityId {
        match self {
            Registration::Created(id) | Registration::Existing(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Registration::Created(_))
    }
}

/// The three catalog tables with their lookup indexes.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    files: Vec<FileRecord>,
    entities: Vec<EntityRecord>,
    calls: Vec<CallRecord>,
    file_by_import_path: HashMap<String, FileId>,
    entity_by_key: HashMap<(String, String), EntityId>,
    entities_by_name: HashMap<String, Vec<EntityId>>,
    entity_position: HashMap<EntityId, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a catalog (and its indexes) from persisted rows.
    pub fn from_rows(
        files: Vec<FileRecord>,
        entities: Vec<EntityRecord>,
        calls: Vec<CallRecord>,
    ) -> Self {
        let mut catalog = Catalog::new();
        for file in files {
            catalog.file_by_import_path.insert(file.import_path.clone(), file.id);
            catalog.files.push(file);
        }
        for entity in entities {
            catalog.index_entity(&entity);
            catalog.entities.push(entity);
        }
        catalog.calls = calls;
        catalog
    }

    /// Register a file; re-adding a known import path returns the existing id.
    pub fn add_file(&mut self, full_path: &str, import_path: &str, mod_time: u64) -> FileId {
        if let Some(id) = self.file_by_import_path.get(import_path) {
            return *id;
        }
        let id = FileId(self.files.len() as u64 + 1);
        self.files.push(FileRecord {
            id,
            full_path: full_path.to_string(),
            import_path: import_path.to_string(),
            mod_time,
        });
        self.file_by_import_path.insert(import_path.to_string(), id);
        id
    }

    /// Register an entity, or find the one already registered under the same
    /// `(name, import_path)`.
    pub fn add_entity(&mut self, entity: NewEntity<'_>) -> Registration {
        let key = (entity.name.to_string(), entity.import_path.to_string());
        if let Some(id) = self.entity_by_key.get(&key) {
            return Registration::Existing(*id);
        }
        let record = EntityRecord {
            id: EntityId(self.entities.len() as u64 + 1),
            file_id: entity.file_id,
            name: entity.name.to_string(),
            kind: entity.kind,
            import_path: entity.import_path.to_string(),
            member_of_class: entity.member_of_class,
        };
        let id = record.id;
        self.index_entity(&record);
        self.entities.push(record);
        Registration::Created(id)
    }

    pub fn add_call(&mut self, caller: EntityId, callee: EntityId, collision_key: CollisionKey) -> CallId {
        let id = CallId(self.calls.len() as u64 + 1);
        self.calls.push(CallRecord {
            id,
            caller,
            callee,
            collision_key,
        });
        id
    }

    pub fn list_files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn list_entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    pub fn list_calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn file(&self, id: FileId) -> Option<&FileRecord> {
        // Ids are dense and assigned in insertion order.
        id.0.checked_sub(1)
            .and_then(|idx| self.files.get(idx as usize))
            .filter(|f| f.id == id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entity_position.get(&id).map(|idx| &self.entities[*idx])
    }

    /// Whether any entity carries this name.
    pub fn has_name(&self, name: &str) -> bool {
        self.entities_by_name.contains_key(name)
    }

    /// Ids of every entity called `name`, optionally restricted to one file,
    /// in creation order.
    pub fn find_entity_ids_by_name(&self, name: &str, file: Option<FileId>) -> Vec<EntityId> {
        let Some(ids) = self.entities_by_name.get(name) else {
            return Vec::new();
        };
        match file {
            None => ids.clone(),
            Some(file_id) => ids
                .iter()
                .copied()
                .filter(|id| self.entity(*id).map(|e| e.file_id) == Some(file_id))
                .collect(),
        }
    }

    /// Truncate every table. Ids restart at 1.
    pub fn clear(&mut self) {
        *self = Catalog::default();
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.entities.is_empty() && self.calls.is_empty()
    }

    fn index_entity(&mut self, entity: &EntityRecord) {
        self.entity_by_key
            .insert((entity.name.clone(), entity.import_path.clone()), entity.id);
        self.entities_by_name
            .entry(entity.name.clone())
            .or_default()
            .push(entity.id);
        self.entity_position.insert(entity.id, self.entities.len());
    }
}
