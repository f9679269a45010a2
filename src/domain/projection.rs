// Entity-keyed view of the catalog consumed by the pruner and the renderers.
// Call rows are regrouped by collision key, so each inner list is one call
// site and a list longer than one is an ambiguous call.

use crate::domain::catalog::{Catalog, EntityId, EntityKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One entity as shown downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedEntity {
    /// Display name, decorated by kind (`Foo:`, `bar()`).
    pub name: String,
    /// Name as declared.
    pub base_name: String,
    pub kind: EntityKind,
    pub file_import_path: String,
    /// Dotted path of the container.
    pub import_path: String,
    pub member_of_class: Option<EntityId>,
    /// Candidate callees per call site, in call-site order.
    pub calls: Vec<Vec<EntityId>>,
}

impl ProjectedEntity {
    pub fn is_ambiguous_call(group: &[EntityId]) -> bool {
        group.len() > 1
    }
}

/// Projected call graph keyed by entity id (ascending id = creation order).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    entities: BTreeMap<EntityId, ProjectedEntity>,
}

impl Projection {
    pub fn from_entities(entities: BTreeMap<EntityId, ProjectedEntity>) -> Self {
        Self { entities }
    }

    pub fn get(&self, id: EntityId) -> Option<&ProjectedEntity> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &ProjectedEntity)> {
        self.entities.iter().map(|(id, e)| (*id, e))
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Same shape, restricted to `keep`. Call lists are left untouched and
    /// may name ids that are no longer present.
    pub fn restrict(&self, keep: &BTreeSet<EntityId>) -> Projection {
        let entities = self
            .entities
            .iter()
            .filter(|(id, _)| keep.contains(id))
            .map(|(id, e)| (*id, e.clone()))
            .collect();
        Projection { entities }
    }
}

/// Join files, entities and calls into a [`Projection`].
pub fn project(catalog: &Catalog) -> Projection {
    // caller -> (collision key -> group index), groups in first-seen order
    let mut group_index: HashMap<EntityId, HashMap<&str, usize>> = HashMap::new();
    let mut groups: HashMap<EntityId, Vec<Vec<EntityId>>> = HashMap::new();

    for call in catalog.list_calls() {
        let slots = groups.entry(call.caller).or_default();
        let index = group_index.entry(call.caller).or_default();
        let slot = *index.entry(call.collision_key.as_str()).or_insert_with(|| {
            slots.push(Vec::new());
            slots.len() - 1
        });
        slots[slot].push(call.callee);
    }

    let entities = catalog
        .list_entities()
        .iter()
        .filter_map(|entity| {
            let file = catalog.file(entity.file_id)?;
            let projected = ProjectedEntity {
                name: format!("{}{}", entity.name, entity.kind.decoration()),
                base_name: entity.name.clone(),
                kind: entity.kind,
                file_import_path: file.import_path.clone(),
                import_path: entity.import_path.clone(),
                member_of_class: entity.member_of_class,
                calls: groups.remove(&entity.id).unwrap_or_default(),
            };
            Some((entity.id, projected))
        })
        .collect();

    Projection { entities }
}
