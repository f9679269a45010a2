//! Selection-driven reachability pruning.
//!
//! Keeps every entity that a selected entity can reach or be reached from,
//! then closes the kept set over class containment so members never render
//! outside their class.

use crate::domain::catalog::EntityId;
use crate::domain::projection::Projection;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("empty entity selection")]
    Empty,

    #[error("invalid entity id {0:?} in selection")]
    InvalidId(String),
}

/// Parse a comma separated list of entity ids, e.g. `"3,17, 42"`.
pub fn parse_selection(literal: &str) -> Result<BTreeSet<EntityId>, SelectionError> {
    if literal.trim().is_empty() {
        return Err(SelectionError::Empty);
    }
    literal
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<u64>()
                .map(EntityId)
                .map_err(|_| SelectionError::InvalidId(part.to_string()))
        })
        .collect()
}

/// Simple directed adjacency sets built from call groups.
#[derive(Debug, Default)]
pub struct CallAdjacency {
    forward: HashMap<EntityId, BTreeSet<EntityId>>,
    backward: HashMap<EntityId, BTreeSet<EntityId>>,
}

impl CallAdjacency {
    pub fn from_projection(projection: &Projection) -> Self {
        let mut adjacency = CallAdjacency::default();
        for (caller, entity) in projection.iter() {
            for callee in entity.calls.iter().flatten() {
                adjacency.forward.entry(caller).or_default().insert(*callee);
                adjacency.backward.entry(*callee).or_default().insert(caller);
            }
        }
        adjacency
    }

    pub fn successors(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.forward.get(&id).into_iter().flatten().copied()
    }

    pub fn predecessors(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.backward.get(&id).into_iter().flatten().copied()
    }

    /// Everything reachable from `start` following calls.
    pub fn reachable_forward(&self, start: EntityId) -> BTreeSet<EntityId> {
        Self::walk(start, |id| self.successors(id).collect())
    }

    /// Everything that can reach `start`.
    pub fn reachable_backward(&self, start: EntityId) -> BTreeSet<EntityId> {
        Self::walk(start, |id| self.predecessors(id).collect())
    }

    fn walk(start: EntityId, next: impl Fn(EntityId) -> Vec<EntityId>) -> BTreeSet<EntityId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            for n in next(id) {
                if seen.insert(n) {
                    stack.push(n);
                }
            }
        }
        seen
    }
}

/// Add owning classes of kept members until nothing changes.
pub fn close_over_classes(projection: &Projection, keep: &mut BTreeSet<EntityId>) {
    loop {
        let owners: Vec<EntityId> = keep
            .iter()
            .filter_map(|id| projection.get(*id)?.member_of_class)
            .filter(|owner| !keep.contains(owner))
            .collect();
        if owners.is_empty() {
            return;
        }
        keep.extend(owners);
    }
}

/// Ids retained for `selection`: the selection, its forward and backward
/// reachable sets, closed over class containment.
pub fn retained_ids(projection: &Projection, selection: &BTreeSet<EntityId>) -> BTreeSet<EntityId> {
    let adjacency = CallAdjacency::from_projection(projection);
    let mut keep = selection.clone();
    for id in selection {
        keep.extend(adjacency.reachable_forward(*id));
        keep.extend(adjacency.reachable_backward(*id));
    }
    close_over_classes(projection, &mut keep);
    keep
}

pub fn prune(projection: &Projection, selection: &BTreeSet<EntityId>) -> Projection {
    projection.restrict(&retained_ids(projection, selection))
}

/// Prune by a selection literal. A malformed literal leaves the projection
/// unpruned.
pub fn prune_by_literal(projection: &Projection, literal: &str) -> Projection {
    match parse_selection(literal) {
        Ok(selection) => prune(projection, &selection),
        Err(e) => {
            warn!("unable to parse entity selection {:?}: {}", literal, e);
            projection.clone()
        }
    }
}
