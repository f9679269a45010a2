use crate::domain::catalog::EntityKind;
use crate::domain::projection::{ProjectedEntity, Projection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphDto {
    pub nodes: Vec<NodeDto>,
    pub call_sites: Vec<CallSiteDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeDto {
    pub id: u64,
    pub label: String,
    pub name: String,
    pub kind: EntityKind,
    pub module: String,
    pub import_path: String,
    pub member_of_class: Option<u64>,
}

/// One call site; more than one candidate means the callee is ambiguous.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallSiteDto {
    pub caller: u64,
    /// Position of the site in the caller body; matches the collision key.
    pub sequence: usize,
    pub candidates: Vec<u64>,
    pub ambiguous: bool,
}

impl From<&Projection> for GraphDto {
    fn from(projection: &Projection) -> Self {
        let nodes = projection
            .iter()
            .map(|(id, e)| NodeDto {
                id: id.0,
                label: e.name.clone(),
                name: e.base_name.clone(),
                kind: e.kind,
                module: e.file_import_path.clone(),
                import_path: e.import_path.clone(),
                member_of_class: e.member_of_class.map(|c| c.0),
            })
            .collect();

        let mut call_sites = Vec::new();
        for (id, entity) in projection.iter() {
            for (sequence, group) in entity.calls.iter().enumerate() {
                call_sites.push(CallSiteDto {
                    caller: id.0,
                    sequence,
                    candidates: group.iter().map(|c| c.0).collect(),
                    ambiguous: ProjectedEntity::is_ambiguous_call(group),
                });
            }
        }

        GraphDto { nodes, call_sites }
    }
}

impl GraphDto {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
