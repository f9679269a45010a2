//! DOT Exporter
//!
//! Renders a projected (optionally pruned) call graph as a Graphviz digraph.
//! Nodes are grouped into clusters per file and, inside a file, per class.

use crate::domain::catalog::{EntityId, EntityKind};
use crate::domain::projection::{ProjectedEntity, Projection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rasterizer `{0}` not found in PATH")]
    RasterizerMissing(String),

    #[error("rasterizer `{program}` failed with exit code {code:?}: {stderr}")]
    RasterizerFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rotating edge palette (X11 colour names).
pub const EDGE_PALETTE: [&str; 30] = [
    "aquamarine",
    "antiquewhite4",
    "aquamarine3",
    "azure3",
    "bisque2",
    "blue",
    "blueviolet",
    "brown4",
    "burlywood4",
    "cadetblue4",
    "chartreuse4",
    "chocolate4",
    "coral3",
    "cornsilk3",
    "cyan2",
    "darkgoldenrod",
    "darkgray",
    "darkolivegreen",
    "darkorange",
    "darkorchid",
    "darkred",
    "darkseagreen3",
    "darkslategray2",
    "darkviolet",
    "deeppink4",
    "deepskyblue4",
    "dodgerblue2",
    "firebrick2",
    "gold2",
    "goldenrod2",
];

const HIGHLIGHT_FILL: &str = "gold";

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RankDir {
    TB,
    BT,
    RL,
    #[default]
    LR,
}

impl FromStr for RankDir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TB" => Ok(RankDir::TB),
            "BT" => Ok(RankDir::BT),
            "RL" => Ok(RankDir::RL),
            "LR" => Ok(RankDir::LR),
            other => Err(format!("unknown rankdir {:?} (expected TB, BT, RL or LR)", other)),
        }
    }
}

impl fmt::Display for RankDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RankDir::TB => "TB",
            RankDir::BT => "BT",
            RankDir::RL => "RL",
            RankDir::LR => "LR",
        };
        f.write_str(s)
    }
}

/// Edge colour policy: one fixed colour, or a new palette colour per call site.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EdgeColor {
    #[default]
    Rotate,
    Fixed(String),
}

impl From<String> for EdgeColor {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("rotate") {
            EdgeColor::Rotate
        } else {
            EdgeColor::Fixed(value)
        }
    }
}

impl From<EdgeColor> for String {
    fn from(value: EdgeColor) -> Self {
        match value {
            EdgeColor::Rotate => "rotate".to_string(),
            EdgeColor::Fixed(color) => color,
        }
    }
}

impl FromStr for EdgeColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err("edge colour must not be empty".to_string());
        }
        Ok(EdgeColor::from(s.to_string()))
    }
}

/// Walks the palette: first colour, then backwards with wrap-around.
#[derive(Debug, Clone, Default)]
pub struct ColorWheel {
    cursor: usize,
}

impl ColorWheel {
    pub fn next_color(&mut self) -> &'static str {
        let color = EDGE_PALETTE[self.cursor];
        self.cursor = (self.cursor + EDGE_PALETTE.len() - 1) % EDGE_PALETTE.len();
        color
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub graph_name: String,
    pub rankdir: RankDir,
    pub edge_color: EdgeColor,
    pub suppress_recursive_calls: bool,
    pub combine_calls: bool,
    pub suppress_class_references: bool,
    /// Entities drawn with the highlight style.
    #[serde(skip)]
    pub highlight: BTreeSet<EntityId>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            graph_name: "Callflow Analysis".to_string(),
            rankdir: RankDir::default(),
            edge_color: EdgeColor::default(),
            suppress_recursive_calls: false,
            combine_calls: false,
            suppress_class_references: false,
            highlight: BTreeSet::new(),
        }
    }
}

impl RenderOptions {
    /// Every simplification switched on, as used for per-entity images.
    pub fn simplified(&self) -> Self {
        Self {
            suppress_recursive_calls: true,
            combine_calls: true,
            suppress_class_references: true,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStyle {
    Solid,
    /// Call site with more than one candidate.
    Dashed,
}

impl EdgeStyle {
    fn as_str(&self) -> &'static str {
        match self {
            EdgeStyle::Solid => "solid",
            EdgeStyle::Dashed => "dashed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotNode {
    pub entity: EntityId,
    pub label: String,
    pub highlighted: bool,
}

#[derive(Debug, Clone)]
pub struct DotCluster {
    pub name: String,
    pub label: String,
    pub nodes: Vec<DotNode>,
    /// Indexes of nested clusters.
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotEdge {
    pub from: EntityId,
    pub to: EntityId,
    pub style: EdgeStyle,
    pub color: String,
}

/// Typed Graphviz digraph.
#[derive(Debug, Clone)]
pub struct DotGraph {
    pub name: String,
    pub rankdir: RankDir,
    pub clusters: Vec<DotCluster>,
    /// Top-level (file) clusters.
    pub roots: Vec<usize>,
    pub edges: Vec<DotEdge>,
}

impl DotGraph {
    pub fn node(&self, entity: EntityId) -> Option<&DotNode> {
        self.clusters
            .iter()
            .flat_map(|c| c.nodes.iter())
            .find(|n| n.entity == entity)
    }

    pub fn node_count(&self) -> usize {
        self.clusters.iter().map(|c| c.nodes.len()).sum()
    }

    /// Index of the cluster directly holding `entity`'s node.
    pub fn cluster_of(&self, entity: EntityId) -> Option<usize> {
        self.clusters
            .iter()
            .position(|c| c.nodes.iter().any(|n| n.entity == entity))
    }

    pub fn parent_of(&self, cluster: usize) -> Option<usize> {
        self.clusters.iter().position(|c| c.children.contains(&cluster))
    }

    pub fn to_dot(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("digraph \"{}\" {{", escape_label(&self.name)));
        lines.push("    compound=true;".to_string());
        lines.push(format!("    rankdir={};", self.rankdir));
        for root in &self.roots {
            self.write_cluster(*root, 1, &mut lines);
        }
        for edge in &self.edges {
            lines.push(format!(
                "    \"{}\" -> \"{}\" [style={}, color=\"{}\"];",
                edge.from,
                edge.to,
                edge.style.as_str(),
                escape_label(&edge.color)
            ));
        }
        lines.push("}".to_string());
        lines.join("\n")
    }

    fn write_cluster(&self, index: usize, depth: usize, lines: &mut Vec<String>) {
        let cluster = &self.clusters[index];
        let pad = "    ".repeat(depth);
        lines.push(format!("{}subgraph \"{}\" {{", pad, escape_label(&cluster.name)));
        lines.push(format!("{}    label=\"{}\";", pad, escape_label(&cluster.label)));
        for node in &cluster.nodes {
            let style = if node.highlighted {
                format!(", style=filled, fillcolor={}", HIGHLIGHT_FILL)
            } else {
                String::new()
            };
            lines.push(format!(
                "{}    \"{}\" [label=\"{}\"{}];",
                pad,
                node.entity,
                escape_label(&node.label),
                style
            ));
        }
        for child in &cluster.children {
            self.write_cluster(*child, depth + 1, lines);
        }
        lines.push(format!("{}}}", pad));
    }
}

fn escape_label(label: &str) -> String {
    label
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Cluster bookkeeping for pass 1.
struct ClusterSet {
    clusters: Vec<DotCluster>,
    roots: Vec<usize>,
    by_file: HashMap<String, usize>,
    by_class: HashMap<EntityId, usize>,
}

impl ClusterSet {
    fn new() -> Self {
        Self {
            clusters: Vec::new(),
            roots: Vec::new(),
            by_file: HashMap::new(),
            by_class: HashMap::new(),
        }
    }

    fn push(&mut self, name: String, label: String) -> usize {
        self.clusters.push(DotCluster {
            name,
            label,
            nodes: Vec::new(),
            children: Vec::new(),
        });
        self.clusters.len() - 1
    }

    fn file(&mut self, import_path: &str) -> usize {
        if let Some(index) = self.by_file.get(import_path) {
            return *index;
        }
        let index = self.push(format!("cluster_{}", import_path), import_path.to_string());
        self.roots.push(index);
        self.by_file.insert(import_path.to_string(), index);
        index
    }

    /// Cluster of a class, nested under the class's own file cluster.
    fn class(&mut self, projection: &Projection, class: EntityId, fallback_file: &str) -> usize {
        if let Some(index) = self.by_class.get(&class) {
            return *index;
        }
        let (file, label) = match projection.get(class) {
            Some(entity) => (entity.file_import_path.clone(), entity.name.clone()),
            None => (fallback_file.to_string(), class.to_string()),
        };
        let parent = self.file(&file);
        let index = self.push(format!("cluster_class_{}", class), label);
        self.clusters[parent].children.push(index);
        self.by_class.insert(class, index);
        index
    }
}

pub struct DotExporter;

impl DotExporter {
    /// Build the clustered graph for `projection`.
    pub fn render(projection: &Projection, options: &RenderOptions) -> DotGraph {
        let mut clusters = ClusterSet::new();
        let mut drawn: HashSet<EntityId> = HashSet::new();

        // Pass 1: clusters and nodes
        for (id, entity) in projection.iter() {
            let file_cluster = clusters.file(&entity.file_import_path);
            let mut target = match entity.member_of_class {
                Some(class) => clusters.class(projection, class, &entity.file_import_path),
                None => file_cluster,
            };
            let mut label = entity.name.clone();

            if entity.kind == EntityKind::Class {
                let own = clusters.class(projection, id, &entity.file_import_path);
                if options.suppress_class_references {
                    continue;
                }
                label.push_str(" (ref)");
                target = own;
            }

            clusters.clusters[target].nodes.push(DotNode {
                entity: id,
                label,
                highlighted: options.highlight.contains(&id),
            });
            drawn.insert(id);
        }

        // Pass 2: edges
        let mut wheel = ColorWheel::default();
        let mut emitted: HashSet<(EntityId, EntityId)> = HashSet::new();
        let mut edges = Vec::new();
        for (id, entity) in projection.iter() {
            if !drawn.contains(&id) {
                continue;
            }
            for group in &entity.calls {
                let style = if ProjectedEntity::is_ambiguous_call(group) {
                    EdgeStyle::Dashed
                } else {
                    EdgeStyle::Solid
                };
                let color = match &options.edge_color {
                    EdgeColor::Fixed(color) => color.clone(),
                    EdgeColor::Rotate => wheel.next_color().to_string(),
                };
                for callee in group {
                    if !drawn.contains(callee) {
                        continue;
                    }
                    if options.suppress_recursive_calls && *callee == id {
                        continue;
                    }
                    if options.combine_calls && emitted.contains(&(id, *callee)) {
                        continue;
                    }
                    if options.suppress_class_references
                        && projection.get(*callee).map(|e| e.kind) == Some(EntityKind::Class)
                    {
                        continue;
                    }
                    edges.push(DotEdge {
                        from: id,
                        to: *callee,
                        style,
                        color: color.clone(),
                    });
                    emitted.insert((id, *callee));
                }
            }
        }

        DotGraph {
            name: options.graph_name.clone(),
            rankdir: options.rankdir,
            clusters: clusters.clusters,
            roots: clusters.roots,
            edges,
        }
    }

    /// Render straight to DOT text.
    pub fn to_dot(projection: &Projection, options: &RenderOptions) -> String {
        Self::render(projection, options).to_dot()
    }

    /// Write DOT text to `path`.
    pub fn export(projection: &Projection, options: &RenderOptions, path: &str) -> Result<(), RenderError> {
        std::fs::write(path, Self::to_dot(projection, options)).map_err(|source| RenderError::Io {
            path: PathBuf::from(path),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entity(
        name: &str,
        kind: EntityKind,
        file: &str,
        owner: Option<u64>,
        calls: Vec<Vec<u64>>,
    ) -> ProjectedEntity {
        ProjectedEntity {
            name: format!("{}{}", name, kind.decoration()),
            base_name: name.to_string(),
            kind,
            file_import_path: file.to_string(),
            import_path: file.to_string(),
            member_of_class: owner.map(EntityId),
            calls: calls
                .into_iter()
                .map(|g| g.into_iter().map(EntityId).collect())
                .collect(),
        }
    }

    /// Class C(1) with methods m(2) calling itself and n(3) calling m.
    fn class_scenario() -> Projection {
        let mut map = BTreeMap::new();
        map.insert(EntityId(1), entity("C", EntityKind::Class, "pkg.a", None, vec![]));
        map.insert(EntityId(2), entity("m", EntityKind::Method, "pkg.a", Some(1), vec![vec![2]]));
        map.insert(EntityId(3), entity("n", EntityKind::Method, "pkg.a", Some(1), vec![vec![2]]));
        Projection::from_entities(map)
    }

    fn edge_pairs(graph: &DotGraph) -> Vec<(u64, u64)> {
        graph.edges.iter().map(|e| (e.from.0, e.to.0)).collect()
    }

    #[test]
    fn test_members_placed_in_class_cluster_under_file() {
        let graph = DotExporter::render(&class_scenario(), &RenderOptions::default());

        assert_eq!(graph.roots.len(), 1);
        let class_cluster = graph.cluster_of(EntityId(2)).unwrap();
        assert_eq!(graph.cluster_of(EntityId(3)), Some(class_cluster));
        assert_eq!(graph.cluster_of(EntityId(1)), Some(class_cluster));
        assert_eq!(graph.parent_of(class_cluster), Some(graph.roots[0]));
        assert_eq!(graph.clusters[class_cluster].label, "C:");
        assert_eq!(graph.node(EntityId(1)).unwrap().label, "C: (ref)");
    }

    #[test]
    fn test_suppress_recursive_calls_drops_only_self_edges() {
        let projection = class_scenario();
        let plain = DotExporter::render(&projection, &RenderOptions::default());
        assert_eq!(edge_pairs(&plain), vec![(2, 2), (3, 2)]);

        for combine_calls in [false, true] {
            let options = RenderOptions {
                suppress_recursive_calls: true,
                combine_calls,
                ..Default::default()
            };
            let graph = DotExporter::render(&projection, &options);
            assert_eq!(edge_pairs(&graph), vec![(3, 2)]);
        }
    }

    #[test]
    fn test_selecting_method_keeps_class_and_drops_self_edge() {
        let projection = class_scenario();
        let selection = BTreeSet::from([EntityId(3)]);
        let pruned = crate::domain::prune::prune(&projection, &selection);
        let kept: Vec<u64> = pruned.iter().map(|(id, _)| id.0).collect();
        assert_eq!(kept, vec![1, 2, 3]);

        let options = RenderOptions {
            suppress_recursive_calls: true,
            highlight: selection,
            ..Default::default()
        };
        let graph = DotExporter::render(&pruned, &options);
        assert_eq!(edge_pairs(&graph), vec![(3, 2)]);
        assert!(graph.node(EntityId(1)).is_some());
    }

    #[test]
    fn test_combine_calls_emits_one_edge_per_pair() {
        let mut map = BTreeMap::new();
        map.insert(EntityId(1), entity("x", EntityKind::Function, "pkg.a", None, vec![]));
        map.insert(EntityId(2), entity("y", EntityKind::Function, "pkg.a", None, vec![]));
        map.insert(
            EntityId(3),
            entity("caller", EntityKind::Function, "pkg.a", None, vec![vec![1], vec![1, 2]]),
        );
        let projection = Projection::from_entities(map);

        let plain = DotExporter::render(&projection, &RenderOptions::default());
        assert_eq!(edge_pairs(&plain), vec![(3, 1), (3, 1), (3, 2)]);

        let options = RenderOptions {
            combine_calls: true,
            ..Default::default()
        };
        let combined = DotExporter::render(&projection, &options);
        assert_eq!(edge_pairs(&combined), vec![(3, 1), (3, 2)]);
        assert_eq!(combined.edges[0].style, EdgeStyle::Solid);
        assert_eq!(combined.edges[1].style, EdgeStyle::Dashed);
    }

    #[test]
    fn test_suppress_class_references() {
        let mut map = BTreeMap::new();
        map.insert(EntityId(1), entity("C", EntityKind::Class, "pkg.a", None, vec![]));
        map.insert(EntityId(2), entity("m", EntityKind::Method, "pkg.a", Some(1), vec![]));
        map.insert(
            EntityId(3),
            entity("main", EntityKind::Function, "pkg.b", None, vec![vec![1], vec![2]]),
        );
        let projection = Projection::from_entities(map);

        let options = RenderOptions {
            suppress_class_references: true,
            ..Default::default()
        };
        let graph = DotExporter::render(&projection, &options);
        assert!(graph.node(EntityId(1)).is_none());
        assert!(graph.cluster_of(EntityId(2)).is_some());
        assert_eq!(edge_pairs(&graph), vec![(3, 2)]);
    }

    #[test]
    fn test_missing_targets_are_dropped() {
        let mut map = BTreeMap::new();
        map.insert(EntityId(1), entity("a", EntityKind::Function, "pkg.a", None, vec![vec![99], vec![1]]));
        let graph = DotExporter::render(&Projection::from_entities(map), &RenderOptions::default());
        assert_eq!(edge_pairs(&graph), vec![(1, 1)]);
    }

    #[test]
    fn test_color_rotates_once_per_group() {
        let mut map = BTreeMap::new();
        map.insert(EntityId(1), entity("a", EntityKind::Function, "pkg.a", None, vec![]));
        map.insert(
            EntityId(2),
            entity("b", EntityKind::Function, "pkg.a", None, vec![vec![99], vec![1], vec![1]]),
        );
        let graph = DotExporter::render(&Projection::from_entities(map), &RenderOptions::default());

        // The first group draws nothing but still takes a colour.
        let colors: Vec<&str> = graph.edges.iter().map(|e| e.color.as_str()).collect();
        assert_eq!(colors, vec![EDGE_PALETTE[29], EDGE_PALETTE[28]]);
    }

    #[test]
    fn test_color_wheel_wraps() {
        let mut wheel = ColorWheel::default();
        let first = wheel.next_color();
        for _ in 1..EDGE_PALETTE.len() {
            wheel.next_color();
        }
        assert_eq!(first, EDGE_PALETTE[0]);
        assert_eq!(wheel.next_color(), first);
    }

    #[test]
    fn test_fixed_edge_color() {
        let options = RenderOptions {
            edge_color: "black".parse().unwrap(),
            ..Default::default()
        };
        let graph = DotExporter::render(&class_scenario(), &options);
        assert!(graph.edges.iter().all(|e| e.color == "black"));
    }

    #[test]
    fn test_to_dot_text() {
        let options = RenderOptions {
            rankdir: RankDir::TB,
            highlight: BTreeSet::from([EntityId(3)]),
            ..Default::default()
        };
        let dot = DotExporter::to_dot(&class_scenario(), &options);
        assert!(dot.starts_with("digraph \"Callflow Analysis\" {"));
        assert!(dot.contains("rankdir=TB;"));
        assert!(dot.contains("subgraph \"cluster_pkg.a\""));
        assert!(dot.contains("subgraph \"cluster_class_1\""));
        assert!(dot.contains("\"3\" [label=\"n\", style=filled, fillcolor=gold];"));
        assert!(dot.contains("\"3\" -> \"2\" [style=solid"));
        assert!(dot.ends_with('}'));
    }

    #[test]
    fn test_option_parsing() {
        assert_eq!("lr".parse::<RankDir>(), Ok(RankDir::LR));
        assert!("sideways".parse::<RankDir>().is_err());
        assert_eq!("Rotate".parse::<EdgeColor>(), Ok(EdgeColor::Rotate));
        assert_eq!("red".parse::<EdgeColor>(), Ok(EdgeColor::Fixed("red".to_string())));
    }
}
