// Collaborator contracts the core depends on.

use crate::domain::catalog::FileRecord;
use crate::domain::declaration::Declaration;
use std::path::Path;

pub mod dot_exporter;
pub mod text_exporter;

pub use dot_exporter::RenderError;

/// A source unit found on disk, not yet cataloged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub full_path: String,
    pub import_path: String,
    pub mod_time: u64,
}

/// Supplies the ordered list of source units for the cataloging phase.
pub trait SourceDiscovery {
    fn discover(&self) -> anyhow::Result<Vec<SourceFile>>;
}

/// Reads declared symbols and the names their bodies reference.
pub trait CodeIntrospector {
    /// Introspector-specific handle for one declared symbol.
    type Symbol;

    /// Ordered declaration tree of one cataloged file.
    fn declarations(&self, file: &FileRecord) -> anyhow::Result<Vec<Declaration<Self::Symbol>>>;

    /// Names referenced by an executable symbol's body, in evaluation order.
    fn reference_stream(&self, symbol: &Self::Symbol) -> anyhow::Result<Vec<String>>;
}

/// Turns a graph description into an image on disk.
pub trait Rasterizer: Sync {
    fn rasterize(&self, dot: &str, output: &Path) -> Result<(), RenderError>;

    /// File extension of the produced images.
    fn extension(&self) -> &str;
}
