// Concrete collaborators: filesystem, syn, Graphviz, config, worker pool.

pub mod concurrency;
pub mod config;
pub mod graphviz;
pub mod project_loader;
pub mod rust_introspector;

pub use graphviz::GraphvizRasterizer;
pub use project_loader::FsDiscovery;
pub use rust_introspector::RustIntrospector;
