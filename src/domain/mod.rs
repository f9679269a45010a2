// Core tables and the pure phases that run over them.

pub mod catalog;
pub mod declaration;
pub mod projection;
pub mod prune;
pub mod resolver;
pub mod store;
