// Main library entry point for callflow.

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod ports;
