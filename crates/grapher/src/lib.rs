//! Mesh grapher daemon
//!
//! Periodically loads the base traffic map, runs the appender pipeline
//! against the metrics backend and writes the annotated snapshot.

pub mod api;
pub mod config;
pub mod enricher;
