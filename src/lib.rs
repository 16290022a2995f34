#![deny(missing_docs)]

//! Core library for the Rusty Import note importer.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Drop target admission checks performed before an import starts.
pub mod dropzone;
/// Format-specific import engines and the engine contract.
pub mod engines;
/// File classification and import coordination.
pub mod importer;
/// Structured logging and tracing setup.
pub mod logging;
/// Import metrics helpers.
pub mod metrics;
/// Note records and the shared note sink.
pub mod notes;
