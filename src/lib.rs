//! Lethality case loader: library entry point.
//!
//! Exposes the file readers, the model assembler, case discovery, the scan
//! store and report writers for use by the CLI and tests.

pub mod catalog;
pub mod config;
pub mod error;
pub mod geometry;
pub mod model;
pub mod notice;
pub mod parser;
pub mod report;
pub mod store;
pub mod util;

pub use error::{ErrorKind, LoadError};
pub use model::{load_case, Model, ModelSummary};
