//! Placement roster engine: spreadsheet ingestion, reconciliation into a keyed
//! student roster, upload versions, an audited edit log and cached analytics.

pub mod analytics;
pub mod cache;
pub mod coerce;
pub mod config;
pub mod db;
pub mod edits;
pub mod engine;
pub mod error;
pub mod fields;
pub mod models;
pub mod normalize;
pub mod placement;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod trends;
pub mod versioning;

pub use config::{RosterSchema, Settings};
pub use engine::{Engine, IngestReport, VersionSnapshot};
pub use error::{EngineError, Result};
