//! Synheart Cards - explainable health summary cards
//!
//! Cards turn per-day health records into a self-describing envelope of
//! computed signals through a deterministic pipeline: row fetch → signal
//! extraction → aggregation and baselines → goals and coverage → envelope.
//!
//! ## Modules
//!
//! - **Catalogs**: static signal definitions (`signals`) and goals (`goals`)
//! - **Pipeline**: `connector` → `extractor` → `features` → `builder`
//! - **Surfaces**: request parsing, presets, C FFI and the `cards` CLI

pub mod builder;
pub mod config;
pub mod connector;
pub mod error;
pub mod extractor;
pub mod features;
pub mod goals;
pub mod presets;
pub mod request;
pub mod signals;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use builder::CardBuilder;
pub use config::KernelConfig;
pub use connector::{Connector, MemoryRowSource, RowSource};
pub use error::{CardError, CatalogError, SourceError};
pub use goals::{GoalCatalog, GoalSpec, TargetType};
pub use request::{CardRequest, CardRequestParams};
pub use signals::{AggregationMethod, SignalCatalog, SignalSpec};
pub use types::{CardEnvelope, CardType, Granularity, RawDayRecord, Signal, Status, Trend};

/// Library version, reported by the CLI
pub const CARDS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported alongside the version
pub const PRODUCER_NAME: &str = "synheart-cards";

/// Envelope schema version
pub const SCHEMA_VERSION: &str = "v0";
