//! Project Migration
//!
//! Loads project files written by any past release of the voice synthesis
//! editor and brings them into the current format.
//!
//! ## Features
//!
//! - **Version-gated steps**: Each format change is a step bound to the
//!   releases that predate it, applied in order
//! - **Schema Validation**: The result is checked against embedded JSON Schemas
//!   and parsed into a typed [`ProjectDocument`]
//! - **Talk Checks**: Audio keys must resolve and voices must be complete
//! - **Checksums**: SHA256 fingerprints of the document before and after
//!
//! ## Architecture
//!
//! ```text
//! schemas/
//! ├── project.schema.json      root, sub-schemas land in definitions/
//! ├── audio-item.schema.json
//! ├── audio-query.schema.json
//! ├── track.schema.json
//! └── ...
//! src/migration/
//! ├── talk.rs                  talk item steps (<0.4.0 … <0.22.0)
//! ├── mora.rs                  phoneme timing recomputation (<0.5.0)
//! ├── song.rs                  talk/song split and track steps
//! └── latest.rs                current-shape backfill (<1.1.0-dev)
//! ```

pub mod audio;
pub mod checksum;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod migration;
pub mod registry;
pub mod schema;
pub mod version;

pub use checksum::Checksum;
pub use config::MigrationConfig;
pub use error::{ProjectError, Result, SchemaViolation, ViolationKind, VoiceAttribute};
pub use migration::{Collaborators, MigrationPipeline, MigrationReport, MoraDataFetcher};
pub use registry::SchemaRegistry;
pub use schema::ProjectDocument;
pub use version::{ProjectVersion, VersionRange};
