//! Domain models for the tracks migrator.
//!
//! # Core Concepts
//!
//! ## Fleet Entities
//!
//! - [`Repository`]: A repository fetched from the registry. Immutable for the length of a run.
//! - [`CompletionRecord`]: Append-only ledger row stating that a repository was processed,
//!   and whether a change was proposed for it.
//!
//! ## Per-Repository Entities
//!
//! These exist only while a single repository is being processed:
//!
//! - [`LegacyLogicFile`]: A source file implementing `IPageOrder`.
//! - [`DataModelVocabulary`]: Valid `dataModel` paths the oracle may reference.
//! - [`TransformationInstruction`]: One page + hidden expression pair produced by the oracle.
//! - [`MigrationBranch`]: The timestamped branch the migration is committed on.

mod migration;
mod record;
mod repository;

pub use migration::*;
pub use record::*;
pub use repository::*;
