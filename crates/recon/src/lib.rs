//! `reconcile-core`: two-source record reconciliation engine.
//!
//! Pure engine crate: pulls records from two data sources, aligns them by key
//! with a sort-merge join, and returns the breaks (differences) between them.
//! Producers, writers and rendering live outside; this crate only defines the
//! seams (`RecordProducer`, `ContentWriter`).

pub mod aggregate;
pub mod breaks;
pub mod comparator;
pub mod config;
pub mod converter;
pub mod derived;
pub mod engine;
pub mod error;
pub mod exclude;
pub mod filter;
pub mod format;
pub mod metadata;
pub mod record;
pub mod schema;
pub mod sort;
pub mod source;
pub mod value;

pub use breaks::{Break, BreakKind, FieldDiff, Side};
pub use comparator::{DataComparator, RecordComparator};
pub use config::ComparisonConfig;
pub use converter::{StringTypeConverter, TypeConverter};
pub use engine::{Comparison, Reconciler};
pub use error::{ReconError, Result, SourceState};
pub use metadata::ComparisonMetadata;
pub use record::Record;
pub use schema::Schema;
pub use source::{DataSource, MemoryProducer, RecordProducer, RecordSource};
pub use value::Value;
