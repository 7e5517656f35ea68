//! Hive-partitioned record store with composite-key direct addressing.
//!
//! A namespace owns one ordered partition schema and one data format.
//! Records route to a partition directory whose path encodes the
//! schema's key/value pairs (`year=2025/country=US`); a RowId embeds
//! that same tuple plus a unique suffix, giving single-file lookup
//! without scanning unrelated partitions.
//!
//! - [`store`] — atomic whole-document and line-delimited file I/O (C1).
//! - [`validate`] — declarative document schema validation (C2).
//! - [`schema`] — partition schema and per-record validation (C3).
//! - [`manifest`] — namespace creation, persistence, and discovery (C4).
//! - [`rowid`] — RowId generation and parsing (C5).
//! - [`router`] — partition path derivation and query resolution (C6).
//! - [`resolver`] — per-RowId CRUD through the encoded partition (C7).
//! - [`reorg`] — schema-evolution split/merge jobs (C8).
//! - [`config`] — `StoreConfig`, the RowId/discovery defaults an embedder
//!   constructs up front.

pub mod config;
pub mod error;
pub mod manifest;
pub mod reorg;
pub mod resolver;
pub mod router;
pub mod rowid;
pub mod schema;
pub mod store;
pub mod validate;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use manifest::{DataFormat, Namespace, NamespaceManifest, PartitionInfo};
pub use reorg::{ReorgIssue, ReorgOperation, ReorgReport, SplitConfig};
pub use resolver::{LookupResult, DEFAULT_ID_FIELD};
pub use router::{FilterValue, PartitionFilter};
pub use rowid::{ParsedRowId, RowIdCodec, SuffixFormat, SuffixGenerator, SuffixGenerators};
pub use schema::{DerivationFn, DerivationRegistry, FieldSchema, FieldType, PartitionSchema};
pub use validate::DocumentSchema;
