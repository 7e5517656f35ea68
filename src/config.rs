//! Store-wide configuration.
//!
//! Mirrors the teacher's `table::config::TableConfig`: a plain struct with
//! a `Default` impl, constructed by the embedding application as a struct
//! literal rather than parsed from an external file — this storage
//! engine's own config layer takes no file format, the same shape the
//! teacher's table layer uses.

use serde::{Deserialize, Serialize};

use crate::resolver::DEFAULT_ID_FIELD;
use crate::rowid::{RowIdCodec, SuffixFormat};

/// Configuration for a namespace's RowId codec and open-time behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Separator joining partition values and the suffix in a RowId.
    /// Default: `.`
    pub separator: String,

    /// Prefix each partition segment with `key=` in generated RowIds.
    /// Default: `false`
    pub include_keys: bool,

    /// Suffix grammar used when a call does not override it.
    /// Default: `Uuid`
    pub default_suffix_format: SuffixFormat,

    /// Record field treated as the RowId by the resolver.
    /// Default: `"rowId"`
    pub id_field: String,

    /// Rediscover partitions from disk immediately on [`Namespace::open`].
    /// Default: `false` — the manifest's cached `discoveredPartitions` is
    /// trusted until the caller asks for a rescan.
    ///
    /// [`Namespace::open`]: crate::manifest::Namespace::open
    pub discover_on_open: bool,

    /// Pretty-print whole-document writes (manifest, `data.json`).
    /// Default: `true`
    pub pretty_print: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            include_keys: false,
            default_suffix_format: SuffixFormat::Uuid,
            id_field: DEFAULT_ID_FIELD.to_string(),
            discover_on_open: false,
            pretty_print: true,
        }
    }
}

impl StoreConfig {
    /// Build the RowId codec this config describes.
    pub fn codec(&self) -> RowIdCodec {
        RowIdCodec::new(self.separator.clone(), self.include_keys, self.default_suffix_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.separator, ".");
        assert!(!config.include_keys);
        assert_eq!(config.default_suffix_format, SuffixFormat::Uuid);
        assert_eq!(config.id_field, "rowId");
        assert!(!config.discover_on_open);
        assert!(config.pretty_print);
    }

    #[test]
    fn round_trips_through_json() {
        let config = StoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.separator, back.separator);
        assert_eq!(config.default_suffix_format, back.default_suffix_format);
    }

    #[test]
    fn codec_uses_configured_separator() {
        let mut config = StoreConfig::default();
        config.separator = "|".to_string();
        let codec = config.codec();
        assert_eq!(codec.separator(), "|");
    }
}
