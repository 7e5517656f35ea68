//! Pluggable derivation functions for `derive_from_data`.
//!
//! spec.md §9 lists three ways to represent the source's run-time-compiled
//! expression strings in a language-neutral reimplementation; this crate
//! picks option (b), a named-function registry, the same shape as the
//! teacher's `table::rollers::PartitionRoller` trait object
//! (`Box<dyn PartitionRoller>` registered per table).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

/// A derivation function: computes a partition value from a whole record.
pub type DerivationFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Named registry of derivation functions, supplied by the caller and
/// consulted by [`crate::schema::PartitionSchema::validate_record`] and by
/// the split reorganization job.
#[derive(Clone, Default)]
pub struct DerivationRegistry {
    functions: HashMap<String, DerivationFn>,
}

impl DerivationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a derivation function under `name`. Registering the same
    /// name again replaces the previous function.
    pub fn register(&mut self, name: impl Into<String>, f: DerivationFn) {
        self.functions.insert(name.into(), f);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&DerivationFn> {
        self.functions.get(name)
    }
}

impl std::fmt::Debug for DerivationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivationRegistry")
            .field("registered", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}
