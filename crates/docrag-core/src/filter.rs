use serde::{Deserialize, Serialize};

use crate::fragment::{Fragment, SOURCE_KEY};
use crate::{RagError, RagResult};

/// One `key == value` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEquals {
    /// Metadata key, see [`Fragment::metadata_value`].
    pub key: String,
    /// Required value.
    pub value: String,
}

/// A conjunction of equality constraints over fragment metadata.
///
/// An empty filter matches every fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    constraints: Vec<FieldEquals>,
}

impl MetadataFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching a single source.
    pub fn source(source: impl Into<String>) -> Self {
        Self::new().equals(SOURCE_KEY, source)
    }

    /// Adds an equality constraint. Chainable.
    pub fn equals(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.push(FieldEquals {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// The constraints, in insertion order.
    pub fn constraints(&self) -> &[FieldEquals] {
        &self.constraints
    }

    /// True when the filter has no constraints.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Rejects constraints with an empty key.
    pub fn validate(&self) -> RagResult<()> {
        if self.constraints.iter().any(|c| c.key.trim().is_empty()) {
            return Err(RagError::Configuration(
                "metadata filter keys must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `fragment` satisfies every constraint.
    pub fn matches(&self, fragment: &Fragment) -> bool {
        self.constraints.iter().all(|c| {
            fragment
                .metadata_value(&c.key)
                .is_some_and(|v| v == c.value.as_str())
        })
    }
}
