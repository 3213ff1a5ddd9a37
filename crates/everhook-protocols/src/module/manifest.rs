//! Module manifest types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Metadata, Version};

/// Static description of a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub id: String,
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ModuleManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version,
            description: String::new(),
            author: None,
            dependencies: Dependencies::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Adds a required dependency. The dependency loads first; if it is
    /// missing, older than `minimum` or fails, this module fails too.
    pub fn requires(mut self, id: impl Into<String>, minimum: Option<Version>) -> Self {
        self.dependencies.required.push(DependencySpec {
            id: id.into(),
            version: minimum,
        });
        self
    }

    /// Adds an optional dependency. It loads first when present.
    pub fn optionally(mut self, id: impl Into<String>) -> Self {
        self.dependencies.optional.push(DependencySpec {
            id: id.into(),
            version: None,
        });
        self
    }
}

/// Dependencies on other modules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub required: Vec<DependencySpec>,
    #[serde(default)]
    pub optional: Vec<DependencySpec>,
}

impl Dependencies {
    /// Required then optional dependency ids.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .map(|d| d.id.as_str())
    }
}

/// A dependency on another module, with an optional minimum version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
