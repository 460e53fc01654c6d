//! Node manifests: palette metadata for a node type.
//!
//! Manifests are used for labeling and grouping only. Nothing in execution
//! or validation reads them.

use crate::node::{JsonMap, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Locale used when the requested one is missing.
pub const FALLBACK_LOCALE: &str = "en_US";

/// Category for manifests that do not declare one.
pub const DEFAULT_CATEGORY: &str = "other";

/// Text that is either plain or keyed by locale (`en_US`, `zh_Hans`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

impl LocalizedText {
    /// Returns the text for `locale`, then `en_US`, then any entry.
    #[must_use]
    pub fn resolve(&self, locale: &str) -> &str {
        match self {
            Self::Plain(text) => text,
            Self::Localized(map) => map
                .get(locale)
                .or_else(|| map.get(FALLBACK_LOCALE))
                .or_else(|| map.values().next())
                .map(String::as_str)
                .unwrap_or_default(),
        }
    }
}

impl From<&str> for LocalizedText {
    fn from(text: &str) -> Self {
        Self::Plain(text.to_string())
    }
}

/// Display hints of a manifest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManifestSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Palette metadata for one node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeManifest {
    /// The node type this manifest describes.
    pub name: String,
    pub label: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedText>,
    #[serde(default)]
    pub spec: ManifestSpec,
}

impl NodeManifest {
    /// Creates a manifest with a plain label.
    #[must_use]
    pub fn new(name: impl Into<String>, label: impl Into<String>, category: &str, color: &str) -> Self {
        Self {
            name: name.into(),
            label: LocalizedText::Plain(label.into()),
            description: None,
            spec: ManifestSpec {
                category: Some(category.to_string()),
                color: Some(color.to_string()),
                extra: JsonMap::new(),
            },
        }
    }

    /// Sets a plain description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(LocalizedText::Plain(description.into()));
        self
    }

    /// Returns the node kind named by this manifest.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        NodeKind::from(self.name.as_str())
    }

    /// Returns the category, or `other` if none was declared.
    #[must_use]
    pub fn category(&self) -> &str {
        self.spec
            .category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
    }
}
