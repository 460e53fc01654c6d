//! Catalog of available node types.
//!
//! The registry is constructed explicitly and passed to whoever needs it.
//! It is loaded once per editor session and refreshed on demand; consumers
//! only read it.

use crate::error::EditorError;
use flowdeck_gateway::PersistenceGateway;
use flowdeck_workflow::manifest::DEFAULT_CATEGORY;
use flowdeck_workflow::{NodeKind, NodeManifest};
use rootcause::prelude::Report;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Where the current catalog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    /// Fetched from the executor.
    Gateway,
    /// Built-in fallback set.
    Builtin,
}

/// Mapping from node type name to manifest.
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    manifests: Vec<NodeManifest>,
    index: HashMap<String, usize>,
    locale: String,
    source: CatalogSource,
    load_error: Option<String>,
}

/// Manifests used when the executor cannot be reached.
#[must_use]
pub fn builtin_manifests() -> Vec<NodeManifest> {
    vec![
        NodeManifest::new("event_start", "Event Start", "trigger", "#22c55e")
            .with_description("Starts the workflow when a message arrives"),
        NodeManifest::new("schedule_start", "Schedule Start", "trigger", "#22c55e")
            .with_description("Starts the workflow on a cron schedule"),
        NodeManifest::new("condition", "Condition", "logic", "#f59e0b"),
        NodeManifest::new("chat_command_branch", "Command Branch", "logic", "#f59e0b"),
        NodeManifest::new("reply_message", "Reply Message", "action", "#3b82f6")
            .with_description("Sends a reply to the triggering conversation"),
        NodeManifest::new("http_request", "HTTP Request", "action", "#3b82f6"),
        NodeManifest::new("tool_action", "Tool Action", "action", "#3b82f6"),
        NodeManifest::new("set_variable", "Set Variable", "data", "#8b5cf6"),
        NodeManifest::new("get_variable", "Get Variable", "data", "#8b5cf6"),
        NodeManifest::new("json_processor", "JSON Processor", "data", "#8b5cf6"),
        NodeManifest::new("binary_storage", "Binary Storage", "storage", "#64748b"),
        NodeManifest::new("file_storage", "File Storage", "storage", "#64748b"),
        NodeManifest::new("end", "End", "control", "#ef4444"),
    ]
}

impl NodeTypeRegistry {
    /// Creates a registry holding the built-in fallback set.
    #[must_use]
    pub fn builtin(locale: impl Into<String>) -> Self {
        let mut registry = Self {
            manifests: Vec::new(),
            index: HashMap::new(),
            locale: locale.into(),
            source: CatalogSource::Builtin,
            load_error: None,
        };
        registry.replace(builtin_manifests(), CatalogSource::Builtin);
        registry
    }

    /// Fetches manifests from the gateway.
    ///
    /// Never fails: if the fetch fails or returns nothing, the built-in set
    /// is used and the reason is kept in [`load_error`](Self::load_error).
    pub async fn load<G: PersistenceGateway + ?Sized>(
        gateway: &G,
        locale: impl Into<String>,
    ) -> Self {
        let mut registry = Self::builtin(locale);
        if let Err(report) = registry.refresh(gateway).await {
            warn!(error = %report, "using built-in node types");
            registry.load_error = Some(report.current_context().to_string());
        }
        registry
    }

    /// Fetches manifests again, keeping the current catalog on failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails or returns no manifests.
    pub async fn refresh<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<(), Report<EditorError>> {
        let manifests = gateway.get_node_manifests().await.map_err(|report| {
            let retryable = report.current_context().is_retryable();
            report.context(EditorError::Gateway {
                operation: "load node types",
                retryable,
            })
        })?;

        if manifests.is_empty() {
            return Err(EditorError::Gateway {
                operation: "load node types",
                retryable: false,
            }
            .into());
        }

        info!(count = manifests.len(), "node types loaded");
        self.replace(manifests, CatalogSource::Gateway);
        self.load_error = None;
        Ok(())
    }

    fn replace(&mut self, manifests: Vec<NodeManifest>, source: CatalogSource) {
        self.index.clear();
        self.manifests.clear();
        for manifest in manifests {
            if self.index.contains_key(&manifest.name) {
                debug!(node_type = %manifest.name, "duplicate manifest ignored");
                continue;
            }
            self.index.insert(manifest.name.clone(), self.manifests.len());
            self.manifests.push(manifest);
        }
        self.source = source;
    }

    /// Returns the manifest for a type name; `None` for unknown types.
    #[must_use]
    pub fn resolve(&self, node_type: &str) -> Option<&NodeManifest> {
        self.index.get(node_type).map(|&i| &self.manifests[i])
    }

    /// Returns the display label, falling back to the raw type name.
    #[must_use]
    pub fn label_for(&self, kind: &NodeKind) -> String {
        self.resolve(kind.as_str())
            .map(|m| m.label.resolve(&self.locale).to_string())
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| kind.to_string())
    }

    /// Returns the description in the registry's locale, if any.
    #[must_use]
    pub fn description_for(&self, kind: &NodeKind) -> Option<&str> {
        self.resolve(kind.as_str())
            .and_then(|m| m.description.as_ref())
            .map(|d| d.resolve(&self.locale))
    }

    /// Returns the category, falling back to `other`.
    #[must_use]
    pub fn category_for(&self, kind: &NodeKind) -> &str {
        self.resolve(kind.as_str())
            .map(NodeManifest::category)
            .unwrap_or(DEFAULT_CATEGORY)
    }

    /// Groups manifests by category.
    ///
    /// Categories appear in the order first seen; manifests keep the order
    /// the executor returned them in.
    #[must_use]
    pub fn by_category(&self) -> Vec<(&str, Vec<&NodeManifest>)> {
        let mut groups: Vec<(&str, Vec<&NodeManifest>)> = Vec::new();
        for manifest in &self.manifests {
            let category = manifest.category();
            match groups.iter_mut().find(|(name, _)| *name == category) {
                Some((_, members)) => members.push(manifest),
                None => groups.push((category, vec![manifest])),
            }
        }
        groups
    }

    /// Returns every manifest in catalog order.
    #[must_use]
    pub fn manifests(&self) -> &[NodeManifest] {
        &self.manifests
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    #[must_use]
    pub fn source(&self) -> CatalogSource {
        self.source
    }

    /// Returns why the last load fell back to built-ins.
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }
}
