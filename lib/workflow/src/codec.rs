//! YAML export and import of workflow definitions.
//!
//! Exported files hold one workflow under a top-level `workflow:` key.
//! Import also accepts a bare definition without the wrapper.

use crate::definition::WorkflowDefinition;
use crate::error::CodecError;
use rootcause::prelude::Report;
use serde::Serialize;

const ROOT_KEY: &str = "workflow";

#[derive(Serialize)]
struct ExportDocument<'a> {
    workflow: &'a WorkflowDefinition,
}

/// Writes a definition as a YAML export document.
///
/// # Errors
///
/// Returns an error if the definition cannot be represented as YAML.
pub fn to_yaml(definition: &WorkflowDefinition) -> Result<String, Report<CodecError>> {
    let document = ExportDocument {
        workflow: definition,
    };
    let yaml = serde_yaml_ng::to_string(&document).map_err(|e| CodecError::Encode {
        reason: e.to_string(),
    })?;
    Ok(yaml)
}

/// Reads a definition from YAML text.
///
/// # Errors
///
/// Returns an error if the text is not YAML or does not describe a workflow.
pub fn from_yaml(text: &str) -> Result<WorkflowDefinition, Report<CodecError>> {
    let document: serde_yaml_ng::Value =
        serde_yaml_ng::from_str(text).map_err(|e| CodecError::Decode {
            reason: e.to_string(),
        })?;
    let body = document.get(ROOT_KEY).cloned().unwrap_or(document);
    let definition = serde_yaml_ng::from_value(body).map_err(|e| CodecError::Decode {
        reason: e.to_string(),
    })?;
    Ok(definition)
}

/// Reads a definition from the raw bytes of an export file.
///
/// # Errors
///
/// Returns an error if the bytes are not UTF-8 or not a valid document.
pub fn from_bytes(bytes: &[u8]) -> Result<WorkflowDefinition, Report<CodecError>> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)?;
    from_yaml(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{TriggerType, WorkflowStatus};
    use crate::graph::WorkflowGraph;
    use crate::node::{JsonMap, NodeKind, NodePatch, Position};
    use flowdeck_core::WorkflowId;
    use serde_json::json;

    fn definition() -> WorkflowDefinition {
        let mut graph = WorkflowGraph::new();
        let start = graph
            .add_node(&NodeKind::ScheduleStart, Position::new(0.0, 0.0), None)
            .id
            .clone();
        let reply = graph
            .add_node(&NodeKind::ReplyMessage, Position::new(200.0, 0.0), None)
            .id
            .clone();
        let mut config = JsonMap::new();
        config.insert("content".to_string(), json!("Good morning ${name}"));
        graph
            .update_node(&reply, NodePatch::config(config))
            .expect("config");
        graph.connect(&start, &reply, None, None).expect("connect");

        let mut def = WorkflowDefinition::new("Morning");
        def.id = Some(WorkflowId::new("wf_9"));
        def.status = WorkflowStatus::Inactive;
        def.trigger_types = vec![TriggerType::Scheduled];
        def.tags = vec!["daily".to_string()];
        def.graph = graph.to_definition_payload();
        def
    }

    #[test]
    fn export_is_wrapped_and_reads_back() {
        let def = definition();
        let yaml = to_yaml(&def).expect("encode");
        assert!(yaml.starts_with("workflow:"));

        let parsed = from_yaml(&yaml).expect("decode");
        assert_eq!(parsed, def);
    }

    #[test]
    fn bare_definition_is_accepted() {
        let yaml = "name: Bare\nstatus: draft\nnodes:\n  - id: e\n    type: end\n    name: End\n";
        let parsed = from_yaml(yaml).expect("decode");
        assert_eq!(parsed.name, "Bare");
        assert_eq!(parsed.graph.nodes.len(), 1);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = from_yaml("workflow: [unclosed").unwrap_err();
        assert!(matches!(err.current_context(), CodecError::Decode { .. }));
    }

    #[test]
    fn non_utf8_bytes_are_rejected() {
        let err = from_bytes(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err.current_context(), &CodecError::NotUtf8);
    }
}
