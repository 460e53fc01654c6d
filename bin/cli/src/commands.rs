//! Command implementations.
//!
//! Commands that touch a stored workflow open it in an [`EditorController`]
//! first, so the CLI goes through the same gates and checks as any other
//! front end.

use crate::cli::{Cli, Commands, SortField, sort_order};
use crate::error::CliError;
use flowdeck_core::{NodeId, WorkflowId};
use flowdeck_editor::{
    DebugError, DebugSessionController, DebugState, EditorConfig, EditorController,
    NodeTypeRegistry, OperationGate, check_definition,
};
use flowdeck_gateway::{HttpGateway, PersistenceGateway};
use flowdeck_workflow::{JsonMap, TriggerType, ValidationReport, codec};
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

type CliResult<T = ()> = flowdeck_core::Result<T, CliError>;

fn failed<C>(command: &'static str) -> impl FnOnce(Report<C>) -> Report<CliError> {
    move |report| report.context(CliError::Command { command })
}

/// Runs one parsed command line.
pub async fn run(cli: Cli) -> CliResult {
    let mut config = EditorConfig::from_env().map_err(|e| CliError::Config {
        reason: e.to_string(),
    })?;
    if let Some(base_url) = cli.base_url {
        config.gateway.base_url = base_url;
    }

    match cli.command {
        Commands::Validate { file } => validate(&file).await,
        Commands::List { sort, asc } => list(connect(&config)?, &config, sort, asc).await,
        Commands::Nodes => nodes(connect(&config)?, &config).await,
        Commands::Export {
            workflow_id,
            output,
        } => export(connect(&config)?, &config, &workflow_id, output.as_deref()).await,
        Commands::Import { file } => import(connect(&config)?, &config, &file).await,
        Commands::Execute {
            workflow_id,
            trigger,
            data,
        } => {
            let trigger = parse_trigger(trigger.as_deref(), &config)?;
            let data = parse_trigger_data(&data)?;
            execute(connect(&config)?, &config, &workflow_id, trigger, data).await
        }
        Commands::Debug {
            workflow_id,
            breakpoints,
            step,
            trigger,
            data,
        } => {
            let trigger = parse_trigger(trigger.as_deref(), &config)?;
            let data = parse_trigger_data(&data)?;
            let breakpoints = breakpoints.into_iter().map(NodeId::new).collect();
            let gateway = connect(&config)?;
            debug_run(gateway, &config, &workflow_id, trigger, data, breakpoints, step).await
        }
    }
}

fn connect(config: &EditorConfig) -> CliResult<Arc<HttpGateway>> {
    let gateway = HttpGateway::new(config.gateway.clone()).map_err(|report| {
        report.context(CliError::Config {
            reason: "cannot build gateway client".to_string(),
        })
    })?;
    debug!(base_url = %config.gateway.base_url, "using persistence service");
    Ok(Arc::new(gateway))
}

async fn open_editor<G: PersistenceGateway + Clone>(
    gateway: G,
    config: &EditorConfig,
    workflow_id: Option<&str>,
) -> CliResult<EditorController<G>> {
    let registry = NodeTypeRegistry::builtin(config.locale.clone());
    let mut editor = EditorController::new(gateway, registry, OperationGate::new());
    let workflow_id = workflow_id.map(WorkflowId::new);
    editor
        .open(workflow_id.as_ref())
        .await
        .map_err(failed("open"))?;
    Ok(editor)
}

async fn list<G: PersistenceGateway + Clone>(
    gateway: G,
    config: &EditorConfig,
    sort: SortField,
    asc: bool,
) -> CliResult {
    let editor = open_editor(gateway, config, None).await?;
    let workflows = editor
        .list_workflows(sort.sort_by(), sort_order(asc))
        .await
        .map_err(failed("list"))?;

    for workflow in workflows {
        let id = workflow.id.as_ref().map_or("-", WorkflowId::as_str);
        let updated = workflow
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{id:<32} {:<9} {updated:<16} {}", workflow.status, workflow.name);
    }
    Ok(())
}

async fn nodes<G: PersistenceGateway>(gateway: G, config: &EditorConfig) -> CliResult {
    let registry = NodeTypeRegistry::load(&gateway, config.locale.clone()).await;
    if let Some(reason) = registry.load_error() {
        eprintln!("warning: showing built-in node types ({reason})");
    }
    for (category, manifests) in registry.by_category() {
        println!("{category}:");
        for manifest in manifests {
            let kind = manifest.kind();
            println!("  {:<22} {}", manifest.name, registry.label_for(&kind));
        }
    }
    Ok(())
}

async fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    let bytes = tokio::fs::read(path).await.map_err(|e| CliError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(bytes)
}

/// Checks an export file and prints every issue found.
pub async fn validate(path: &Path) -> CliResult {
    let bytes = read_file(path).await?;
    let report = validate_bytes(&bytes).map_err(|reason| CliError::Io {
        path: path.to_path_buf(),
        reason,
    })?;

    print!("{}", render_report(&report));
    let blocking = report.blocking().count();
    if blocking > 0 {
        return Err(CliError::Invalid { blocking }.into());
    }
    Ok(())
}

fn validate_bytes(bytes: &[u8]) -> Result<ValidationReport, String> {
    let definition =
        codec::from_bytes(bytes).map_err(|report| report.current_context().to_string())?;
    let (graph, report) = check_definition(&definition).map_err(|e| e.to_string())?;
    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "workflow file parsed"
    );
    Ok(report)
}

fn render_report(report: &ValidationReport) -> String {
    if report.is_clean() {
        return "ok: no issues found\n".to_string();
    }
    let mut out = String::new();
    for issue in report.issues() {
        let level = if issue.is_blocking() { "error" } else { "warning" };
        out.push_str(&format!("{level}: {issue}\n"));
    }
    out
}

async fn export<G: PersistenceGateway + Clone>(
    gateway: G,
    config: &EditorConfig,
    workflow_id: &str,
    output: Option<&Path>,
) -> CliResult {
    let editor = open_editor(gateway, config, Some(workflow_id)).await?;
    let bytes = editor
        .export()
        .await
        .map_err(failed("export"))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &bytes)
                .await
                .map_err(|e| CliError::Io {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            println!("exported {workflow_id} to {}", path.display());
        }
        None => print!("{}", String::from_utf8_lossy(&bytes)),
    }
    Ok(())
}

async fn import<G: PersistenceGateway + Clone>(
    gateway: G,
    config: &EditorConfig,
    path: &Path,
) -> CliResult {
    let bytes = read_file(path).await?;
    let mut editor = open_editor(gateway, config, None).await?;
    let id = editor
        .import(&bytes)
        .await
        .map_err(failed("import"))?;
    println!("imported as {id}");
    Ok(())
}

async fn execute<G: PersistenceGateway + Clone>(
    gateway: G,
    config: &EditorConfig,
    workflow_id: &str,
    trigger: TriggerType,
    data: JsonMap,
) -> CliResult {
    let editor = open_editor(gateway, config, Some(workflow_id)).await?;
    let response = editor
        .execute(trigger, data)
        .await
        .map_err(failed("execute"))?;
    match response.status {
        Some(status) => println!("execution {} {status}", response.execution_id),
        None => println!("execution {} started", response.execution_id),
    }
    Ok(())
}

async fn debug_run<G: PersistenceGateway + Clone>(
    gateway: G,
    config: &EditorConfig,
    workflow_id: &str,
    trigger: TriggerType,
    data: JsonMap,
    breakpoints: Vec<NodeId>,
    step: bool,
) -> CliResult {
    let editor = open_editor(gateway.clone(), config, Some(workflow_id)).await?;
    let gate = editor.gate().clone();
    let target = editor
        .debug_target(trigger)
        .map_err(|e| failed("debug")(Report::<DebugError>::from(e)))?
        .with_trigger_data(data);

    let mut controller = DebugSessionController::new(gateway, gate);
    let mut state = controller
        .start(&target, breakpoints, step)
        .await
        .map_err(failed("debug"))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while state == DebugState::Paused {
        let at = controller
            .session()
            .and_then(|s| s.current_node())
            .map(ToString::to_string)
            .unwrap_or_default();
        eprint!("paused at {at}; press Enter to step ");
        let line = lines.next_line().await.map_err(|e| CliError::Io {
            path: "<stdin>".into(),
            reason: e.to_string(),
        })?;
        if line.is_none() {
            controller.reset();
            eprintln!();
            println!("debug session abandoned");
            return Ok(());
        }
        state = controller
            .step()
            .map_err(|e| failed("step")(Report::<DebugError>::from(e)))?;
    }

    if let Some(session) = controller.session() {
        print_session(session);
    }
    Ok(())
}

fn print_session(session: &flowdeck_editor::DebugSession) {
    for record in session.records() {
        match &record.error {
            Some(error) => println!("{:<8} {} ({error})", record.status, record.node_id),
            None => println!("{:<8} {}", record.status, record.node_id),
        }
    }
    if !session.variables().is_empty() {
        println!("variables:");
        for (name, value) in session.variables() {
            println!("  {name} = {value}");
        }
    }
    match session.failure() {
        Some(reason) => println!("run {}: {reason}", session.state()),
        None => println!("run {}", session.state()),
    }
}

fn parse_trigger(raw: Option<&str>, config: &EditorConfig) -> CliResult<TriggerType> {
    let Some(raw) = raw else {
        return Ok(config.debug.default_trigger);
    };
    let trigger = serde_json::from_value(JsonValue::String(raw.to_string())).map_err(|e| {
        CliError::InvalidArgument {
            name: "trigger",
            reason: e.to_string(),
        }
    })?;
    Ok(trigger)
}

fn parse_trigger_data(raw: &str) -> CliResult<JsonMap> {
    match serde_json::from_str(raw) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(CliError::InvalidArgument {
            name: "data",
            reason: "expected a JSON object".to_string(),
        }
        .into()),
        Err(e) => Err(CliError::InvalidArgument {
            name: "data",
            reason: e.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdeck_gateway::{GatewayCall, InMemoryGateway};
    use std::io::Write;

    const GREETER: &str = r"
workflow:
  name: Greeter
  nodes:
    - id: start_1
      type: event_start
      name: Start
      config:
        trigger_type: person_message
    - id: reply_1
      type: reply_message
      name: Reply
      config:
        content: Hello
    - id: end_1
      type: end
      name: End
  edges:
    - id: e1
      source: start_1
      target: reply_1
    - id: e2
      source: reply_1
      target: end_1
";

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[tokio::test]
    async fn clean_file_validates() {
        let file = write_temp(GREETER);
        validate(file.path()).await.expect("valid");
    }

    #[tokio::test]
    async fn blocking_issue_fails_validation() {
        let broken = GREETER.replace("target: reply_1", "target: start_1");
        let file = write_temp(&broken);

        let err = validate(file.path()).await.expect_err("should fail");
        assert!(matches!(
            err.current_context(),
            CliError::Invalid { blocking } if *blocking > 0
        ));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = validate(&dir.path().join("absent.yaml"))
            .await
            .expect_err("should fail");
        assert!(matches!(err.current_context(), CliError::Io { .. }));
    }

    #[test]
    fn report_lists_every_issue() {
        let report = validate_bytes(b"name: ''\nnodes: []\n").expect("parse");
        assert_eq!(render_report(&report), "error: workflow name is empty\n");
        let clean = validate_bytes(GREETER.as_bytes()).expect("parse");
        assert_eq!(render_report(&clean), "ok: no issues found\n");
    }

    #[tokio::test]
    async fn debug_runs_saved_workflow_to_completion() {
        let gateway = InMemoryGateway::new();
        let definition = codec::from_bytes(GREETER.as_bytes()).expect("parse");
        let id = gateway.insert(definition).await;

        debug_run(
            gateway.clone(),
            &EditorConfig::default(),
            id.as_str(),
            TriggerType::PersonMessage,
            JsonMap::new(),
            Vec::new(),
            false,
        )
        .await
        .expect("debug");

        let requests = gateway.debug_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].trigger, TriggerType::PersonMessage);
        assert!(!requests[0].step_mode);
    }

    #[tokio::test]
    async fn debug_of_missing_workflow_fails_on_open() {
        let gateway = InMemoryGateway::new();

        let err = debug_run(
            gateway.clone(),
            &EditorConfig::default(),
            "wf_missing",
            TriggerType::PersonMessage,
            JsonMap::new(),
            Vec::new(),
            false,
        )
        .await
        .expect_err("should fail");

        assert_eq!(
            err.current_context(),
            &CliError::Command { command: "open" }
        );
        assert_eq!(
            gateway.calls().await,
            vec![GatewayCall::GetWorkflow(WorkflowId::new("wf_missing"))]
        );
    }

    #[test]
    fn trigger_falls_back_to_config() {
        let config = EditorConfig::default();
        assert_eq!(
            parse_trigger(None, &config).expect("default"),
            TriggerType::PersonMessage
        );
        assert_eq!(
            parse_trigger(Some("schedule"), &config).expect("alias"),
            TriggerType::Scheduled
        );
        assert!(parse_trigger(Some("carrier_pigeon"), &config).is_err());
    }

    #[test]
    fn trigger_data_must_be_an_object() {
        assert_eq!(
            parse_trigger_data(r#"{"text": "hi"}"#)
                .expect("object")
                .get("text"),
            Some(&serde_json::json!("hi"))
        );
        assert!(parse_trigger_data("[1]").is_err());
        assert!(parse_trigger_data("{").is_err());
    }
}
