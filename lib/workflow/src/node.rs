//! Workflow node types and configurations.
//!
//! Nodes are the building blocks of workflows. Each node has:
//! - A unique ID within the workflow
//! - A kind (the registry key: `event_start`, `http_request`, ...)
//! - Configuration whose shape is fixed by the kind
//! - A purely visual position on the editor canvas
//!
//! Every typed config keeps the cross-cutting [`AdvancedSettings`] and any
//! field it does not know about, so definitions written by a newer editor
//! survive a load/save cycle untouched.

use crate::definition::TriggerType;
use crate::edge::EdgeCondition;
use crate::error::ConfigError;
use flowdeck_core::NodeId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// A JSON object, used for free-form mappings and preserved unknown fields.
pub type JsonMap = Map<String, JsonValue>;

/// The kind of a workflow node, as stored in the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    /// Entry point fired by an incoming chat message.
    EventStart,
    /// Entry point fired by a cron schedule.
    ScheduleStart,
    /// Evaluates conditions and follows one tagged branch.
    Condition,
    /// Routes chat messages vs. commands by prefix.
    ChatCommandBranch,
    /// Performs an outbound HTTP request.
    HttpRequest,
    /// Reads or writes a binary blob by key.
    BinaryStorage,
    /// Reads or writes a file through a storage provider.
    FileStorage,
    /// Extracts, sets, or (de)serializes JSON values.
    JsonProcessor,
    /// Sends a reply to the triggering conversation.
    ReplyMessage,
    /// Writes a workflow variable.
    SetVariable,
    /// Reads a workflow variable.
    GetVariable,
    /// Invokes a plugin tool.
    ToolAction,
    /// Terminates the workflow.
    End,
    /// A node type this build does not know about.
    Custom(String),
}

impl NodeKind {
    /// Every built-in node kind, in palette order.
    #[must_use]
    pub fn builtin() -> [NodeKind; 13] {
        [
            Self::EventStart,
            Self::ScheduleStart,
            Self::Condition,
            Self::ChatCommandBranch,
            Self::HttpRequest,
            Self::BinaryStorage,
            Self::FileStorage,
            Self::JsonProcessor,
            Self::ReplyMessage,
            Self::SetVariable,
            Self::GetVariable,
            Self::ToolAction,
            Self::End,
        ]
    }

    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::EventStart => "event_start",
            Self::ScheduleStart => "schedule_start",
            Self::Condition => "condition",
            Self::ChatCommandBranch => "chat_command_branch",
            Self::HttpRequest => "http_request",
            Self::BinaryStorage => "binary_storage",
            Self::FileStorage => "file_storage",
            Self::JsonProcessor => "json_processor",
            Self::ReplyMessage => "reply_message",
            Self::SetVariable => "set_variable",
            Self::GetVariable => "get_variable",
            Self::ToolAction => "tool_action",
            Self::End => "end",
            Self::Custom(name) => name,
        }
    }

    /// Start nodes accept no inbound edges.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::EventStart | Self::ScheduleStart)
    }

    /// End nodes emit no outbound edges.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Branching nodes tag each outgoing edge with a discriminator.
    #[must_use]
    pub fn is_branching(&self) -> bool {
        matches!(self, Self::Condition | Self::ChatCommandBranch)
    }

    /// Returns the editable fields this kind declares, in form order.
    ///
    /// The cross-cutting advanced fields are not included; see
    /// [`ADVANCED_FIELDS`].
    #[must_use]
    pub fn config_fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::EventStart => EVENT_START_FIELDS,
            Self::ScheduleStart => SCHEDULE_START_FIELDS,
            Self::Condition => CONDITION_FIELDS,
            Self::ChatCommandBranch => CHAT_COMMAND_BRANCH_FIELDS,
            Self::HttpRequest => HTTP_REQUEST_FIELDS,
            Self::BinaryStorage => BINARY_STORAGE_FIELDS,
            Self::FileStorage => FILE_STORAGE_FIELDS,
            Self::JsonProcessor => JSON_PROCESSOR_FIELDS,
            Self::ReplyMessage => REPLY_MESSAGE_FIELDS,
            Self::SetVariable => SET_VARIABLE_FIELDS,
            Self::GetVariable => GET_VARIABLE_FIELDS,
            Self::ToolAction => TOOL_ACTION_FIELDS,
            Self::End | Self::Custom(_) => &[],
        }
    }

    /// Looks up a field declaration by name, including advanced fields.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.config_fields()
            .iter()
            .chain(ADVANCED_FIELDS.iter())
            .find(|f| f.name == name)
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        Self::builtin()
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .unwrap_or_else(|| Self::Custom(s.to_string()))
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an editor form should treat a config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text, applied verbatim.
    Text,
    /// Whole number.
    Integer,
    /// One of a fixed set of strings.
    Choice(&'static [&'static str]),
    /// A JSON object typed as text.
    Mapping,
    /// A JSON array typed as text.
    List,
    /// Any JSON value typed as text.
    Any,
}

impl FieldKind {
    /// Returns true if the raw input must parse as JSON before it is applied.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Mapping | Self::List | Self::Any)
    }
}

/// Declaration of one editable config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Key in the persisted config object.
    pub name: &'static str,
    /// Editing behaviour.
    pub kind: FieldKind,
    /// Whether validation reports the field when it is absent.
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldKind, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required,
    }
}

const MESSAGE_TRIGGERS: &[&str] = &["person_message", "group_message"];
const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "HEAD"];
const JSON_OPERATIONS: &[&str] = &["extract", "set", "serialize", "deserialize"];
const STORAGE_OPERATIONS: &[&str] = &["save", "load", "delete"];

/// Fields every node accepts regardless of kind.
pub const ADVANCED_FIELDS: &[FieldSpec] = &[
    field("timeout", FieldKind::Integer, false),
    field("retry", FieldKind::Integer, false),
    field("error_handler", FieldKind::Choice(&["fail", "skip", "retry"]), false),
];

const EVENT_START_FIELDS: &[FieldSpec] = &[
    field("trigger_type", FieldKind::Choice(MESSAGE_TRIGGERS), true),
    field("filters", FieldKind::Mapping, false),
];
const SCHEDULE_START_FIELDS: &[FieldSpec] = &[
    field("cron_expression", FieldKind::Text, true),
    field("timezone", FieldKind::Text, false),
];
const CONDITION_FIELDS: &[FieldSpec] = &[
    field("conditions", FieldKind::List, true),
    field("default_branch", FieldKind::Text, false),
];
const CHAT_COMMAND_BRANCH_FIELDS: &[FieldSpec] = &[
    field("command_prefix", FieldKind::Text, false),
    field("rules", FieldKind::List, false),
];
const HTTP_REQUEST_FIELDS: &[FieldSpec] = &[
    field("method", FieldKind::Choice(HTTP_METHODS), true),
    field("url", FieldKind::Text, true),
    field("headers", FieldKind::Mapping, false),
    field("body", FieldKind::Any, false),
    field("auth", FieldKind::Mapping, false),
];
const BINARY_STORAGE_FIELDS: &[FieldSpec] = &[
    field("operation", FieldKind::Choice(STORAGE_OPERATIONS), false),
    field("key", FieldKind::Text, true),
    field("value", FieldKind::Any, false),
];
const FILE_STORAGE_FIELDS: &[FieldSpec] = &[
    field("provider", FieldKind::Text, false),
    field("operation", FieldKind::Choice(STORAGE_OPERATIONS), false),
    field("path", FieldKind::Text, true),
    field("content", FieldKind::Any, false),
];
const JSON_PROCESSOR_FIELDS: &[FieldSpec] = &[
    field("operation", FieldKind::Choice(JSON_OPERATIONS), true),
    field("path", FieldKind::Text, false),
    field("value", FieldKind::Any, false),
];
const REPLY_MESSAGE_FIELDS: &[FieldSpec] = &[
    field("content", FieldKind::Text, true),
    field("reply_to", FieldKind::Text, false),
    field("components", FieldKind::List, false),
];
const SET_VARIABLE_FIELDS: &[FieldSpec] = &[
    field("variable_name", FieldKind::Text, true),
    field("value", FieldKind::Any, false),
];
const GET_VARIABLE_FIELDS: &[FieldSpec] = &[
    field("variable_name", FieldKind::Text, true),
    field("default", FieldKind::Any, false),
];
const TOOL_ACTION_FIELDS: &[FieldSpec] = &[
    field("tool_id", FieldKind::Text, true),
    field("parameters", FieldKind::Mapping, false),
];

/// What happens to a run when a node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandler {
    /// Halt the run.
    #[default]
    #[serde(alias = "stop")]
    Fail,
    /// Mark the node skipped and continue downstream.
    Skip,
    /// Re-attempt up to `retry` times, then fail.
    Retry,
}

/// Cross-cutting settings accepted by every node kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdvancedSettings {
    /// Timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Number of retries on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    /// Failure strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handler: Option<ErrorHandler>,
}

impl AdvancedSettings {
    /// Returns the configured failure strategy, defaulting to fail.
    #[must_use]
    pub fn error_handler(&self) -> ErrorHandler {
        self.error_handler.unwrap_or_default()
    }
}

/// Configuration for `event_start` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventStartConfig {
    /// Which message event fires the workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_type: Option<TriggerType>,
    /// Event filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<JsonMap>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Configuration for `schedule_start` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleStartConfig {
    /// Cron expression, e.g. `0 7 * * *`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    /// IANA timezone name; `UTC` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl ScheduleStartConfig {
    /// Returns the effective timezone.
    #[must_use]
    pub fn timezone(&self) -> &str {
        self.timezone.as_deref().unwrap_or("UTC")
    }
}

/// Configuration for `condition` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Conditions, evaluated in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<EdgeCondition>>,
    /// Branch followed when nothing matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// A prefix routing rule for `chat_command_branch` nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    /// Message prefix that selects the branch.
    pub prefix: String,
    /// Branch name followed on match.
    pub branch: String,
}

/// Configuration for `chat_command_branch` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatCommandBranchConfig {
    /// Prefix that marks a message as a command; `/` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_prefix: Option<String>,
    /// Additional prefix rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<PrefixRule>>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// HTTP methods accepted by `http_request` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

/// Configuration for `http_request` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HttpRequestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<JsonMap>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Configuration for `binary_storage` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BinaryStorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Configuration for `file_storage` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileStorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<JsonValue>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Operations supported by `json_processor` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonOperation {
    Extract,
    Set,
    Serialize,
    Deserialize,
}

/// Configuration for `json_processor` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JsonProcessorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<JsonOperation>,
    /// JSON path, used by extract and set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Value written by set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Configuration for `reply_message` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplyMessageConfig {
    /// Message text; may embed `${variable}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<JsonValue>>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl ReplyMessageConfig {
    /// Returns the `${...}` placeholder names used in `content`, in order.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.content.as_deref().unwrap_or_default();
        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                break;
            };
            names.push(after[..end].trim());
            rest = &after[end + 1..];
        }
        names
    }
}

/// Configuration for `set_variable` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SetVariableConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Configuration for `get_variable` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetVariableConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Configuration for `tool_action` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolActionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonMap>,
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Configuration for `end` nodes and for kinds without declared fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlainConfig {
    #[serde(flatten)]
    pub advanced: AdvancedSettings,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Configuration for a node, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    EventStart(EventStartConfig),
    ScheduleStart(ScheduleStartConfig),
    Condition(ConditionConfig),
    ChatCommandBranch(ChatCommandBranchConfig),
    HttpRequest(HttpRequestConfig),
    BinaryStorage(BinaryStorageConfig),
    FileStorage(FileStorageConfig),
    JsonProcessor(JsonProcessorConfig),
    ReplyMessage(ReplyMessageConfig),
    SetVariable(SetVariableConfig),
    GetVariable(GetVariableConfig),
    ToolAction(ToolActionConfig),
    End(PlainConfig),
    /// Unknown kind; the config is kept as-is.
    Custom {
        node_type: String,
        config: PlainConfig,
    },
}

/// Applies `$body` to the typed config inside any variant.
macro_rules! with_config {
    ($value:expr, $cfg:ident => $body:expr) => {
        match $value {
            NodeConfig::EventStart($cfg) => $body,
            NodeConfig::ScheduleStart($cfg) => $body,
            NodeConfig::Condition($cfg) => $body,
            NodeConfig::ChatCommandBranch($cfg) => $body,
            NodeConfig::HttpRequest($cfg) => $body,
            NodeConfig::BinaryStorage($cfg) => $body,
            NodeConfig::FileStorage($cfg) => $body,
            NodeConfig::JsonProcessor($cfg) => $body,
            NodeConfig::ReplyMessage($cfg) => $body,
            NodeConfig::SetVariable($cfg) => $body,
            NodeConfig::GetVariable($cfg) => $body,
            NodeConfig::ToolAction($cfg) => $body,
            NodeConfig::End($cfg) => $body,
            NodeConfig::Custom { config: $cfg, .. } => $body,
        }
    };
}

fn parse_typed<T: DeserializeOwned>(kind: &NodeKind, map: JsonMap) -> Result<T, ConfigError> {
    serde_json::from_value(JsonValue::Object(map)).map_err(|e| ConfigError::Malformed {
        node_type: kind.to_string(),
        reason: e.to_string(),
    })
}

impl NodeConfig {
    /// Returns an empty configuration for the given kind.
    #[must_use]
    pub fn empty(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::EventStart => Self::EventStart(EventStartConfig::default()),
            NodeKind::ScheduleStart => Self::ScheduleStart(ScheduleStartConfig::default()),
            NodeKind::Condition => Self::Condition(ConditionConfig::default()),
            NodeKind::ChatCommandBranch => {
                Self::ChatCommandBranch(ChatCommandBranchConfig::default())
            }
            NodeKind::HttpRequest => Self::HttpRequest(HttpRequestConfig::default()),
            NodeKind::BinaryStorage => Self::BinaryStorage(BinaryStorageConfig::default()),
            NodeKind::FileStorage => Self::FileStorage(FileStorageConfig::default()),
            NodeKind::JsonProcessor => Self::JsonProcessor(JsonProcessorConfig::default()),
            NodeKind::ReplyMessage => Self::ReplyMessage(ReplyMessageConfig::default()),
            NodeKind::SetVariable => Self::SetVariable(SetVariableConfig::default()),
            NodeKind::GetVariable => Self::GetVariable(GetVariableConfig::default()),
            NodeKind::ToolAction => Self::ToolAction(ToolActionConfig::default()),
            NodeKind::End => Self::End(PlainConfig::default()),
            NodeKind::Custom(name) => Self::Custom {
                node_type: name.clone(),
                config: PlainConfig::default(),
            },
        }
    }

    /// Reads a persisted config object for the given kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a declared field has the wrong shape.
    pub fn from_json(kind: &NodeKind, map: JsonMap) -> Result<Self, ConfigError> {
        let nulls: Vec<String> = map
            .iter()
            .filter(|(_, value)| value.is_null())
            .map(|(key, _)| key.clone())
            .collect();
        let mut config = match kind {
            NodeKind::EventStart => Self::EventStart(parse_typed(kind, map)?),
            NodeKind::ScheduleStart => Self::ScheduleStart(parse_typed(kind, map)?),
            NodeKind::Condition => Self::Condition(parse_typed(kind, map)?),
            NodeKind::ChatCommandBranch => Self::ChatCommandBranch(parse_typed(kind, map)?),
            NodeKind::HttpRequest => Self::HttpRequest(parse_typed(kind, map)?),
            NodeKind::BinaryStorage => Self::BinaryStorage(parse_typed(kind, map)?),
            NodeKind::FileStorage => Self::FileStorage(parse_typed(kind, map)?),
            NodeKind::JsonProcessor => Self::JsonProcessor(parse_typed(kind, map)?),
            NodeKind::ReplyMessage => Self::ReplyMessage(parse_typed(kind, map)?),
            NodeKind::SetVariable => Self::SetVariable(parse_typed(kind, map)?),
            NodeKind::GetVariable => Self::GetVariable(parse_typed(kind, map)?),
            NodeKind::ToolAction => Self::ToolAction(parse_typed(kind, map)?),
            NodeKind::End => Self::End(parse_typed(kind, map)?),
            NodeKind::Custom(name) => Self::Custom {
                node_type: name.clone(),
                config: parse_typed(kind, map)?,
            },
        };
        // Declared fields read `null` as absent; keep the null so it is written back.
        with_config!(&mut config, cfg => {
            for key in nulls {
                cfg.extra.entry(key).or_insert(JsonValue::Null);
            }
        });
        Ok(config)
    }

    /// Writes this configuration as a persisted config object.
    #[must_use]
    pub fn to_json(&self) -> JsonMap {
        let (value, nulls) = with_config!(self, cfg => {
            let mut cfg = cfg.clone();
            let nulls: Vec<String> = cfg
                .extra
                .iter()
                .filter(|(_, value)| value.is_null())
                .map(|(key, _)| key.clone())
                .collect();
            cfg.extra.retain(|_, value| !value.is_null());
            (serde_json::to_value(&cfg), nulls)
        });
        let mut map = match value {
            Ok(JsonValue::Object(map)) => map,
            _ => JsonMap::new(),
        };
        for key in nulls {
            map.entry(key).or_insert(JsonValue::Null);
        }
        map
    }

    /// Returns the kind this configuration belongs to.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::EventStart(_) => NodeKind::EventStart,
            Self::ScheduleStart(_) => NodeKind::ScheduleStart,
            Self::Condition(_) => NodeKind::Condition,
            Self::ChatCommandBranch(_) => NodeKind::ChatCommandBranch,
            Self::HttpRequest(_) => NodeKind::HttpRequest,
            Self::BinaryStorage(_) => NodeKind::BinaryStorage,
            Self::FileStorage(_) => NodeKind::FileStorage,
            Self::JsonProcessor(_) => NodeKind::JsonProcessor,
            Self::ReplyMessage(_) => NodeKind::ReplyMessage,
            Self::SetVariable(_) => NodeKind::SetVariable,
            Self::GetVariable(_) => NodeKind::GetVariable,
            Self::ToolAction(_) => NodeKind::ToolAction,
            Self::End(_) => NodeKind::End,
            Self::Custom { node_type, .. } => NodeKind::Custom(node_type.clone()),
        }
    }

    /// Returns the cross-cutting settings.
    #[must_use]
    pub fn advanced(&self) -> &AdvancedSettings {
        with_config!(self, cfg => &cfg.advanced)
    }

    /// Returns the fields this config carries that its kind does not declare.
    #[must_use]
    pub fn extra(&self) -> &JsonMap {
        with_config!(self, cfg => &cfg.extra)
    }

    /// Merges a partial config into this one.
    ///
    /// Keys in `patch` overwrite existing keys, a `null` value removes the
    /// key, and keys absent from `patch` are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged object no longer fits the kind.
    pub fn merge(&self, patch: &JsonMap) -> Result<Self, ConfigError> {
        let mut merged = self.to_json();
        for (key, value) in patch {
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        Self::from_json(&self.kind(), merged)
    }

    /// Returns the names of required fields that are absent or empty.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        let json = self.to_json();
        self.kind()
            .config_fields()
            .iter()
            .filter(|spec| spec.required)
            .filter(|spec| match json.get(spec.name) {
                None | Some(JsonValue::Null) => true,
                Some(JsonValue::String(s)) => s.trim().is_empty(),
                Some(JsonValue::Array(items)) => items.is_empty(),
                Some(_) => false,
            })
            .map(|spec| spec.name)
            .collect()
    }

    /// Returns the trigger this node implies, if it is a start node.
    #[must_use]
    pub fn implied_trigger(&self) -> Option<TriggerType> {
        match self {
            Self::EventStart(cfg) => cfg.trigger_type,
            Self::ScheduleStart(_) => Some(TriggerType::Scheduled),
            _ => None,
        }
    }
}

/// Visual position on the editor canvas. Never consulted by execution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique identifier for this node within the workflow.
    pub id: NodeId,
    /// Display label.
    pub name: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Canvas position, if one was ever recorded.
    pub position: Option<Position>,
    /// Node configuration (determines kind and behaviour).
    pub config: NodeConfig,
    /// Persisted fields outside the known node shape.
    pub extra: JsonMap,
}

impl Node {
    /// Creates a new node with an empty configuration.
    #[must_use]
    pub fn new(id: NodeId, name: impl Into<String>, kind: &NodeKind) -> Self {
        Self::with_config(id, name, NodeConfig::empty(kind))
    }

    /// Creates a new node with the given configuration.
    #[must_use]
    pub fn with_config(id: NodeId, name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            position: None,
            config,
            extra: JsonMap::new(),
        }
    }

    /// Sets the canvas position.
    #[must_use]
    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Returns the kind of this node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }
}

/// A partial update to a node. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub position: Option<Position>,
    /// Merged into the existing config, see [`NodeConfig::merge`].
    pub config: Option<JsonMap>,
}

impl NodePatch {
    /// Patch that only renames the node.
    #[must_use]
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Patch that only merges config fields.
    #[must_use]
    pub fn config(config: JsonMap) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }
}
