//! HTTP client for the workflow persistence service.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::PersistenceGateway;
use crate::types::{
    DebugRequest, DebugResponse, ExecuteRequest, ExecuteResponse, ManifestList, SortBy,
    SortOrder, WorkflowBody, WorkflowList,
};
use async_trait::async_trait;
use flowdeck_core::WorkflowId;
use flowdeck_workflow::{NodeManifest, WorkflowDefinition};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use rootcause::prelude::Report;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use ulid::Ulid;

/// Every JSON answer of the service is wrapped in `{code, msg, data}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

/// Unwraps an envelope body. A `code` other than 0 is a refusal; a refusal
/// whose message says "not found" maps to [`GatewayError::NotFound`].
fn decode_envelope<T: DeserializeOwned>(
    body: &[u8],
    resource: &str,
) -> Result<Option<T>, GatewayError> {
    let envelope: Envelope<T> =
        serde_json::from_slice(body).map_err(|e| GatewayError::Decode {
            reason: e.to_string(),
        })?;

    if envelope.code != 0 {
        if envelope.msg.to_lowercase().contains("not found") {
            return Err(GatewayError::NotFound {
                resource: resource.to_string(),
            });
        }
        return Err(GatewayError::Rejected {
            code: envelope.code,
            message: envelope.msg,
        });
    }
    Ok(envelope.data)
}

fn require_data<T>(data: Option<T>, resource: &str) -> Result<T, GatewayError> {
    data.ok_or_else(|| GatewayError::Decode {
        reason: format!("response for {resource} carried no data"),
    })
}

/// Gateway backed by the persistence service's REST API.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
    root: String,
}

impl HttpGateway {
    /// Builds a client from connection settings.
    pub fn new(config: GatewayConfig) -> Result<Self, Report<GatewayError>> {
        if config.base_url.trim().is_empty() {
            return Err(GatewayError::InvalidConfig {
                reason: "base_url is empty".to_string(),
            }
            .into());
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::InvalidConfig {
                reason: e.to_string(),
            })?;

        let root = config.workflows_url();
        Ok(Self {
            client,
            config,
            root,
        })
    }

    /// Returns the connection settings.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            self.root.clone()
        } else {
            format!("{}/{}", self.root, path)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        resource: &str,
    ) -> Result<Response, Report<GatewayError>> {
        let response = builder.send().await.map_err(|e| GatewayError::Transport {
            reason: e.to_string(),
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), resource, "response received");

        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound {
                resource: resource.to_string(),
            }
            .into());
        }
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
                .map(|envelope| envelope.msg)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(GatewayError::Status {
                code: status.as_u16(),
                message,
            }
            .into());
        }
        Ok(response)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        resource: &str,
    ) -> Result<Option<T>, Report<GatewayError>> {
        let response = self.send(builder, resource).await?;
        let body = response.bytes().await.map_err(|e| GatewayError::Transport {
            reason: e.to_string(),
        })?;
        let data = decode_envelope(&body, resource)?;
        Ok(data)
    }
}

fn fresh_workflow_id() -> WorkflowId {
    WorkflowId::new(format!(
        "workflow_{}",
        Ulid::new().to_string().to_lowercase()
    ))
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    #[instrument(skip(self))]
    async fn list_workflows(
        &self,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<Vec<WorkflowDefinition>, Report<GatewayError>> {
        let builder = self
            .request(Method::GET, "")
            .query(&[("sortBy", sort_by.as_str()), ("sortOrder", sort_order.as_str())]);
        let list: Option<WorkflowList> = self.call(builder, "workflows").await?;
        let workflows = list.map(|l| l.workflows).unwrap_or_default();
        debug!(count = workflows.len(), "workflows listed");
        Ok(workflows)
    }

    #[instrument(skip(self))]
    async fn get_node_manifests(&self) -> Result<Vec<NodeManifest>, Report<GatewayError>> {
        let list: Option<ManifestList> = self
            .call(self.request(Method::GET, "nodes"), "node manifests")
            .await?;
        Ok(list.map(|l| l.nodes).unwrap_or_default())
    }

    #[instrument(skip(self), fields(workflow_id = %id))]
    async fn get_workflow(
        &self,
        id: &WorkflowId,
    ) -> Result<WorkflowDefinition, Report<GatewayError>> {
        let resource = format!("workflow {id}");
        let body: Option<WorkflowBody> = self
            .call(self.request(Method::GET, id.as_str()), &resource)
            .await?;
        let body = require_data(body, &resource)?;
        Ok(body.workflow)
    }

    #[instrument(skip(self, definition), fields(name = %definition.name))]
    async fn create_workflow(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowDefinition, Report<GatewayError>> {
        let builder = self.request(Method::POST, "").json(definition);
        let body: Option<WorkflowBody> = self.call(builder, "new workflow").await?;
        let body = require_data(body, "new workflow")?;
        debug!(workflow_id = ?body.workflow.id, "workflow created");
        Ok(body.workflow)
    }

    #[instrument(skip(self, definition), fields(workflow_id = %id))]
    async fn update_workflow(
        &self,
        id: &WorkflowId,
        definition: &WorkflowDefinition,
    ) -> Result<(), Report<GatewayError>> {
        let builder = self
            .request(Method::PUT, &format!("update/{id}"))
            .json(definition);
        let _: Option<serde_json::Value> = self.call(builder, &format!("workflow {id}")).await?;
        debug!("workflow updated");
        Ok(())
    }

    #[instrument(skip(self), fields(workflow_id = %id))]
    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), Report<GatewayError>> {
        let _: Option<serde_json::Value> = self
            .call(
                self.request(Method::DELETE, id.as_str()),
                &format!("workflow {id}"),
            )
            .await?;
        debug!("workflow deleted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(workflow_id = %id, trigger = %request.trigger))]
    async fn execute_workflow(
        &self,
        id: &WorkflowId,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse, Report<GatewayError>> {
        let resource = format!("workflow {id}");
        let builder = self
            .request(Method::POST, &format!("{id}/execute"))
            .json(request);
        let response: Option<ExecuteResponse> = self.call(builder, &resource).await?;
        let response = require_data(response, &resource)?;
        debug!(execution_id = %response.execution_id, "execution started");
        Ok(response)
    }

    #[instrument(
        skip(self, request),
        fields(workflow_id = %id, breakpoints = request.breakpoints.len(), step_mode = request.step_mode)
    )]
    async fn start_debug(
        &self,
        id: &WorkflowId,
        request: &DebugRequest,
    ) -> Result<DebugResponse, Report<GatewayError>> {
        let resource = format!("workflow {id}");
        let builder = self
            .request(Method::POST, &format!("{id}/debug"))
            .json(request);
        let response: Option<DebugResponse> = self.call(builder, &resource).await?;
        let response = require_data(response, &resource)?;
        debug!(
            execution_id = %response.execution_id,
            status = %response.status,
            executed = response.executed_nodes.len(),
            "debug run finished"
        );
        Ok(response)
    }

    #[instrument(skip(self), fields(workflow_id = %id))]
    async fn export_workflow(&self, id: &WorkflowId) -> Result<Vec<u8>, Report<GatewayError>> {
        let response = self
            .send(
                self.request(Method::GET, &format!("{id}/export")),
                &format!("workflow {id}"),
            )
            .await?;
        let bytes = response.bytes().await.map_err(|e| GatewayError::Transport {
            reason: e.to_string(),
        })?;
        debug!(size = bytes.len(), "workflow exported");
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn import_workflow(
        &self,
        bytes: &[u8],
    ) -> Result<WorkflowDefinition, Report<GatewayError>> {
        let id = fresh_workflow_id();
        let resource = format!("workflow {id}");
        let builder = self
            .request(Method::POST, &format!("{id}/import"))
            .header(reqwest::header::CONTENT_TYPE, "text/yaml")
            .body(bytes.to_vec());
        let body: Option<WorkflowBody> = self.call(builder, &resource).await?;
        let body = require_data(body, &resource)?;
        debug!(workflow_id = %id, "workflow imported");
        Ok(body.workflow)
    }
}
