//! Tool/resource registry and the execution context it runs against.
//!
//! The dispatcher never reads process-wide clients. Every call receives an
//! [`ExecutionContext`] holding the client pair resolved for *that* request, so
//! concurrent calls with different credentials cannot observe each other.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::types::{ResourceDescriptor, ToolContent, ToolDescriptor};
use crate::upstream::{ServiceClient, UpstreamError};

const DEFAULT_MAX_RESULTS: u64 = 20;

/// The client pair active for one dispatcher invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub issue_tracker: Arc<ServiceClient>,
    pub wiki: Arc<ServiceClient>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn tools(&self) -> Vec<ToolDescriptor>;

    async fn call_tool(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        arguments: &Value,
    ) -> Result<Vec<ToolContent>, DispatchError>;

    async fn list_resources(&self, ctx: &ExecutionContext) -> Result<Vec<ResourceDescriptor>, DispatchError>;
}

// ── Jira / Confluence catalog ───────────────────────────────────────────────

/// Default dispatcher: thin tools over the Jira and Confluence REST APIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtlassianDispatcher;

#[async_trait]
impl Dispatcher for AtlassianDispatcher {
    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            tool("get-issue", "Get a Jira issue by key.", json!({
                "type": "object",
                "properties": {
                    "issue_key": { "type": "string", "description": "Issue key, e.g. PROJ-123" }
                },
                "required": ["issue_key"]
            })),
            tool("search-issues", "Search Jira issues with JQL.", json!({
                "type": "object",
                "properties": {
                    "jql": { "type": "string", "description": "JQL query" },
                    "max_results": { "type": "integer", "description": "Maximum issues to return (default 20)" }
                },
                "required": ["jql"]
            })),
            tool("get-my-assigned-issues", "List unresolved Jira issues assigned to the current user.", json!({
                "type": "object",
                "properties": {
                    "max_results": { "type": "integer", "description": "Maximum issues to return (default 20)" }
                }
            })),
            tool("get-page", "Get a Confluence page by ID, including its storage-format body.", json!({
                "type": "object",
                "properties": {
                    "page_id": { "type": "string", "description": "Confluence page ID" }
                },
                "required": ["page_id"]
            })),
            tool("search-pages", "Search Confluence content with CQL.", json!({
                "type": "object",
                "properties": {
                    "cql": { "type": "string", "description": "CQL query" },
                    "limit": { "type": "integer", "description": "Maximum results to return (default 20)" }
                },
                "required": ["cql"]
            })),
        ]
    }

    async fn call_tool(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        arguments: &Value,
    ) -> Result<Vec<ToolContent>, DispatchError> {
        let body = match name {
            "get-issue" => {
                let key = path_segment(arguments, "issue_key")?;
                ctx.issue_tracker
                    .get_json(&format!("/rest/api/2/issue/{key}"), &[])
                    .await?
            }
            "search-issues" => {
                let jql = required_str(arguments, "jql")?;
                search_issues(ctx, jql, optional_u64(arguments, "max_results")).await?
            }
            "get-my-assigned-issues" => {
                let jql = "assignee = currentUser() AND resolution = Unresolved ORDER BY updated DESC";
                search_issues(ctx, jql, optional_u64(arguments, "max_results")).await?
            }
            "get-page" => {
                let id = path_segment(arguments, "page_id")?;
                ctx.wiki
                    .get_json(
                        &format!("/rest/api/content/{id}"),
                        &[("expand", "body.storage,version,space".to_string())],
                    )
                    .await?
            }
            "search-pages" => {
                let cql = required_str(arguments, "cql")?;
                let limit = optional_u64(arguments, "limit").unwrap_or(DEFAULT_MAX_RESULTS);
                ctx.wiki
                    .get_json(
                        "/rest/api/content/search",
                        &[("cql", cql.to_string()), ("limit", limit.to_string())],
                    )
                    .await?
            }
            other => return Err(DispatchError::UnknownTool(other.to_string())),
        };

        let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
        Ok(vec![ToolContent::text(text)])
    }

    async fn list_resources(&self, ctx: &ExecutionContext) -> Result<Vec<ResourceDescriptor>, DispatchError> {
        Ok(vec![
            ResourceDescriptor {
                uri: "jira://projects".to_string(),
                name: "Jira Projects".to_string(),
                description: format!("Projects visible on {}", ctx.issue_tracker.config().base_url),
                mime_type: "application/json".to_string(),
            },
            ResourceDescriptor {
                uri: "confluence://spaces".to_string(),
                name: "Confluence Spaces".to_string(),
                description: format!("Spaces visible on {}", ctx.wiki.config().base_url),
                mime_type: "application/json".to_string(),
            },
        ])
    }
}

async fn search_issues(ctx: &ExecutionContext, jql: &str, max_results: Option<u64>) -> Result<Value, UpstreamError> {
    let max = max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    ctx.issue_tracker
        .get_json(
            "/rest/api/2/search",
            &[("jql", jql.to_string()), ("maxResults", max.to_string())],
        )
        .await
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, DispatchError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| DispatchError::InvalidArguments(format!("'{key}' is required")))
}

/// A value spliced into an upstream URL path: one segment of letters,
/// digits, `-` and `_`, so it can neither climb the path nor add a query.
fn path_segment<'a>(args: &'a Value, key: &str) -> Result<&'a str, DispatchError> {
    let value = required_str(args, key)?;
    if value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        Ok(value)
    } else {
        Err(DispatchError::InvalidArguments(format!(
            "'{key}' may only contain letters, digits, '-' and '_'"
        )))
    }
}

fn optional_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}
