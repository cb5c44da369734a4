//! Tool definitions and dispatch.
//!
//! Every user-facing operation is a [`Tool`]: it receives JSON parameters
//! and a [`ToolContext`] (configuration, gateway, notifier) and returns a
//! tagged [`CallResult`]. Tools never panic and never surface a transport
//! error directly — failures come back as data for the caller to present.
//! The same registry backs the CLI, the JSON HTTP API, and the MCP bridge.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::fetch;
use crate::filter::{self, FilterArgs};
use crate::gateway::Gateway;
use crate::models::{CallResult, WorkItem};
use crate::notify::Notifier;
use crate::score;
use crate::wiql;

/// A tool that agents can discover and call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, used as the route path and
    /// MCP tool name.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with already-typed parameters. Malformed arguments yield a
    /// tagged error result, not an `Err`.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> CallResult;
}

/// Context bridge for tool execution: shared configuration, the HTTP
/// gateway, and the notification sink for this invocation.
pub struct ToolContext {
    pub config: Arc<Config>,
    pub gateway: Arc<Gateway>,
    pub notifier: Arc<dyn Notifier>,
}

impl ToolContext {
    pub fn new(config: Arc<Config>, gateway: Arc<Gateway>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            gateway,
            notifier,
        }
    }
}

// ============ Parameter helpers ============

fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn opt_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, CallResult> {
    match opt_str(params, key) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                CallResult::fail(format!("{} must be a YYYY-MM-DD date, got '{}'", key, raw))
            }),
    }
}

fn opt_ids(params: &Value, key: &str) -> Result<Option<Vec<i64>>, CallResult> {
    let Some(raw) = params.get(key) else {
        return Ok(None);
    };
    if raw.is_null() {
        return Ok(None);
    }
    let items = raw
        .as_array()
        .ok_or_else(|| CallResult::fail(format!("{} must be an array of integers", key)))?;
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .as_i64()
            .ok_or_else(|| CallResult::fail(format!("{} contains a non-numeric id", key)))?;
        ids.push(id);
    }
    Ok(Some(ids))
}

/// Resolve candidates or take the caller's id list, then expand details.
async fn candidate_records(
    ctx: &ToolContext,
    work_item_type: Option<&str>,
    restrict_ids: Option<Vec<i64>>,
    cap: usize,
) -> Result<Vec<WorkItem>, CallResult> {
    let mut ids = match restrict_ids {
        Some(ids) => ids,
        None => {
            wiql::resolve_ids(
                &ctx.gateway,
                &ctx.config,
                work_item_type,
                cap,
                ctx.notifier.as_ref(),
            )
            .await?
        }
    };
    ids.truncate(cap);
    Ok(fetch::fetch_details(&ctx.gateway, &ctx.config, &ids, ctx.notifier.as_ref()).await)
}

// ============ search_work_items ============

/// Rank work items against a free-text query over titles and discussion.
pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search_work_items"
    }

    fn description(&self) -> &str {
        "Search work item titles and discussion text for a phrase, ranked by relevance"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Free-text search phrase" },
                "work_item_type": { "type": "string", "description": "Restrict to a declared type like Bug or Task" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> CallResult {
        let Some(query) = opt_str(&params, "query") else {
            return CallResult::fail("query must not be empty");
        };
        let work_item_type = opt_str(&params, "work_item_type");

        let cap = ctx.config.query.search_cap;
        let items =
            match candidate_records(ctx, work_item_type.as_deref(), None, cap).await {
                Ok(items) => items,
                Err(err) => return err,
            };

        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let comments =
            fetch::fetch_comments(ctx.gateway.clone(), &ctx.config, &ids, ctx.notifier.clone())
                .await;

        let scored_input: Vec<(WorkItem, String)> = items
            .into_iter()
            .map(|item| {
                let text = comments.get(&item.id).map(String::as_str).unwrap_or("");
                let discussion = fetch::discussion_text(&item, text);
                (item, discussion)
            })
            .collect();

        let matches = score::rank(&query, &scored_input);
        if matches.is_empty() {
            return CallResult::ok(format!("No work items matched '{}'.", query), None);
        }

        let mut text = String::new();
        for (i, m) in matches.iter().enumerate() {
            text.push_str(&format!(
                "{}. [{:.2}] #{} {} ({})\n    excerpt: \"{}\"\n",
                i + 1,
                m.score,
                m.id,
                m.title,
                m.state,
                m.excerpt
            ));
        }
        let json = serde_json::json!({ "matches": matches });
        CallResult::ok(text.trim_end().to_string(), Some(json))
    }
}

// ============ filter_work_items ============

/// Filter work items through a natural-language temporal/status window.
pub struct FilterTool;

#[async_trait]
impl Tool for FilterTool {
    fn name(&self) -> &str {
        "filter_work_items"
    }

    fn description(&self) -> &str {
        "Filter work items by a natural-language date/status phrase like 'overdue' or 'completed last month'"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filter": { "type": "string", "description": "Natural-language filter phrase" },
                "start_date": { "type": "string", "description": "Explicit window start (YYYY-MM-DD)" },
                "end_date": { "type": "string", "description": "Explicit window end (YYYY-MM-DD)" },
                "status": { "type": "string", "description": "Exact state to require" },
                "ids": { "type": "array", "items": { "type": "integer" }, "description": "Restrict to these work item ids" },
                "work_item_type": { "type": "string", "description": "Restrict to a declared type" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> CallResult {
        let explicit_start = match opt_date(&params, "start_date") {
            Ok(d) => d,
            Err(err) => return err,
        };
        let explicit_end = match opt_date(&params, "end_date") {
            Ok(d) => d,
            Err(err) => return err,
        };
        let restrict_ids = match opt_ids(&params, "ids") {
            Ok(ids) => ids,
            Err(err) => return err,
        };

        let args = FilterArgs {
            query_phrase: opt_str(&params, "filter"),
            explicit_start,
            explicit_end,
            explicit_status: opt_str(&params, "status"),
            restrict_ids,
        };
        let work_item_type = opt_str(&params, "work_item_type");

        let cap = ctx.config.query.filter_cap;
        let items = match candidate_records(
            ctx,
            work_item_type.as_deref(),
            args.restrict_ids.clone(),
            cap,
        )
        .await
        {
            Ok(items) => items,
            Err(err) => return err,
        };

        let today = Utc::now().date_naive();
        let plan = filter::parse_filter(&args, today);
        let candidates = &ctx.config.fields.date_candidates;

        let kept: Vec<&WorkItem> = items
            .iter()
            .filter(|item| filter::matches(&plan, item, candidates))
            .collect();

        if kept.is_empty() {
            return CallResult::ok("No work items matched the filter.", None);
        }

        let mut text = String::new();
        let mut rows = Vec::with_capacity(kept.len());
        for item in &kept {
            let date = filter::discover_date(&item.fields, candidates, plan.target_date_only)
                .map(|d| d.format("%Y-%m-%d").to_string());
            text.push_str(&format!(
                "#{} {} ({}){}\n",
                item.id,
                item.title(),
                item.state(),
                date.as_deref()
                    .map(|d| format!(" — {}", d))
                    .unwrap_or_default()
            ));
            rows.push(serde_json::json!({
                "id": item.id,
                "title": item.title(),
                "state": item.state(),
                "date": date,
            }));
        }
        let json = serde_json::json!({ "items": rows });
        CallResult::ok(text.trim_end().to_string(), Some(json))
    }
}

// ============ get_work_item ============

/// Fetch a single work item with its discussion text.
pub struct GetTool;

#[async_trait]
impl Tool for GetTool {
    fn name(&self) -> &str {
        "get_work_item"
    }

    fn description(&self) -> &str {
        "Fetch one work item by id, including fields, relations, and discussion"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer", "description": "Work item id" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> CallResult {
        let Some(id) = params.get("id").and_then(|v| v.as_i64()) else {
            return CallResult::fail("id must be an integer");
        };

        // Primary fetch: its failure is the operation's result.
        let item =
            match fetch::fetch_detail(&ctx.gateway, &ctx.config, id, ctx.notifier.as_ref()).await {
                Ok(item) => item,
                Err(err) => return err,
            };

        let comments = fetch::fetch_comments(
            ctx.gateway.clone(),
            &ctx.config,
            &[id],
            ctx.notifier.clone(),
        )
        .await;
        let discussion = fetch::discussion_text(
            &item,
            comments.get(&id).map(String::as_str).unwrap_or(""),
        );

        let json = serde_json::json!({
            "id": item.id,
            "fields": item.fields,
            "relations": item.relations,
            "discussion": discussion,
        });
        let text = format!(
            "#{} {} ({})\n{}",
            item.id,
            item.title(),
            item.state(),
            discussion
        );
        CallResult::ok(text, Some(json))
    }
}

// ============ list_work_items ============

/// Plain listing of work items of a declared type.
pub struct ListTool;

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &str {
        "list_work_items"
    }

    fn description(&self) -> &str {
        "List work items of a given type, most recently changed first"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "work_item_type": { "type": "string", "description": "Work item type like Bug, Task, User Story" }
            },
            "required": ["work_item_type"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> CallResult {
        let Some(work_item_type) = opt_str(&params, "work_item_type") else {
            return CallResult::fail("work_item_type must not be empty");
        };

        let cap = ctx.config.query.list_cap;
        let items = match candidate_records(ctx, Some(&work_item_type), None, cap).await {
            Ok(items) => items,
            Err(err) => return err,
        };

        if items.is_empty() {
            return CallResult::ok(format!("No {} work items found.", work_item_type), None);
        }

        let mut text = String::new();
        let mut rows = Vec::with_capacity(items.len());
        for item in &items {
            text.push_str(&format!(
                "ID: {}, Title: {}, State: {}\n",
                item.id,
                item.title(),
                item.state()
            ));
            rows.push(serde_json::json!({
                "id": item.id,
                "title": item.title(),
                "state": item.state(),
            }));
        }
        let json = serde_json::json!({ "items": rows });
        CallResult::ok(text.trim_end().to_string(), Some(json))
    }
}

// ============ Registry ============

/// Registry of callable tools, shared by the CLI, HTTP API, and MCP bridge.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with the built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchTool));
        registry.register(Box::new(FilterTool));
        registry.register(Box::new(GetTool));
        registry.register(Box::new(ListTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
