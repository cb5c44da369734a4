//! Detail and discussion fetching for resolved candidate ids.
//!
//! Two independent phases. Detail fetches run strictly sequentially (one in
//! flight at a time, keeping individual URLs bounded); a failed fetch skips
//! that id with a warning and the batch continues. Comment fetches for the
//! whole batch are then issued concurrently with no throttling beyond the
//! candidate cap already applied; a failed comment fetch degrades to an
//! empty string for that id. A record can therefore surface with details
//! but no discussion text, or be entirely absent when its detail fetch
//! failed.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::gateway::{Gateway, Method};
use crate::models::WorkItem;
use crate::notify::Notifier;

fn scoped_base(config: &Config) -> String {
    let tracker = &config.tracker;
    match &tracker.project {
        Some(project) => format!("{}/{}", tracker.org_url, project),
        None => tracker.org_url.clone(),
    }
}

fn detail_url(config: &Config, id: i64) -> String {
    format!(
        "{}/_apis/wit/workitems/{}?$expand=relations&api-version={}",
        scoped_base(config),
        id,
        config.tracker.api_version
    )
}

fn comments_url(config: &Config, id: i64) -> String {
    format!(
        "{}/_apis/wit/workItems/{}/comments?api-version={}-preview.3",
        scoped_base(config),
        id,
        config.tracker.api_version
    )
}

/// Fetch one work item's full record (fields + relations).
///
/// This is the primary fetch for single-id lookups, so the gateway's tagged
/// error comes back untouched for the caller to surface.
pub async fn fetch_detail(
    gateway: &Gateway,
    config: &Config,
    id: i64,
    notify: &dyn Notifier,
) -> Result<WorkItem, crate::models::CallResult> {
    let result = gateway
        .execute(Method::Get, &detail_url(config, id), None, notify)
        .await;
    if result.is_error {
        return Err(result);
    }
    match result.json.as_ref().and_then(WorkItem::from_json) {
        Some(item) => Ok(item),
        None => Err(crate::models::CallResult::fail(format!(
            "work item {}: response had no parseable record",
            id
        ))),
    }
}

/// Expand a candidate id list into full records, sequentially, isolating
/// per-id failures.
pub async fn fetch_details(
    gateway: &Gateway,
    config: &Config,
    ids: &[i64],
    notify: &dyn Notifier,
) -> Vec<WorkItem> {
    let mut items = Vec::with_capacity(ids.len());
    for &id in ids {
        let result = gateway
            .execute(Method::Get, &detail_url(config, id), None, notify)
            .await;
        if result.is_error {
            notify.warn(&format!("work item {}: detail fetch failed, skipping", id));
            continue;
        }
        match result.json.as_ref().and_then(WorkItem::from_json) {
            Some(item) => items.push(item),
            None => notify.warn(&format!("work item {}: unparseable record, skipping", id)),
        }
    }
    items
}

/// Fetch comment text for every id concurrently.
///
/// Each task writes a disjoint key of the result map, so no coordination is
/// needed beyond the join. Errors degrade to an empty string rather than
/// failing the batch.
pub async fn fetch_comments(
    gateway: Arc<Gateway>,
    config: &Config,
    ids: &[i64],
    notify: Arc<dyn Notifier>,
) -> HashMap<i64, String> {
    let mut set = JoinSet::new();
    for &id in ids {
        let gateway = gateway.clone();
        let notify = notify.clone();
        let url = comments_url(config, id);
        set.spawn(async move {
            let result = gateway.execute(Method::Get, &url, None, notify.as_ref()).await;
            let text = if result.is_error {
                String::new()
            } else {
                result.json.as_ref().map(comment_bodies).unwrap_or_default()
            };
            (id, text)
        });
    }

    let mut comments = HashMap::with_capacity(ids.len());
    while let Some(joined) = set.join_next().await {
        if let Ok((id, text)) = joined {
            comments.insert(id, text);
        }
    }
    comments
}

/// Concatenate all comment bodies in response order.
fn comment_bodies(body: &Value) -> String {
    body.get("comments")
        .and_then(|c| c.as_array())
        .map(|comments| {
            comments
                .iter()
                .filter_map(|c| c.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Derive a record's discussion text: all comment bodies followed by the
/// description field. Recomputed per request, never persisted.
pub fn discussion_text(item: &WorkItem, comments: &str) -> String {
    let description = item.description();
    if comments.is_empty() {
        description.to_string()
    } else if description.is_empty() {
        comments.to_string()
    } else {
        format!("{}\n{}", comments, description)
    }
}
