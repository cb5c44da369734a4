//! WIQL construction and work item id resolution.
//!
//! Only one query shape is built: select `[System.Id]`, optionally filtered
//! by declared type and containing project, ordered by last-changed
//! descending. The ordering is a fixed policy — when a candidate cap
//! truncates the set, scoring and filtering see the most-recently-active
//! items first.

use serde_json::Value;

use crate::config::Config;
use crate::gateway::{Gateway, Method};
use crate::models::CallResult;
use crate::notify::Notifier;

/// Build the fixed WIQL query text.
pub fn build_wiql(work_item_type: Option<&str>, project: Option<&str>) -> String {
    let mut predicates = Vec::new();
    if let Some(t) = work_item_type {
        predicates.push(format!("[System.WorkItemType] = '{}'", escape(t)));
    }
    if let Some(p) = project {
        predicates.push(format!("[System.TeamProject] = '{}'", escape(p)));
    }

    let mut query = String::from("SELECT [System.Id] FROM WorkItems");
    if !predicates.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&predicates.join(" AND "));
    }
    query.push_str(" ORDER BY [System.ChangedDate] DESC");
    query
}

// WIQL string literals escape single quotes by doubling them.
fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

fn wiql_url(config: &Config) -> String {
    let tracker = &config.tracker;
    match &tracker.project {
        Some(project) => format!(
            "{}/{}/_apis/wit/wiql?api-version={}",
            tracker.org_url, project, tracker.api_version
        ),
        None => format!(
            "{}/_apis/wit/wiql?api-version={}",
            tracker.org_url, tracker.api_version
        ),
    }
}

/// Resolve a bounded candidate id list via the gateway.
///
/// A gateway error propagates untouched as the `Err` value so the caller
/// can surface it as the operation's result. Entries without a numeric id
/// are discarded; the list is truncated to `cap` before use.
pub async fn resolve_ids(
    gateway: &Gateway,
    config: &Config,
    work_item_type: Option<&str>,
    cap: usize,
    notify: &dyn Notifier,
) -> Result<Vec<i64>, CallResult> {
    let query = build_wiql(work_item_type, config.tracker.project.as_deref());
    let body = serde_json::json!({ "query": query });

    let result = gateway
        .execute(Method::Post, &wiql_url(config), Some(body), notify)
        .await;
    if result.is_error {
        return Err(result);
    }

    let mut ids = match &result.json {
        Some(json) => extract_ids(json),
        None => Vec::new(),
    };
    ids.truncate(cap);
    Ok(ids)
}

/// Pull numeric ids out of a WIQL response body, discarding anything else.
pub fn extract_ids(body: &Value) -> Vec<i64> {
    body.get("workItems")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(|id| id.as_i64()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiql_shape_with_type_and_project() {
        let q = build_wiql(Some("Bug"), Some("Platform"));
        assert_eq!(
            q,
            "SELECT [System.Id] FROM WorkItems \
             WHERE [System.WorkItemType] = 'Bug' AND [System.TeamProject] = 'Platform' \
             ORDER BY [System.ChangedDate] DESC"
        );
    }

    #[test]
    fn wiql_shape_unfiltered() {
        let q = build_wiql(None, None);
        assert_eq!(
            q,
            "SELECT [System.Id] FROM WorkItems ORDER BY [System.ChangedDate] DESC"
        );
    }

    #[test]
    fn wiql_escapes_single_quotes() {
        let q = build_wiql(Some("User's Story"), None);
        assert!(q.contains("'User''s Story'"));
    }

    #[test]
    fn extract_ids_discards_non_numeric() {
        let body = serde_json::json!({
            "workItems": [
                { "id": 1 },
                { "id": "two" },
                { "url": "no id" },
                { "id": 3 }
            ]
        });
        assert_eq!(extract_ids(&body), vec![1, 3]);
    }

    #[test]
    fn extract_ids_tolerates_missing_list() {
        assert!(extract_ids(&serde_json::json!({})).is_empty());
    }
}
