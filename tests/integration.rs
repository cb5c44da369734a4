//! End-to-end pipeline tests against an in-process fake tracker.
//!
//! A small axum app stands in for the tracking service: WIQL resolution,
//! detail fetches, and comment threads are served from canned state, plus a
//! handful of raw endpoints that exercise the gateway's response
//! classification. Everything runs over a real TCP socket so the full
//! reqwest path is covered.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use workitem_harness::config::{Config, FieldsConfig, QueryConfig, ServerConfig, TrackerConfig};
use workitem_harness::gateway::{Gateway, Method};
use workitem_harness::notify::{CollectingNotifier, Level};
use workitem_harness::tools::{ToolContext, ToolRegistry};

// ============ Fake tracker ============

/// Canned tracker state served by the fake app.
#[derive(Default)]
struct FakeTracker {
    /// Ids returned by the WIQL endpoint, in order.
    wiql_ids: Vec<i64>,
    /// When set, the WIQL endpoint fails with this status and body.
    wiql_error: Option<(u16, Value)>,
    /// Detail bodies keyed by id.
    details: HashMap<i64, Value>,
    /// Ids whose detail fetch fails with a 500.
    fail_details: HashSet<i64>,
    /// Comment bodies keyed by id; absent ids get an empty thread.
    comments: HashMap<i64, Value>,
}

impl FakeTracker {
    fn with_items(items: Vec<Value>) -> Self {
        let mut tracker = FakeTracker::default();
        for item in items {
            let id = item["id"].as_i64().unwrap();
            tracker.wiql_ids.push(id);
            tracker.details.insert(id, item);
        }
        tracker
    }
}

async fn wiql_handler(State(t): State<Arc<FakeTracker>>) -> Response {
    if let Some((status, body)) = &t.wiql_error {
        return (
            StatusCode::from_u16(*status).unwrap(),
            Json(body.clone()),
        )
            .into_response();
    }
    let items: Vec<Value> = t.wiql_ids.iter().map(|id| json!({ "id": id })).collect();
    Json(json!({ "workItems": items })).into_response()
}

async fn detail_handler(
    State(t): State<Arc<FakeTracker>>,
    Path((_project, id)): Path<(String, i64)>,
) -> Response {
    if t.fail_details.contains(&id) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": format!("synthetic failure for {}", id) })),
        )
            .into_response();
    }
    match t.details.get(&id) {
        Some(body) => Json(body.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("work item {} does not exist", id) })),
        )
            .into_response(),
    }
}

async fn comments_handler(
    State(t): State<Arc<FakeTracker>>,
    Path((_project, id)): Path<(String, i64)>,
) -> Json<Value> {
    Json(
        t.comments
            .get(&id)
            .cloned()
            .unwrap_or_else(|| json!({ "comments": [] })),
    )
}

// Raw endpoints exercising gateway response classification.

async fn raw_continuation() -> Json<Value> {
    Json(json!({
        "count": 100,
        "value": [{ "id": 1 }],
        "@odata.nextLink": "https://tracker/api/items?%24skip=50"
    }))
}

async fn raw_no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn raw_plain() -> Response {
    ([(header::CONTENT_TYPE, "text/plain")], "plain body").into_response()
}

async fn raw_xml() -> Response {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        "<items><item id=\"1\"/></items>",
    )
        .into_response()
}

async fn raw_not_json() -> Response {
    ([(header::CONTENT_TYPE, "application/json")], "oops, not json").into_response()
}

async fn raw_error() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": "query was malformed", "typeKey": "WiqlError" })),
    )
        .into_response()
}

/// Serve the fake tracker on an ephemeral port and return its base URL.
async fn spawn_tracker(tracker: FakeTracker) -> String {
    let app = Router::new()
        .route("/raw/continuation", get(raw_continuation))
        .route("/raw/no-content", get(raw_no_content))
        .route("/raw/plain", get(raw_plain))
        .route("/raw/xml", get(raw_xml))
        .route("/raw/not-json", get(raw_not_json))
        .route("/raw/error", get(raw_error))
        .route("/{project}/_apis/wit/wiql", post(wiql_handler))
        .route("/{project}/_apis/wit/workitems/{id}", get(detail_handler))
        .route(
            "/{project}/_apis/wit/workItems/{id}/comments",
            get(comments_handler),
        )
        .with_state(Arc::new(tracker));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ============ Harness plumbing ============

fn make_config(base_url: &str) -> Config {
    Config {
        tracker: TrackerConfig {
            org_url: base_url.to_string(),
            project: Some("Platform".to_string()),
            api_version: "7.1".to_string(),
        },
        query: QueryConfig::default(),
        fields: FieldsConfig::default(),
        server: ServerConfig::default(),
    }
}

fn harness(base_url: &str) -> (ToolContext, Arc<CollectingNotifier>) {
    std::env::set_var("AZDO_PAT", "test-pat");
    let config = Arc::new(make_config(base_url));
    let gateway = Arc::new(Gateway::new(&config).unwrap());
    let notifier = Arc::new(CollectingNotifier::new());
    let ctx = ToolContext::new(config, gateway, notifier.clone());
    (ctx, notifier)
}

async fn call_tool(
    ctx: &ToolContext,
    name: &str,
    params: Value,
) -> workitem_harness::CallResult {
    let registry = ToolRegistry::with_builtins();
    registry.find(name).unwrap().execute(params, ctx).await
}

fn item(id: i64, title: &str, state: &str, extra_fields: Value) -> Value {
    let mut fields = json!({
        "System.Title": title,
        "System.State": state,
    });
    if let Some(extra) = extra_fields.as_object() {
        for (k, v) in extra {
            fields[k] = v.clone();
        }
    }
    json!({ "id": id, "fields": fields })
}

// ============ Gateway classification ============

#[tokio::test]
async fn gateway_surfaces_continuation_hint_and_notification() {
    let base = spawn_tracker(FakeTracker::default()).await;
    let (ctx, notifier) = harness(&base);

    let result = ctx
        .gateway
        .execute(
            Method::Get,
            &format!("{}/raw/continuation", base),
            None,
            notifier.as_ref(),
        )
        .await;

    assert!(!result.is_error);
    assert!(result
        .text
        .contains("More results available. Pass skip=50 to continue."));
    let infos = notifier.messages_at(Level::Info);
    assert!(infos.iter().any(|m| m.contains("skip=50")));
}

#[tokio::test]
async fn gateway_treats_no_content_as_success() {
    let base = spawn_tracker(FakeTracker::default()).await;
    let (ctx, notifier) = harness(&base);

    let result = ctx
        .gateway
        .execute(
            Method::Get,
            &format!("{}/raw/no-content", base),
            None,
            notifier.as_ref(),
        )
        .await;

    assert!(!result.is_error);
    assert_eq!(result.text, "No content.");
    assert!(result.json.is_none());
}

#[tokio::test]
async fn gateway_passes_text_and_xml_bodies_verbatim() {
    let base = spawn_tracker(FakeTracker::default()).await;
    let (ctx, notifier) = harness(&base);

    let plain = ctx
        .gateway
        .execute(
            Method::Get,
            &format!("{}/raw/plain", base),
            None,
            notifier.as_ref(),
        )
        .await;
    assert!(!plain.is_error);
    assert_eq!(plain.text, "plain body");

    let xml = ctx
        .gateway
        .execute(
            Method::Get,
            &format!("{}/raw/xml", base),
            None,
            notifier.as_ref(),
        )
        .await;
    assert!(!xml.is_error);
    assert_eq!(xml.text, "<items><item id=\"1\"/></items>");
    assert!(xml.json.is_none());
}

#[tokio::test]
async fn gateway_degrades_unparseable_json_to_text_success() {
    let base = spawn_tracker(FakeTracker::default()).await;
    let (ctx, notifier) = harness(&base);

    let result = ctx
        .gateway
        .execute(
            Method::Get,
            &format!("{}/raw/not-json", base),
            None,
            notifier.as_ref(),
        )
        .await;

    assert!(!result.is_error);
    assert_eq!(result.text, "oops, not json");
    assert!(result.json.is_none());
}

#[tokio::test]
async fn gateway_pretty_prints_upstream_errors() {
    let base = spawn_tracker(FakeTracker::default()).await;
    let (ctx, notifier) = harness(&base);

    let result = ctx
        .gateway
        .execute(
            Method::Get,
            &format!("{}/raw/error", base),
            None,
            notifier.as_ref(),
        )
        .await;

    assert!(result.is_error);
    assert!(result.text.starts_with("HTTP 400:"));
    assert!(result.text.contains("query was malformed"));
    assert!(!notifier.messages_at(Level::Error).is_empty());
}

// ============ Pipelines ============

#[tokio::test]
async fn wiql_failure_propagates_as_the_tool_result() {
    let tracker = FakeTracker {
        wiql_error: Some((500, json!({ "message": "resolver exploded" }))),
        ..Default::default()
    };
    let base = spawn_tracker(tracker).await;
    let (ctx, _) = harness(&base);

    let result = call_tool(&ctx, "search_work_items", json!({ "query": "anything" })).await;
    assert!(result.is_error);
    assert!(result.text.starts_with("HTTP 500:"));
    assert!(result.text.contains("resolver exploded"));
}

#[tokio::test]
async fn detail_failure_skips_the_record_and_warns() {
    let mut tracker = FakeTracker::with_items(vec![
        item(1, "First", "Active", json!({})),
        item(2, "Second", "Active", json!({})),
        item(3, "Third", "Active", json!({})),
    ]);
    tracker.fail_details.insert(2);
    let base = spawn_tracker(tracker).await;
    let (ctx, notifier) = harness(&base);

    let result = call_tool(&ctx, "list_work_items", json!({ "work_item_type": "Task" })).await;
    assert!(!result.is_error);
    assert!(result.text.contains("ID: 1, Title: First, State: Active"));
    assert!(result.text.contains("ID: 3, Title: Third, State: Active"));
    assert!(!result.text.contains("ID: 2"));

    let warnings = notifier.messages_at(Level::Warn);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("work item 2"));
}

#[tokio::test]
async fn search_ranks_titles_and_discussion() {
    let mut tracker = FakeTracker::with_items(vec![
        item(
            10,
            "Fix login bug",
            "Active",
            json!({ "System.Description": "<div>Users report a login bug after the deploy.</div>" }),
        ),
        item(11, "Quarterly planning", "New", json!({})),
    ]);
    tracker.comments.insert(
        10,
        json!({ "comments": [{ "text": "login keeps timing out for SSO users" }] }),
    );
    let base = spawn_tracker(tracker).await;
    let (ctx, _) = harness(&base);

    let result = call_tool(&ctx, "search_work_items", json!({ "query": "login bug" })).await;
    assert!(!result.is_error);
    assert!(result.text.contains("#10 Fix login bug (Active)"));
    assert!(!result.text.contains("#11"));

    let matches = result.json.as_ref().unwrap()["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["id"], 10);
    // Full title + discussion overlap: 0.6 + 0.4.
    assert!((matches[0]["score"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    let excerpt = matches[0]["excerpt"].as_str().unwrap();
    assert!(excerpt.contains("login"));
}

#[tokio::test]
async fn search_reports_when_nothing_clears_the_threshold() {
    let tracker = FakeTracker::with_items(vec![item(1, "Unrelated", "New", json!({}))]);
    let base = spawn_tracker(tracker).await;
    let (ctx, _) = harness(&base);

    let result = call_tool(
        &ctx,
        "search_work_items",
        json!({ "query": "database timeout" }),
    )
    .await;
    assert!(!result.is_error);
    assert!(result.text.contains("No work items matched"));
}

#[tokio::test]
async fn filter_overdue_keeps_items_strictly_past_their_date() {
    let tracker = FakeTracker::with_items(vec![
        item(
            1,
            "Slipped task",
            "Active",
            json!({ "Microsoft.VSTS.Scheduling.TargetDate": "2001-01-15T00:00:00Z" }),
        ),
        item(
            2,
            "Due far in the future",
            "Active",
            json!({ "Microsoft.VSTS.Scheduling.TargetDate": "2999-01-01T00:00:00Z" }),
        ),
        item(3, "No date at all", "Active", json!({})),
    ]);
    let base = spawn_tracker(tracker).await;
    let (ctx, _) = harness(&base);

    let result = call_tool(
        &ctx,
        "filter_work_items",
        json!({ "filter": "overdue tasks" }),
    )
    .await;
    assert!(!result.is_error);
    assert!(result.text.contains("#1 Slipped task (Active)"));
    assert!(!result.text.contains("#2"));
    assert!(!result.text.contains("#3"));

    let items = result.json.as_ref().unwrap()["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], 1);
}

#[tokio::test]
async fn filter_respects_caller_supplied_ids() {
    let tracker = FakeTracker::with_items(vec![
        item(1, "First", "Active", json!({})),
        item(2, "Second", "Done", json!({})),
        item(3, "Third", "Active", json!({})),
    ]);
    let base = spawn_tracker(tracker).await;
    let (ctx, _) = harness(&base);

    // Only id 2 is fetched; the WIQL resolver is bypassed entirely.
    let result = call_tool(
        &ctx,
        "filter_work_items",
        json!({ "filter": "done items", "ids": [2] }),
    )
    .await;
    assert!(!result.is_error);
    assert!(result.text.contains("#2 Second (Done)"));
    assert!(!result.text.contains("#1"));
    assert!(!result.text.contains("#3"));
}

#[tokio::test]
async fn get_work_item_joins_comments_and_description() {
    let mut tracker = FakeTracker::with_items(vec![item(
        7,
        "Investigate flake",
        "Active",
        json!({ "System.Description": "Fails roughly one run in ten." }),
    )]);
    tracker.comments.insert(
        7,
        json!({ "comments": [{ "text": "repros on CI only" }, { "text": "suspect the clock" }] }),
    );
    let base = spawn_tracker(tracker).await;
    let (ctx, _) = harness(&base);

    let result = call_tool(&ctx, "get_work_item", json!({ "id": 7 })).await;
    assert!(!result.is_error);
    assert!(result.text.contains("#7 Investigate flake (Active)"));
    assert!(result.text.contains("repros on CI only"));
    assert!(result.text.contains("suspect the clock"));
    assert!(result.text.contains("Fails roughly one run in ten."));

    let json = result.json.as_ref().unwrap();
    assert_eq!(json["id"], 7);
    assert!(json["discussion"]
        .as_str()
        .unwrap()
        .starts_with("repros on CI only\nsuspect the clock"));
}

#[tokio::test]
async fn get_work_item_surfaces_the_primary_fetch_failure() {
    let mut tracker = FakeTracker::default();
    tracker.fail_details.insert(99);
    let base = spawn_tracker(tracker).await;
    let (ctx, _) = harness(&base);

    let result = call_tool(&ctx, "get_work_item", json!({ "id": 99 })).await;
    assert!(result.is_error);
    assert!(result.text.starts_with("HTTP 500:"));
    assert!(result.text.contains("synthetic failure for 99"));
}

#[tokio::test]
async fn tools_reject_malformed_parameters_as_tagged_errors() {
    let base = spawn_tracker(FakeTracker::default()).await;
    let (ctx, _) = harness(&base);

    let result = call_tool(&ctx, "search_work_items", json!({})).await;
    assert!(result.is_error);
    assert!(result.text.contains("query"));

    let result = call_tool(
        &ctx,
        "filter_work_items",
        json!({ "start_date": "not-a-date" }),
    )
    .await;
    assert!(result.is_error);
    assert!(result.text.contains("start_date"));

    let result = call_tool(&ctx, "get_work_item", json!({ "id": "seven" })).await;
    assert!(result.is_error);
}
