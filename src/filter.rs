//! Temporal and status filtering of work items.
//!
//! A filter starts as a natural-language phrase ("overdue bugs",
//! "completed last month") plus optional explicit arguments. Parsing is a
//! fixed pattern table, not a grammar: each cue sets derived fields, and
//! explicit arguments layer additional constraints on top. Record dates are
//! found by a best-effort heuristic over the dynamic field map — it may
//! bind an unrelated date on records with several date-like custom fields,
//! and that is an accepted limitation of the discovery order, not something
//! to second-guess per record.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::models::WorkItem;

/// States treated as "work finished", matched case-insensitively.
pub const DONE_STATES: [&str; 5] = ["done", "closed", "completed", "resolved", "removed"];

/// System fields probed for a date before any heuristic scan.
const SYSTEM_DATE_FIELDS: [&str; 3] = [
    "System.ChangedDate",
    "System.CreatedDate",
    "Microsoft.VSTS.Common.ClosedDate",
];

/// Field-name keywords that mark a field as date-like.
const DATE_NAME_KEYWORDS: [&str; 5] = ["due", "target", "date", "completed", "closed"];

/// Nested keys checked first when scanning object values.
const NESTED_DATE_KEYS: [&str; 6] = [
    "date",
    "value",
    "dueDate",
    "completedDate",
    "createdDate",
    "closedDate",
];

/// Maximum recursion depth for the field scan.
const SCAN_DEPTH: usize = 3;

/// Caller-supplied filter arguments, before derivation.
#[derive(Debug, Clone, Default)]
pub struct FilterArgs {
    pub query_phrase: Option<String>,
    pub explicit_start: Option<NaiveDate>,
    pub explicit_end: Option<NaiveDate>,
    pub explicit_status: Option<String>,
    pub restrict_ids: Option<Vec<i64>>,
}

/// Inclusive date window; either bound may be open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl DateWindow {
    fn is_active(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

/// Status requirement derived from the phrase or explicit argument.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusRule {
    Any,
    /// Exact match against the given state, case-insensitive.
    Exact(String),
    /// State must be in the done-like set.
    Done,
    /// State must NOT be in the done-like set.
    Open,
}

/// Fully derived filter, ready to evaluate against records.
#[derive(Debug, Clone)]
pub struct FilterPlan {
    pub window: DateWindow,
    /// Overdue filters compare strictly (`date < end`) instead of
    /// inclusively.
    pub overdue: bool,
    pub status: StatusRule,
    /// Restrict date discovery to the configured target/due candidates,
    /// skipping the general fallback.
    pub target_date_only: bool,
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Derive a [`FilterPlan`] from the caller's arguments.
///
/// Precedence for conflicting cues is fixed: explicit args, then overdue,
/// then last-month, then completed-in-month, then open/done keywords, then
/// the target-date preference.
pub fn parse_filter(args: &FilterArgs, today: NaiveDate) -> FilterPlan {
    let phrase = args
        .query_phrase
        .as_deref()
        .unwrap_or("")
        .to_lowercase();

    let mut window = DateWindow::default();
    let mut overdue = false;
    let mut status = StatusRule::Any;

    if phrase.contains("overdue")
        || phrase.contains("past due")
        || phrase.contains("already passed")
    {
        window.end = today.and_hms_opt(0, 0, 0);
        overdue = true;
    } else if phrase.contains("last month") {
        let (start, end) = previous_month(today);
        window = DateWindow {
            start: Some(start),
            end: Some(end),
        };
    } else if let Some(month) = completed_in_month(&phrase) {
        let (start, end) = month_window(today.year(), month);
        window = DateWindow {
            start: Some(start),
            end: Some(end),
        };
        status = StatusRule::Done;
    }

    if status == StatusRule::Any {
        if phrase.contains("open") {
            status = StatusRule::Open;
        } else if ["completed", "done", "finished", "closed"]
            .iter()
            .any(|kw| phrase.contains(kw))
        {
            status = StatusRule::Done;
        }
    }

    let target_date_only = ["target date", "due date", "targetdate", "duedate", "target"]
        .iter()
        .any(|kw| phrase.contains(kw));

    // Explicit arguments are additional constraints, not replacements:
    // bounds intersect the parsed window, status replaces the derived rule.
    if let Some(start) = args.explicit_start {
        let start = start.and_hms_opt(0, 0, 0).unwrap_or_default();
        window.start = Some(match window.start {
            Some(existing) => existing.max(start),
            None => start,
        });
    }
    if let Some(end) = args.explicit_end {
        let end = end.and_hms_milli_opt(23, 59, 59, 999).unwrap_or_default();
        window.end = Some(match window.end {
            Some(existing) => existing.min(end),
            None => end,
        });
    }
    if let Some(state) = &args.explicit_status {
        status = StatusRule::Exact(state.clone());
    }

    FilterPlan {
        window,
        overdue,
        status,
        target_date_only,
    }
}

/// "completed ... <month name>" forces a done-state month window.
fn completed_in_month(phrase: &str) -> Option<u32> {
    if !phrase.contains("completed") {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| phrase.contains(m))
        .map(|i| i as u32 + 1)
}

fn previous_month(today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let first_of_this = today.with_day(1).unwrap_or(today);
    let last_of_prev = first_of_this - Duration::days(1);
    let first_of_prev = last_of_prev.with_day(1).unwrap_or(last_of_prev);
    (
        first_of_prev.and_hms_opt(0, 0, 0).unwrap_or_default(),
        last_of_prev
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_default(),
    )
}

fn month_window(year: i32, month: u32) -> (NaiveDateTime, NaiveDateTime) {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default();
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .unwrap_or_default();
    let last = next_first - Duration::days(1);
    (
        first.and_hms_opt(0, 0, 0).unwrap_or_default(),
        last.and_hms_milli_opt(23, 59, 59, 999).unwrap_or_default(),
    )
}

// ============ Date discovery ============

/// Lenient timestamp parsing: RFC 3339, ISO date-times with or without
/// fractional seconds, and bare dates.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn value_as_date(value: &Value) -> Option<NaiveDateTime> {
    value.as_str().and_then(parse_date)
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Discover a date for a record's fields, in fixed priority order,
/// stopping at the first success. With `target_only`, only the configured
/// candidate names are probed and the general fallback is skipped.
pub fn discover_date(
    fields: &Map<String, Value>,
    candidates: &[String],
    target_only: bool,
) -> Option<NaiveDateTime> {
    if target_only {
        for candidate in candidates {
            let wanted = normalize_name(candidate);
            for (name, value) in fields {
                if normalize_name(name).contains(&wanted) {
                    if let Some(date) = value_as_date(value) {
                        return Some(date);
                    }
                }
            }
        }
        return None;
    }

    for name in SYSTEM_DATE_FIELDS {
        if let Some(date) = fields.get(name).and_then(value_as_date) {
            return Some(date);
        }
    }

    for (name, value) in fields {
        let lower = name.to_lowercase();
        if DATE_NAME_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            if let Some(date) = value_as_date(value) {
                return Some(date);
            }
        }
    }

    for value in fields.values() {
        if let Some(date) = scan_value(value, SCAN_DEPTH) {
            return Some(date);
        }
    }
    None
}

/// Bounded-depth visitor over a dynamic JSON value. Objects check common
/// nested date keys before the rest; arrays scan their elements.
fn scan_value(value: &Value, depth: usize) -> Option<NaiveDateTime> {
    if depth == 0 {
        return None;
    }
    match value {
        Value::String(s) => parse_date(s),
        Value::Object(map) => {
            for key in NESTED_DATE_KEYS {
                if let Some(inner) = map.get(key) {
                    if let Some(date) = scan_value(inner, depth - 1) {
                        return Some(date);
                    }
                }
            }
            map.values().find_map(|inner| scan_value(inner, depth - 1))
        }
        Value::Array(items) => items.iter().find_map(|inner| scan_value(inner, depth - 1)),
        _ => None,
    }
}

// ============ Predicate ============

fn is_done_state(state: &str) -> bool {
    let lower = state.to_lowercase();
    DONE_STATES.contains(&lower.as_str())
}

fn status_matches(rule: &StatusRule, state: &str) -> bool {
    match rule {
        StatusRule::Any => true,
        StatusRule::Exact(wanted) => state.eq_ignore_ascii_case(wanted),
        StatusRule::Done => is_done_state(state),
        StatusRule::Open => !is_done_state(state),
    }
}

/// Evaluate a record against the plan. Records with no discoverable date
/// are excluded whenever a window constraint is active.
pub fn matches(plan: &FilterPlan, item: &WorkItem, candidates: &[String]) -> bool {
    if !status_matches(&plan.status, item.state()) {
        return false;
    }
    if !plan.window.is_active() {
        return true;
    }

    let Some(date) = discover_date(&item.fields, candidates, plan.target_date_only) else {
        return false;
    };

    if let Some(start) = plan.window.start {
        if date < start {
            return false;
        }
    }
    if let Some(end) = plan.window.end {
        if plan.overdue {
            if date >= end {
                return false;
            }
        } else if date > end {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn item(state: &str, fields: Value) -> WorkItem {
        let mut all = fields.as_object().cloned().unwrap_or_default();
        all.insert("System.State".to_string(), json!(state));
        WorkItem::from_json(&json!({ "id": 1, "fields": all })).unwrap()
    }

    fn args(phrase: &str) -> FilterArgs {
        FilterArgs {
            query_phrase: Some(phrase.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn last_month_window() {
        // Scenario C: today = 2024-10-05 -> September 2024.
        let plan = parse_filter(&args("items from last month"), d(2024, 10, 5));
        assert_eq!(
            plan.window.start,
            d(2024, 9, 1).and_hms_opt(0, 0, 0)
        );
        assert_eq!(
            plan.window.end,
            d(2024, 9, 30).and_hms_milli_opt(23, 59, 59, 999)
        );
        assert!(!plan.overdue);
    }

    #[test]
    fn overdue_is_strict_before_start_of_today() {
        // Scenario D.
        let today = d(2024, 10, 5);
        let plan = parse_filter(&args("overdue items"), today);
        assert!(plan.overdue);
        assert_eq!(plan.window.end, today.and_hms_opt(0, 0, 0));
        assert!(plan.window.start.is_none());

        let candidates = crate::config::FieldsConfig::default().date_candidates;
        let a = item(
            "Active",
            json!({ "System.ChangedDate": "2024-10-04T12:00:00Z" }),
        );
        let b = item(
            "Active",
            json!({ "System.ChangedDate": "2024-10-06T12:00:00Z" }),
        );
        assert!(matches(&plan, &a, &candidates));
        assert!(!matches(&plan, &b, &candidates));
    }

    #[test]
    fn overdue_wins_over_last_month() {
        let plan = parse_filter(&args("overdue since last month"), d(2024, 10, 5));
        assert!(plan.overdue);
        assert!(plan.window.start.is_none());
    }

    #[test]
    fn completed_in_month_forces_done_state() {
        let plan = parse_filter(&args("completed in september"), d(2024, 10, 5));
        assert_eq!(plan.status, StatusRule::Done);
        assert_eq!(plan.window.start, d(2024, 9, 1).and_hms_opt(0, 0, 0));
        assert_eq!(
            plan.window.end,
            d(2024, 9, 30).and_hms_milli_opt(23, 59, 59, 999)
        );
    }

    #[test]
    fn completed_december_spans_year_end() {
        let plan = parse_filter(&args("completed in december"), d(2024, 10, 5));
        assert_eq!(
            plan.window.end,
            d(2024, 12, 31).and_hms_milli_opt(23, 59, 59, 999)
        );
    }

    #[test]
    fn open_and_done_keywords() {
        let plan = parse_filter(&args("open bugs"), d(2024, 10, 5));
        assert_eq!(plan.status, StatusRule::Open);

        let plan = parse_filter(&args("finished work"), d(2024, 10, 5));
        assert_eq!(plan.status, StatusRule::Done);

        let candidates = crate::config::FieldsConfig::default().date_candidates;
        assert!(matches(&plan, &item("Closed", json!({})), &candidates));
        assert!(matches(&plan, &item("RESOLVED", json!({})), &candidates));
        assert!(!matches(&plan, &item("Active", json!({})), &candidates));
    }

    #[test]
    fn target_date_preference_restricts_discovery() {
        let plan = parse_filter(&args("items by target date"), d(2024, 10, 5));
        assert!(plan.target_date_only);

        let candidates = crate::config::FieldsConfig::default().date_candidates;
        // Has a system date but no target/due field: no date discoverable.
        let fields: Map<String, Value> =
            json!({ "System.ChangedDate": "2024-10-01T00:00:00Z" })
                .as_object()
                .cloned()
                .unwrap();
        assert!(discover_date(&fields, &candidates, true).is_none());

        let fields: Map<String, Value> =
            json!({ "Microsoft.VSTS.Scheduling.TargetDate": "2024-10-01T00:00:00Z" })
                .as_object()
                .cloned()
                .unwrap();
        assert!(discover_date(&fields, &candidates, true).is_some());
    }

    #[test]
    fn explicit_args_constrain_and_replace() {
        let mut a = args("last month");
        a.explicit_start = Some(d(2024, 9, 15));
        a.explicit_status = Some("Blocked".to_string());
        let plan = parse_filter(&a, d(2024, 10, 5));
        // Explicit start raises the parsed window start.
        assert_eq!(plan.window.start, d(2024, 9, 15).and_hms_opt(0, 0, 0));
        assert_eq!(plan.status, StatusRule::Exact("Blocked".to_string()));

        let candidates = crate::config::FieldsConfig::default().date_candidates;
        let blocked = item(
            "blocked",
            json!({ "System.ChangedDate": "2024-09-20T10:00:00Z" }),
        );
        assert!(matches(&plan, &blocked, &candidates));
    }

    #[test]
    fn discovery_priority_system_then_name_then_scan() {
        let candidates = crate::config::FieldsConfig::default().date_candidates;

        let fields: Map<String, Value> = json!({
            "System.ChangedDate": "2024-01-01T00:00:00Z",
            "Custom.DueDate": "2024-02-02T00:00:00Z"
        })
        .as_object()
        .cloned()
        .unwrap();
        let found = discover_date(&fields, &candidates, false).unwrap();
        assert_eq!(found.date(), d(2024, 1, 1));

        let fields: Map<String, Value> = json!({
            "Custom.DueDate": "2024-02-02T00:00:00Z"
        })
        .as_object()
        .cloned()
        .unwrap();
        let found = discover_date(&fields, &candidates, false).unwrap();
        assert_eq!(found.date(), d(2024, 2, 2));

        // Nothing date-named: the recursive scan finds a nested value.
        let fields: Map<String, Value> = json!({
            "Custom.Milestone": { "value": "2024-03-03" }
        })
        .as_object()
        .cloned()
        .unwrap();
        let found = discover_date(&fields, &candidates, false).unwrap();
        assert_eq!(found.date(), d(2024, 3, 3));
    }

    #[test]
    fn scan_is_depth_bounded() {
        let fields: Map<String, Value> = json!({
            "Custom.Deep": { "a": { "b": { "c": "2024-03-03" } } }
        })
        .as_object()
        .cloned()
        .unwrap();
        // Value sits at depth 4 from the field value; the scan stops at 3.
        assert!(discover_date(&fields, &[], false).is_none());
    }

    #[test]
    fn window_excludes_records_without_discoverable_date() {
        let plan = parse_filter(&args("last month"), d(2024, 10, 5));
        let candidates = crate::config::FieldsConfig::default().date_candidates;
        assert!(!matches(&plan, &item("Active", json!({})), &candidates));
    }

    #[test]
    fn lenient_date_parsing() {
        assert!(parse_date("2024-10-04T12:30:00Z").is_some());
        assert!(parse_date("2024-10-04T12:30:00.123Z").is_some());
        assert!(parse_date("2024-10-04T12:30:00").is_some());
        assert!(parse_date("2024-10-04").is_some());
        assert!(parse_date("10/04/2024").is_some());
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
    }
}
