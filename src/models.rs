//! Core data models used throughout the harness.
//!
//! These types represent the work item records, scored matches, and tagged
//! call results that flow through the query pipelines. Nothing here is
//! persisted: every pipeline invocation owns the records it fetches and
//! drops them when the call returns.

use serde::Serialize;
use serde_json::{Map, Value};

/// A work item record as returned by the tracking service.
///
/// `fields` is a dynamic mapping because the field set is tenant-specific;
/// downstream code probes it with tolerant accessors rather than a schema.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: i64,
    pub fields: Map<String, Value>,
    pub relations: Vec<Value>,
}

impl WorkItem {
    /// Parse a work item from a detail response body. Entries without a
    /// numeric id are rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_i64()?;
        let fields = value
            .get("fields")
            .and_then(|f| f.as_object())
            .cloned()
            .unwrap_or_default();
        let relations = value
            .get("relations")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();
        Some(Self {
            id,
            fields,
            relations,
        })
    }

    fn field_str(&self, name: &str) -> &str {
        self.fields.get(name).and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.field_str("System.Title")
    }

    pub fn state(&self) -> &str {
        self.field_str("System.State")
    }

    pub fn description(&self) -> &str {
        self.field_str("System.Description")
    }

    pub fn work_item_type(&self) -> &str {
        self.field_str("System.WorkItemType")
    }
}

/// A record that met the relevance threshold, with its score and excerpt.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMatch {
    pub id: i64,
    pub title: String,
    pub state: String,
    /// Weighted token-overlap score in `[0, 1]`.
    pub score: f64,
    /// Bounded window of discussion text around the first query occurrence.
    pub excerpt: String,
}

/// Tagged result returned by the gateway and by every tool operation.
///
/// This is the boundary contract: a failure is carried as data
/// (`is_error = true`), never as a panic or an escaping error. The parsed
/// JSON body (if any) rides alongside the text rendering so callers do not
/// re-parse.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub is_error: bool,
    pub text: String,
    pub json: Option<Value>,
}

impl CallResult {
    pub fn ok(text: impl Into<String>, json: Option<Value>) -> Self {
        Self {
            is_error: false,
            text: text.into(),
            json,
        }
    }

    pub fn fail(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            text: text.into(),
            json: None,
        }
    }

    /// Render in the tool-boundary shape:
    /// `{ isError?, content: [{type: "text", text}], json? }`.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        if self.is_error {
            obj.insert("isError".to_string(), Value::Bool(true));
        }
        obj.insert(
            "content".to_string(),
            serde_json::json!([{ "type": "text", "text": self.text }]),
        );
        if let Some(json) = &self.json {
            obj.insert("json".to_string(), json.clone());
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_item_requires_numeric_id() {
        let v = serde_json::json!({ "fields": { "System.Title": "x" } });
        assert!(WorkItem::from_json(&v).is_none());
        let v = serde_json::json!({ "id": "12" });
        assert!(WorkItem::from_json(&v).is_none());
        let v = serde_json::json!({ "id": 12 });
        assert_eq!(WorkItem::from_json(&v).unwrap().id, 12);
    }

    #[test]
    fn call_result_shape() {
        let r = CallResult::fail("boom").to_value();
        assert_eq!(r["isError"], Value::Bool(true));
        assert_eq!(r["content"][0]["type"], "text");
        assert_eq!(r["content"][0]["text"], "boom");

        let ok = CallResult::ok("fine", Some(serde_json::json!({"n": 1}))).to_value();
        assert!(ok.get("isError").is_none());
        assert_eq!(ok["json"]["n"], 1);
    }
}
