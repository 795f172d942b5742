//! The stub query: which documents are exportable, and what we read back.

use serde_json::{json, Value};

/// Cursor batch size used by store drivers.
pub const BATCH_SIZE: u32 = 100;

/// Filter and projection for exportable documents.
///
/// A document qualifies when it is distributable (`canBeDistributed` is
/// `"yes"` or absent) and article-shaped (`type` is `Article`, or it has a
/// non-null `body`, or `realtime` is true). A non-empty candidate list
/// additionally restricts the match to those uuids.
#[derive(Debug, Clone, Default)]
pub struct StubQuery {
    candidates: Vec<String>,
}

impl StubQuery {
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Wire-form filter for drivers with a document query language.
    pub fn filter(&self) -> Value {
        let mut clauses = vec![
            json!({"$or": [
                {"canBeDistributed": "yes"},
                {"canBeDistributed": {"$exists": false}},
            ]}),
            json!({"$or": [
                {"type": "Article"},
                {"body": {"$ne": null}},
                {"realtime": true},
            ]}),
        ];
        if !self.candidates.is_empty() {
            clauses.push(json!({"uuid": {"$in": self.candidates}}));
        }
        json!({ "$and": clauses })
    }

    /// Projection keeping only the fields the stub needs.
    pub fn projection(&self) -> Value {
        json!({"uuid": 1, "firstPublishedDate": 1, "publishedDate": 1})
    }

    /// Evaluate the filter against one document, for stores without a
    /// query language.
    pub fn matches(&self, doc: &Value) -> bool {
        let distributable = match doc.get("canBeDistributed") {
            None => true,
            Some(value) => value.as_str() == Some("yes"),
        };
        if !distributable {
            return false;
        }

        let article_shaped = doc.get("type").and_then(Value::as_str) == Some("Article")
            || doc.get("body").is_some_and(|body| !body.is_null())
            || doc.get("realtime").and_then(Value::as_bool) == Some(true);
        if !article_shaped {
            return false;
        }

        if self.candidates.is_empty() {
            return true;
        }
        doc.get("uuid")
            .and_then(Value::as_str)
            .is_some_and(|uuid| self.candidates.iter().any(|c| c == uuid))
    }

    /// Apply the projection to one document.
    pub fn project(&self, doc: &Value) -> Value {
        let mut projected = serde_json::Map::new();
        for field in ["uuid", "firstPublishedDate", "publishedDate"] {
            if let Some(value) = doc.get(field) {
                projected.insert(field.to_string(), value.clone());
            }
        }
        Value::Object(projected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_has_both_clauses() {
        let filter = StubQuery::default().filter();
        let clauses = filter["$and"].as_array().unwrap();
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn candidates_extend_the_filter() {
        let query = StubQuery::new(vec!["u1".to_string(), "u2".to_string()]);
        let filter = query.filter();
        let clauses = filter["$and"].as_array().unwrap();
        assert_eq!(clauses.len(), 3);
        assert_eq!(clauses[2]["uuid"]["$in"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn matches_distributable_articles() {
        let query = StubQuery::default();
        assert!(query.matches(&json!({"uuid": "u", "type": "Article"})));
        assert!(query.matches(&json!({"uuid": "u", "body": "<p/>", "canBeDistributed": "yes"})));
        assert!(query.matches(&json!({"uuid": "u", "realtime": true})));
    }

    #[test]
    fn rejects_non_distributable_and_non_articles() {
        let query = StubQuery::default();
        assert!(!query.matches(&json!({"uuid": "u", "type": "Article", "canBeDistributed": "no"})));
        assert!(!query.matches(&json!({"uuid": "u", "type": "Image"})));
        assert!(!query.matches(&json!({"uuid": "u", "body": null})));
    }

    #[test]
    fn candidates_restrict_matches() {
        let query = StubQuery::new(vec!["u1".to_string()]);
        assert!(query.matches(&json!({"uuid": "u1", "type": "Article"})));
        assert!(!query.matches(&json!({"uuid": "u2", "type": "Article"})));
    }

    #[test]
    fn projection_drops_everything_else() {
        let query = StubQuery::default();
        let projected = query.project(&json!({
            "uuid": "u1",
            "firstPublishedDate": "2020-01-01T00:00:00Z",
            "body": "large",
        }));
        let fields = projected.as_object().unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("uuid"));
        assert!(fields.contains_key("firstPublishedDate"));
    }
}
