//! Translates solver answers into the hierarchical query result structure.
//!
//! The named queries speak a small atom vocabulary:
//! - `result(Key)` declares a row,
//! - `field(Key, Name, Value)` sets a row field (repeats become arrays),
//! - `childResult(Parent, Child)` nests one row under another,
//! - `error(Message)` fills the single error slot.

use std::collections::BTreeMap;

use serde_json::Value;

use super::solver::{Const, parse_ground_atom};
use crate::error::CardoError;

/// One row of a query result.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub key: String,
    pub fields: BTreeMap<String, Value>,
    pub children: Vec<ResultRow>,
}

/// A parsed answer set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub error: Option<String>,
    pub rows: Vec<ResultRow>,
}

impl QueryResult {
    /// Total number of rows, nested rows included.
    pub fn row_count(&self) -> usize {
        fn count(rows: &[ResultRow]) -> usize {
            rows.iter().map(|r| 1 + count(&r.children)).sum()
        }
        count(&self.rows)
    }

    /// Find a row by key anywhere in the hierarchy.
    pub fn find(&self, key: &str) -> Option<&ResultRow> {
        fn search<'a>(rows: &'a [ResultRow], key: &str) -> Option<&'a ResultRow> {
            for row in rows {
                if row.key == key {
                    return Some(row);
                }
                if let Some(found) = search(&row.children, key) {
                    return Some(found);
                }
            }
            None
        }
        search(&self.rows, key)
    }
}

fn const_to_json(value: &Const) -> Value {
    match value {
        Const::Int(i) => Value::from(*i),
        Const::Sym(s) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => Value::from(other),
        },
        Const::Str(s) => Value::from(s.clone()),
    }
}

fn const_to_key(value: &Const) -> String {
    match value {
        Const::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the hierarchical result from rendered answer atoms.
pub fn parse_answers(answers: &[String]) -> Result<QueryResult, CardoError> {
    let mut error = None;
    let mut keys: Vec<String> = Vec::new();
    let mut fields: BTreeMap<String, BTreeMap<String, Vec<Value>>> = BTreeMap::new();
    let mut child_edges: Vec<(String, String)> = Vec::new();

    for answer in answers {
        let (predicate, terms) = parse_ground_atom(answer)?;
        match (predicate.as_str(), terms.as_slice()) {
            ("result", [key]) => keys.push(const_to_key(key)),
            ("field", [key, name, value]) => {
                fields
                    .entry(const_to_key(key))
                    .or_default()
                    .entry(const_to_key(name))
                    .or_default()
                    .push(const_to_json(value));
            }
            ("childResult", [parent, child]) => {
                child_edges.push((const_to_key(parent), const_to_key(child)));
            }
            ("error", [message]) => {
                error = Some(const_to_key(message));
            }
            // Atoms outside the vocabulary are tolerated; ad-hoc programs may
            // show anything.
            _ => {}
        }
    }

    let mut rows: BTreeMap<String, ResultRow> = keys
        .into_iter()
        .map(|key| {
            let fields = fields
                .remove(&key)
                .unwrap_or_default()
                .into_iter()
                .map(|(name, mut values)| {
                    let value = if values.len() == 1 {
                        values.pop().expect("non-empty")
                    } else {
                        Value::Array(values)
                    };
                    (name, value)
                })
                .collect();
            (key.clone(), ResultRow { key, fields, children: Vec::new() })
        })
        .collect();

    // Edges where both endpoints are rows form the hierarchy; a child with a
    // missing parent stays top-level.
    let mut children_of: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut is_child: std::collections::BTreeSet<String> = Default::default();
    for (parent, child) in &child_edges {
        if rows.contains_key(parent) && rows.contains_key(child) && is_child.insert(child.clone())
        {
            children_of.entry(parent.clone()).or_default().push(child.clone());
        }
    }

    fn build(
        key: &str,
        rows: &mut BTreeMap<String, ResultRow>,
        children_of: &BTreeMap<String, Vec<String>>,
    ) -> Option<ResultRow> {
        let mut row = rows.remove(key)?;
        if let Some(children) = children_of.get(key) {
            for child in children {
                if let Some(child_row) = build(child, rows, children_of) {
                    row.children.push(child_row);
                }
            }
        }
        Some(row)
    }

    let root_keys: Vec<String> =
        rows.keys().filter(|k| !is_child.contains(*k)).cloned().collect();
    let mut top_level = Vec::new();
    for key in root_keys {
        if let Some(row) = build(&key, &mut rows, &children_of) {
            top_level.push(row);
        }
    }
    // Rows unreachable from any root (malformed edge data) stay visible.
    top_level.extend(rows.into_values());

    let mut result = QueryResult { error, rows: top_level };
    sort_rows(&mut result.rows);
    Ok(result)
}

/// Stable ordering: by the `rank` field when present, then by key.
fn sort_rows(rows: &mut [ResultRow]) {
    rows.sort_by(|a, b| {
        let ra = a.fields.get("rank").and_then(Value::as_str);
        let rb = b.fields.get("rank").and_then(Value::as_str);
        ra.cmp(&rb).then_with(|| a.key.cmp(&b.key))
    });
    for row in rows {
        sort_rows(&mut row.children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_rows_with_fields() {
        let answers = vec![
            r#"result("demo_1")"#.to_string(),
            r#"result("demo_2")"#.to_string(),
            r#"field("demo_1","workflowState","Draft")"#.to_string(),
            r#"field("demo_1","estimate",8)"#.to_string(),
        ];
        let result = parse_answers(&answers).unwrap();
        assert_eq!(result.rows.len(), 2);
        let row = result.find("demo_1").unwrap();
        assert_eq!(row.fields["workflowState"], "Draft");
        assert_eq!(row.fields["estimate"], 8);
        assert!(result.error.is_none());
    }

    #[test]
    fn repeated_fields_become_arrays() {
        let answers = vec![
            r#"result("demo_1")"#.to_string(),
            r#"field("demo_1","labels","alpha")"#.to_string(),
            r#"field("demo_1","labels","beta")"#.to_string(),
        ];
        let result = parse_answers(&answers).unwrap();
        let row = result.find("demo_1").unwrap();
        assert_eq!(row.fields["labels"], serde_json::json!(["alpha", "beta"]));
    }

    #[test]
    fn child_edges_nest_rows() {
        let answers = vec![
            r#"result("demo_1")"#.to_string(),
            r#"result("demo_2")"#.to_string(),
            r#"result("demo_3")"#.to_string(),
            r#"childResult("demo_1","demo_2")"#.to_string(),
            r#"childResult("demo_2","demo_3")"#.to_string(),
        ];
        let result = parse_answers(&answers).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.row_count(), 3);
        let root = &result.rows[0];
        assert_eq!(root.key, "demo_1");
        assert_eq!(root.children[0].key, "demo_2");
        assert_eq!(root.children[0].children[0].key, "demo_3");
    }

    #[test]
    fn error_slot_is_captured() {
        let answers = vec![r#"error("no such card")"#.to_string()];
        let result = parse_answers(&answers).unwrap();
        assert_eq!(result.error.as_deref(), Some("no such card"));
    }

    #[test]
    fn rows_sort_by_rank_then_key() {
        let answers = vec![
            r#"result("demo_b")"#.to_string(),
            r#"result("demo_a")"#.to_string(),
            r#"field("demo_b","rank","a")"#.to_string(),
            r#"field("demo_a","rank","b")"#.to_string(),
        ];
        let result = parse_answers(&answers).unwrap();
        let keys: Vec<&str> = result.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["demo_b", "demo_a"]);
    }
}
