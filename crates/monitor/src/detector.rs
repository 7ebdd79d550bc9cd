use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use webwatch_core_types::ChangeRecord;

#[derive(Clone, Debug, Default)]
pub struct ChangeOutcome {
    pub changed: bool,
    pub changed_fields: Vec<String>,
    pub is_restock: bool,
    pub is_first_execution: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

#[derive(Clone, Debug)]
pub struct FieldChange {
    pub path: String,
    pub kind: ChangeKind,
}

/// Recursive structural diff over JSON extraction results (§4.8). No direct
/// teacher analogue — grounded on the plain `serde_json::Value` recursion
/// idiom used across the retrieval pack for ad-hoc JSON diffing.
pub fn has_changed(
    prev: Option<&HashMap<String, Value>>,
    curr: &HashMap<String, Value>,
) -> ChangeOutcome {
    let Some(prev) = prev else {
        return ChangeOutcome { changed: false, changed_fields: vec![], is_restock: false, is_first_execution: true };
    };

    let prev_value = Value::Object(prev.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    let curr_value = Value::Object(curr.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

    let mut changed_fields = Vec::new();
    diff_values("", &prev_value, &curr_value, &mut changed_fields);
    changed_fields.sort();
    changed_fields.dedup();

    let is_restock = changed_fields.iter().any(|f| f == "roastingDate")
        && is_later_date(prev.get("roastingDate"), curr.get("roastingDate"));

    ChangeOutcome {
        changed: !changed_fields.is_empty(),
        changed_fields,
        is_restock,
        is_first_execution: false,
    }
}

pub fn get_change_details(
    prev: Option<&HashMap<String, Value>>,
    curr: &HashMap<String, Value>,
) -> Vec<FieldChange> {
    let Some(prev) = prev else { return vec![] };
    let mut details = Vec::new();
    for key in curr.keys().chain(prev.keys()).collect::<std::collections::BTreeSet<_>>() {
        match (prev.get(key), curr.get(key)) {
            (None, Some(_)) => details.push(FieldChange { path: key.clone(), kind: ChangeKind::Added }),
            (Some(_), None) => details.push(FieldChange { path: key.clone(), kind: ChangeKind::Removed }),
            (Some(a), Some(b)) if a != b => details.push(FieldChange { path: key.clone(), kind: ChangeKind::Modified }),
            _ => {}
        }
    }
    details
}

fn diff_values(path: &str, prev: &Value, curr: &Value, out: &mut Vec<String>) {
    match (prev, curr) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for key in curr_map.keys().chain(prev_map.keys()) {
                let child_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                let prev_child = prev_map.get(key).unwrap_or(&Value::Null);
                let curr_child = curr_map.get(key).unwrap_or(&Value::Null);
                diff_values(&child_path, prev_child, curr_child, out);
            }
        }
        _ => {
            if prev != curr {
                out.push(path.to_string());
            }
        }
    }
}

fn is_later_date(prev: Option<&Value>, curr: Option<&Value>) -> bool {
    match (prev.and_then(|v| v.as_str()), curr.and_then(|v| v.as_str())) {
        (Some(prev), Some(curr)) => curr > prev,
        _ => false,
    }
}

pub fn to_change_record(task_id: webwatch_core_types::TaskId, execution_id: Option<webwatch_core_types::ExecutionId>, outcome: &ChangeOutcome) -> ChangeRecord {
    ChangeRecord {
        task_id,
        execution_id,
        changed_fields: outcome.changed_fields.clone(),
        is_restock: outcome.is_restock,
        detected_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn identical_samples_report_no_change() {
        let sample = map(&[("price", json!(165))]);
        let outcome = has_changed(Some(&sample), &sample);
        assert!(!outcome.changed);
    }

    #[test]
    fn changed_field_set_is_symmetric() {
        let a = map(&[("price", json!(165)), ("roastingDate", json!("2025-07-02"))]);
        let b = map(&[("price", json!(170)), ("roastingDate", json!("2025-07-10"))]);
        let ab = has_changed(Some(&a), &b).changed_fields;
        let ba = has_changed(Some(&b), &a).changed_fields;
        assert_eq!(ab, ba);
    }

    #[test]
    fn restock_requires_strictly_later_date() {
        let prev = map(&[("roastingDate", json!("2025-07-02")), ("price", json!(165))]);
        let curr = map(&[("roastingDate", json!("2025-07-10")), ("price", json!(170))]);
        let outcome = has_changed(Some(&prev), &curr);
        assert!(outcome.is_restock);
        assert!(outcome.changed_fields.contains(&"roastingDate".to_string()));
    }

    #[test]
    fn earlier_date_is_not_a_restock() {
        let prev = map(&[("roastingDate", json!("2025-07-10"))]);
        let curr = map(&[("roastingDate", json!("2025-07-02"))]);
        assert!(!has_changed(Some(&prev), &curr).is_restock);
    }

    #[test]
    fn first_execution_reports_no_change() {
        let curr = map(&[("price", json!(1))]);
        let outcome = has_changed(None, &curr);
        assert!(outcome.is_first_execution);
        assert!(!outcome.changed);
    }

    #[test]
    fn change_details_classify_added_removed_modified() {
        let prev = map(&[("a", json!(1)), ("b", json!(2))]);
        let curr = map(&[("b", json!(3)), ("c", json!(4))]);
        let details = get_change_details(Some(&prev), &curr);
        assert!(details.iter().any(|d| d.path == "a" && d.kind == ChangeKind::Removed));
        assert!(details.iter().any(|d| d.path == "b" && d.kind == ChangeKind::Modified));
        assert!(details.iter().any(|d| d.path == "c" && d.kind == ChangeKind::Added));
    }
}
