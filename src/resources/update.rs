//! Update operations applied to resource documents.
//!
//! Array elements are compared by their JSON form, so objects and scalars go
//! through the same handler.

use serde_json::Value;

use crate::error::CardoError;

/// A single mutation of one key in a resource document.
#[derive(Debug, Clone)]
pub enum UpdateOp {
    /// Scalar assignment.
    Set(Value),
    /// Append to an array; duplicates are rejected.
    Add(Value),
    /// Remove an existing element from an array.
    Remove(Value),
    /// Replace an existing element in place.
    Change { target: Value, to: Value },
    /// Move an existing element to a new index.
    Rank { target: Value, index: usize },
}

/// Apply `op` to `doc[key]`.
///
/// `Set` creates the key when missing; the array variants require `doc[key]`
/// to already be an array.
pub fn apply(doc: &mut Value, key: &str, op: UpdateOp) -> Result<(), CardoError> {
    let object = doc.as_object_mut().ok_or_else(|| {
        CardoError::InvalidInput("Resource document is not a JSON object".into())
    })?;

    if let UpdateOp::Set(value) = op {
        if value.is_null() {
            object.remove(key);
        } else {
            object.insert(key.to_string(), value);
        }
        return Ok(());
    }

    let slot = object.get_mut(key).ok_or_else(|| {
        CardoError::InvalidInput(format!("Resource document has no key '{key}'"))
    })?;
    let array = slot.as_array_mut().ok_or_else(|| {
        CardoError::InvalidInput(format!("Key '{key}' is not an array"))
    })?;

    match op {
        UpdateOp::Set(_) => unreachable!("handled above"),
        UpdateOp::Add(value) => {
            if array.contains(&value) {
                return Err(CardoError::ItemAlreadyExists(compact(&value)));
            }
            array.push(value);
        }
        UpdateOp::Remove(target) => {
            let at = position(array, &target)?;
            array.remove(at);
        }
        UpdateOp::Change { target, to } => {
            let at = position(array, &target)?;
            array[at] = to;
        }
        UpdateOp::Rank { target, index } => {
            if index >= array.len() {
                return Err(CardoError::InvalidTargetIndex { index, len: array.len() });
            }
            let at = position(array, &target)?;
            let value = array.remove(at);
            array.insert(index, value);
        }
    }
    Ok(())
}

fn position(array: &[Value], target: &Value) -> Result<usize, CardoError> {
    array
        .iter()
        .position(|v| v == target)
        .ok_or_else(|| CardoError::ItemNotFound(compact(target)))
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "name": "demo/workflows/simple",
            "states": [
                {"name": "Draft", "category": "initial"},
                {"name": "Approved", "category": "closed"}
            ]
        })
    }

    #[test]
    fn set_assigns_and_null_clears() {
        let mut d = doc();
        apply(&mut d, "displayName", UpdateOp::Set(json!("Simple"))).unwrap();
        assert_eq!(d["displayName"], "Simple");
        apply(&mut d, "displayName", UpdateOp::Set(Value::Null)).unwrap();
        assert!(d.get("displayName").is_none());
    }

    #[test]
    fn add_then_remove_is_identity() {
        let mut d = doc();
        let original = d.clone();
        let state = json!({"name": "Archived", "category": "closed"});
        apply(&mut d, "states", UpdateOp::Add(state.clone())).unwrap();
        apply(&mut d, "states", UpdateOp::Remove(state)).unwrap();
        assert_eq!(d, original);
    }

    #[test]
    fn double_add_is_a_conflict() {
        let mut d = doc();
        let state = json!({"name": "Archived"});
        apply(&mut d, "states", UpdateOp::Add(state.clone())).unwrap();
        let err = apply(&mut d, "states", UpdateOp::Add(state)).unwrap_err();
        assert!(matches!(err, CardoError::ItemAlreadyExists(_)));
    }

    #[test]
    fn change_requires_existing_target() {
        let mut d = doc();
        let err = apply(
            &mut d,
            "states",
            UpdateOp::Change { target: json!({"name": "Ghost"}), to: json!({"name": "X"}) },
        )
        .unwrap_err();
        assert!(matches!(err, CardoError::ItemNotFound(_)));
    }

    #[test]
    fn rank_moves_and_preserves_the_set() {
        let mut d = doc();
        apply(
            &mut d,
            "states",
            UpdateOp::Rank { target: json!({"name": "Approved", "category": "closed"}), index: 0 },
        )
        .unwrap();
        assert_eq!(d["states"][0]["name"], "Approved");
        assert_eq!(d["states"][1]["name"], "Draft");
    }

    #[test]
    fn rank_rejects_out_of_range_index() {
        let mut d = doc();
        let err = apply(
            &mut d,
            "states",
            UpdateOp::Rank { target: json!({"name": "Draft", "category": "initial"}), index: 5 },
        )
        .unwrap_err();
        assert!(matches!(err, CardoError::InvalidTargetIndex { index: 5, len: 2 }));
    }

    #[test]
    fn structural_equality_covers_objects() {
        let mut d = doc();
        // Same JSON form, built separately.
        apply(
            &mut d,
            "states",
            UpdateOp::Remove(json!({"category": "initial", "name": "Draft"})),
        )
        .unwrap();
        assert_eq!(d["states"].as_array().unwrap().len(), 1);
    }
}
