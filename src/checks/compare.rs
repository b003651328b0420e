//! Comparison helpers shared by the checks
//!
//! Exact on structure (keys, counts, ids), tolerant on floating point
//! aggregates.

use bson::Bson;
use serde_json::{Map, Value};

use super::CheckFailure;

/// Tolerance for aggregate comparisons
pub const EPSILON: f64 = 1e-2;

/// Numeric value of a JSON field
///
/// Accepts plain numbers and extended-JSON wrappers such as
/// `{"$numberDecimal": "129.50"}`.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => ["$numberDecimal", "$numberDouble", "$numberInt", "$numberLong"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(|inner| match inner {
                Value::String(s) => s.trim().parse().ok(),
                Value::Number(n) => n.as_f64(),
                _ => None,
            }),
        _ => None,
    }
}

/// Numeric value of a BSON field, including `Decimal128`
pub fn bson_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(d) => Some(*d),
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        other => numeric_value(&other.clone().into_relaxed_extjson()),
    }
}

pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon
}

/// Comparable string form of a ground-truth `_id`
pub fn bson_id(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Comparable string form of an `_id` returned by the service
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// `_id` of a JSON document from the service
pub fn json_doc_id(doc: &Value) -> Option<String> {
    doc.get("_id").and_then(json_id)
}

/// Whether a search-index field mapping declares `ty`
///
/// A mapping is either a single object with a `type` or a list of such
/// objects (multi-typed fields).
pub fn field_type_includes(mapping: &Bson, ty: &str) -> bool {
    match mapping {
        Bson::Document(doc) => doc.get_str("type").map(|t| t == ty).unwrap_or(false),
        Bson::Array(items) => items.iter().any(|item| field_type_includes(item, ty)),
        _ => false,
    }
}

/// Fail with a parse error naming the first missing field
pub fn require_fields(
    obj: &Map<String, Value>,
    fields: &[&str],
    context: &str,
) -> Result<(), CheckFailure> {
    match fields.iter().find(|f| !obj.contains_key(**f)) {
        Some(missing) => Err(CheckFailure::parse(format!(
            "missing required field '{}' in {}",
            missing, context
        ))),
        None => Ok(()),
    }
}

/// Fail with a mismatch unless the counts agree
pub fn expect_count(what: &str, expected: usize, actual: usize) -> Result<(), CheckFailure> {
    if expected == actual {
        Ok(())
    } else {
        Err(CheckFailure::mismatch(format!(
            "{} count differs: expected {}, got {}",
            what, expected, actual
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use serde_json::json;

    #[test]
    fn test_numeric_value_accepts_decimal_wrapper() {
        assert_eq!(numeric_value(&json!(3)), Some(3.0));
        assert_eq!(numeric_value(&json!({ "$numberDecimal": "129.50" })), Some(129.5));
        assert_eq!(numeric_value(&json!("12")), None);
        assert_eq!(numeric_value(&json!({ "price": 1 })), None);
    }

    #[test]
    fn test_bson_number() {
        assert_eq!(bson_number(&Bson::Int32(4)), Some(4.0));
        assert_eq!(bson_number(&Bson::Double(1.25)), Some(1.25));
        assert_eq!(bson_number(&Bson::String("1".into())), None);
    }

    #[test]
    fn test_approx_eq_uses_tolerance() {
        assert!(approx_eq(100.004, 100.0, EPSILON));
        assert!(!approx_eq(100.02, 100.0, EPSILON));
    }

    #[test]
    fn test_ids_compare_across_representations() {
        let oid = ObjectId::new();
        assert_eq!(
            bson_id(&Bson::ObjectId(oid)),
            json_id(&json!({ "$oid": oid.to_hex() })).unwrap()
        );
        assert_eq!(bson_id(&Bson::String("10006546".into())), "10006546");
        assert_eq!(json_doc_id(&json!({ "_id": "10006546" })).as_deref(), Some("10006546"));
        assert_eq!(json_doc_id(&json!({ "name": "x" })), None);
    }

    #[test]
    fn test_field_type_single_and_list() {
        let single = Bson::Document(doc! { "type": "token" });
        let multi = Bson::Array(vec![
            Bson::Document(doc! { "type": "string" }),
            Bson::Document(doc! { "type": "token" }),
        ]);
        assert!(field_type_includes(&single, "token"));
        assert!(field_type_includes(&multi, "token"));
        assert!(!field_type_includes(&single, "number"));
    }

    #[test]
    fn test_require_fields_names_missing_field() {
        let obj = json!({ "a": 1 });
        let err = require_fields(obj.as_object().unwrap(), &["a", "b"], "result 0").unwrap_err();
        assert!(err.reason().contains("'b'"));
    }
}
