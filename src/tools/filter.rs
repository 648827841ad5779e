//! Record filtering and ordering for `query_data` / `aggregate_data`.
//!
//! A filter maps field names to either a literal (equality) or an object of
//! operators: `$gt $lt $gte $lte $eq $ne`. Unknown operators are ignored.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::core::error::ToolError;

pub type Record = Map<String, Value>;

fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None | Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "bool",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

/// Ordering between two values of the same kind; None when incomparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Equality where `1` and `1.0` are the same number.
pub fn values_equal(a: Option<&Value>, b: &Value) -> bool {
    match (a, b) {
        (Some(Value::Number(x)), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (None, Value::Null) => true,
        (Some(x), y) => x == y,
        (None, _) => false,
    }
}

fn ordered(op: &str, item_value: Option<&Value>, value: &Value) -> Result<Ordering, ToolError> {
    item_value
        .and_then(|v| compare(v, value))
        .ok_or_else(|| {
            ToolError::Failed(format!(
                "'{}' not supported between {} and {}",
                op,
                type_name(item_value),
                type_name(Some(value))
            ))
        })
}

/// Whether `item` satisfies every criterion in `filter`.
pub fn matches(item: &Record, filter: &Map<String, Value>) -> Result<bool, ToolError> {
    for (field, condition) in filter {
        let item_value = item.get(field);
        let Value::Object(ops) = condition else {
            if !values_equal(item_value, condition) {
                return Ok(false);
            }
            continue;
        };

        for (op, value) in ops {
            let ok = match op.as_str() {
                "$gt" => ordered(op, item_value, value)? == Ordering::Greater,
                "$lt" => ordered(op, item_value, value)? == Ordering::Less,
                "$gte" => ordered(op, item_value, value)? != Ordering::Less,
                "$lte" => ordered(op, item_value, value)? != Ordering::Greater,
                "$eq" => values_equal(item_value, value),
                "$ne" => !values_equal(item_value, value),
                _ => true,
            };
            if !ok {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Stable sort by `field`; records missing the field sort as `0`.
pub fn sort_records(records: &mut [Record], field: &str) -> Result<(), ToolError> {
    let zero = Value::from(0);
    let mut incomparable = false;
    records.sort_by(|a, b| {
        let x = a.get(field).unwrap_or(&zero);
        let y = b.get(field).unwrap_or(&zero);
        compare(x, y).unwrap_or_else(|| {
            incomparable = true;
            Ordering::Equal
        })
    });
    if incomparable {
        return Err(ToolError::Failed(format!(
            "cannot sort by '{field}': values are not comparable"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn filter(value: Value) -> Map<String, Value> {
        record(value)
    }

    #[test]
    fn operator_filters() {
        let item = record(json!({"age": 30, "city": "Austin"}));
        assert!(matches(&item, &filter(json!({"age": {"$gt": 25}}))).unwrap());
        assert!(!matches(&item, &filter(json!({"age": {"$lt": 25}}))).unwrap());
        assert!(matches(&item, &filter(json!({"age": {"$gte": 30, "$lte": 30.0}}))).unwrap());
        assert!(matches(&item, &filter(json!({"city": {"$ne": "Dallas"}}))).unwrap());
        assert!(matches(&item, &filter(json!({"city": "Austin", "age": 30.0}))).unwrap());
        assert!(!matches(&item, &filter(json!({"city": "Dallas"}))).unwrap());
        assert!(matches(&item, &filter(json!({"age": {"$regex": "x"}}))).unwrap());
    }

    #[test]
    fn incomparable_ordering_is_error() {
        let item = record(json!({"name": "Bob"}));
        assert!(matches(&item, &filter(json!({"age": {"$gt": 1}}))).is_err());
        assert!(matches(&item, &filter(json!({"name": {"$gt": 1}}))).is_err());
        // Missing field only errors for ordering operators
        assert!(matches(&item, &filter(json!({"age": {"$ne": 1}}))).unwrap());
    }

    #[test]
    fn sorting_is_stable_and_defaults_missing_to_zero() {
        let mut records = vec![
            record(json!({"id": 1, "price": 5})),
            record(json!({"id": 2})),
            record(json!({"id": 3, "price": 5})),
            record(json!({"id": 4, "price": 1.5})),
        ];
        sort_records(&mut records, "price").unwrap();
        let ids: Vec<_> = records.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);

        let mut mixed = vec![record(json!({"k": "a"})), record(json!({"k": 1}))];
        assert!(sort_records(&mut mixed, "k").is_err());
    }
}
