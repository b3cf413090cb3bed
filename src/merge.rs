use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

/// Recursively merges `incoming` into a copy of `existing`.
///
/// Sub-mappings merge key by key with the same `overwrite` flag; scalars are
/// normalized on the way in. Absent keys are always set; present keys only
/// change when `overwrite` is true, otherwise the existing value wins and the
/// incoming one is dropped. Pure: persistence is the caller's job.
pub fn merge(
    existing: &Map<String, Value>,
    incoming: &Map<String, Value>,
    overwrite: bool,
) -> Map<String, Value> {
    let mut result = existing.clone();
    merge_into(&mut result, incoming, overwrite);
    result
}

fn merge_into(existing: &mut Map<String, Value>, incoming: &Map<String, Value>, overwrite: bool) {
    for (key, value) in incoming {
        if let Value::Object(sub) = value {
            match existing.get_mut(key) {
                Some(Value::Object(existing_sub)) => merge_into(existing_sub, sub, overwrite),
                Some(_) if !overwrite => {
                    debug!(key, "existing scalar blocks incoming sub-mapping, skipping");
                }
                _ => {
                    let mut fresh = Map::new();
                    merge_into(&mut fresh, sub, overwrite);
                    existing.insert(key.clone(), Value::Object(fresh));
                }
            }
            continue;
        }

        let value = normalize(value);
        if existing.contains_key(key) {
            if overwrite {
                debug!(key, "overwriting existing value");
                existing.insert(key.clone(), value);
            } else {
                debug!(key, "key present, skipping");
            }
        } else {
            debug!(key, "setting new key");
            existing.insert(key.clone(), value);
        }
    }
}

/// Coerces library-boxed numerics to their native equivalents: float-typed
/// whole numbers become integers, everything else passes through. Unrecognized
/// shapes are left as-is with a warning, never an error.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Number(number) => normalize_number(number),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Null | Value::Bool(_) | Value::String(_) => value.clone(),
        Value::Object(_) => {
            warn!("sub-mapping reached scalar normalization, passing through unchanged");
            value.clone()
        }
    }
}

fn normalize_number(number: &Number) -> Value {
    if number.is_i64() || number.is_u64() {
        return Value::Number(number.clone());
    }
    match number.as_f64() {
        Some(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => {
            Value::Number(Number::from(float as i64))
        }
        Some(_) => Value::Number(number.clone()),
        None => {
            warn!(%number, "unrecognized numeric value, passing through unchanged");
            Value::Number(number.clone())
        }
    }
}

/// Parses a raw table cell into the closest native scalar: bool, integer,
/// float, then string.
pub fn normalize_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    match trimmed.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(Number::from(int));
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if let Some(number) = Number::from_f64(float) {
            return normalize(&Value::Number(number));
        }
    }
    Value::String(trimmed.to_string())
}
