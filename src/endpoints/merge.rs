use serde_json::{Map, Value};

use super::tree::RequestConfig;

/// Recursively merges `source` into `target`.
///
/// Objects merge key by key. Arrays, scalars and `null` in `source` replace
/// whatever `target` holds at that position.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => merge_maps(target, source),
        (target, source) => *target = source,
    }
}

pub(crate) fn merge_maps(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}

/// Deep-merges `overrides` over `base` without touching either input.
///
/// Returns `None` only when both sides are absent.
pub fn merge_request_configs(
    base: Option<&RequestConfig>,
    overrides: Option<&RequestConfig>,
) -> Option<RequestConfig> {
    match (base, overrides) {
        (None, None) => None,
        (Some(base), None) => Some(base.clone()),
        (None, Some(overrides)) => Some(overrides.clone()),
        (Some(base), Some(overrides)) => {
            let mut merged = base.clone();
            merge_maps(merged.as_map_mut(), overrides.as_map().clone());
            Some(merged)
        }
    }
}

/// Merges an update into an optional stored config in place.
pub(crate) fn merge_into(target: &mut Option<RequestConfig>, update: RequestConfig) {
    match target {
        Some(existing) => merge_maps(existing.as_map_mut(), update.into_map()),
        None => *target = Some(update),
    }
}
