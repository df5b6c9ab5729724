//! Field omission: deliberate removal of response fields to simulate
//! incomplete data.
//!
//! Manual mode deletes explicitly listed dot-paths. Random mode
//! enumerates reachable paths, shuffles them with a Fisher-Yates pass
//! driven by the policy's generator, and omits each surviving
//! candidate with the configured probability until `max_omit_count`
//! omissions have been applied. With a seed the whole pass is
//! deterministic.

use crate::config::{FieldOmitPolicy, OmitMode, OmitSelection};
use crate::rng::{draw_percent, Entropy, Mulberry32};
use rand::RngCore;
use serde_json::Value;

/// Apply a field-omission policy to a JSON value.
///
/// The input is never mutated; a corrupted copy is returned. When the
/// policy is disabled the input is returned unchanged.
pub fn omit(value: &Value, policy: &FieldOmitPolicy, entropy: &dyn Entropy) -> Value {
    if !policy.enabled {
        return value.clone();
    }

    let mut out = value.clone();
    match policy.mode {
        OmitSelection::Manual => {
            for path in &policy.fields {
                apply_omission(&mut out, path, OmitMode::Delete);
            }
        }
        OmitSelection::Random => {
            let mut rng: Box<dyn RngCore> = match policy.random.seed {
                Some(seed) => Box::new(Mulberry32::new(seed)),
                None => entropy.rng(),
            };
            random_omit(&mut out, policy, rng.as_mut());
        }
    }
    out
}

fn random_omit(value: &mut Value, policy: &FieldOmitPolicy, rng: &mut dyn RngCore) {
    let random = &policy.random;

    let mut candidates: Vec<String> = Vec::new();
    collect_paths(value, random.depth_limit, 0, &mut String::new(), &mut candidates);
    candidates.retain(|path| !is_excluded(path, &random.exclude_fields));

    shuffle(&mut candidates, rng);

    let mut omitted = 0;
    for path in &candidates {
        if omitted >= random.max_omit_count {
            break;
        }
        if draw_percent(rng, random.probability) {
            apply_omission(value, path, random.omit_mode);
            omitted += 1;
        }
    }
}

/// Enumerate every reachable field path up to `depth_limit` (depth 0 =
/// top-level keys), descending into objects and arrays alike.
fn collect_paths(
    value: &Value,
    depth_limit: usize,
    depth: usize,
    prefix: &mut String,
    out: &mut Vec<String>,
) {
    if depth > depth_limit {
        return;
    }

    let mut visit = |key: &str, child: &Value, out: &mut Vec<String>| {
        let saved_len = prefix.len();
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(key);
        out.push(prefix.clone());
        collect_paths(child, depth_limit, depth + 1, prefix, out);
        prefix.truncate(saved_len);
    };

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                visit(key, child, out);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                visit(&idx.to_string(), child, out);
            }
        }
        _ => {}
    }
}

/// Whether a candidate path is protected by the exclusion list.
/// Protection is inherited: excluding `result` also protects
/// `result.user.email`.
fn is_excluded(path: &str, excludes: &[String]) -> bool {
    excludes.iter().any(|excluded| {
        path == excluded.as_str()
            || (path.len() > excluded.len()
                && path.starts_with(excluded.as_str())
                && path.as_bytes()[excluded.len()] == b'.')
    })
}

/// Fisher-Yates shuffle driven by the supplied generator, so selection
/// order is unbiased and independent of traversal order.
fn shuffle(items: &mut [String], rng: &mut dyn RngCore) {
    for i in (1..items.len()).rev() {
        let j = (rng.next_u32() as usize) % (i + 1);
        items.swap(i, j);
    }
}

/// Apply one omission at a dot-path. Unreachable paths and non-object
/// intermediates are ignored silently.
fn apply_omission(value: &mut Value, path: &str, mode: OmitMode) {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = value;
    for part in parents {
        current = match current {
            Value::Object(map) => match map.get_mut(*part) {
                Some(child) => child,
                None => return,
            },
            Value::Array(items) => match part.parse::<usize>().ok().and_then(|i| items.get_mut(i))
            {
                Some(child) => child,
                None => return,
            },
            _ => return,
        };
    }

    match current {
        Value::Object(map) => match mode {
            OmitMode::Delete => {
                map.remove(*last);
            }
            OmitMode::Undefined | OmitMode::Null => {
                if let Some(slot) = map.get_mut(*last) {
                    *slot = Value::Null;
                }
            }
        },
        Value::Array(items) => {
            // Arrays cannot have holes; every omit mode nulls the slot
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}
