//! A minimal RFC 6902 JSON Patch: diff two [`serde_json::Value`] trees
//! into `add`/`remove`/`replace` operations, and apply a patch back.
//!
//! No crate in reach of this workspace implements JSON Patch, so this
//! is hand-rolled. Scope is deliberately narrower than the full RFC:
//! `move`/`copy`/`test` are never emitted (reconstructing prior states
//! only requires `add`/`remove`/`replace`), though `test` is accepted
//! on apply for forward-compatibility with hand-authored patches.

use serde_json::Value;

/// One JSON Patch operation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Test { path: String, value: Value },
}

/// An ordered sequence of [`PatchOp`]s, applied in order.
pub type Patch = Vec<PatchOp>;

/// Diff `before` against `after`, producing the patch that turns
/// `before` into `after`. Object keys present in `before` but absent
/// from `after` become `remove`; keys added become `add`; keys whose
/// value differs become `replace`. Arrays are compared wholesale: any
/// difference in an array value produces a single `replace` at the
/// array's path, favoring a stable diff over a minimal one.
pub fn diff(before: &Value, after: &Value) -> Patch {
    let mut ops = Vec::new();
    diff_at("", before, after, &mut ops);
    ops
}

fn diff_at(path: &str, before: &Value, after: &Value, ops: &mut Patch) {
    match (before, after) {
        (Value::Object(before_map), Value::Object(after_map)) => {
            for (key, before_value) in before_map {
                let child_path = format!("{path}/{}", escape_token(key));
                match after_map.get(key) {
                    None => ops.push(PatchOp::Remove { path: child_path }),
                    Some(after_value) => diff_at(&child_path, before_value, after_value, ops),
                }
            }
            for (key, after_value) in after_map {
                if !before_map.contains_key(key) {
                    let child_path = format!("{path}/{}", escape_token(key));
                    ops.push(PatchOp::Add {
                        path: child_path,
                        value: after_value.clone(),
                    });
                }
            }
        }
        _ if before != after => ops.push(PatchOp::Replace {
            path: path.to_string(),
            value: after.clone(),
        }),
        _ => {}
    }
}

/// Apply `patch` to `base`, returning the resulting document.
///
/// `test` operations fail the whole apply if the value at `path`
/// doesn't match; `remove` of an absent path or `replace`/`add` at a
/// path whose parent doesn't exist as an object both fail, since this
/// crate only ever applies patches it produced itself via [`diff`] or
/// `null`-tolerant hand-authored ones.
pub fn apply(base: &Value, patch: &Patch) -> Result<Value, String> {
    let mut doc = base.clone();
    for op in patch {
        apply_one(&mut doc, op)?;
    }
    Ok(doc)
}

fn apply_one(doc: &mut Value, op: &PatchOp) -> Result<(), String> {
    match op {
        PatchOp::Add { path, value } => set_at(doc, path, value.clone()),
        PatchOp::Replace { path, value } => set_at(doc, path, value.clone()),
        PatchOp::Remove { path } => remove_at(doc, path),
        PatchOp::Test { path, value } => {
            let found = get_at(doc, path).ok_or_else(|| format!("test: path not found: {path}"))?;
            if found == value {
                Ok(())
            } else {
                Err(format!("test failed at {path}"))
            }
        }
    }
}

fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    path.trim_start_matches('/')
        .split('/')
        .map(unescape_token)
        .collect()
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn get_at<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let tokens = split_path(path);
    let mut current = doc;
    for token in tokens {
        current = current.as_object()?.get(&token)?;
    }
    Some(current)
}

fn set_at(doc: &mut Value, path: &str, value: Value) -> Result<(), String> {
    let tokens = split_path(path);
    if tokens.is_empty() {
        *doc = value;
        return Ok(());
    }
    let mut current = doc;
    for token in &tokens[..tokens.len() - 1] {
        current = current
            .as_object_mut()
            .ok_or_else(|| format!("path segment is not an object: {path}"))?
            .entry(token.clone())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    current
        .as_object_mut()
        .ok_or_else(|| format!("parent of {path} is not an object"))?
        .insert(tokens.last().unwrap().clone(), value);
    Ok(())
}

fn remove_at(doc: &mut Value, path: &str) -> Result<(), String> {
    let tokens = split_path(path);
    if tokens.is_empty() {
        return Err("cannot remove document root".to_string());
    }
    let mut current = doc;
    for token in &tokens[..tokens.len() - 1] {
        current = current
            .as_object_mut()
            .ok_or_else(|| format!("path segment is not an object: {path}"))?
            .get_mut(token)
            .ok_or_else(|| format!("path not found: {path}"))?;
    }
    current
        .as_object_mut()
        .ok_or_else(|| format!("parent of {path} is not an object"))?
        .remove(tokens.last().unwrap())
        .map(|_| ())
        .ok_or_else(|| format!("path not found: {path}"))
}
