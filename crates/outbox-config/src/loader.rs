//! Layered YAML config loading: later files deep-merge over earlier ones,
//! then the merged document is deserialized into [`crate::Config`].
//!
//! This lives outside the core crates deliberately — configuration
//! loading is an external concern; the core only needs the resulting
//! `Config` value, never a file path.

use std::fs;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::Config;

/// Load and deep-merge YAML files in order, then deserialize into
/// [`Config`]. Missing fields fall back to [`Config::default`] via serde's
/// `#[serde(default)]`-free path: callers that want partial overrides
/// should merge over a base document produced from `Config::default()`
/// serialized to YAML first.
pub fn load_layered_yaml(paths: &[&str]) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default()).context("serialize defaults")?;

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    serde_json::from_value(merged).context("merged config does not match Config shape")
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}
