//! Loosely-typed launch request parsing.
//!
//! Requests arrive from untrusted parameters where every field may be a
//! string, so boolean-like fields go through an explicit three-way parse
//! rather than serde's native `bool`. Only the literal string `"false"`
//! reads as false; any other present value — empty string, `0`, even JSON
//! `false` — reads as true. Existing callers depend on that coercion.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::EngineVariant;

/// Loose truthiness over an already-present value.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::String(s) => s != "false",
        _ => true,
    }
}

fn de_boolish<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|v| truthy(&v)))
}

fn de_loose_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Which of the compiled-in default arguments to drop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IgnoreDefaultArgs {
    /// Keep every default argument (unset or `"false"`).
    #[default]
    Keep,
    /// Drop all default arguments (`""`, `"true"`, or `true`).
    All,
    /// Drop only the listed tokens (comma-split string or array).
    Listed(Vec<String>),
}

impl<'de> Deserialize<'de> for IgnoreDefaultArgs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null | Value::Bool(false) => Self::Keep,
            Value::Bool(true) => Self::All,
            Value::String(s) if s == "false" => Self::Keep,
            Value::String(s) if s.is_empty() || s == "true" => Self::All,
            Value::String(s) => Self::Listed(
                s.split(',')
                    .map(|token| token.trim().to_string())
                    .filter(|token| !token.is_empty())
                    .collect(),
            ),
            Value::Array(items) => Self::Listed(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        other => Some(other.to_string()),
                    })
                    .collect(),
            ),
            _ => Self::Keep,
        })
    }
}

/// A launch request as received from the embedding server.
///
/// Unknown fields are collected in `extra`; the ones whose names start with
/// `--` pass through verbatim as additional process arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchRequest {
    /// Explicit process arguments, highest-precedence launch input.
    pub args: Vec<String>,
    #[serde(deserialize_with = "de_boolish")]
    pub headless: Option<bool>,
    pub ignore_default_args: IgnoreDefaultArgs,
    /// Top-level user data directory option; an explicit `--user-data-dir`
    /// argument wins over it.
    pub user_data_dir: Option<String>,
    #[serde(deserialize_with = "de_boolish")]
    pub block_ads: Option<bool>,
    #[serde(deserialize_with = "de_boolish")]
    pub pause_on_connect: Option<bool>,
    /// Opaque caller correlation id, scoped into the workspace layout.
    pub tracking_id: Option<String>,
    /// Idle deadline in milliseconds after which the session is torn down.
    #[serde(deserialize_with = "de_loose_u64")]
    pub keepalive: Option<u64>,
    pub engine: EngineVariant,
    /// Set by the embedder for instances launched ahead of a request.
    #[serde(skip)]
    pub prebooted: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LaunchRequest {
    /// Unknown `--`-prefixed request fields, rendered as process arguments.
    pub fn passthrough_args(&self) -> Vec<String> {
        self.extra
            .iter()
            .filter(|(key, _)| key.starts_with("--"))
            .map(|(key, value)| match value {
                Value::Null => key.clone(),
                Value::String(s) if s.is_empty() => key.clone(),
                Value::String(s) => format!("{key}={s}"),
                other => format!("{key}={other}"),
            })
            .collect()
    }
}
