//! Versioned scene snapshot format.
//!
//! ```json
//! { "version": 1, "updatedAt": 1700000000000, "data": [ElementRecord, ...] }
//! ```
//!
//! Only root-level elements appear in `data`; descendants nest through each
//! record's `children`.

use crate::element::{ElementKind, Fill};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{SystemTime, UNIX_EPOCH};
#[cfg(target_arch = "wasm32")]
use web_time::{SystemTime, UNIX_EPOCH};

/// The only snapshot version this crate reads or writes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot parsing errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(String),
    #[error("Snapshot has no data array")]
    MissingData,
}

/// Persisted form of the whole scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    /// Unix time in milliseconds.
    #[serde(default)]
    pub updated_at: i64,
    pub data: Vec<ElementRecord>,
}

/// Persisted form of one element and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub width: f64,
    pub height: f64,
    /// `[a, b, c, d, e, f]`
    pub matrix: [f64; 6],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub children: Vec<ElementRecord>,
}

fn default_visible() -> bool {
    true
}

impl ElementRecord {
    /// Number of records in this subtree, including this one.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(ElementRecord::subtree_len).sum::<usize>()
    }
}

impl Snapshot {
    /// Build a current-version snapshot stamped with the current time.
    pub fn new(data: Vec<ElementRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            updated_at: now_millis(),
            data,
        }
    }

    /// Total number of element records, nested ones included.
    pub fn element_count(&self) -> usize {
        self.data.iter().map(ElementRecord::subtree_len).sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a snapshot, rejecting anything whose `version` is not exactly
    /// [`SNAPSHOT_VERSION`] or whose `data` is not an array. No migration is
    /// attempted.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_str(json)?;

        let version = value.get("version").cloned().unwrap_or(Value::Null);
        if version.as_u64() != Some(u64::from(SNAPSHOT_VERSION)) {
            return Err(SnapshotError::UnsupportedVersion(version.to_string()));
        }
        if !value.get("data").is_some_and(Value::is_array) {
            return Err(SnapshotError::MissingData);
        }

        Ok(serde_json::from_value(value)?)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
