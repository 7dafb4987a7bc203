//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered, versioned pipeline.
///
/// `name` is not globally unique; the pair (name, version) is. At most one
/// version of a given name may be active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Store-assigned identity, absent until first persisted.
    pub id: Option<i64>,
    pub name: String,
    pub version: i64,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub active: bool,
    pub implementation: TaskRef,
}

impl Pipeline {
    /// A fresh, inactive registration of `implementation` under `name`.
    pub fn new(
        name: impl Into<String>,
        version: i64,
        owner: impl Into<String>,
        tags: Vec<String>,
        implementation: TaskRef,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            version,
            owner: owner.into(),
            created_at: Utc::now(),
            tags,
            active: false,
            implementation,
        }
    }
}

/// Implementation descriptor stored in the catalog.
///
/// Pipelines dispatch by capability: the catalog stores the key of a
/// compiled-in task plus the declared shape of its parameters, never code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    pub task: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl TaskRef {
    pub fn named(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            params: Vec::new(),
        }
    }
}

/// Declared parameter of a pipeline implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
}
