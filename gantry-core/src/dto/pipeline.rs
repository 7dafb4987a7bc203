//! Pipeline DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{Pipeline, TaskRef};

/// Request to register a pipeline implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPipeline {
    pub name: String,
    pub implementation: TaskRef,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// When set, registers `max(version) + 1` of an existing name.
    #[serde(default)]
    pub new_version: bool,
}

/// Optional filters for pipeline lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineQuery {
    pub version: Option<i64>,
    pub active: Option<bool>,
    pub tag: Option<String>,
}

/// Lightweight pipeline listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub name: String,
    pub version: i64,
    pub owner: String,
    pub active: bool,
    pub tags: Vec<String>,
    pub task: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Pipeline> for PipelineSummary {
    fn from(p: &Pipeline) -> Self {
        Self {
            name: p.name.clone(),
            version: p.version,
            owner: p.owner.clone(),
            active: p.active,
            tags: p.tags.clone(),
            task: p.implementation.task.clone(),
            created_at: p.created_at,
        }
    }
}
