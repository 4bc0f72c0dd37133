//! Models API
//!
//! Descriptors returned by `/v1/models`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A model available to the API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Model identifier used in completion requests
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Creation timestamp (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

impl Model {
    /// Creation time, if the service reported one
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

/// Response of the model listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    /// Object type, normally `list`
    #[serde(default)]
    pub object: String,

    #[serde(default)]
    pub data: Vec<Model>,
}

impl ModelList {
    /// Identifiers of all listed models, in listing order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.data.iter().map(|m| m.id.as_str())
    }

    /// Whether a model with this identifier is listed
    pub fn contains(&self, id: &str) -> bool {
        self.data.iter().any(|m| m.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
