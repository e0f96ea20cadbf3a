//! Data exchanged with plugins.

use std::collections::BTreeMap;

use fleet_id::{GroupId, InstanceId, LogicalId};
use serde::{Deserialize, Serialize};

use crate::error::AllocationError;

/// Tag map attached to instances.
pub type Tags = BTreeMap<String, String>;

/// A caller-declared group.
///
/// `properties` is kept opaque here; the controller parses it into
/// allocation, instance and flavor sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(rename = "ID")]
    pub id: GroupId,

    #[serde(rename = "Properties", default)]
    pub properties: serde_json::Value,
}

impl GroupSpec {
    pub fn new(id: impl Into<GroupId>, properties: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            properties,
        }
    }
}

/// How a group is sized: a target count or a fixed set of logical IDs.
///
/// Exactly one of the two must be set; see [`AllocationMethod::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationMethod {
    #[serde(rename = "Size", default)]
    pub size: u32,

    #[serde(rename = "LogicalIDs", default)]
    pub logical_ids: Vec<LogicalId>,
}

/// A resolved allocation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation<'a> {
    /// Elastic pool of this many members.
    Size(u32),
    /// Quorum with exactly these members.
    LogicalIds(&'a [LogicalId]),
}

impl AllocationMethod {
    pub fn with_size(size: u32) -> Self {
        Self {
            size,
            logical_ids: Vec::new(),
        }
    }

    pub fn with_logical_ids(logical_ids: Vec<LogicalId>) -> Self {
        Self {
            size: 0,
            logical_ids,
        }
    }

    /// Resolve to exactly one allocation method.
    pub fn resolve(&self) -> Result<Allocation<'_>, AllocationError> {
        match (self.size, self.logical_ids.is_empty()) {
            (0, true) => Err(AllocationError::Blank),
            (0, false) => Ok(Allocation::LogicalIds(&self.logical_ids)),
            (size, true) => Ok(Allocation::Size(size)),
            (_, false) => Err(AllocationError::Ambiguous),
        }
    }
}

/// A request to provision one instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Instance plugin properties, passed through untouched.
    #[serde(rename = "Properties", default)]
    pub properties: serde_json::Value,

    #[serde(rename = "Tags", default)]
    pub tags: Tags,

    /// Boot script, usually filled in by the flavor.
    #[serde(rename = "Init", default)]
    pub init: String,

    #[serde(rename = "LogicalID", default, skip_serializing_if = "Option::is_none")]
    pub logical_id: Option<LogicalId>,
}

/// An observed instance, as reported by the instance plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescription {
    #[serde(rename = "ID")]
    pub id: InstanceId,

    #[serde(rename = "LogicalID", default, skip_serializing_if = "Option::is_none")]
    pub logical_id: Option<LogicalId>,

    #[serde(rename = "Tags", default)]
    pub tags: Tags,
}

/// Health of an instance as judged by its flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Not yet known; callers should keep waiting.
    Unknown,
    Healthy,
    Unhealthy,
}

/// Returns true if every filter tag is present on `tags` with the same value.
///
/// Extra tags on the instance are ignored.
pub fn tags_match(tags: &Tags, filter: &Tags) -> bool {
    filter
        .iter()
        .all(|(key, value)| tags.get(key) == Some(value))
}
