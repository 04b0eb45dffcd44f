//! Data model shared by the orchestrator and the HTTP API.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// A single application container placed on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Container id assigned by the engine.
    pub id: String,
    /// Application the instance was launched for.
    pub app: String,
    /// Node the instance runs on.
    pub node: String,
    /// Published host port of the application socket, absent until the
    /// container is running.
    pub port: Option<u16>,
    /// Slots the instance occupies on its node.
    pub slots: u32,
    /// Launch environment with infrastructure keys stripped.
    pub environment: HashMap<String, String>,
    /// Source bundle the runner was pointed at. Absent on containers that
    /// were not launched with one.
    pub source_uri: Option<String>,
}

/// Point-in-time capacity and health of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub slots: SlotUsage,
    pub state: NodeHealth,
}

impl NodeDescriptor {
    pub fn healthy(id: impl Into<String>, slots: SlotUsage) -> Self {
        Self {
            id: id.into(),
            slots,
            state: NodeHealth::Healthy,
        }
    }

    /// Descriptor for a node that could not be inspected. Capacity reads as
    /// zero so the node never attracts placements while degraded.
    pub fn degraded(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slots: SlotUsage::default(),
            state: NodeHealth::Unreachable(reason.into()),
        }
    }
}

/// Slot accounting for one node. `free` is always `total - used`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUsage {
    pub total: u32,
    pub used: u32,
    pub free: u32,
}

impl SlotUsage {
    pub fn new(total: u32, used: u32) -> Self {
        Self {
            total,
            used,
            free: total.saturating_sub(used),
        }
    }
}

/// Health of a node as reported in its descriptor.
///
/// Serializes to the literal string `"healthy"` or, for an unreachable node,
/// the failure reason itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeHealth {
    Healthy,
    Unreachable(String),
}

impl NodeHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeHealth::Healthy)
    }
}

impl Serialize for NodeHealth {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            NodeHealth::Healthy => serializer.serialize_str("healthy"),
            NodeHealth::Unreachable(reason) => serializer.serialize_str(reason),
        }
    }
}

impl<'de> Deserialize<'de> for NodeHealth {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let state = String::deserialize(deserializer)?;
        if state == "healthy" {
            Ok(NodeHealth::Healthy)
        } else {
            Ok(NodeHealth::Unreachable(state))
        }
    }
}

/// Fleet-wide instance counts grouped by application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub total_instances: usize,
    /// Running instance count per application name, sorted by name.
    pub apps: BTreeMap<String, usize>,
}

impl InstanceSummary {
    pub fn from_instances<'a, I>(instances: I) -> Self
    where
        I: IntoIterator<Item = &'a Instance>,
    {
        let mut summary = InstanceSummary::default();
        for instance in instances {
            summary.total_instances += 1;
            *summary.apps.entry(instance.app.clone()).or_default() += 1;
        }
        summary
    }
}
