//! Workflow node types.
//!
//! A node is a single step of a workflow graph. Each node has:
//! - An id unique within its graph (authored by the editor)
//! - An activity type, resolved to an executor at run time
//! - Static activity properties
//! - Input mappings pulling predecessor outputs into its input
//! - Output mappings publishing its output into workflow variables

use crate::value::{DataMap, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Activity type prefix that marks a node as a trigger by default.
pub const TRIGGER_NAMESPACE: &str = "Trigger.";

/// Identifier of a node within a graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The structural role of a node, used by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry points; valid roots for reachability analysis.
    Trigger,
    /// Ordinary steps that are expected to lead somewhere.
    #[default]
    Action,
    /// Steps designed to end a path.
    Terminal,
}

impl NodeCategory {
    /// The category a node gets when none is given explicitly.
    #[must_use]
    pub fn for_activity_type(activity_type: &str) -> Self {
        if activity_type.starts_with(TRIGGER_NAMESPACE) {
            Self::Trigger
        } else {
            Self::Action
        }
    }
}

/// Copies one property of a predecessor's output into this node's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMapping {
    pub source_node_id: NodeId,
    pub source_property: String,
    pub target_property: String,
}

impl InputMapping {
    #[must_use]
    pub fn new(
        source_node_id: impl Into<NodeId>,
        source_property: impl Into<String>,
        target_property: impl Into<String>,
    ) -> Self {
        Self {
            source_node_id: source_node_id.into(),
            source_property: source_property.into(),
            target_property: target_property.into(),
        }
    }
}

/// Publishes one property of this node's output as a workflow variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMapping {
    pub source_property: String,
    pub target_variable: String,
}

impl OutputMapping {
    #[must_use]
    pub fn new(source_property: impl Into<String>, target_variable: impl Into<String>) -> Self {
        Self {
            source_property: source_property.into(),
            target_variable: target_variable.into(),
        }
    }
}

/// Editor canvas position. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "NodeDocument")]
pub struct Node {
    pub id: NodeId,
    /// Human-readable label.
    pub name: String,
    /// Key resolved by the activity registry.
    pub activity_type: String,
    pub category: NodeCategory,
    pub activity_properties: DataMap,
    pub input_mappings: Vec<InputMapping>,
    pub output_mappings: Vec<OutputMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// Serialized node as authored; only `id` and `activityType` are required.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeDocument {
    id: NodeId,
    #[serde(default)]
    name: String,
    activity_type: String,
    #[serde(default)]
    category: Option<NodeCategory>,
    #[serde(default)]
    activity_properties: DataMap,
    #[serde(default)]
    input_mappings: Vec<InputMapping>,
    #[serde(default)]
    output_mappings: Vec<OutputMapping>,
    #[serde(default)]
    position: Option<Position>,
}

impl From<NodeDocument> for Node {
    fn from(doc: NodeDocument) -> Self {
        let category = doc
            .category
            .unwrap_or_else(|| NodeCategory::for_activity_type(&doc.activity_type));
        Self {
            id: doc.id,
            name: doc.name,
            activity_type: doc.activity_type,
            category,
            activity_properties: doc.activity_properties,
            input_mappings: doc.input_mappings,
            output_mappings: doc.output_mappings,
            position: doc.position,
        }
    }
}

impl Node {
    /// Creates a node; activity types under `Trigger.` default to the trigger category.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, activity_type: impl Into<String>) -> Self {
        let activity_type = activity_type.into();
        Self {
            id: id.into(),
            name: String::new(),
            category: NodeCategory::for_activity_type(&activity_type),
            activity_type,
            activity_properties: DataMap::new(),
            input_mappings: Vec::new(),
            output_mappings: Vec::new(),
            position: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: NodeCategory) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.activity_properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_input_mapping(mut self, mapping: InputMapping) -> Self {
        self.input_mappings.push(mapping);
        self
    }

    #[must_use]
    pub fn with_output_mapping(mut self, mapping: OutputMapping) -> Self {
        self.output_mappings.push(mapping);
        self
    }

    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.category == NodeCategory::Trigger
    }

    /// Input mappings that pull from the given predecessor.
    pub fn mappings_from<'a>(
        &'a self,
        source: &NodeId,
    ) -> impl Iterator<Item = &'a InputMapping> + use<'a> {
        let source = source.clone();
        self.input_mappings
            .iter()
            .filter(move |m| m.source_node_id == source)
    }
}
