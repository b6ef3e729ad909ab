use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Type tag given to nodes that do not carry one.
pub const DEFAULT_NODE_TYPE: &str = "existing";

fn default_node_type() -> String {
    DEFAULT_NODE_TYPE.to_string()
}

/// A plan: metadata plus an ordered list of nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Plan {
    pub name: String,
    /// Free-text period label, typically a month.
    pub period: String,
    pub memo: String,
    pub nodes: Vec<Node>,
}

impl Plan {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// One position in the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub grade: String,
    /// Depth hint; not derived from the parent chain.
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    #[serde(default)]
    pub employment: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub is_arranged: bool,
    /// Set on every persisted write; ignored on input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Node {
    /// A node with every field at its default.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            position: String::new(),
            grade: String::new(),
            level: 0,
            parent_id: None,
            node_type: default_node_type(),
            employment: String::new(),
            x: 0.0,
            y: 0.0,
            is_arranged: false,
            updated_at: None,
        }
    }
}

/// A partial field set merged onto an existing node.
///
/// `parentId: null` clears the parent; an absent `parentId` leaves it alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<String>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_arranged: Option<bool>,
}

// Distinguishes `"parentId": null` (Some(None)) from a missing key (None).
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl NodePatch {
    pub fn apply(&self, node: &mut Node) {
        if let Some(v) = &self.name {
            node.name = v.clone();
        }
        if let Some(v) = &self.position {
            node.position = v.clone();
        }
        if let Some(v) = &self.grade {
            node.grade = v.clone();
        }
        if let Some(v) = self.level {
            node.level = v;
        }
        if let Some(v) = &self.parent_id {
            node.parent_id = v.clone();
        }
        if let Some(v) = &self.node_type {
            node.node_type = v.clone();
        }
        if let Some(v) = &self.employment {
            node.employment = v.clone();
        }
        if let Some(v) = self.x {
            node.x = v;
        }
        if let Some(v) = self.y {
            node.y = v;
        }
        if let Some(v) = self.is_arranged {
            node.is_arranged = v;
        }
    }
}

/// One entry of a batch update: the target node id plus fields to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub id: String,
    #[serde(flatten)]
    pub patch: NodePatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_defaults_fill_omitted_fields() {
        let node: Node = serde_json::from_value(json!({ "id": "n1", "name": "Ada" })).unwrap();
        assert_eq!(node.node_type, "existing");
        assert_eq!(node.level, 0);
        assert_eq!(node.parent_id, None);
        assert_eq!((node.x, node.y), (0.0, 0.0));
        assert!(!node.is_arranged);
    }

    #[test]
    fn node_serializes_camel_case() {
        let mut node = Node::new("n1");
        node.parent_id = Some("root".into());
        node.is_arranged = true;
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(v["parentId"], "root");
        assert_eq!(v["isArranged"], true);
        assert_eq!(v["type"], "existing");
        assert!(v.get("updatedAt").is_none());
    }

    #[test]
    fn patch_distinguishes_null_parent_from_absent() {
        let clear: NodeUpdate =
            serde_json::from_value(json!({ "id": "n1", "parentId": null })).unwrap();
        assert_eq!(clear.patch.parent_id, Some(None));

        let keep: NodeUpdate = serde_json::from_value(json!({ "id": "n1", "x": 40.5 })).unwrap();
        assert_eq!(keep.patch.parent_id, None);

        let mut node = Node::new("n1");
        node.parent_id = Some("root".into());
        keep.patch.apply(&mut node);
        assert_eq!(node.parent_id.as_deref(), Some("root"));
        assert_eq!(node.x, 40.5);

        clear.patch.apply(&mut node);
        assert_eq!(node.parent_id, None);
    }

    #[test]
    fn plan_metadata_defaults_to_empty() {
        let plan: Plan = serde_json::from_value(json!({ "name": "Q1" })).unwrap();
        assert_eq!(plan.period, "");
        assert!(plan.nodes.is_empty());
    }
}
