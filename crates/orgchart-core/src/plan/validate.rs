//! Referential checks over a plan's parent links.

use std::collections::{HashMap, HashSet};

use super::model::Node;
use crate::error::{OrgError, OrgResult};

/// Check that the node list forms a forest.
///
/// Rejects blank ids, duplicate ids, parent ids that name no node in the
/// list, and parent cycles (including a node that is its own parent).
pub fn validate_tree(nodes: &[Node]) -> OrgResult<()> {
    let mut parents: HashMap<&str, Option<&str>> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        if node.id.trim().is_empty() {
            return Err(OrgError::Validation("node id must not be blank".into()));
        }
        if parents
            .insert(node.id.as_str(), node.parent_id.as_deref())
            .is_some()
        {
            return Err(OrgError::Validation(format!(
                "duplicate node id {:?}",
                node.id
            )));
        }
    }

    for node in nodes {
        match node.parent_id.as_deref() {
            Some(parent) if !parents.contains_key(parent) => {
                return Err(OrgError::Validation(format!(
                    "node {:?} references missing parent {parent:?}",
                    node.id
                )));
            }
            _ => {}
        }
    }

    // Walk up from every node; nodes already proven to reach a root are
    // skipped so the whole pass stays linear.
    let mut rooted: HashSet<&str> = HashSet::with_capacity(nodes.len());
    for node in nodes {
        let mut path: HashSet<&str> = HashSet::new();
        let mut cursor = Some(node.id.as_str());
        while let Some(id) = cursor {
            if rooted.contains(id) {
                break;
            }
            if !path.insert(id) {
                return Err(OrgError::Validation(format!(
                    "parent cycle through node {id:?}"
                )));
            }
            cursor = parents.get(id).copied().flatten();
        }
        rooted.extend(path);
    }

    Ok(())
}
