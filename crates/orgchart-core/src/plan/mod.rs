//! Plans: versioned snapshots of an org chart, one sheet per plan.

pub mod model;
pub mod repository;
pub mod schema;
pub mod validate;

pub use model::{DEFAULT_NODE_TYPE, Node, NodePatch, NodeUpdate, Plan};
pub use repository::{CURRENT_PLAN_ID, PlanRepository};
pub use validate::validate_tree;
