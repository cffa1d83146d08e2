use std::collections::HashSet;

use super::node::{MenuNode, RoleId};

/// What a caller is allowed to see during one resolution.
#[derive(Debug, Clone, Copy)]
pub enum Visibility<'a> {
    /// Administrative listing: every stored node, active or not.
    Everything,
    /// A user's role ids and permission names.
    Grants {
        role_ids: &'a HashSet<RoleId>,
        permissions: &'a HashSet<String>,
    },
}

impl Visibility<'_> {
    pub fn admits(&self, node: &MenuNode) -> bool {
        match self {
            Visibility::Everything => true,
            Visibility::Grants { role_ids, permissions } => is_accessible(node, role_ids, permissions),
        }
    }
}

/// Local check for a single node; ancestors are not considered here.
pub fn is_accessible(node: &MenuNode, role_ids: &HashSet<RoleId>, permissions: &HashSet<String>) -> bool {
    if !node.is_active {
        return false;
    }

    if !node.allowed_role_ids.is_empty() && !node.allowed_role_ids.iter().any(|role| role_ids.contains(role)) {
        return false;
    }

    node.required_permissions
        .iter()
        .all(|permission| permissions.contains(permission))
}
