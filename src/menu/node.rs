use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type MenuId = i64;
pub type RoleId = i64;

/// One navigation entry as stored, with its allowed roles already joined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuNode {
    pub id: MenuId,
    pub parent_id: Option<MenuId>,
    #[schema(example = "users")]
    pub name: String,
    #[schema(example = "Users")]
    pub label: String,
    #[schema(example = "people")]
    pub icon: Option<String>,
    #[schema(example = "/users")]
    pub route: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub order_by: i32,
    pub is_active: bool,
    /// Every listed permission is required (empty = no permission restriction)
    #[serde(default)]
    pub required_permissions: Vec<String>,
    /// Any listed role grants access (empty = no role restriction)
    #[serde(default)]
    #[schema(value_type = Vec<i64>)]
    pub allowed_role_ids: BTreeSet<RoleId>,
}

impl MenuNode {
    pub fn new(id: MenuId, parent_id: Option<MenuId>, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id,
            parent_id,
            name: label.to_lowercase().replace(' ', "_"),
            label,
            icon: None,
            route: None,
            url: None,
            description: None,
            order_by: 0,
            is_active: true,
            required_permissions: Vec::new(),
            allowed_role_ids: BTreeSet::new(),
        }
    }

    pub fn with_order(mut self, order_by: i32) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.allowed_role_ids = roles.into_iter().collect();
        self
    }

    pub fn with_permissions<S: Into<String>>(mut self, perms: impl IntoIterator<Item = S>) -> Self {
        self.required_permissions = perms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A resolved menu entry with its visible children attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MenuTree {
    #[serde(flatten)]
    pub menu: MenuNode,
    pub children: Vec<MenuTree>,
}

impl MenuTree {
    pub fn id(&self) -> MenuId {
        self.menu.id
    }

    /// Depth-first ids, parents before children.
    pub fn flatten_ids(&self) -> Vec<MenuId> {
        let mut ids = Vec::new();
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            ids.push(tree.menu.id);
            stack.extend(tree.children.iter().rev());
        }
        ids
    }
}
