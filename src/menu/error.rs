use serde::Serialize;

use super::node::MenuId;

/// Corrupted menu snapshots. Resolution never returns a partial tree alongside these.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MenuError {
    #[error("menu {menu_id} is part of a parent cycle: {path:?}")]
    Cycle { menu_id: MenuId, path: Vec<MenuId> },
    #[error("menu id {0} appears more than once in the snapshot")]
    DuplicateId(MenuId),
}

/// Non-fatal findings reported next to a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveWarning {
    /// `parent_id` points at a menu that is not in the snapshot; the node was surfaced as a root.
    OrphanReference { menu_id: MenuId, parent_id: MenuId },
}

impl std::fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveWarning::OrphanReference { menu_id, parent_id } => {
                write!(f, "menu {menu_id} references missing parent {parent_id}")
            }
        }
    }
}
