//! Hierarchical access-controlled menu resolution.
//!
//! A flat snapshot of stored menus is filtered by the caller's roles and
//! permissions and assembled into an ordered parent/children forest. A node is
//! only reachable through its ancestors, so an excluded menu hides its whole
//! subtree.

mod access;
mod error;
mod node;
mod repository;
mod resolver;

use std::collections::HashSet;

pub use access::{is_accessible, Visibility};
pub use error::{MenuError, ResolveWarning};
pub use node::{MenuId, MenuNode, MenuTree, RoleId};
pub use repository::{MenuRepository, SqliteMenuRepository};
pub use resolver::{MenuResolver, ResolvedMenus};

use crate::errors::AppResult;

/// Loads a fresh snapshot and resolves it for one user.
pub async fn resolve_for<R: MenuRepository + ?Sized>(
    repo: &R,
    role_ids: &HashSet<RoleId>,
    permissions: &HashSet<String>,
) -> AppResult<ResolvedMenus> {
    let flat = repo.list_all().await?;
    Ok(MenuResolver::resolve(&flat, role_ids, permissions)?)
}

/// Loads a fresh snapshot and returns the unfiltered tree.
pub async fn resolve_everything<R: MenuRepository + ?Sized>(repo: &R) -> AppResult<ResolvedMenus> {
    let flat = repo.list_all().await?;
    Ok(MenuResolver::resolve_all(&flat)?)
}
