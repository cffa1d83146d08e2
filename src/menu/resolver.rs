use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::access::Visibility;
use super::error::{MenuError, ResolveWarning};
use super::node::{MenuId, MenuNode, MenuTree, RoleId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMenus {
    pub roots: Vec<MenuTree>,
    pub warnings: Vec<ResolveWarning>,
}

impl ResolvedMenus {
    /// Number of nodes in the whole forest.
    pub fn len(&self) -> usize {
        self.roots.iter().map(|root| root.flatten_ids().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Builds request-scoped menu forests from a flat snapshot.
///
/// Stateless: every call borrows its snapshot, allocates its own index and
/// keeps nothing once it returns, so calls can run concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct MenuResolver;

impl MenuResolver {
    /// Tree of the menus a user with these grants can reach.
    ///
    /// A node survives only if it and every ancestor pass the accessibility
    /// check; an excluded parent takes its whole subtree with it.
    pub fn resolve(
        flat: &[MenuNode],
        role_ids: &HashSet<RoleId>,
        permissions: &HashSet<String>,
    ) -> Result<ResolvedMenus, MenuError> {
        Self::resolve_with(flat, Visibility::Grants { role_ids, permissions })
    }

    /// Full tree for management screens, inactive menus included.
    pub fn resolve_all(flat: &[MenuNode]) -> Result<ResolvedMenus, MenuError> {
        Self::resolve_with(flat, Visibility::Everything)
    }

    pub fn resolve_with(flat: &[MenuNode], visibility: Visibility<'_>) -> Result<ResolvedMenus, MenuError> {
        let index = index_by_id(flat)?;
        let candidates: HashSet<MenuId> = flat
            .iter()
            .filter(|node| visibility.admits(node))
            .map(|node| node.id)
            .collect();

        let mut walk = AncestorWalk {
            index: &index,
            candidates: &candidates,
            verdicts: HashMap::with_capacity(candidates.len()),
        };
        let mut warnings = Vec::new();
        let mut groups: HashMap<Option<MenuId>, Vec<&MenuNode>> = HashMap::new();

        for node in flat {
            if !candidates.contains(&node.id) || !walk.reaches_root(node.id)? {
                continue;
            }

            let parent = effective_parent(node, &index);
            if let (Some(missing), None) = (node.parent_id, parent) {
                tracing::warn!(
                    menu_id = node.id,
                    parent_id = missing,
                    "menu references a missing parent, surfacing it as a root"
                );
                warnings.push(ResolveWarning::OrphanReference {
                    menu_id: node.id,
                    parent_id: missing,
                });
            }
            groups.entry(parent).or_default().push(node);
        }

        for group in groups.values_mut() {
            group.sort_by_key(|node| (node.order_by, node.id));
        }

        let visible: usize = groups.values().map(Vec::len).sum();
        let roots = assemble(&groups);

        tracing::debug!(
            total = flat.len(),
            candidates = candidates.len(),
            visible,
            orphans = warnings.len(),
            "resolved menu tree"
        );

        Ok(ResolvedMenus { roots, warnings })
    }
}

fn index_by_id(flat: &[MenuNode]) -> Result<HashMap<MenuId, &MenuNode>, MenuError> {
    let mut index = HashMap::with_capacity(flat.len());
    for node in flat {
        if index.insert(node.id, node).is_some() {
            return Err(MenuError::DuplicateId(node.id));
        }
    }
    Ok(index)
}

/// Parent as seen by the tree: a reference to a missing menu counts as no parent.
fn effective_parent(node: &MenuNode, index: &HashMap<MenuId, &MenuNode>) -> Option<MenuId> {
    node.parent_id.filter(|parent| index.contains_key(parent))
}

/// Builds the forest from sorted sibling groups without recursion.
fn assemble(groups: &HashMap<Option<MenuId>, Vec<&MenuNode>>) -> Vec<MenuTree> {
    // pre-order: every node precedes its subtree, siblings keep their sort order
    let mut order: Vec<(Option<MenuId>, &MenuNode)> = Vec::with_capacity(groups.values().map(Vec::len).sum());
    let mut stack: Vec<(Option<MenuId>, &MenuNode)> = groups
        .get(&None)
        .map(|roots| roots.iter().rev().map(|node| (None, *node)).collect())
        .unwrap_or_default();
    while let Some((parent, node)) = stack.pop() {
        order.push((parent, node));
        if let Some(children) = groups.get(&Some(node.id)) {
            stack.extend(children.iter().rev().map(|child| (Some(node.id), *child)));
        }
    }

    // reverse pre-order finishes every subtree before its parent
    let mut built: HashMap<Option<MenuId>, Vec<MenuTree>> = HashMap::new();
    for (parent, node) in order.into_iter().rev() {
        let mut children = built.remove(&Some(node.id)).unwrap_or_default();
        children.reverse();
        built.entry(parent).or_default().push(MenuTree {
            menu: node.clone(),
            children,
        });
    }

    let mut roots = built.remove(&None).unwrap_or_default();
    roots.reverse();
    roots
}

/// Upward walks over `parent_id`, memoised per node.
struct AncestorWalk<'a> {
    index: &'a HashMap<MenuId, &'a MenuNode>,
    candidates: &'a HashSet<MenuId>,
    verdicts: HashMap<MenuId, bool>,
}

impl AncestorWalk<'_> {
    /// True when `start` and all of its ancestors are candidates.
    fn reaches_root(&mut self, start: MenuId) -> Result<bool, MenuError> {
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut cursor = Some(start);

        let verdict = loop {
            let Some(id) = cursor else {
                break true;
            };
            if let Some(&known) = self.verdicts.get(&id) {
                break known;
            }
            if !self.candidates.contains(&id) {
                break false;
            }
            let Some(node) = self.index.get(&id) else {
                break false;
            };
            if !on_path.insert(id) {
                let from = path.iter().position(|&seen| seen == id).unwrap_or(0);
                let mut cycle: Vec<MenuId> = path[from..].to_vec();
                cycle.push(id);
                return Err(MenuError::Cycle { menu_id: id, path: cycle });
            }
            path.push(id);
            cursor = effective_parent(node, self.index);
        };

        for id in path {
            self.verdicts.insert(id, verdict);
        }
        Ok(verdict)
    }
}
