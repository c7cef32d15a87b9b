//! Group hierarchy
//!
//! Inverts the schema's parent links into an explicit tree that the
//! materializer walks top-down.

use std::collections::{BTreeMap, HashSet};

use crate::error::ConfigError;
use crate::schema::{GroupNode, GroupSchema};

/// A group with its resolved children
#[derive(Debug, Clone)]
pub struct HierarchyNode<'s> {
    pub name: &'s str,
    pub group: &'s GroupNode,
    pub children: Vec<HierarchyNode<'s>>,
}

impl<'s> HierarchyNode<'s> {
    fn collect_names(&self, names: &mut Vec<&'s str>) {
        names.push(self.name);
        for child in &self.children {
            child.collect_names(names);
        }
    }
}

/// Root groups (no parent) and everything below them
#[derive(Debug, Clone, Default)]
pub struct GroupTree<'s> {
    roots: Vec<HierarchyNode<'s>>,
}

impl<'s> GroupTree<'s> {
    pub fn roots(&self) -> &[HierarchyNode<'s>] {
        &self.roots
    }

    /// Group names depth-first, children in name order
    pub fn names(&self) -> Vec<&'s str> {
        let mut names = Vec::new();
        for root in &self.roots {
            root.collect_names(&mut names);
        }
        names
    }

    #[cfg(test)]
    fn find(&self, name: &str) -> Option<&HierarchyNode<'s>> {
        fn search<'t, 's>(
            nodes: &'t [HierarchyNode<'s>],
            name: &str,
        ) -> Option<&'t HierarchyNode<'s>> {
            nodes.iter().find_map(|node| {
                if node.name == name {
                    Some(node)
                } else {
                    search(&node.children, name)
                }
            })
        }
        search(&self.roots, name)
    }
}

/// Resolve parent links into a tree.
///
/// Fails on a parent that names no group, and on groups whose parent chain
/// never reaches a root.
pub fn build_hierarchy(schema: &GroupSchema) -> Result<GroupTree<'_>, ConfigError> {
    let mut roots: Vec<(&str, &GroupNode)> = Vec::new();
    let mut children: BTreeMap<&str, Vec<(&str, &GroupNode)>> = BTreeMap::new();

    for (name, group) in schema.groups() {
        match group.parent.as_deref() {
            None => roots.push((name, group)),
            Some(parent) if schema.group(parent).is_some() => {
                children.entry(parent).or_default().push((name, group));
            }
            Some(parent) => {
                return Err(ConfigError::UnknownParent {
                    group: name.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
    }

    let tree = GroupTree {
        roots: roots
            .into_iter()
            .map(|(name, group)| attach(name, group, &children))
            .collect(),
    };

    // Every parent exists, so anything unreachable from a root sits on a cycle
    let reached: HashSet<&str> = tree.names().into_iter().collect();
    if let Some((name, _)) = schema.groups().find(|(name, _)| !reached.contains(name)) {
        return Err(ConfigError::ParentCycle {
            group: name.to_string(),
        });
    }

    Ok(tree)
}

fn attach<'s>(
    name: &'s str,
    group: &'s GroupNode,
    children: &BTreeMap<&'s str, Vec<(&'s str, &'s GroupNode)>>,
) -> HierarchyNode<'s> {
    HierarchyNode {
        name,
        group,
        children: children
            .get(name)
            .map(|kids| {
                kids.iter()
                    .map(|&(child, child_group)| attach(child, child_group, children))
                    .collect()
            })
            .unwrap_or_default(),
    }
}
