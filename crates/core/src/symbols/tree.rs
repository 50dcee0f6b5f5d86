use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

#[derive(Debug, Default, Clone)]
struct TreeNode {
    children: BTreeSet<String>,
    defined: bool,
    references: usize,
}

/// Parent/child structure of dotted global names: `a.b.c` hangs below `a.b`, which hangs
/// below `a`. Nodes that are neither defined nor referenced disappear once their last child
/// goes; referenced ones stay behind as placeholders.
#[derive(Debug, Default, Clone)]
pub struct LabelTree {
    nodes: FxHashMap<String, TreeNode>,
}

fn parent_of(name: &str) -> Option<&str> {
    name.rsplit_once('.')
        .map(|(parent, _)| parent)
        .filter(|parent| !parent.is_empty())
}

impl LabelTree {
    pub fn insert(&mut self, name: &str) {
        self.ensure_path(name);
        if let Some(node) = self.nodes.get_mut(name) {
            node.defined = true;
        }
    }

    pub fn remove(&mut self, name: &str) {
        if let Some(node) = self.nodes.get_mut(name) {
            node.defined = false;
        }
        self.prune(name);
    }

    pub fn add_reference(&mut self, name: &str) {
        self.ensure_path(name);
        if let Some(node) = self.nodes.get_mut(name) {
            node.references += 1;
        }
    }

    pub fn release_reference(&mut self, name: &str) {
        if let Some(node) = self.nodes.get_mut(name) {
            node.references = node.references.saturating_sub(1);
        }
        self.prune(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|node| node.defined)
    }

    /// A node that only survives because something still refers to it.
    pub fn is_placeholder(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|node| !node.defined)
    }

    pub fn children(&self, name: &str) -> Vec<&str> {
        self.nodes
            .get(name)
            .map(|node| node.children.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn roots(&self) -> Vec<&str> {
        let mut roots: Vec<&str> = self
            .nodes
            .keys()
            .map(String::as_str)
            .filter(|name| parent_of(name).is_none())
            .collect();
        roots.sort_unstable();
        roots
    }

    fn ensure_path(&mut self, name: &str) {
        self.nodes.entry(name.to_string()).or_default();
        let mut child = name;
        while let Some(parent) = parent_of(child) {
            self.nodes
                .entry(parent.to_string())
                .or_default()
                .children
                .insert(child.to_string());
            child = parent;
        }
    }

    fn prune(&mut self, name: &str) {
        let mut current = name.to_string();
        loop {
            let Some(node) = self.nodes.get(&current) else {
                return;
            };
            if node.defined || node.references > 0 || !node.children.is_empty() {
                return;
            }
            self.nodes.remove(&current);
            let Some(parent) = parent_of(&current).map(str::to_string) else {
                return;
            };
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.remove(&current);
            }
            current = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_names_build_a_hierarchy() {
        let mut tree = LabelTree::default();
        tree.insert("player.x");
        tree.insert("player.y");
        tree.insert("enemy");
        assert_eq!(tree.roots(), vec!["enemy", "player"]);
        assert_eq!(tree.children("player"), vec!["player.x", "player.y"]);
        assert!(tree.is_placeholder("player"));
        assert!(tree.is_defined("player.x"));
    }

    #[test]
    fn removal_cascades_until_a_referenced_ancestor() {
        let mut tree = LabelTree::default();
        tree.insert("a.b.c");
        tree.add_reference("a");
        tree.remove("a.b.c");
        assert!(!tree.contains("a.b.c"));
        assert!(!tree.contains("a.b"));
        assert!(tree.contains("a"));
        assert!(tree.children("a").is_empty());

        tree.release_reference("a");
        assert!(!tree.contains("a"));
    }

    #[test]
    fn defined_parents_survive_their_children() {
        let mut tree = LabelTree::default();
        tree.insert("table");
        tree.insert("table.row");
        tree.remove("table.row");
        assert!(tree.is_defined("table"));
        assert!(tree.children("table").is_empty());
    }
}
