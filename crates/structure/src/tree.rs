use std::collections::{HashMap, HashSet};

use crate::node::{NodeKind, StructureNode};

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Node fields without the child list.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub kind: NodeKind,
    pub number: String,
    pub title: String,
    pub text: String,
    pub placeholder: bool,
}

impl NodeData {
    pub fn new(kind: NodeKind, number: impl Into<String>) -> Self {
        Self {
            kind,
            number: number.into(),
            title: String::new(),
            text: String::new(),
            placeholder: false,
        }
    }

    pub fn placeholder(kind: NodeKind, number: impl Into<String>) -> Self {
        Self {
            placeholder: true,
            ..Self::new(kind, number)
        }
    }

    pub fn matches(&self, kind: &NodeKind, number: &str) -> bool {
        &self.kind == kind && self.number == number
    }
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    children: Vec<NodeId>,
}

/// Arena-backed document tree.
///
/// Nodes live in a flat vector and refer to their children by index, so
/// re-parenting is a move of ids between child lists. Slot 0 is a virtual
/// root whose children are the top-level nodes; it is never serialized.
/// Detached slots stay allocated until the tree is rebuilt.
#[derive(Debug, Clone)]
pub struct StructureTree {
    slots: Vec<Slot>,
}

impl Default for StructureTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureTree {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                data: NodeData::new(NodeKind::Other(String::new()), ""),
                children: Vec::new(),
            }],
        }
    }

    pub fn from_nodes(nodes: Vec<StructureNode>) -> Self {
        let mut tree = Self::new();
        for node in nodes {
            tree.insert_subtree(tree.root(), node);
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.slots[id.0].data
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.slots[id.0].data
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.slots[id.0].children
    }

    pub fn children_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        &mut self.slots[id.0].children
    }

    pub fn take_children(&mut self, id: NodeId) -> Vec<NodeId> {
        std::mem::take(&mut self.slots[id.0].children)
    }

    pub fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            data,
            children: Vec::new(),
        });
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.slots[parent.0].children.push(child);
    }

    /// Allocate a nested node and all its descendants under `parent`.
    pub fn insert_subtree(&mut self, parent: NodeId, node: StructureNode) -> NodeId {
        let id = self.alloc(NodeData {
            kind: node.kind,
            number: node.number,
            title: node.title,
            text: node.text,
            placeholder: node.placeholder,
        });
        self.append_child(parent, id);
        for child in node.children {
            self.insert_subtree(id, child);
        }
        id
    }

    /// Nested form of the reachable tree.
    pub fn to_nodes(&self) -> Vec<StructureNode> {
        let mut path = HashSet::from([self.root()]);
        self.children(self.root())
            .iter()
            .filter_map(|&id| self.to_node(id, &mut path))
            .collect()
    }

    fn to_node(&self, id: NodeId, path: &mut HashSet<NodeId>) -> Option<StructureNode> {
        if !path.insert(id) {
            return None;
        }
        let data = self.node(id).clone();
        let children = self
            .children(id)
            .iter()
            .filter_map(|&child| self.to_node(child, path))
            .collect();
        path.remove(&id);

        Some(StructureNode {
            kind: data.kind,
            number: data.number,
            title: data.title,
            text: data.text,
            children,
            placeholder: data.placeholder,
        })
    }

    /// Reachable descendants of `from` in document (pre-)order, `from` excluded.
    /// Each node is visited once even if it is referenced twice.
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([from]);
        let mut stack: Vec<NodeId> = self.children(from).iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Parent of every reachable node (first reference wins).
    pub fn parents(&self) -> HashMap<NodeId, NodeId> {
        let mut parents = HashMap::new();
        let mut stack = vec![self.root()];
        let mut seen = HashSet::from([self.root()]);

        while let Some(id) = stack.pop() {
            for &child in self.children(id) {
                if seen.insert(child) {
                    parents.insert(child, id);
                    stack.push(child);
                }
            }
        }
        parents
    }

    /// Ids from the root (exclusive) down to `id` (inclusive).
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let parents = self.parents();
        let mut path = vec![id];
        let mut current = id;
        while let Some(&parent) = parents.get(&current) {
            if parent == self.root() || path.contains(&parent) {
                break;
            }
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// First node of `kind`/`number` anywhere in the tree, in document order.
    pub fn find(&self, kind: &NodeKind, number: &str) -> Option<NodeId> {
        self.find_in(self.root(), kind, number)
    }

    /// First matching descendant of `from`.
    pub fn find_in(&self, from: NodeId, kind: &NodeKind, number: &str) -> Option<NodeId> {
        self.preorder(from)
            .into_iter()
            .find(|&id| self.node(id).matches(kind, number))
    }

    /// Matching direct child of `parent`.
    pub fn find_child(&self, parent: NodeId, kind: &NodeKind, number: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&id| self.node(id).matches(kind, number))
    }

    /// Reallocate the subtree under `id` with fresh ids.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let mut path = HashSet::new();
        self.copy_subtree(id, &mut path)
    }

    fn copy_subtree(&mut self, id: NodeId, path: &mut HashSet<NodeId>) -> NodeId {
        path.insert(id);
        let data = self.node(id).clone();
        let children = self.children(id).to_vec();
        let copy = self.alloc(data);

        for child in children {
            // A child that is its own ancestor would recurse forever
            if path.contains(&child) {
                continue;
            }
            let child_copy = self.copy_subtree(child, path);
            self.append_child(copy, child_copy);
        }

        path.remove(&id);
        copy
    }

    /// Make the reachable structure a proper tree.
    ///
    /// A reference to a node on its own ancestor path is dropped; a second
    /// reference to an already attached node is replaced by a fresh copy.
    /// Returns the number of references fixed.
    pub fn break_cycles(&mut self) -> usize {
        let mut active = HashSet::new();
        let mut seen = HashSet::new();
        let mut fixed = 0;
        let root = self.root();
        self.break_cycles_from(root, &mut active, &mut seen, &mut fixed);
        fixed
    }

    fn break_cycles_from(
        &mut self,
        id: NodeId,
        active: &mut HashSet<NodeId>,
        seen: &mut HashSet<NodeId>,
        fixed: &mut usize,
    ) {
        active.insert(id);
        seen.insert(id);

        let children = self.take_children(id);
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            if active.contains(&child) {
                *fixed += 1;
                continue;
            }
            if seen.contains(&child) {
                *fixed += 1;
                kept.push(self.deep_copy(child));
            } else {
                kept.push(child);
            }
            let current = kept[kept.len() - 1];
            seen.insert(current);
            self.break_cycles_from(current, active, seen, fixed);
        }
        self.slots[id.0].children = kept;

        active.remove(&id);
    }

    /// Number of reachable nodes.
    pub fn len(&self) -> usize {
        self.preorder(self.root()).len()
    }
}
