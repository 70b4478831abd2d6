//! Device tree with a synthetic root
//!
//! Nodes live in an arena with the synthetic root at index 0. Parent and
//! child links are arena indices, so the tree has no reference cycles and
//! upward traversal is O(1) per step.
//!
//! Each arena slot is an `Arc<DeviceNode>` and the lookup index is shared, so
//! cloning a tree copies pointers only. Patching one device's properties
//! through a cloned tree copies that one node.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::HalError;
use crate::index::LookupIndex;
use crate::node::{DeviceId, DeviceNode, NodeIndex};
use crate::property::{PropertyMap, PropertyValue};

const ROOT: NodeIndex = NodeIndex(0);

/// A device as fetched from the daemon: its UDI and full property set
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub properties: PropertyMap,
}

impl DeviceRecord {
    pub fn new(id: DeviceId, properties: PropertyMap) -> Self {
        Self { id, properties }
    }
}

/// Immutable-structure snapshot of all devices
#[derive(Debug, Clone)]
pub struct DeviceTree {
    nodes: Vec<Arc<DeviceNode>>,
    index: Arc<LookupIndex>,
}

impl DeviceTree {
    /// A tree holding only the synthetic root
    pub fn empty(root_udi: &str) -> Self {
        let nodes = vec![DeviceNode::new(DeviceId::new(root_udi), None, PropertyMap::new())];
        Self::seal(nodes)
    }

    /// Link a set of device records into a tree
    ///
    /// Records are ordered by UDI. A device whose declared parent is unknown,
    /// is itself, or lies on a parent cycle is attached under the root.
    pub fn from_records(mut records: Vec<DeviceRecord>, config: &EngineConfig) -> Result<Self, HalError> {
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let mut positions: HashMap<DeviceId, usize> = HashMap::with_capacity(records.len() + 1);
        positions.insert(DeviceId::new(config.root_udi.as_str()), ROOT.0);

        let mut nodes = Vec::with_capacity(records.len() + 1);
        nodes.push(DeviceNode::new(
            DeviceId::new(config.root_udi.as_str()),
            None,
            PropertyMap::new(),
        ));

        for record in records {
            if positions.contains_key(&record.id) {
                return Err(HalError::DuplicateIdentifier(record.id));
            }
            let declared = record
                .properties
                .get(&config.parent_key)
                .and_then(PropertyValue::as_str)
                .map(DeviceId::new);
            positions.insert(record.id.clone(), nodes.len());
            nodes.push(DeviceNode::new(record.id, declared, record.properties));
        }

        // First pass: resolve declared parents against known devices
        let mut parents: Vec<usize> = vec![ROOT.0; nodes.len()];
        for (i, node) in nodes.iter().enumerate().skip(1) {
            if let Some(&p) = node.declared_parent().and_then(|d| positions.get(d)) {
                if p != i {
                    parents[i] = p;
                }
            }
        }
        break_cycles(&mut parents);

        // Second pass: link children in sorted order
        for i in 1..nodes.len() {
            let p = parents[i];
            nodes[i].parent = Some(NodeIndex(p));
            nodes[p].children.push(NodeIndex(i));
        }

        Ok(Self::seal(nodes))
    }

    fn seal(nodes: Vec<DeviceNode>) -> Self {
        let index = Arc::new(LookupIndex::build(&nodes, ROOT));
        Self {
            nodes: nodes.into_iter().map(Arc::new).collect(),
            index,
        }
    }

    pub fn root(&self) -> &DeviceNode {
        &self.nodes[ROOT.0]
    }

    pub fn root_index(&self) -> NodeIndex {
        ROOT
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&DeviceNode> {
        self.nodes.get(idx.0).map(Arc::as_ref)
    }

    /// Resolve a UDI to its node; `None` means the device is not present
    pub fn resolve(&self, id: &DeviceId) -> Option<&DeviceNode> {
        self.index.get(id).map(|idx| &*self.nodes[idx.0])
    }

    /// Mutable access to one device, copying it first if another tree
    /// shares it
    pub(crate) fn resolve_mut(&mut self, id: &DeviceId) -> Option<&mut DeviceNode> {
        let idx = self.index.get(id)?;
        self.nodes.get_mut(idx.0).map(Arc::make_mut)
    }

    /// True if both trees hold the very same allocation for `id`
    #[cfg(test)]
    pub(crate) fn shares_node(&self, other: &DeviceTree, id: &DeviceId) -> bool {
        match (self.index.get(id), other.index.get(id)) {
            (Some(a), Some(b)) => match (self.nodes.get(a.0), other.nodes.get(b.0)) {
                (Some(x), Some(y)) => Arc::ptr_eq(x, y),
                _ => false,
            },
            _ => false,
        }
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.index.contains(id)
    }

    pub fn index(&self) -> &LookupIndex {
        &self.index
    }

    /// Child nodes of `id`, in insertion order
    pub fn children(&self, id: &DeviceId) -> Vec<&DeviceNode> {
        self.resolve(id)
            .map(|node| node.children().iter().map(|c| &*self.nodes[c.0]).collect())
            .unwrap_or_default()
    }

    pub fn parent_of(&self, id: &DeviceId) -> Option<&DeviceNode> {
        self.resolve(id)
            .and_then(DeviceNode::parent)
            .map(|p| &*self.nodes[p.0])
    }

    /// Number of real devices (the synthetic root is not counted)
    pub fn device_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// UDIs of every real device, in arena (sorted) order
    pub fn device_ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.nodes.iter().skip(1).map(|node| node.id())
    }

    /// Pre-order traversal from the root, yielding each node with its depth
    pub fn walk(&self) -> Vec<(usize, &DeviceNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0usize, ROOT)];
        while let Some((depth, idx)) = stack.pop() {
            let node: &DeviceNode = &self.nodes[idx.0];
            out.push((depth, node));
            for child in node.children().iter().rev() {
                stack.push((depth + 1, *child));
            }
        }
        out
    }

    /// Check the structural invariants: unique indexed identifiers, every
    /// parent link consistent with the parent's child list, and every node
    /// reaching the root in at most `len` steps.
    pub fn is_consistent(&self) -> bool {
        if self.index.len() != self.nodes.len() || self.nodes[ROOT.0].parent.is_some() {
            return false;
        }
        for (i, node) in self.nodes.iter().enumerate().skip(1) {
            let Some(p) = node.parent else {
                return false;
            };
            match self.nodes.get(p.0) {
                Some(parent) if parent.children.contains(&NodeIndex(i)) => {}
                _ => return false,
            }
            let mut cursor = node.parent;
            let mut steps = 0;
            while let Some(c) = cursor {
                if c == ROOT {
                    break;
                }
                steps += 1;
                if steps > self.nodes.len() {
                    return false;
                }
                cursor = self.nodes[c.0].parent;
            }
        }
        true
    }
}

/// Re-home every node that sits on a parent cycle under the root
fn break_cycles(parents: &mut [usize]) {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnPath,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; parents.len()];
    marks[ROOT.0] = Mark::Done;

    for start in 1..parents.len() {
        let mut path = Vec::new();
        let mut cursor = start;
        while marks[cursor] == Mark::Unvisited {
            marks[cursor] = Mark::OnPath;
            path.push(cursor);
            cursor = parents[cursor];
        }
        if marks[cursor] == Mark::OnPath {
            // cursor is the entry point of a cycle on the current path
            if let Some(pos) = path.iter().position(|&n| n == cursor) {
                for &n in &path[pos..] {
                    parents[n] = ROOT.0;
                }
            }
        }
        for n in path {
            marks[n] = Mark::Done;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, parent: Option<&str>) -> DeviceRecord {
        let mut props = PropertyMap::new();
        if let Some(p) = parent {
            props.insert("info.parent".to_string(), p.into());
        }
        DeviceRecord::new(DeviceId::from(id), props)
    }

    fn child_ids<'a>(tree: &'a DeviceTree, id: &str) -> Vec<&'a str> {
        tree.children(&DeviceId::from(id))
            .into_iter()
            .map(|n| n.id().as_str())
            .collect()
    }

    #[test]
    fn test_unknown_parent_attaches_under_root() {
        let config = EngineConfig::default();
        let tree = DeviceTree::from_records(
            vec![record("C", Some("missing")), record("B", Some("A")), record("A", None)],
            &config,
        )
        .unwrap();

        assert_eq!(child_ids(&tree, "virtual_root"), vec!["A", "C"]);
        assert_eq!(child_ids(&tree, "A"), vec!["B"]);
        assert_eq!(tree.device_count(), 3);
        assert!(tree.is_consistent());
        assert_eq!(
            tree.resolve(&DeviceId::from("C")).unwrap().declared_parent(),
            Some(&DeviceId::from("missing"))
        );
    }

    #[test]
    fn test_children_follow_sorted_order() {
        let config = EngineConfig::default();
        let tree = DeviceTree::from_records(
            vec![record("p/z", Some("p")), record("p", None), record("p/a", Some("p"))],
            &config,
        )
        .unwrap();
        assert_eq!(child_ids(&tree, "p"), vec!["p/a", "p/z"]);
    }

    #[test]
    fn test_duplicate_identifier_fails() {
        let config = EngineConfig::default();
        let err = DeviceTree::from_records(vec![record("A", None), record("A", None)], &config).unwrap_err();
        assert_eq!(err, HalError::DuplicateIdentifier(DeviceId::from("A")));
    }

    #[test]
    fn test_reserved_root_identifier_is_rejected() {
        let config = EngineConfig::default();
        let err = DeviceTree::from_records(vec![record("virtual_root", None)], &config).unwrap_err();
        assert!(matches!(err, HalError::DuplicateIdentifier(_)));
    }

    #[test]
    fn test_cycles_are_broken_at_root() {
        let config = EngineConfig::default();
        let tree = DeviceTree::from_records(
            vec![
                record("A", Some("B")),
                record("B", Some("A")),
                record("C", Some("A")),
                record("S", Some("S")),
            ],
            &config,
        )
        .unwrap();

        assert!(tree.is_consistent());
        assert_eq!(child_ids(&tree, "virtual_root"), vec!["A", "B", "S"]);
        assert_eq!(child_ids(&tree, "A"), vec!["C"]);
    }

    #[test]
    fn test_walk_is_preorder_with_depth() {
        let config = EngineConfig::default();
        let tree = DeviceTree::from_records(
            vec![record("A", None), record("B", Some("A")), record("C", None)],
            &config,
        )
        .unwrap();

        let walked: Vec<(usize, &str)> = tree.walk().into_iter().map(|(d, n)| (d, n.id().as_str())).collect();
        assert_eq!(walked, vec![(0, "virtual_root"), (1, "A"), (2, "B"), (1, "C")]);
    }

    #[test]
    fn test_patching_a_clone_copies_only_that_node() {
        let config = EngineConfig::default();
        let tree = DeviceTree::from_records(vec![record("A", None), record("B", Some("A"))], &config).unwrap();
        let mut patched = tree.clone();
        let a = DeviceId::from("A");
        let b = DeviceId::from("B");

        patched.resolve_mut(&b).unwrap().set_property("vendor", "Acme".into());

        assert!(tree.shares_node(&patched, &a));
        assert!(!tree.shares_node(&patched, &b));
        assert!(tree.resolve(&b).unwrap().property("vendor").is_none());
        assert_eq!(
            patched.resolve(&b).unwrap().property("vendor"),
            Some(&PropertyValue::from("Acme"))
        );
        assert!(patched.is_consistent());
    }

    #[test]
    fn test_empty_tree_has_only_root() {
        let tree = DeviceTree::empty("virtual_root");
        assert_eq!(tree.device_count(), 0);
        assert!(tree.root().parent().is_none());
        assert!(tree.is_consistent());
        assert!(tree.resolve(&DeviceId::from("A")).is_none());
    }
}
