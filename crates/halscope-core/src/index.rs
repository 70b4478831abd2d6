//! Identifier lookup for the current tree

use std::collections::HashMap;

use crate::node::{DeviceId, DeviceNode, NodeIndex};

/// Maps every device identifier in a tree to its arena position
#[derive(Debug, Clone, Default)]
pub struct LookupIndex {
    by_id: HashMap<DeviceId, NodeIndex>,
}

impl LookupIndex {
    /// Index every node reachable from `root`, depth first
    pub fn build(nodes: &[DeviceNode], root: NodeIndex) -> Self {
        let mut by_id = HashMap::with_capacity(nodes.len());
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let node = &nodes[idx.0];
            by_id.insert(node.id().clone(), idx);
            stack.extend(node.children().iter().rev().copied());
        }
        Self { by_id }
    }

    pub fn get(&self, id: &DeviceId) -> Option<NodeIndex> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.by_id.keys()
    }
}
