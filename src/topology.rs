//! The immutable node graph and its derived mask cache.
//!
//! Both are pure functions of the node set supplied at construction and
//! never change afterwards; they are shared by reference between the
//! allocator's own pipeline and the handles passed to custom hooks.

use std::collections::HashMap;

use crate::error::MemError;
use crate::mask::{MemoryType, NodeMask, TypeMask};
use crate::node::{Distance, Node};

/// A precomputed, read-only index over the node set, keyed by property.
#[derive(Debug, Clone)]
pub struct MaskCache {
    pub all: NodeMask,
    pub has_memory: NodeMask,
    pub normal: NodeMask,
    pub movable: NodeMask,
    pub has_close_cpus: NodeMask,
    pub no_close_cpus: NodeMask,
    by_type: HashMap<TypeMask, NodeMask>,
}

impl MaskCache {
    fn build(nodes: &[Node]) -> MaskCache {
        let mut all = NodeMask::new();
        let mut has_memory = NodeMask::new();
        let mut normal = NodeMask::new();
        let mut movable = NodeMask::new();
        let mut has_close_cpus = NodeMask::new();
        let mut no_close_cpus = NodeMask::new();
        let mut by_single_type: HashMap<MemoryType, NodeMask> = HashMap::new();

        for node in nodes {
            all.insert(node.id);
            if node.has_memory() {
                has_memory.insert(node.id);
                by_single_type.entry(node.kind).or_default().insert(node.id);
            }
            if node.is_normal {
                normal.insert(node.id);
            } else {
                movable.insert(node.id);
            }
            if node.close_cpus.is_empty() {
                no_close_cpus.insert(node.id);
            } else {
                has_close_cpus.insert(node.id);
            }
        }

        let mut by_type = HashMap::new();
        for subset in TypeMask::all_subsets() {
            let mut mask = NodeMask::new();
            for t in subset.iter() {
                if let Some(m) = by_single_type.get(&t) {
                    mask = mask.union(m);
                }
            }
            by_type.insert(subset, mask);
        }

        MaskCache {
            all,
            has_memory,
            normal,
            movable,
            has_close_cpus,
            no_close_cpus,
            by_type,
        }
    }

    /// Memory-bearing nodes whose type is in `types`.
    pub fn nodes_of_types(&self, types: TypeMask) -> NodeMask {
        self.by_type.get(&types).copied().unwrap_or_default()
    }

    pub fn known_types(&self) -> TypeMask {
        let mut known = TypeMask::new();
        for t in MemoryType::ALL {
            if self.nodes_of_types(TypeMask::single(t)).intersects(&self.has_memory) {
                known.insert(t);
            }
        }
        known
    }
}

/// The immutable node graph: all known nodes plus their derived distance
/// tables and mask cache.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<Node>,
    index_of: HashMap<u8, usize>,
    distances: Vec<Distance>,
    masks: MaskCache,
}

impl Topology {
    pub fn build(mut nodes: Vec<Node>) -> Result<Topology, MemError> {
        nodes.sort_by_key(|n| n.id);

        let mut seen = std::collections::HashSet::new();
        for n in &nodes {
            if n.id > crate::mask::MAX_NODE_ID {
                return Err(MemError::InvalidNode(format!(
                    "node id {} exceeds cap of {}",
                    n.id,
                    crate::mask::MAX_NODE_ID
                )));
            }
            if !seen.insert(n.id) {
                return Err(MemError::InvalidNode(format!("duplicate node id {}", n.id)));
            }
        }

        let node_ids: Vec<u8> = nodes.iter().map(|n| n.id).collect();
        let mut distances = Vec::with_capacity(nodes.len());
        for n in &nodes {
            distances.push(Distance::build(&node_ids, &n.distances, n.id)?);
        }

        let index_of: HashMap<u8, usize> =
            node_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let masks = MaskCache::build(&nodes);

        Ok(Topology {
            nodes,
            index_of,
            distances,
            masks,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: u8) -> Option<&Node> {
        self.index_of.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn distance_of(&self, id: u8) -> Option<&Distance> {
        self.index_of.get(&id).map(|&i| &self.distances[i])
    }

    pub fn masks(&self) -> &MaskCache {
        &self.masks
    }

    pub fn contains_only_known_nodes(&self, mask: NodeMask) -> bool {
        mask.is_subset(&self.masks.all)
    }

    /// Union of the types of the memory-bearing nodes in `mask`.
    pub fn types_of(&self, mask: NodeMask) -> TypeMask {
        let mut types = TypeMask::new();
        for id in mask.iter() {
            if let Some(node) = self.node(id) {
                if node.has_memory() {
                    types.insert(node.kind);
                }
            }
        }
        types
    }

    /// Sum of capacities of the memory-bearing nodes in `mask`.
    pub fn capacity_of(&self, mask: NodeMask) -> u64 {
        mask.iter()
            .filter_map(|id| self.node(id))
            .filter(|n| n.has_memory())
            .map(|n| n.capacity)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::CpuMask;

    fn node(id: u8, kind: MemoryType, capacity: u64, is_normal: bool, distances: Vec<u32>) -> Node {
        Node::new(id, kind, capacity, is_normal, CpuMask::EMPTY, distances)
    }

    #[test]
    fn rejects_duplicate_node_id() {
        let nodes = vec![
            node(0, MemoryType::Dram, 4, true, vec![0, 10]),
            node(0, MemoryType::Dram, 4, true, vec![10, 0]),
        ];
        assert!(matches!(Topology::build(nodes), Err(MemError::InvalidNode(_))));
    }

    #[test]
    fn rejects_node_id_beyond_cap() {
        let nodes = vec![node(64, MemoryType::Dram, 4, true, vec![0])];
        assert!(matches!(Topology::build(nodes), Err(MemError::InvalidNode(_))));
    }

    #[test]
    fn mask_cache_groups_by_type_and_movability() {
        let nodes = vec![
            node(0, MemoryType::Dram, 4, true, vec![0, 10]),
            node(1, MemoryType::Pmem, 4, false, vec![10, 0]),
        ];
        let topo = Topology::build(nodes).unwrap();
        let masks = topo.masks();
        assert_eq!(masks.normal, NodeMask::single(0));
        assert_eq!(masks.movable, NodeMask::single(1));
        assert_eq!(masks.nodes_of_types(TypeMask::single(MemoryType::Dram)), NodeMask::single(0));
        assert_eq!(
            masks.nodes_of_types(TypeMask::single(MemoryType::Dram).union(&TypeMask::single(MemoryType::Pmem))),
            NodeMask::single(0).union(&NodeMask::single(1))
        );
        assert_eq!(masks.known_types(), TypeMask::single(MemoryType::Dram).union(&TypeMask::single(MemoryType::Pmem)));
    }
}
