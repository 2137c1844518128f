//! Immutable node descriptions and their derived distance tables.

use serde::{Deserialize, Serialize};

use crate::error::MemError;
use crate::mask::{CpuMask, MemoryType, NodeMask};

/// An immutable description of one NUMA memory node, as supplied by the
/// caller at allocator construction. The allocator never mutates a `Node`
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: u8,
    pub kind: MemoryType,
    /// Capacity in bytes. May be zero for a memory-less (e.g. compute-only)
    /// node.
    pub capacity: u64,
    /// True if memory on this node is not movable.
    pub is_normal: bool,
    #[serde(skip, default)]
    pub close_cpus: CpuMask,
    /// Raw per-node distance vector, one entry per node in the allocator's
    /// node set (ordered by ascending node id). Validated for uniform length
    /// against the total node count at [`crate::Allocator`] construction.
    pub distances: Vec<u32>,
}

impl Node {
    pub fn new(
        id: u8,
        kind: MemoryType,
        capacity: u64,
        is_normal: bool,
        close_cpus: CpuMask,
        distances: Vec<u32>,
    ) -> Self {
        Node {
            id,
            kind,
            capacity,
            is_normal,
            close_cpus,
            distances,
        }
    }

    pub fn has_memory(&self) -> bool {
        self.capacity > 0
    }
}

/// The distance vector re-indexed for expansion: sorted unique distances,
/// and, for each distinct distance, the [`NodeMask`] of peers at exactly
/// that distance (peers here meaning positions in the node list, by id).
#[derive(Debug, Clone)]
pub struct Distance {
    /// `(distance, peers_at_exactly_that_distance)`, ascending by distance.
    buckets: Vec<(u32, NodeMask)>,
}

impl Distance {
    /// Builds the derived distance table for one node given the full,
    /// id-ordered node list and its own raw distance vector. `node_ids[i]`
    /// must be the id corresponding to `raw[i]`.
    pub fn build(node_ids: &[u8], raw: &[u32], self_id: u8) -> Result<Distance, MemError> {
        if raw.len() != node_ids.len() {
            return Err(MemError::InvalidNode(format!(
                "node {self_id}: distance vector length {} does not match node count {}",
                raw.len(),
                node_ids.len()
            )));
        }
        let self_pos = node_ids
            .iter()
            .position(|&id| id == self_id)
            .ok_or_else(|| MemError::InvalidNode(format!("node {self_id}: not in node set")))?;
        let self_distance = raw[self_pos];
        if raw
            .iter()
            .enumerate()
            .any(|(i, &d)| i != self_pos && d <= self_distance)
        {
            return Err(MemError::InvalidNode(format!(
                "node {self_id}: self distance is not the strict minimum"
            )));
        }

        let mut by_distance: Vec<(u32, u8)> = raw
            .iter()
            .zip(node_ids.iter())
            .map(|(&d, &id)| (d, id))
            .collect();
        by_distance.sort_by_key(|(d, _)| *d);

        let mut buckets: Vec<(u32, NodeMask)> = Vec::new();
        for (d, id) in by_distance {
            match buckets.last_mut() {
                Some((last_d, mask)) if *last_d == d => mask.insert(id),
                _ => {
                    let mut mask = NodeMask::new();
                    mask.insert(id);
                    buckets.push((d, mask));
                }
            }
        }
        Ok(Distance { buckets })
    }

    /// Distance buckets in increasing order of distance.
    pub fn buckets(&self) -> &[(u32, NodeMask)] {
        &self.buckets
    }
}
