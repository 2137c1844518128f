//! Materialized zones: sets of nodes currently hosting at least one
//! request.

use std::collections::HashSet;

use crate::mask::{NodeMask, TypeMask};
use crate::topology::Topology;

/// A zone materialized for the exact [`NodeMask`] of its member nodes.
///
/// Zones are created lazily when first assigned a user and are removed
/// (garbage collected) once their last user leaves. Per the design notes,
/// a zone holds only the *ids* of its users, not the [`crate::Request`]
/// values themselves — the request store is the single owner of those.
#[derive(Debug, Clone)]
pub struct Zone {
    pub nodes: NodeMask,
    pub types: TypeMask,
    pub capacity: u64,
    pub users: HashSet<String>,
}

impl Zone {
    pub fn new(nodes: NodeMask, topology: &Topology) -> Zone {
        Zone {
            nodes,
            types: topology.types_of(nodes),
            capacity: topology.capacity_of(nodes),
            users: HashSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
