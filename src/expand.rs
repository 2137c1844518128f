//! The default zone expansion algorithm (spec §4.5).

use crate::mask::{NodeMask, TypeMask};
use crate::topology::Topology;

/// Extends `zone` by the nearest nodes of each type in `types`.
///
/// For each requested type, every node already in `zone` contributes: the
/// first distance at which an as-yet-absent node of that type appears in
/// its distance table, and then every node of that type at or below that
/// distance. The union across all contributing nodes and all requested
/// types is the expansion. Returns the empty mask if `types` is empty or
/// no new node of any requested type exists.
pub(crate) fn default_expand_zone(topology: &Topology, zone: NodeMask, types: TypeMask) -> NodeMask {
    if types.is_empty() {
        return NodeMask::EMPTY;
    }

    let mut result = NodeMask::EMPTY;
    for t in types.iter() {
        let type_nodes = topology.masks().nodes_of_types(TypeMask::single(t));
        if type_nodes.is_empty() {
            continue;
        }
        for n in zone.iter() {
            let Some(distance) = topology.distance_of(n) else {
                continue;
            };
            let mut closest = None;
            for &(d, peers) in distance.buckets() {
                if !peers.intersection(&type_nodes).difference(&zone).is_empty() {
                    closest = Some(d);
                    break;
                }
            }
            let Some(closest) = closest else {
                continue;
            };
            for &(d, peers) in distance.buckets() {
                if d > closest {
                    break;
                }
                result = result.union(&peers.intersection(&type_nodes).difference(&zone));
            }
        }
    }
    result
}
