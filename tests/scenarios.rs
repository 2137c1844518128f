//! End-to-end scenarios over the 8-node DRAM/PMEM fixture used throughout
//! the design (spec §8): nodes 0-3 are DRAM and normal-memory, nodes 4-7 are
//! PMEM and movable, 4 bytes of capacity each. Distances: 0 to self, 10 to
//! the close-cpu partner, 20 to the cross-type partner, 30 otherwise.

use libmem::mask::{MemoryType, NodeMask, TypeMask};
use libmem::{
    container, container_with_strict_types, container_with_types, preserved_container, Allocator, ExpandHook, Handle,
    MemError, Node, Priority,
};

fn fixture_nodes() -> Vec<Node> {
    let mut nodes = Vec::new();
    for id in 0u8..8 {
        let kind = if id < 4 { MemoryType::Dram } else { MemoryType::Pmem };
        let is_normal = id < 4;
        let distances = (0u8..8)
            .map(|other| {
                if other == id {
                    0
                } else if other / 2 == id / 2 {
                    10
                } else if other % 4 == id % 4 {
                    20
                } else {
                    30
                }
            })
            .collect();
        nodes.push(Node::new(id, kind, 4, is_normal, Default::default(), distances));
    }
    nodes
}

fn fixture() -> Allocator {
    Allocator::builder().with_nodes(fixture_nodes()).unwrap().build().unwrap()
}

/// Every materialized zone's nested usage (spec §9: sum of limits of
/// requests whose zone is a *subset*, not requests assigned exactly to it)
/// stays within capacity.
fn assert_no_overcommit(allocator: &Allocator) {
    for zone in allocator.zones() {
        let usage: u64 = allocator
            .requests()
            .filter(|r| r.zone.is_subset(&zone.nodes))
            .map(|r| r.limit)
            .sum();
        assert!(
            usage <= zone.capacity,
            "zone {} usage {usage} exceeds capacity {}",
            zone.nodes,
            zone.capacity
        );
    }
}

#[test]
fn simple_dram_placement() {
    let mut allocator = fixture();
    let (zone, updates) = allocator
        .allocate(container_with_types("c1", "c1", 2, NodeMask::single(0), TypeMask::single(MemoryType::Dram)))
        .unwrap();
    assert_eq!(zone, NodeMask::single(0));
    assert!(updates.is_empty());
    allocator.self_check().unwrap();
}

#[test]
fn priority_driven_relocation() {
    let mut allocator = fixture();
    allocator
        .allocate(container("b1", "b1", 2, NodeMask::single(0)))
        .unwrap();
    allocator
        .allocate(container("b2", "b2", 2, NodeMask::single(0)))
        .unwrap();
    allocator
        .allocate(container("b3", "b3", 2, NodeMask::single(2)))
        .unwrap();
    allocator
        .allocate(container("b4", "b4", 2, NodeMask::single(2)))
        .unwrap();
    assert_no_overcommit(&allocator);

    let (zone, updates) = allocator
        .allocate(container("g1", "g1", 2, NodeMask::single(0)).priority(Priority::GUARANTEED))
        .unwrap();
    assert!(zone.contains(0));
    assert!(!updates.is_empty(), "filling node 0 to capacity then admitting a guaranteed request must relocate a burstable holder");
    for (id, new_zone) in &updates {
        let moved = allocator.request(id).unwrap();
        assert!(moved.priority <= Priority::GUARANTEED);
        assert!(new_zone.contains(0));
    }
    assert_no_overcommit(&allocator);
    allocator.self_check().unwrap();
}

#[test]
fn cascade_to_full_system() {
    let mut allocator = fixture();
    for (i, affinity) in [1u8, 3, 1, 3].into_iter().enumerate() {
        allocator
            .allocate(container(format!("c{i}"), "c", 2, NodeMask::single(affinity)))
            .unwrap();
        assert_no_overcommit(&allocator);
        allocator.self_check().unwrap();
    }
    // Some request ended up spanning well beyond its original single node as
    // the cascade repeatedly widened overcommitted zones.
    assert!(allocator.requests().any(|r| r.zone.len() > 1));
}

#[test]
fn strict_type_failure_when_type_unavailable() {
    let mut allocator = fixture();
    let err = allocator
        .allocate(container_with_strict_types(
            "hbm-req",
            "hbm-req",
            8,
            NodeMask::single(0),
            TypeMask::single(MemoryType::Hbm),
        ))
        .unwrap_err();
    assert_eq!(err, MemError::InvalidType("hbm-req: strict types HBM not all available".into()));
    assert!(allocator.request("hbm-req").is_none());
}

#[test]
fn strict_pmem_fails_normal_memory_guarantee_non_strict_falls_back() {
    let mut allocator = fixture();
    let err = allocator
        .allocate(container_with_strict_types(
            "strict-pmem",
            "strict-pmem",
            1,
            NodeMask::single(4),
            TypeMask::single(MemoryType::Pmem),
        ))
        .unwrap_err();
    assert_eq!(err, MemError::NoNormalMemory("strict-pmem".into()));
    assert!(allocator.request("strict-pmem").is_none());

    let (zone, _) = allocator
        .allocate(container_with_types(
            "non-strict-pmem",
            "non-strict-pmem",
            1,
            NodeMask::single(4),
            TypeMask::single(MemoryType::Pmem),
        ))
        .unwrap();
    assert_eq!(zone, NodeMask::from_bits((1 << 0) | (1 << 4)));
    let req = allocator.request("non-strict-pmem").unwrap();
    assert!(req.types.contains(MemoryType::Dram));
    assert!(req.types.contains(MemoryType::Pmem));
}

#[test]
fn offer_invalidation() {
    let mut allocator = fixture();
    let offer = allocator
        .get_offer(container("r1", "r1", 2, NodeMask::single(0)))
        .unwrap();
    assert_eq!(allocator.version(), offer.version());
    assert!(allocator.request("r1").is_none(), "get_offer must not publish");

    allocator
        .allocate(container("r2", "r2", 2, NodeMask::single(2)))
        .unwrap();
    assert!(!offer.is_valid(allocator.version()));

    let err = allocator.commit(offer).unwrap_err();
    assert_eq!(err, MemError::ExpiredOffer);
    assert!(allocator.request("r1").is_none());
}

#[test]
fn realloc_is_monotone() {
    let mut allocator = fixture();
    allocator
        .allocate(container_with_types("r", "r", 2, NodeMask::single(0), TypeMask::single(MemoryType::Dram)))
        .unwrap();
    assert_eq!(allocator.request("r").unwrap().zone, NodeMask::single(0));

    let version_before = allocator.version();
    let zone = allocator
        .realloc("r", NodeMask::EMPTY, TypeMask::single(MemoryType::Pmem))
        .unwrap();
    assert_eq!(zone, NodeMask::from_bits((1 << 0) | (1 << 4)));
    let req = allocator.request("r").unwrap();
    assert!(req.types.contains(MemoryType::Dram));
    assert!(req.types.contains(MemoryType::Pmem));
    assert_eq!(allocator.version(), version_before + 1);

    let version_after_first = allocator.version();
    let zone2 = allocator
        .realloc("r", NodeMask::EMPTY, TypeMask::single(MemoryType::Dram))
        .unwrap();
    assert_eq!(zone2, zone, "re-requesting an already-held type must be a no-op");
    assert_eq!(allocator.version(), version_after_first, "a no-op realloc must not advance the version");
}

#[test]
fn memset_string_matches_scenario() {
    let mask: NodeMask = [
        0u8, 1, 2, 5, 6, 9, 10, 12, 15, 16, 17, 18, 20, 21, 22, 23, 24, 25, 26, 28, 30, 31, 32, 40, 41, 42,
    ]
    .into_iter()
    .collect();
    assert_eq!(mask.memset_string(), "0-2,5-6,9-10,12,15-18,20-26,28,30-32,40-42");
}

#[test]
fn reservation_priority_is_never_relocated() {
    // A closed 2-node system, fully reserved, leaves no capacity anywhere
    // for a third request and no lower-priority occupant to evict.
    let nodes = vec![
        Node::new(0, MemoryType::Dram, 4, true, Default::default(), vec![0, 10]),
        Node::new(1, MemoryType::Dram, 4, true, Default::default(), vec![10, 0]),
    ];
    let mut allocator = Allocator::builder().with_nodes(nodes).unwrap().build().unwrap();

    allocator
        .allocate(libmem::reserved_memory("pinned-0", "pinned-0", 4, NodeMask::single(0)))
        .unwrap();
    allocator
        .allocate(libmem::reserved_memory("pinned-1", "pinned-1", 4, NodeMask::single(1)))
        .unwrap();

    let err = allocator
        .allocate(preserved_container("p1", "p1", 1, NodeMask::single(0)))
        .unwrap_err();
    assert!(matches!(err, MemError::NoMem(_)));
    assert!(allocator.request("p1").is_none(), "a failed allocate must not leave the request admitted");
    assert_eq!(allocator.request("pinned-0").unwrap().zone, NodeMask::single(0));
    assert_eq!(allocator.request("pinned-1").unwrap().zone, NodeMask::single(1));
    allocator.self_check().unwrap();
}

#[test]
fn commit_applies_a_valid_offer_exactly_like_allocate() {
    let mut via_offer = fixture();
    for (i, affinity) in [0u8, 0, 2, 2].into_iter().enumerate() {
        via_offer
            .allocate(container(format!("b{i}"), "b", 2, NodeMask::single(affinity)))
            .unwrap();
    }
    let offer = via_offer
        .get_offer(container("g1", "g1", 2, NodeMask::single(0)).priority(Priority::GUARANTEED))
        .unwrap();
    assert!(via_offer.request("g1").is_none(), "get_offer must not publish");
    let final_zone = offer.final_zone();
    let mut expected_updates = offer.updates().clone();
    expected_updates.remove("g1");
    let (zone, updates) = via_offer.commit(offer).unwrap();
    assert_eq!(zone, final_zone);
    assert_eq!(updates, expected_updates);
    assert!(!updates.is_empty(), "filling node 0 to capacity must relocate a burstable holder");
    via_offer.self_check().unwrap();

    let mut via_allocate = fixture();
    for (i, affinity) in [0u8, 0, 2, 2].into_iter().enumerate() {
        via_allocate
            .allocate(container(format!("b{i}"), "b", 2, NodeMask::single(affinity)))
            .unwrap();
    }
    let (zone2, updates2) = via_allocate
        .allocate(container("g1", "g1", 2, NodeMask::single(0)).priority(Priority::GUARANTEED))
        .unwrap();
    assert_eq!(zone2, zone, "commit(offer) and allocate() must reach the same final zone");
    assert_eq!(updates2, updates, "commit(offer) and allocate() must relocate the same requests");
}

#[test]
fn allocate_then_release_restores_state_and_bumps_version_by_two() {
    let mut allocator = fixture();
    let version_before = allocator.version();
    allocator
        .allocate(container_with_types("c1", "c1", 2, NodeMask::single(0), TypeMask::single(MemoryType::Dram)))
        .unwrap();
    assert_eq!(allocator.zones().count(), 1);

    allocator.release("c1").unwrap();
    assert_eq!(allocator.version(), version_before + 2, "allocate+release must advance the version by exactly 2");
    assert!(allocator.request("c1").is_none());
    assert_eq!(allocator.zones().count(), 0, "a zone with no users must be garbage collected");
    allocator.self_check().unwrap();

    let err = allocator.release("c1").unwrap_err();
    assert!(matches!(err, MemError::UnknownRequest(_)));
}

#[test]
fn reset_drops_every_request_and_zone_and_bumps_version() {
    let mut allocator = fixture();
    allocator.allocate(container("a", "a", 2, NodeMask::single(0))).unwrap();
    allocator.allocate(container("b", "b", 2, NodeMask::single(2))).unwrap();
    let version_before = allocator.version();

    allocator.reset();

    assert_eq!(allocator.version(), version_before + 1);
    assert_eq!(allocator.requests().count(), 0);
    assert_eq!(allocator.zones().count(), 0);
    allocator.self_check().unwrap();
}

#[test]
fn custom_expand_hook_overrides_default_and_is_masked_to_new_bits() {
    // Ignores distance entirely and pulls in every node of the requested
    // types, including nodes already in `zone` — exercising the allocator's
    // "hook output masked down to bits not already in zone" behavior
    // (`Handle::expand_zone`).
    let hook: Box<ExpandHook> =
        Box::new(|h: &Handle, zone: NodeMask, types: TypeMask| h.topology().masks().nodes_of_types(types).union(&zone));
    let mut allocator = Allocator::builder()
        .with_nodes(fixture_nodes())
        .unwrap()
        .with_custom_functions(Some(hook), None)
        .build()
        .unwrap();

    let (zone, _updates) = allocator
        .allocate(container_with_types(
            "c1",
            "c1",
            1,
            NodeMask::single(0),
            TypeMask::single(MemoryType::Dram).union(&TypeMask::single(MemoryType::Pmem)),
        ))
        .unwrap();

    // The default nearest-neighbor algorithm would only pull in node 4 (the
    // closest PMEM partner of node 0); the custom hook pulls in every PMEM
    // node regardless of distance.
    let expected = [0u8, 4, 5, 6, 7].into_iter().fold(NodeMask::EMPTY, |m, id| m.union(&NodeMask::single(id)));
    assert_eq!(zone, expected);
    allocator.self_check().unwrap();
}
