//! The per-request admission and reallocation pipelines (spec §4.3–§4.8).
//!
//! These are free functions over a [`Handle`] rather than `Allocator`
//! methods: the handle already borrows the allocator's mutable state, so
//! keeping the pipeline logic outside `impl Allocator` avoids re-borrowing
//! `self` while a handle referencing its fields is alive.

use crate::error::{MemError, Result};
use crate::handle::{Handle, OvercommitHook};
use crate::mask::{MemoryType, NodeMask, TypeMask};
use crate::request::Request;

pub(crate) fn validate(handle: &Handle, req: &mut Request) -> Result<()> {
    if handle.request(&req.id).is_some() {
        return Err(MemError::AlreadyExists(req.id.clone()));
    }
    let topology = handle.topology();
    if !topology.contains_only_known_nodes(req.affinity) {
        return Err(MemError::InvalidNode(format!(
            "request {}: affinity {} references unknown node(s)",
            req.id, req.affinity
        )));
    }
    let known = topology.masks().known_types();
    if req.strict {
        if !req.types.is_subset(&known) {
            return Err(MemError::InvalidType(format!(
                "request {}: strict types {} not all available",
                req.id, req.types
            )));
        }
    } else {
        req.types = req.types.intersection(&known);
    }
    if req.affinity.is_empty() {
        return Err(MemError::InvalidNodeMask(format!(
            "request {}: affinity must be non-zero",
            req.id
        )));
    }
    if req.types.is_empty() {
        req.types = topology.types_of(req.affinity);
    }
    Ok(())
}

/// Seed-zone selection (spec §4.4).
pub(crate) fn initial_zone(handle: &Handle, req: &Request) -> Result<NodeMask> {
    let topology = handle.topology();
    let mut zone = req.affinity;
    loop {
        let have = topology.types_of(zone);
        let missing = req.types.difference(&have);
        if missing.is_empty() {
            break;
        }
        let expansion = handle.expand_zone(zone, missing);
        if expansion.is_empty() {
            break;
        }
        zone = zone.union(&expansion);
    }

    let masked = zone.intersection(&topology.masks().nodes_of_types(req.types));
    if req.strict {
        let represented = topology.types_of(masked);
        if !req.types.is_subset(&represented) {
            return Err(MemError::NoInitialNodes(req.id.clone()));
        }
        Ok(masked)
    } else if !masked.is_empty() {
        Ok(masked)
    } else {
        Ok(zone)
    }
}

/// Normal-memory guarantee (spec §4.6). Widens `req.types` in place if a
/// non-strict request needed a substitute type to reach normal memory.
pub(crate) fn ensure_normal_memory(handle: &Handle, req: &mut Request, zone: NodeMask) -> Result<NodeMask> {
    let topology = handle.topology();
    let normal = topology.masks().normal;
    if zone.intersects(&normal) {
        return Ok(zone);
    }

    let mut probe = zone;
    loop {
        let expansion = handle.expand_zone(probe, req.types);
        if expansion.is_empty() {
            break;
        }
        probe = probe.union(&expansion);
        if probe.intersects(&normal) {
            return Ok(probe);
        }
    }

    if req.strict {
        return Err(MemError::NoNormalMemory(req.id.clone()));
    }

    for t in [MemoryType::Dram, MemoryType::Pmem, MemoryType::Hbm] {
        let type_nodes = topology.masks().nodes_of_types(TypeMask::single(t));
        if !type_nodes.intersects(&normal) {
            continue;
        }
        let sub = TypeMask::single(t);
        let mut probe = zone;
        loop {
            let expansion = handle.expand_zone(probe, sub);
            if expansion.is_empty() {
                break;
            }
            probe = probe.union(&expansion);
            if probe.intersects(&normal) {
                req.types.insert(t);
                return Ok(probe);
            }
        }
    }

    Err(MemError::NoNormalMemory(req.id.clone()))
}

pub(crate) fn resolve_overcommit(
    handle: &mut Handle,
    overcommit_hook: Option<&OvercommitHook>,
    touched: NodeMask,
) -> Result<()> {
    let spill = handle.overcommitted(touched);
    if spill.is_empty() {
        return Ok(());
    }
    match overcommit_hook {
        Some(hook) => hook(handle, &spill),
        None => handle.default_handle_overcommit(&spill),
    }
}

/// Runs the full admission pipeline for a new request (spec §4.3–§4.8). On
/// success the request is live in `handle`'s store and its final zone is
/// recorded in the journal's updates map under `req.id`.
pub(crate) fn admit(handle: &mut Handle, overcommit_hook: Option<&OvercommitHook>, mut req: Request) -> Result<()> {
    validate(handle, &mut req)?;
    let zone = initial_zone(handle, &req)?;
    let zone = ensure_normal_memory(handle, &mut req, zone)?;
    let id = req.id.clone();
    handle.admit_request(req, zone);
    resolve_overcommit(handle, overcommit_hook, zone)?;
    log::debug!("admitted request {id} into zone {zone}");
    Ok(())
}

/// Monotone expansion of an already-admitted request (spec §4.9 `realloc`).
/// Returns the current zone unchanged (no journal entries) when the call is
/// a no-op.
pub(crate) fn realloc(
    handle: &mut Handle,
    overcommit_hook: Option<&OvercommitHook>,
    id: &str,
    extra_affinity: NodeMask,
    extra_types: TypeMask,
) -> Result<NodeMask> {
    let current = handle
        .request(id)
        .cloned()
        .ok_or_else(|| MemError::UnknownRequest(id.to_string()))?;

    if extra_affinity.is_empty() && extra_types.is_empty() {
        return Ok(current.zone);
    }
    let target_affinity = current.zone.union(&extra_affinity);
    let target_types = current.types.union(&extra_types);
    if target_affinity.is_subset(&current.zone) && target_types.is_subset(&current.types) {
        return Ok(current.zone);
    }

    let mut probe = current.clone();
    probe.affinity = target_affinity;
    probe.types = target_types;

    let zone = initial_zone(handle, &probe)?;
    let zone = ensure_normal_memory(handle, &mut probe, zone)?;
    // Monotone: the assigned zone and type mask only ever grow.
    let final_zone = current.zone.union(&zone);
    let final_types = current.types.union(&probe.types);

    handle.move_request(id, final_zone)?;
    if let Some(stored) = handle.store.requests.get_mut(id) {
        stored.types = final_types;
    }

    resolve_overcommit(handle, overcommit_hook, current.zone.union(&final_zone))?;
    log::debug!("realloc {id}: zone {} -> {final_zone}", current.zone);
    Ok(final_zone)
}
