//! The default overcommit resolution algorithm (spec §4.8).

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{MemError, Result};
use crate::handle::Handle;
use crate::mask::{MemoryType, NodeMask, TypeMask};
use crate::priority::Priority;
use crate::request::Request;

/// Priority bands considered in increasing order. `BestEffort` is folded
/// into the `Burstable` band; `Reservation` is never a candidate.
const BANDS: [Priority; 3] = [Priority::BURSTABLE, Priority::GUARANTEED, Priority::PRESERVED];

/// Resolves overcommit by relocating requests out of overcommitted zones,
/// in increasing priority-band order, widening the allowed expansion
/// types each pass, until every initially-overcommitted zone clears or no
/// further progress can be made.
pub(crate) fn default_handle_overcommit(h: &mut Handle, spill: &HashMap<NodeMask, i64>) -> Result<()> {
    if spill.is_empty() {
        return Ok(());
    }
    let touched: NodeMask = spill.keys().fold(NodeMask::EMPTY, |a, &m| a.union(&m));
    let known_types = h.topology().masks().known_types();

    for &band in &BANDS {
        // Type budgets: own types only, then +DRAM, +PMEM, +HBM, skipping
        // types the system doesn't have at all.
        let extra_types = [None, Some(MemoryType::Dram), Some(MemoryType::Pmem), Some(MemoryType::Hbm)];
        let mut cumulative_extra = TypeMask::EMPTY;
        for extra in extra_types {
            if let Some(t) = extra {
                if !known_types.contains(t) {
                    continue;
                }
                cumulative_extra.insert(t);
            }

            let moved = zone_sweep(h, touched, band, cumulative_extra)?;
            let still_over = h.overcommitted(touched);
            log::debug!(
                "overcommit pass: band={band} extra_types={cumulative_extra} moved={moved} remaining_zones={}",
                still_over.len()
            );
            if still_over.is_empty() {
                return Ok(());
            }
        }
    }

    let remaining = h.overcommitted(touched);
    let worst = remaining
        .keys()
        .next()
        .copied()
        .map(|m| m.to_string())
        .unwrap_or_default();
    log::debug!("overcommit unresolved after all bands/types, worst zone {worst}");
    Err(MemError::NoMem(worst))
}

/// One pass over the currently overcommitted zones (recomputed fresh each
/// call), expanding each by `zone.types | extra_types` and relocating
/// candidate users until its spill is absorbed or candidates run out.
/// Returns the total bytes moved in this pass.
fn zone_sweep(h: &mut Handle, touched: NodeMask, band: Priority, extra_types: TypeMask) -> Result<u64> {
    let mut moved_total = 0u64;
    let spill = h.overcommitted(touched);
    let mut zones: Vec<NodeMask> = spill.keys().copied().collect();
    zones.sort_by(|&a, &b| zone_order(h, a, b));

    for zone_mask in zones {
        let Some(mut over) = h.overcommitted(touched).get(&zone_mask).copied() else {
            continue;
        };
        if over <= 0 {
            continue;
        }

        let zone_types = match h.zone(zone_mask) {
            Some(z) => z.types,
            None => continue,
        };
        let expanded = h.expand_zone(zone_mask, zone_types.union(&extra_types));
        if expanded.is_empty() {
            continue;
        }
        let target_zone = zone_mask.union(&expanded);

        let mut candidates: Vec<Request> = h
            .zone(zone_mask)
            .map(|z| {
                z.users
                    .iter()
                    .filter_map(|id| h.request(id).cloned())
                    .filter(|r| !r.priority.is_reservation() && r.priority <= band)
                    .collect()
            })
            .unwrap_or_default();
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.limit.cmp(&a.limit))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        for candidate in candidates {
            if over <= 0 {
                break;
            }
            let eligible = !candidate.strict || candidate.types.is_subset(&h.topology().types_of(target_zone));
            if !eligible {
                continue;
            }
            h.move_request(&candidate.id, target_zone)?;
            moved_total += candidate.limit;
            over -= candidate.limit as i64;
        }
    }
    Ok(moved_total)
}

fn zone_order(h: &Handle, a: NodeMask, b: NodeMask) -> Ordering {
    let users_a = h.zone(a).map(|z| z.users.len()).unwrap_or(0);
    let users_b = h.zone(b).map(|z| z.users.len()).unwrap_or(0);
    users_b
        .cmp(&users_a)
        .then_with(|| {
            if a != b && a.is_subset(&b) {
                Ordering::Less
            } else if a != b && b.is_subset(&a) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.len().cmp(&a.len()))
        .then_with(|| a.bits().cmp(&b.bits()))
}
