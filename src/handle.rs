//! Mutable allocator state and the handle passed to custom hooks.
//!
//! Per the design notes, zones and requests are two owning maps keyed by
//! mask and id respectively; each side holds only the key of the other.
//! [`Store::user_index`] (id -> mask) and each [`Zone::users`] (mask ->
//! set of ids) are the two sources of truth the post-mutation self-check
//! compares.

use std::collections::HashMap;

use crate::error::{MemError, Result};
use crate::expand::default_expand_zone;
use crate::journal::Journal;
use crate::mask::{NodeMask, TypeMask};
use crate::overcommit::default_handle_overcommit;
use crate::request::Request;
use crate::topology::Topology;
use crate::zone::Zone;

/// Signature for a custom zone-expansion hook (spec §4.10). Given the
/// current zone and the set of types still missing, returns additional
/// nodes to bring in; the allocator masks the result down to nodes not
/// already in `zone`.
pub type ExpandHook = dyn Fn(&Handle, NodeMask, TypeMask) -> NodeMask + Send + Sync;

/// Signature for a custom overcommit-resolution hook (spec §4.10). Given the
/// zones over capacity and by how much, must relocate requests (via
/// [`Handle::move_request`]) until every entry in `spill` is cleared, or
/// return [`MemError::NoMem`].
pub type OvercommitHook = dyn Fn(&mut Handle, &HashMap<NodeMask, i64>) -> Result<()> + Send + Sync;

/// The two owning maps (requests, zones) plus the user index that ties
/// them together.
#[derive(Debug, Default)]
pub(crate) struct Store {
    pub(crate) requests: HashMap<String, Request>,
    pub(crate) zones: HashMap<NodeMask, Zone>,
    pub(crate) user_index: HashMap<String, NodeMask>,
}

/// Moves (or admits, or removes) request `id` to `new_zone` in `store`,
/// keeping `Zone::users`, `Store::user_index`, and `Request::zone` in
/// agreement. Does not touch the journal; callers that need reversibility
/// record the move there first.
pub(crate) fn set_zone(store: &mut Store, topology: &Topology, id: &str, new_zone: NodeMask) {
    let curr = store.requests.get(id).map(|r| r.zone).unwrap_or(NodeMask::EMPTY);
    if curr == new_zone {
        return;
    }
    if !curr.is_empty() {
        if let Some(z) = store.zones.get_mut(&curr) {
            z.users.remove(id);
            if z.is_empty() {
                store.zones.remove(&curr);
            }
        }
    }
    if new_zone.is_empty() {
        store.user_index.remove(id);
    } else {
        let zone = store
            .zones
            .entry(new_zone)
            .or_insert_with(|| Zone::new(new_zone, topology));
        zone.users.insert(id.to_string());
        store.user_index.insert(id.to_string(), new_zone);
    }
    if let Some(r) = store.requests.get_mut(id) {
        r.zone = new_zone;
    }
}

/// Reinstalls every journaled revert target, undoing a failed operation.
/// Requests whose prior zone was `NodeMask::EMPTY` (newly admitted this
/// transaction) are removed entirely rather than left with an empty zone.
pub(crate) fn revert(store: &mut Store, topology: &Topology, journal: &Journal) {
    for (id, &prior) in &journal.reverts {
        set_zone(store, topology, id, prior);
        if prior.is_empty() {
            store.requests.remove(id);
            store.user_index.remove(id);
        }
    }
}

/// Drops any zone left with no users. `set_zone` already does this
/// incrementally; this is a defensive sweep run after every commit.
pub(crate) fn gc_empty_zones(store: &mut Store) {
    store.zones.retain(|_, z| !z.is_empty());
}

/// A handle into the allocator's mutable state, passed to the default
/// expansion/overcommit algorithms and to custom hooks. The handle does
/// not outlive the call that constructed it.
pub struct Handle<'a> {
    pub(crate) topology: &'a Topology,
    pub(crate) store: &'a mut Store,
    pub(crate) journal: &'a mut Journal,
    pub(crate) expand_hook: Option<&'a ExpandHook>,
}

impl<'a> Handle<'a> {
    pub(crate) fn new(
        topology: &'a Topology,
        store: &'a mut Store,
        journal: &'a mut Journal,
        expand_hook: Option<&'a ExpandHook>,
    ) -> Self {
        Handle {
            topology,
            store,
            journal,
            expand_hook,
        }
    }

    pub fn topology(&self) -> &Topology {
        self.topology
    }

    pub fn zone(&self, mask: NodeMask) -> Option<&Zone> {
        self.store.zones.get(&mask)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.store.zones.values()
    }

    pub fn request(&self, id: &str) -> Option<&Request> {
        self.store.requests.get(id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.store.requests.values()
    }

    /// Sum of `limit` over every request whose assigned zone is a *subset*
    /// of `zone` (nested usage, per the design notes — not equality).
    pub fn nested_usage(&self, zone: NodeMask) -> u64 {
        self.store
            .requests
            .values()
            .filter(|r| r.zone.is_subset(&zone))
            .map(|r| r.limit)
            .sum()
    }

    /// The zones whose nested usage exceeds their capacity, among zones
    /// intersecting `touched`, mapped to the number of bytes over capacity.
    pub fn overcommitted(&self, touched: NodeMask) -> HashMap<NodeMask, i64> {
        let mut spill = HashMap::new();
        for zone in self.store.zones.values() {
            if !zone.nodes.intersects(&touched) {
                continue;
            }
            let usage = self.nested_usage(zone.nodes) as i64;
            let over = usage - zone.capacity as i64;
            if over > 0 {
                spill.insert(zone.nodes, over);
            }
        }
        spill
    }

    /// Moves an already-admitted request to `new_zone`, journaling the
    /// prior zone as the revert target.
    pub fn move_request(&mut self, id: &str, new_zone: NodeMask) -> Result<()> {
        let curr = self
            .store
            .requests
            .get(id)
            .map(|r| r.zone)
            .ok_or_else(|| MemError::UnknownRequest(id.to_string()))?;
        self.journal.record(id, curr, new_zone);
        set_zone(self.store, self.topology, id, new_zone);
        Ok(())
    }

    /// Admits a brand-new request into the store at `zone`, journaling it
    /// as having no prior zone.
    pub(crate) fn admit_request(&mut self, mut req: Request, zone: NodeMask) {
        let id = req.id.clone();
        self.journal.record(&id, NodeMask::EMPTY, zone);
        req.zone = NodeMask::EMPTY;
        self.store.requests.insert(id.clone(), req);
        set_zone(self.store, self.topology, &id, zone);
    }

    /// The default zone expansion algorithm (spec §4.5), bypassing any
    /// custom hook. Exposed so a custom hook can compose with it.
    pub fn default_expand_zone(&self, zone: NodeMask, types: TypeMask) -> NodeMask {
        default_expand_zone(self.topology, zone, types)
    }

    /// Expands `zone` by `types`, using the custom hook if one was
    /// installed, else the default algorithm. Hook output is masked down to
    /// bits not already in `zone`.
    pub fn expand_zone(&self, zone: NodeMask, types: TypeMask) -> NodeMask {
        match self.expand_hook {
            Some(hook) => hook(self, zone, types).difference(&zone),
            None => self.default_expand_zone(zone, types),
        }
    }

    /// The default overcommit resolution algorithm (spec §4.8), bypassing
    /// any custom hook. Exposed so a custom hook can compose with it.
    pub fn default_handle_overcommit(&mut self, spill: &HashMap<NodeMask, i64>) -> Result<()> {
        default_handle_overcommit(self, spill)
    }
}
