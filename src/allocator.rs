//! The allocator: construction, validation, and the top-level operations
//! (spec §4.1, §4.3–§4.9, §4.11).

use std::collections::HashMap;

use crate::error::{MemError, Result};
use crate::handle::{gc_empty_zones, revert, set_zone, ExpandHook, Handle, OvercommitHook, Store};
use crate::journal::Journal;
use crate::mask::{NodeMask, TypeMask};
use crate::node::Node;
use crate::offer::Offer;
use crate::pipeline;
use crate::request::{Request, RequestBuilder};
use crate::topology::Topology;
use crate::zone::Zone;

/// Hardware discovery is an external collaborator: the allocator core has no
/// opinion on how a node set is obtained, only on what is done with one once
/// supplied. `WithSystemNodes` takes an implementation of this trait rather
/// than reading `/sys` itself.
pub trait SystemTopologyDiscovery {
    fn discover(&self) -> Result<Vec<Node>>;
}

/// Builds an [`Allocator`]. Exactly one of [`AllocatorBuilder::with_nodes`]
/// or [`AllocatorBuilder::with_system_nodes`] must be called before
/// [`AllocatorBuilder::build`].
#[derive(Default)]
pub struct AllocatorBuilder {
    nodes: Option<Vec<Node>>,
    expand_hook: Option<Box<ExpandHook>>,
    overcommit_hook: Option<Box<OvercommitHook>>,
}

impl AllocatorBuilder {
    pub fn new() -> Self {
        AllocatorBuilder::default()
    }

    /// Supplies the node set directly. Mutually exclusive with
    /// [`Self::with_system_nodes`].
    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Result<Self> {
        if self.nodes.is_some() {
            return Err(MemError::FailedOption(
                "node set already supplied; WithNodes/WithSystemNodes may be used only once".into(),
            ));
        }
        self.nodes = Some(nodes);
        Ok(self)
    }

    /// Supplies the node set via hardware discovery. Mutually exclusive with
    /// [`Self::with_nodes`].
    pub fn with_system_nodes(mut self, discovery: &dyn SystemTopologyDiscovery) -> Result<Self> {
        if self.nodes.is_some() {
            return Err(MemError::FailedOption(
                "node set already supplied; WithNodes/WithSystemNodes may be used only once".into(),
            ));
        }
        self.nodes = Some(discovery.discover()?);
        Ok(self)
    }

    /// Installs custom expansion and/or overcommit-resolution hooks. Either
    /// may be `None` to keep the corresponding default algorithm.
    pub fn with_custom_functions(
        mut self,
        expand: Option<Box<ExpandHook>>,
        overcommit: Option<Box<OvercommitHook>>,
    ) -> Self {
        self.expand_hook = expand;
        self.overcommit_hook = overcommit;
        self
    }

    pub fn build(self) -> Result<Allocator> {
        let nodes = self.nodes.ok_or_else(|| {
            MemError::FailedOption("no node set supplied; call WithNodes or WithSystemNodes".into())
        })?;
        let topology = Topology::build(nodes)?;
        Ok(Allocator {
            topology,
            store: Store::default(),
            version: 0,
            next_created_at: 1,
            expand_hook: self.expand_hook,
            overcommit_hook: self.overcommit_hook,
        })
    }
}

/// A topology-aware memory allocator: tracks admitted requests, the zones
/// they materialize, and resolves overcommit as new requests arrive.
///
/// All mutating operations are atomic: on success the allocator reflects the
/// change and the version counter advances by one; on failure the allocator
/// is byte-for-byte as it was before the call. [`Allocator::self_check`]
/// verifies this invariant and every other structural invariant directly.
pub struct Allocator {
    topology: Topology,
    store: Store,
    version: u64,
    next_created_at: u64,
    expand_hook: Option<Box<ExpandHook>>,
    overcommit_hook: Option<Box<OvercommitHook>>,
}

impl Allocator {
    pub fn builder() -> AllocatorBuilder {
        AllocatorBuilder::new()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn nodes(&self) -> &[Node] {
        self.topology.nodes()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
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

    /// Builds a non-publishing preview of admitting `builder` as a new
    /// request: the full pipeline runs and is then reverted, regardless of
    /// outcome, so the allocator's state is unchanged either way.
    pub fn get_offer(&mut self, builder: RequestBuilder) -> Result<Offer> {
        let req = builder.build(self.next_created_at);
        let id = req.id.clone();

        let mut journal = Journal::new();
        let outcome = {
            let topology = &self.topology;
            let store = &mut self.store;
            let expand_hook = self.expand_hook.as_deref();
            let mut handle = Handle::new(topology, store, &mut journal, expand_hook);
            pipeline::admit(&mut handle, self.overcommit_hook.as_deref(), req)
        };

        // Capture the normalized request (types possibly widened by the
        // normal-memory guarantee) before reverting it out of existence.
        let template = outcome.is_ok().then(|| {
            let mut r = self
                .store
                .requests
                .get(&id)
                .cloned()
                .expect("admitted request present before revert");
            r.zone = NodeMask::EMPTY;
            r
        });

        revert(&mut self.store, &self.topology, &journal);
        self.self_check()?;
        outcome?;

        let final_zone = *journal
            .updates
            .get(&id)
            .expect("admitted request recorded in journal updates");
        Ok(Offer {
            version: self.version,
            new_request: template,
            updates: journal.updates,
            final_zone,
        })
    }

    /// Admits `builder` as a new request, publishing the result immediately.
    /// Returns the request's final zone and the zones of any other requests
    /// relocated to resolve overcommit.
    pub fn allocate(&mut self, builder: RequestBuilder) -> Result<(NodeMask, HashMap<String, NodeMask>)> {
        let req = builder.build(self.next_created_at);
        self.next_created_at += 1;
        let id = req.id.clone();

        let mut journal = Journal::new();
        let outcome = {
            let topology = &self.topology;
            let store = &mut self.store;
            let expand_hook = self.expand_hook.as_deref();
            let mut handle = Handle::new(topology, store, &mut journal, expand_hook);
            pipeline::admit(&mut handle, self.overcommit_hook.as_deref(), req)
        };

        match outcome {
            Ok(()) => {
                self.version += 1;
                gc_empty_zones(&mut self.store);
                self.self_check()?;
                let final_zone = *journal.updates.get(&id).expect("admitted request in updates");
                let mut updates = journal.updates;
                updates.remove(&id);
                Ok((final_zone, updates))
            }
            Err(e) => {
                revert(&mut self.store, &self.topology, &journal);
                self.self_check()?;
                Err(e)
            }
        }
    }

    /// Publishes a previously issued [`Offer`]. Fails with
    /// [`MemError::ExpiredOffer`] if any mutation has occurred since the
    /// offer was issued.
    pub fn commit(&mut self, offer: Offer) -> Result<(NodeMask, HashMap<String, NodeMask>)> {
        if offer.version != self.version {
            return Err(MemError::ExpiredOffer);
        }

        let new_id = offer.new_request.as_ref().map(|r| r.id.clone());
        for rid in offer.updates.keys() {
            let is_new = new_id.as_deref() == Some(rid.as_str());
            if is_new {
                if self.store.requests.contains_key(rid) {
                    return Err(MemError::AlreadyExists(rid.clone()));
                }
            } else if !self.store.requests.contains_key(rid) {
                return Err(MemError::UnknownRequest(rid.clone()));
            }
        }

        if let Some(new_req) = &offer.new_request {
            let mut req = new_req.clone();
            req.zone = NodeMask::EMPTY;
            self.store.requests.insert(req.id.clone(), req);
        }
        for (rid, &zone) in &offer.updates {
            set_zone(&mut self.store, &self.topology, rid, zone);
        }

        self.version += 1;
        gc_empty_zones(&mut self.store);
        self.self_check()?;

        let mut updates = offer.updates;
        if let Some(id) = new_id {
            updates.remove(&id);
        }
        Ok((offer.final_zone, updates))
    }

    /// Monotonically expands an already-admitted request's affinity and/or
    /// type preference. Never shrinks the request's current zone or type
    /// mask; a call that asks for nothing beyond what the request already
    /// has is a no-op and does not advance the version.
    pub fn realloc(&mut self, id: &str, extra_affinity: NodeMask, extra_types: TypeMask) -> Result<NodeMask> {
        if !self.store.requests.contains_key(id) {
            return Err(MemError::UnknownRequest(id.to_string()));
        }

        let mut journal = Journal::new();
        let outcome = {
            let topology = &self.topology;
            let store = &mut self.store;
            let expand_hook = self.expand_hook.as_deref();
            let mut handle = Handle::new(topology, store, &mut journal, expand_hook);
            pipeline::realloc(&mut handle, self.overcommit_hook.as_deref(), id, extra_affinity, extra_types)
        };

        match outcome {
            Ok(zone) => {
                if journal.is_empty() {
                    return Ok(zone);
                }
                self.version += 1;
                gc_empty_zones(&mut self.store);
                self.self_check()?;
                Ok(zone)
            }
            Err(e) => {
                revert(&mut self.store, &self.topology, &journal);
                self.self_check()?;
                Err(e)
            }
        }
    }

    /// Removes a request entirely, freeing its share of every zone it was
    /// part of.
    pub fn release(&mut self, id: &str) -> Result<()> {
        if !self.store.requests.contains_key(id) {
            return Err(MemError::UnknownRequest(id.to_string()));
        }
        set_zone(&mut self.store, &self.topology, id, NodeMask::EMPTY);
        self.store.requests.remove(id);
        self.store.user_index.remove(id);
        self.version += 1;
        gc_empty_zones(&mut self.store);
        self.self_check()?;
        Ok(())
    }

    /// Drops every request and zone, keeping the node topology. Counts as a
    /// mutation: it bumps the version and invalidates outstanding offers.
    pub fn reset(&mut self) {
        self.store = Store::default();
        self.version += 1;
    }

    /// Verifies every structural invariant between the request store, the
    /// zone map, and the user index. Returns [`MemError::InternalError`] on
    /// any violation; a violation here is always a bug, never a caller
    /// error.
    pub fn self_check(&self) -> Result<()> {
        for (id, req) in &self.store.requests {
            if &req.id != id {
                return Err(MemError::InternalError(format!(
                    "request store key {id} does not match request.id {}",
                    req.id
                )));
            }
            if req.zone.is_empty() {
                return Err(MemError::InternalError(format!(
                    "request {id} is admitted but has an empty zone"
                )));
            }
            match self.store.user_index.get(id) {
                Some(&z) if z == req.zone => {}
                _ => {
                    return Err(MemError::InternalError(format!(
                        "user_index entry for {id} disagrees with request.zone"
                    )))
                }
            }
            match self.store.zones.get(&req.zone) {
                Some(z) if z.users.contains(id) => {}
                _ => {
                    return Err(MemError::InternalError(format!(
                        "zone {} does not list {id} as a user",
                        req.zone
                    )))
                }
            }
        }

        if self.store.user_index.len() != self.store.requests.len() {
            return Err(MemError::InternalError(
                "user_index size disagrees with request store size".into(),
            ));
        }

        for (mask, zone) in &self.store.zones {
            if zone.nodes != *mask {
                return Err(MemError::InternalError(format!(
                    "zone map key {mask} disagrees with zone.nodes {}",
                    zone.nodes
                )));
            }
            if zone.is_empty() {
                return Err(MemError::InternalError(format!("empty zone {mask} was not garbage collected")));
            }
            if !self.topology.contains_only_known_nodes(*mask) {
                return Err(MemError::InternalError(format!("zone {mask} references unknown node(s)")));
            }
            for uid in &zone.users {
                match self.store.user_index.get(uid) {
                    Some(&z) if z == *mask => {}
                    _ => {
                        return Err(MemError::InternalError(format!(
                            "zone {mask} user {uid} disagrees with user_index"
                        )))
                    }
                }
                if !self.store.requests.contains_key(uid) {
                    return Err(MemError::InternalError(format!(
                        "zone {mask} user {uid} is missing from the request store"
                    )));
                }
            }
            let expect_types = self.topology.types_of(*mask);
            if zone.types != expect_types {
                return Err(MemError::InternalError(format!("zone {mask} cached types are stale")));
            }
            let expect_capacity = self.topology.capacity_of(*mask);
            if zone.capacity != expect_capacity {
                return Err(MemError::InternalError(format!("zone {mask} cached capacity is stale")));
            }
        }

        Ok(())
    }
}
