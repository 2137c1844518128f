//! Allocation requests and their builder.

use serde::{Deserialize, Serialize};

use crate::error::MemError;
use crate::mask::{NodeMask, TypeMask};
use crate::priority::{Priority, QosClass};

/// One allocation intention.
///
/// Invariant: while this request is in the allocator's request store,
/// `zone` equals the store's user-index entry for `id`, and the
/// corresponding zone's `users` set contains `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub name: String,
    pub limit: u64,
    pub affinity: NodeMask,
    pub types: TypeMask,
    pub strict: bool,
    pub priority: Priority,
    /// Monotonic tiebreaker assigned by the allocator when the request is
    /// admitted; larger values are younger. Not a wall-clock timestamp, so
    /// test scenarios are reproducible.
    pub created_at: u64,
    /// The zone this request is pinned to. `NodeMask::EMPTY` until assigned.
    pub zone: NodeMask,
}

impl Request {
    pub fn builder(id: impl Into<String>, limit: u64, affinity: NodeMask) -> RequestBuilder {
        RequestBuilder::new(id, limit, affinity)
    }
}

/// Builds a [`Request`] prior to admission. `created_at` and `zone` are
/// filled in by the allocator, not the caller.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    id: String,
    name: Option<String>,
    limit: u64,
    affinity: NodeMask,
    types: TypeMask,
    strict: bool,
    priority: Priority,
}

impl RequestBuilder {
    pub fn new(id: impl Into<String>, limit: u64, affinity: NodeMask) -> Self {
        RequestBuilder {
            id: id.into(),
            name: None,
            limit,
            affinity,
            types: TypeMask::EMPTY,
            strict: false,
            priority: Priority::BURSTABLE,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn qos_class(mut self, class: &str) -> Result<Self, MemError> {
        let class: QosClass = class.parse()?;
        self.priority = class.priority();
        Ok(self)
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Non-strict type preference: present but not mandatory.
    pub fn preferred_types(mut self, types: TypeMask) -> Self {
        self.types = types;
        self.strict = false;
        self
    }

    /// Strict type requirement: mandatory.
    pub fn strict_types(mut self, types: TypeMask) -> Self {
        self.types = types;
        self.strict = true;
        self
    }

    pub fn build(self, created_at: u64) -> Request {
        Request {
            id: self.id,
            name: self.name.unwrap_or_default(),
            limit: self.limit,
            affinity: self.affinity,
            types: self.types,
            strict: self.strict,
            priority: self.priority,
            created_at,
            zone: NodeMask::EMPTY,
        }
    }
}

/// A plain container workload: non-strict, no type preference, `Burstable`
/// priority.
pub fn container(id: impl Into<String>, name: impl Into<String>, limit: u64, affinity: NodeMask) -> RequestBuilder {
    RequestBuilder::new(id, limit, affinity).name(name)
}

/// A container with a non-strict preference for `types`.
pub fn container_with_types(
    id: impl Into<String>,
    name: impl Into<String>,
    limit: u64,
    affinity: NodeMask,
    types: TypeMask,
) -> RequestBuilder {
    RequestBuilder::new(id, limit, affinity)
        .name(name)
        .preferred_types(types)
}

/// A container that strictly requires `types`.
pub fn container_with_strict_types(
    id: impl Into<String>,
    name: impl Into<String>,
    limit: u64,
    affinity: NodeMask,
    types: TypeMask,
) -> RequestBuilder {
    RequestBuilder::new(id, limit, affinity)
        .name(name)
        .strict_types(types)
}

/// A container at `Preserved` priority: relocatable only as a last resort.
pub fn preserved_container(
    id: impl Into<String>,
    name: impl Into<String>,
    limit: u64,
    affinity: NodeMask,
) -> RequestBuilder {
    RequestBuilder::new(id, limit, affinity)
        .name(name)
        .priority(Priority::PRESERVED)
}

/// A memory reservation: `Reservation` priority, never relocated.
pub fn reserved_memory(
    id: impl Into<String>,
    name: impl Into<String>,
    limit: u64,
    affinity: NodeMask,
) -> RequestBuilder {
    RequestBuilder::new(id, limit, affinity)
        .name(name)
        .priority(Priority::RESERVATION)
}
