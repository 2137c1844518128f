//! `libmem`: a topology-aware memory allocator for NUMA node placement.
//!
//! Given a node graph (ids, memory types, distances, capacities), `libmem`
//! tracks a set of allocation [`Request`]s, each pinned to a [`Zone`] — a
//! materialized set of nodes — and keeps every zone's nested usage within
//! its capacity by relocating lower-priority requests when new admissions
//! would overcommit it.
//!
//! The allocator performs no I/O and holds no locks: callers own
//! concurrency control and persistence. Hardware topology discovery is
//! likewise external, supplied through [`SystemTopologyDiscovery`] or built
//! directly from a caller-supplied [`Node`] list.
//!
//! ```no_run
//! use libmem::{Allocator, Request, mask::{NodeMask, TypeMask}};
//!
//! # fn build_nodes() -> Vec<libmem::Node> { vec![] }
//! let mut allocator = Allocator::builder()
//!     .with_nodes(build_nodes())?
//!     .build()?;
//!
//! let (zone, _moved) = allocator.allocate(
//!     Request::builder("pod-a", 4 << 30, NodeMask::single(0)).name("pod-a"),
//! )?;
//! # let _ = zone;
//! # Ok::<(), libmem::MemError>(())
//! ```

mod allocator;
mod error;
mod expand;
mod handle;
mod journal;
mod node;
mod offer;
mod overcommit;
mod pipeline;
mod priority;
pub mod mask;
mod request;
mod size;
mod topology;
mod zone;

pub use allocator::{Allocator, AllocatorBuilder, SystemTopologyDiscovery};
pub use error::{MemError, Result};
pub use handle::{ExpandHook, Handle, OvercommitHook};
pub use node::{Distance, Node};
pub use offer::Offer;
pub use priority::{Priority, QosClass};
pub use request::{
    container, container_with_strict_types, container_with_types, preserved_container, reserved_memory, Request,
    RequestBuilder,
};
pub use size::format_bytes;
pub use topology::{MaskCache, Topology};
pub use zone::Zone;
