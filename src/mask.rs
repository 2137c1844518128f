//! Bitset views over node ids and memory types.
//!
//! [`NodeMask`] caps at 64 distinct node ids (`0..=63`) because it is backed
//! by a single `u64`. A system with more NUMA nodes would need a wider
//! bitset; this module is the only place that cap would need to widen.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MemError;

/// Highest node id a [`NodeMask`] can represent.
pub const MAX_NODE_ID: u8 = 63;

/// A bitset of NUMA node ids, in the range `0..=63`.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeMask(u64);

impl NodeMask {
    pub const EMPTY: NodeMask = NodeMask(0);

    pub fn new() -> Self {
        Self::EMPTY
    }

    pub fn from_bits(bits: u64) -> Self {
        NodeMask(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn single(id: u8) -> Self {
        let mut m = Self::EMPTY;
        m.insert(id);
        m
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn contains(&self, id: u8) -> bool {
        id <= MAX_NODE_ID && self.0 & (1u64 << id) != 0
    }

    pub fn insert(&mut self, id: u8) {
        if id <= MAX_NODE_ID {
            self.0 |= 1u64 << id;
        }
    }

    pub fn remove(&mut self, id: u8) {
        if id <= MAX_NODE_ID {
            self.0 &= !(1u64 << id);
        }
    }

    pub fn union(&self, other: &NodeMask) -> NodeMask {
        NodeMask(self.0 | other.0)
    }

    pub fn intersection(&self, other: &NodeMask) -> NodeMask {
        NodeMask(self.0 & other.0)
    }

    /// `self \ other`.
    pub fn difference(&self, other: &NodeMask) -> NodeMask {
        NodeMask(self.0 & !other.0)
    }

    pub fn intersects(&self, other: &NodeMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_subset(&self, other: &NodeMask) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn iter(&self) -> NodeMaskIter {
        NodeMaskIter { bits: self.0 }
    }

    /// Canonical `memset`-style form: comma-separated ids with `a-b` run
    /// folding, e.g. `0-3,5,7`.
    pub fn memset_string(&self) -> String {
        let ids: Vec<u8> = self.iter().collect();
        let mut out = Vec::new();
        let mut i = 0;
        while i < ids.len() {
            let start = ids[i];
            let mut end = start;
            while i + 1 < ids.len() && ids[i + 1] == end + 1 {
                end = ids[i + 1];
                i += 1;
            }
            if start == end {
                out.push(start.to_string());
            } else if end == start + 1 {
                out.push(start.to_string());
                out.push(end.to_string());
            } else {
                out.push(format!("{}-{}", start, end));
            }
            i += 1;
        }
        out.join(",")
    }

    pub fn parse(s: &str) -> Result<NodeMask, MemError> {
        let mut mask = NodeMask::EMPTY;
        let s = s.trim();
        if s.is_empty() {
            return Ok(mask);
        }
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let minmax: Vec<&str> = part.splitn(2, '-').collect();
            match minmax.len() {
                1 => {
                    let id = parse_id(minmax[0])?;
                    mask.insert(id);
                }
                2 => {
                    let lo = parse_id(minmax[0])?;
                    let hi = parse_id(minmax[1])?;
                    if lo > hi {
                        return Err(MemError::InvalidNodeMask(format!(
                            "descending range {}-{}",
                            lo, hi
                        )));
                    }
                    for id in lo..=hi {
                        mask.insert(id);
                    }
                }
                _ => unreachable!("splitn(2, ...) yields at most 2 parts"),
            }
        }
        Ok(mask)
    }
}

fn parse_id(s: &str) -> Result<u8, MemError> {
    s.parse::<u8>()
        .map_err(|_| MemError::InvalidNodeMask(format!("not a node id: {s:?}")))
        .and_then(|id| {
            if id > MAX_NODE_ID {
                Err(MemError::InvalidNodeMask(format!(
                    "node id {id} exceeds cap of {MAX_NODE_ID}"
                )))
            } else {
                Ok(id)
            }
        })
}

pub struct NodeMaskIter {
    bits: u64,
}

impl Iterator for NodeMaskIter {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.bits == 0 {
            return None;
        }
        let id = self.bits.trailing_zeros() as u8;
        self.bits &= self.bits - 1;
        Some(id)
    }
}

impl fmt::Display for NodeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.memset_string())
    }
}

impl fmt::Debug for NodeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeMask({})", self.memset_string())
    }
}

impl FromStr for NodeMask {
    type Err = MemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeMask::parse(s)
    }
}

impl std::ops::BitOr for NodeMask {
    type Output = NodeMask;
    fn bitor(self, rhs: NodeMask) -> NodeMask {
        self.union(&rhs)
    }
}

impl std::ops::BitAnd for NodeMask {
    type Output = NodeMask;
    fn bitand(self, rhs: NodeMask) -> NodeMask {
        self.intersection(&rhs)
    }
}

impl FromIterator<u8> for NodeMask {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut mask = NodeMask::EMPTY;
        for id in iter {
            mask.insert(id);
        }
        mask
    }
}

/// One of the three memory types the allocator models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryType {
    Dram,
    Pmem,
    Hbm,
}

impl MemoryType {
    pub const ALL: [MemoryType; 3] = [MemoryType::Dram, MemoryType::Pmem, MemoryType::Hbm];

    pub fn bit(&self) -> u8 {
        match self {
            MemoryType::Dram => 1 << 0,
            MemoryType::Pmem => 1 << 1,
            MemoryType::Hbm => 1 << 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Dram => "DRAM",
            MemoryType::Pmem => "PMEM",
            MemoryType::Hbm => "HBM",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = MemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAM" => Ok(MemoryType::Dram),
            "PMEM" => Ok(MemoryType::Pmem),
            "HBM" => Ok(MemoryType::Hbm),
            other => Err(MemError::InvalidType(other.to_string())),
        }
    }
}

/// A bitset over the three known [`MemoryType`]s.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeMask(u8);

impl TypeMask {
    pub const EMPTY: TypeMask = TypeMask(0);
    pub const ALL: TypeMask = TypeMask(0b111);

    pub fn new() -> Self {
        Self::EMPTY
    }

    pub fn from_bits(bits: u8) -> Self {
        TypeMask(bits & 0b111)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn single(t: MemoryType) -> Self {
        TypeMask(t.bit())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, t: MemoryType) -> bool {
        self.0 & t.bit() != 0
    }

    pub fn insert(&mut self, t: MemoryType) {
        self.0 |= t.bit();
    }

    pub fn union(&self, other: &TypeMask) -> TypeMask {
        TypeMask(self.0 | other.0)
    }

    pub fn intersection(&self, other: &TypeMask) -> TypeMask {
        TypeMask(self.0 & other.0)
    }

    pub fn difference(&self, other: &TypeMask) -> TypeMask {
        TypeMask(self.0 & !other.0)
    }

    pub fn is_subset(&self, other: &TypeMask) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = MemoryType> + '_ {
        MemoryType::ALL.into_iter().filter(move |t| self.contains(*t))
    }

    pub fn parse(s: &str) -> Result<TypeMask, MemError> {
        let mut mask = TypeMask::EMPTY;
        let s = s.trim();
        if s.is_empty() {
            return Ok(mask);
        }
        for part in s.split(',') {
            mask.insert(part.parse::<MemoryType>()?);
        }
        Ok(mask)
    }

    /// All `2^3` subsets of `{DRAM, PMEM, HBM}`, including the empty set.
    pub fn all_subsets() -> impl Iterator<Item = TypeMask> {
        (0u8..8).map(TypeMask::from_bits)
    }
}

impl fmt::Display for TypeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|t| t.as_str()).collect();
        write!(f, "{}", names.join(","))
    }
}

impl fmt::Debug for TypeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeMask({})", self)
    }
}

impl FromStr for TypeMask {
    type Err = MemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeMask::parse(s)
    }
}

impl std::ops::BitOr for TypeMask {
    type Output = TypeMask;
    fn bitor(self, rhs: TypeMask) -> TypeMask {
        self.union(&rhs)
    }
}

/// An opaque set of CPU ids. The allocator only ever tests these for
/// intersection; it never iterates or formats them.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CpuMask(u64);

impl CpuMask {
    pub const EMPTY: CpuMask = CpuMask(0);

    pub fn from_bits(bits: u64) -> Self {
        CpuMask(bits)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn intersects(&self, other: &CpuMask) -> bool {
        self.0 & other.0 != 0
    }
}
