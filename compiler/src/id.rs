// id.rs — Stable handles for operations and resource instances
//
// Operations live in a per-block arena and are addressed by `OpId`, the index
// of the operation in allocation order. Handles never move: rewrites append
// new operations and redirect operand edges instead of splicing pointers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of an operation inside its block's arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OpId(pub u32);

impl OpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Identifies a hardware unit type within one block's resource pool.
/// Assigned in order of first appearance during inventory setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// A concrete resource instance: (unit type, instance number within the type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub type_id: TypeId,
    pub instance: u32,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}#{}", self.type_id.0, self.instance)
    }
}

/// Allocator for operation handles. Produces monotonically increasing IDs
/// in allocation order, so arena indices and handles always agree.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_op: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume allocation after `count` already-allocated operations.
    pub fn starting_at(count: usize) -> Self {
        IdAllocator {
            next_op: count as u32,
        }
    }

    pub fn alloc_op(&mut self) -> OpId {
        let id = OpId(self.next_op);
        self.next_op += 1;
        id
    }

    pub fn allocated(&self) -> usize {
        self.next_op as usize
    }
}
