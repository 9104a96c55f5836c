//! Allocation negotiation with the upstream allocator.
//!
//! The surrounding element forwards its allocation queries here; the active backend answers them
//! in place. This replaces the original vfunc/query-object protocol with explicit typed structs.

use crate::foundation::core::{MemoryDomain, PixelFormat};

/// One pool configuration proposed in an allocation answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolProposal {
    /// Memory domain of the proposed pool.
    pub domain: MemoryDomain,
    /// Minimum number of buffers the pool must hold.
    pub min_buffers: u32,
    /// Maximum number of buffers the pool may hold. Zero means unbounded.
    pub max_buffers: u32,
    /// Buffers must be render-target-eligible.
    pub need_render_target: bool,
}

/// An allocation query from the upstream allocator, answered in place.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AllocationQuery {
    /// Requested pixel format.
    pub format: PixelFormat,
    /// Requested buffer width in pixels.
    pub width: u32,
    /// Requested buffer height in pixels.
    pub height: u32,
    /// Buffer count hint from the requester.
    pub min_buffers: u32,
    /// Upper buffer count hint from the requester. Zero means unbounded.
    pub max_buffers: u32,
    /// The requester needs render-target-eligible buffers.
    pub need_render_target: bool,
    /// Pools proposed by responders, in preference order.
    pub pools: Vec<PoolProposal>,
}

impl AllocationQuery {
    /// A query with no proposals yet.
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            min_buffers: 0,
            max_buffers: 0,
            need_render_target: false,
            pools: Vec::new(),
        }
    }

    /// Append a proposal.
    pub fn propose(&mut self, proposal: PoolProposal) {
        self.pools.push(proposal);
    }

    /// The winning proposal, if any responder answered.
    pub fn decided(&self) -> Option<&PoolProposal> {
        self.pools.first()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/alloc.rs"]
mod tests;
