//! Bounded-depth fence tracking for asynchronous GPU work.
//!
//! Every submission is tagged with a monotonically increasing [`FenceToken`] scoped to one
//! command queue. The [`InFlightRing`] keeps the unretired tokens in submission order and blocks
//! the producer when the configured depth is reached, which caps resource growth when frames
//! arrive faster than the device retires work.

use smallvec::SmallVec;
use tracing::trace;

use crate::foundation::error::OverlayResult;

/// Default bound on unretired submissions.
pub const DEFAULT_ASYNC_DEPTH: usize = 4;

/// Monotonically increasing submission marker scoped to one queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceToken(pub u64);

/// Observes fence progress on a queue.
///
/// The GPU backends implement this over the device's completion signal; tests drive a simulated
/// clock.
pub trait FenceClock {
    /// Highest token value the queue has retired.
    fn completed(&self) -> u64;

    /// Block until `token` has retired.
    fn wait(&self, token: FenceToken) -> OverlayResult<()>;
}

/// FIFO ring of unretired fence tokens with a fixed depth bound.
pub struct InFlightRing {
    depth: usize,
    next: u64,
    pending: SmallVec<[FenceToken; DEFAULT_ASYNC_DEPTH]>,
}

impl InFlightRing {
    /// Create a ring admitting at most `depth` unretired submissions. A depth of zero is
    /// treated as one.
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            next: 1,
            pending: SmallVec::new(),
        }
    }

    /// Number of tokens not yet observed as retired.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Drop tokens the clock has already retired.
    pub fn reap(&mut self, clock: &dyn FenceClock) {
        let completed = clock.completed();
        while let Some(first) = self.pending.first() {
            if first.0 > completed {
                break;
            }
            self.pending.remove(0);
        }
    }

    /// Make room for one more submission, blocking on the oldest pending token when full.
    ///
    /// Retirement is FIFO per queue, so waiting on the oldest token is sufficient.
    pub fn admit(&mut self, clock: &dyn FenceClock) -> OverlayResult<()> {
        self.reap(clock);
        while self.pending.len() >= self.depth {
            let oldest = self.pending[0];
            trace!(token = oldest.0, "fence ring full, waiting");
            clock.wait(oldest)?;
            self.reap(clock);
            if let Some(first) = self.pending.first()
                && *first == oldest
            {
                // The clock reported the wait complete but `completed()` lagged; trust the wait.
                self.pending.remove(0);
            }
        }
        Ok(())
    }

    /// Issue the token for the submission that is about to happen.
    pub fn issue(&mut self) -> FenceToken {
        let token = FenceToken(self.next);
        self.next += 1;
        self.pending.push(token);
        token
    }

    /// Wait out every pending token. Used at teardown and before a destructive rebuild.
    pub fn drain(&mut self, clock: &dyn FenceClock) -> OverlayResult<()> {
        while let Some(&oldest) = self.pending.first() {
            clock.wait(oldest)?;
            self.reap(clock);
            if self.pending.first() == Some(&oldest) {
                self.pending.remove(0);
            }
        }
        Ok(())
    }
}

/// Fence tag of the last GPU write into a buffer.
///
/// Any CPU-side read (and any pool reuse) must wait this tag out first; that wait is the
/// happens-before edge between the producing write and the consuming read.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteFence(pub Option<FenceToken>);

impl WriteFence {
    /// Record `token` as the most recent write.
    pub fn tag(&mut self, token: FenceToken) {
        self.0 = Some(token);
    }

    /// Wait until the tagged write has retired, then clear the tag.
    pub fn settle(&mut self, clock: &dyn FenceClock) -> OverlayResult<()> {
        if let Some(token) = self.0.take() {
            if token.0 > clock.completed() {
                clock.wait(token)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/sync.rs"]
mod tests;
