use tracing::debug;

use crate::foundation::core::PixelFormat;
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::frame::PlaneBuf;

/// Pool configuration: one live configuration per pool at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Pixel format of pooled buffers.
    pub format: PixelFormat,
    /// Buffer width in pixels.
    pub width: u32,
    /// Buffer height in pixels.
    pub height: u32,
}

/// Allocation and reuse counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers allocated fresh.
    pub allocs: u64,
    /// Buffers served from the free list.
    pub reuses: u64,
    /// Buffers dropped on release (stale generation or retention cap).
    pub drops: u64,
}

/// A CPU buffer checked out of a [`CpuBufferPool`].
///
/// Carries the pool generation it was acquired under; releasing it into a reconfigured pool
/// drops it instead of recycling.
#[derive(Debug)]
pub struct PooledBuf {
    /// The buffer itself. Zeroed at acquire time; the pool makes no other content guarantee.
    pub buf: PlaneBuf,
    pub(crate) generation: u64,
}

/// Recycling allocator for fixed-format, fixed-size CPU buffers.
///
/// Pools are destroyed and rebuilt, never mutated in place: any change of format or dimensions
/// bumps the generation and tears down every retained buffer.
pub struct CpuBufferPool {
    config: Option<PoolConfig>,
    generation: u64,
    free: Vec<PlaneBuf>,
    max_retained: usize,
    stats: PoolStats,
}

impl CpuBufferPool {
    /// Create an unconfigured pool retaining at most `max_retained` free buffers.
    pub fn new(max_retained: usize) -> Self {
        Self {
            config: None,
            generation: 0,
            free: Vec::new(),
            max_retained,
            stats: PoolStats::default(),
        }
    }

    /// Current configuration, if any.
    pub fn config(&self) -> Option<PoolConfig> {
        self.config
    }

    /// Current generation. Bumped on every reconfiguration or invalidation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Counters.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Establish (or re-establish) the pool configuration.
    ///
    /// Idempotent: a matching configuration is a no-op. A differing one tears down every
    /// outstanding free buffer and starts a new generation.
    pub fn configure(&mut self, format: PixelFormat, width: u32, height: u32) -> OverlayResult<()> {
        if width == 0 || height == 0 {
            return Err(OverlayError::resource("pool dimensions must be non-zero"));
        }
        let next = PoolConfig {
            format,
            width,
            height,
        };
        if self.config == Some(next) {
            return Ok(());
        }
        debug!(?next, generation = self.generation + 1, "pool reconfigure");
        self.free.clear();
        self.config = Some(next);
        self.generation += 1;
        Ok(())
    }

    /// Drop every retained buffer and start a new generation, keeping the configuration.
    ///
    /// Used on device change: buffers handed out before the bump are refused at release.
    pub fn invalidate(&mut self) {
        self.free.clear();
        self.generation += 1;
    }

    /// Check a zeroed buffer out of the pool, allocating when the free list is empty.
    ///
    /// Allocation failure is a [`OverlayError::Resource`]: fatal for the current negotiation
    /// step, never silent.
    pub fn acquire(&mut self) -> OverlayResult<PooledBuf> {
        let config = self
            .config
            .ok_or_else(|| OverlayError::resource("pool acquire before configure"))?;
        let buf = match self.free.pop() {
            Some(mut buf) => {
                self.stats.reuses += 1;
                buf.clear();
                buf
            }
            None => {
                self.stats.allocs += 1;
                PlaneBuf::alloc(config.format, config.width, config.height)?
            }
        };
        Ok(PooledBuf {
            buf,
            generation: self.generation,
        })
    }

    /// Return a buffer to the pool. Stale-generation buffers and overflow are dropped.
    pub fn release(&mut self, pooled: PooledBuf) {
        if pooled.generation != self.generation || self.free.len() >= self.max_retained {
            self.stats.drops += 1;
            return;
        }
        self.free.push(pooled.buf);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/pool.rs"]
mod tests;
