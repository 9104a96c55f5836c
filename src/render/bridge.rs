//! Wrap/acquire/release protocol for resources bridged between two graphics APIs.
//!
//! A resource native to one API is exposed to the other by wrapping it in a [`Bridged`]. Before
//! the second API may render into it, it must be acquired exclusively, and only while the
//! device-scoped lock is held, so the owning API's internal state cannot be concurrently
//! mutated. Releasing happens on every exit path: the acquisition is a borrow, and dropping it
//! is the release. Copying out of the resource again requires `&mut Bridged`, which the borrow
//! checker refuses while an acquisition is alive, so acquire-before-draw and release-before-copy
//! are not violable through this module's API at all.

use std::sync::MutexGuard;

/// Counters exposed for verification; the protocol itself is enforced by borrows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Completed acquire/release cycles.
    pub acquires: u64,
    /// Releases observed (always equal to `acquires` once no acquisition is alive).
    pub releases: u64,
}

/// A resource wrapped for cross-API use.
pub struct Bridged<T> {
    inner: T,
    stats: BridgeStats,
}

impl<T> Bridged<T> {
    /// Wrap a native resource. The bridge owns it until [`Bridged::unwrap`].
    pub fn wrap(inner: T) -> Self {
        Self {
            inner,
            stats: BridgeStats::default(),
        }
    }

    /// Acquire the resource for the foreign API.
    ///
    /// Requires the device-scoped lock guard as a witness; the acquisition cannot outlive it.
    pub fn acquire<'a>(&'a mut self, _device_lock: &'a MutexGuard<'_, ()>) -> Acquired<'a, T> {
        self.stats.acquires += 1;
        Acquired { bridge: self }
    }

    /// Access the native resource. Only callable when no acquisition is alive.
    pub fn native(&self) -> &T {
        &self.inner
    }

    /// Mutable access for the native API (e.g. scheduling a copy out). Only callable after
    /// every acquisition has been released.
    pub fn native_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Protocol counters.
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Tear the bridge down and recover the native resource.
    pub fn unwrap(self) -> T {
        self.inner
    }
}

/// Exclusive foreign-API access to a bridged resource. Dropping it is the release.
pub struct Acquired<'a, T> {
    bridge: &'a mut Bridged<T>,
}

impl<T> Acquired<'_, T> {
    /// The resource, as seen by the foreign API.
    pub fn resource_mut(&mut self) -> &mut T {
        &mut self.bridge.inner
    }
}

impl<T> Drop for Acquired<'_, T> {
    fn drop(&mut self) {
        self.bridge.stats.releases += 1;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/bridge.rs"]
mod tests;
