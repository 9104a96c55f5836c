use super::*;

use std::cell::Cell;

/// A simulated queue clock: retirement happens when the test says so.
struct TestClock {
    completed: Cell<u64>,
    waits: Cell<u64>,
}

impl TestClock {
    fn new() -> Self {
        Self {
            completed: Cell::new(0),
            waits: Cell::new(0),
        }
    }

    fn retire_to(&self, token: u64) {
        self.completed.set(token);
    }
}

impl FenceClock for TestClock {
    fn completed(&self) -> u64 {
        self.completed.get()
    }

    fn wait(&self, token: FenceToken) -> OverlayResult<()> {
        self.waits.set(self.waits.get() + 1);
        // Waiting on a real queue always makes progress up to the token.
        if self.completed.get() < token.0 {
            self.completed.set(token.0);
        }
        Ok(())
    }
}

#[test]
fn tokens_are_monotonic() {
    let mut ring = InFlightRing::new(4);
    let a = ring.issue();
    let b = ring.issue();
    assert!(b > a);
}

#[test]
fn admit_below_depth_never_waits() {
    let clock = TestClock::new();
    let mut ring = InFlightRing::new(4);
    for _ in 0..4 {
        ring.admit(&clock).unwrap();
        ring.issue();
    }
    assert_eq!(clock.waits.get(), 0);
    assert_eq!(ring.in_flight(), 4);
}

#[test]
fn admit_at_depth_blocks_on_the_oldest() {
    let clock = TestClock::new();
    let mut ring = InFlightRing::new(4);
    let mut tokens = Vec::new();
    for _ in 0..4 {
        ring.admit(&clock).unwrap();
        tokens.push(ring.issue());
    }
    ring.admit(&clock).unwrap();
    assert_eq!(clock.waits.get(), 1);
    // The wait targeted the oldest token; exactly one slot opened.
    assert_eq!(clock.completed.get(), tokens[0].0);
    assert_eq!(ring.in_flight(), 3);
}

#[test]
fn in_flight_never_exceeds_depth() {
    let clock = TestClock::new();
    let mut ring = InFlightRing::new(4);
    for _ in 0..32 {
        ring.admit(&clock).unwrap();
        ring.issue();
        assert!(ring.in_flight() <= 4);
    }
}

#[test]
fn reap_drops_retired_tokens_in_fifo_order() {
    let clock = TestClock::new();
    let mut ring = InFlightRing::new(8);
    let tokens: Vec<_> = (0..5).map(|_| ring.issue()).collect();
    clock.retire_to(tokens[2].0);
    ring.reap(&clock);
    assert_eq!(ring.in_flight(), 2);
}

#[test]
fn zero_depth_is_clamped_to_one() {
    let clock = TestClock::new();
    let mut ring = InFlightRing::new(0);
    ring.admit(&clock).unwrap();
    ring.issue();
    ring.admit(&clock).unwrap();
    assert_eq!(clock.waits.get(), 1);
}

#[test]
fn drain_retires_everything() {
    let clock = TestClock::new();
    let mut ring = InFlightRing::new(4);
    for _ in 0..3 {
        ring.issue();
    }
    ring.drain(&clock).unwrap();
    assert_eq!(ring.in_flight(), 0);
}

#[test]
fn write_fence_settle_waits_only_when_tagged() {
    let clock = TestClock::new();
    let mut fence = WriteFence::default();
    fence.settle(&clock).unwrap();
    assert_eq!(clock.waits.get(), 0);

    fence.tag(FenceToken(7));
    fence.settle(&clock).unwrap();
    assert_eq!(clock.waits.get(), 1);
    assert!(clock.completed.get() >= 7);

    // The tag is consumed by settling.
    fence.settle(&clock).unwrap();
    assert_eq!(clock.waits.get(), 1);
}

#[test]
fn write_fence_skips_wait_for_already_retired_writes() {
    let clock = TestClock::new();
    clock.retire_to(10);
    let mut fence = WriteFence::default();
    fence.tag(FenceToken(3));
    fence.settle(&clock).unwrap();
    assert_eq!(clock.waits.get(), 0);
}
