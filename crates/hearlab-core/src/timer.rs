//! Cancellable timer scheduling.
//!
//! The scheduler is a wall-clock-based primitive with no internal threads -
//! the caller is responsible for calling `tick()` periodically. Scheduling
//! returns a disposable [`TimerHandle`]; dropping an action cancels its
//! handles before any stale callback can fire into it.
//!
//! ## Usage
//!
//! ```ignore
//! let mut scheduler = Scheduler::new(clock);
//! let handle = scheduler.schedule(42, TimerTag::AutoAdvance);
//! // In a loop:
//! for tag in scheduler.tick() { /* react */ }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic clock seam. Production code uses [`SystemTimeSource`]; tests
/// drive [`StubTimeSource`] by hand so timing assertions are deterministic.
pub trait TimeSource: fmt::Debug + Send + Sync {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}

/// High-resolution monotonic clock backed by `std::time::Instant`.
#[derive(Debug)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct StubTimeSource {
    now: AtomicU64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for StubTimeSource {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// What a timer means to the session when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTag {
    /// Submit the current action with TIMEOUT answers.
    AutoAdvance,
    /// Deferred playback-finished signal (`timeout_after_playback`).
    PlaybackTimeout,
    /// The action's response deadline elapsed.
    ResponseDeadline,
}

/// Handle for a scheduled timer; pass back to [`Scheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Pending {
    id: u64,
    due_ms: u64,
    tag: TimerTag,
}

/// One-shot timer scheduler driven by the caller's tick loop.
#[derive(Debug)]
pub struct Scheduler {
    clock: Arc<dyn TimeSource>,
    next_id: u64,
    pending: Vec<Pending>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    /// Schedule `tag` to fire `delay_ms` from now.
    pub fn schedule(&mut self, delay_ms: u64, tag: TimerTag) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(Pending {
            id,
            due_ms: self.clock.now_ms().saturating_add(delay_ms),
            tag,
        });
        TimerHandle(id)
    }

    /// Cancel a single timer. Returns whether it was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != handle.0);
        self.pending.len() != before
    }

    /// Cancel every pending timer carrying `tag`.
    pub fn cancel_tag(&mut self, tag: TimerTag) {
        self.pending.retain(|p| p.tag != tag);
    }

    /// Cancel everything. Called when an action is deactivated.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.iter().any(|p| p.id == handle.0)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Fire every timer that has come due, in due order.
    pub fn tick(&mut self) -> Vec<TimerTag> {
        let now = self.clock.now_ms();
        let mut fired: Vec<Pending> = Vec::new();
        let mut remaining = Vec::with_capacity(self.pending.len());
        for p in self.pending.drain(..) {
            if p.due_ms <= now {
                fired.push(p);
            } else {
                remaining.push(p);
            }
        }
        self.pending = remaining;
        fired.sort_by_key(|p| (p.due_ms, p.id));
        fired.into_iter().map(|p| p.tag).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<StubTimeSource>, Scheduler) {
        let clock = Arc::new(StubTimeSource::new());
        let scheduler = Scheduler::new(clock.clone() as Arc<dyn TimeSource>);
        (clock, scheduler)
    }

    #[test]
    fn fires_only_after_delay() {
        let (clock, mut scheduler) = setup();
        scheduler.schedule(100, TimerTag::AutoAdvance);

        assert!(scheduler.tick().is_empty());
        clock.advance(99);
        assert!(scheduler.tick().is_empty());
        clock.advance(1);
        assert_eq!(scheduler.tick(), vec![TimerTag::AutoAdvance]);
        // One-shot: never fires twice.
        clock.advance(1000);
        assert!(scheduler.tick().is_empty());
    }

    #[test]
    fn cancel_prevents_firing() {
        let (clock, mut scheduler) = setup();
        let handle = scheduler.schedule(50, TimerTag::PlaybackTimeout);
        assert!(scheduler.is_pending(handle));
        assert!(scheduler.cancel(handle));
        clock.advance(100);
        assert!(scheduler.tick().is_empty());
        assert!(!scheduler.cancel(handle));
    }

    #[test]
    fn clear_drops_all_pending() {
        let (clock, mut scheduler) = setup();
        scheduler.schedule(10, TimerTag::AutoAdvance);
        scheduler.schedule(20, TimerTag::ResponseDeadline);
        assert_eq!(scheduler.pending_count(), 2);
        scheduler.clear();
        clock.advance(100);
        assert!(scheduler.tick().is_empty());
    }

    #[test]
    fn fires_in_due_order() {
        let (clock, mut scheduler) = setup();
        scheduler.schedule(30, TimerTag::AutoAdvance);
        scheduler.schedule(10, TimerTag::PlaybackTimeout);
        clock.advance(30);
        assert_eq!(
            scheduler.tick(),
            vec![TimerTag::PlaybackTimeout, TimerTag::AutoAdvance]
        );
    }

    #[test]
    fn cancel_tag_is_selective() {
        let (clock, mut scheduler) = setup();
        scheduler.schedule(10, TimerTag::AutoAdvance);
        scheduler.schedule(10, TimerTag::ResponseDeadline);
        scheduler.cancel_tag(TimerTag::AutoAdvance);
        clock.advance(10);
        assert_eq!(scheduler.tick(), vec![TimerTag::ResponseDeadline]);
    }
}
