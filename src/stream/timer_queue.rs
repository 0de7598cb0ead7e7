//! Priority queue of timers registered with a stream.
//!
//! Callers reschedule and cancel timers through their own handles, so the
//! queue can not keep a heap ordered incrementally. Instead every query
//! takes a fresh [`TimerKey`] snapshot of each timer and selects the
//! minimum, which is linear in the number of registered timers. Ties go to
//! the timer registered first.

use super::timer::{Timer, TimerKey};

/// Timers registered with one stream, each present at most once.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    timers: Vec<Timer>,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, timer: &Timer) -> bool {
        self.timers.contains(timer)
    }

    /// Adds a timer. Returns `false` if it was already present.
    pub(crate) fn insert(&mut self, timer: Timer) -> bool {
        if self.contains(&timer) {
            return false;
        }
        self.timers.push(timer);
        true
    }

    /// Removes a timer. Returns `false` if it was not present.
    pub(crate) fn remove(&mut self, timer: &Timer) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t != timer);
        self.timers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }

    /// The timer that expires soonest, or any disarmed timer if none is
    /// armed.
    fn earliest(&self) -> Option<(&Timer, TimerKey)> {
        self.timers
            .iter()
            .map(|timer| (timer, timer.key()))
            .min_by_key(|(_, key)| *key)
    }

    /// Milliseconds until the soonest armed timer expires, clamped at zero.
    /// `None` when no timer is armed.
    pub(crate) fn next_delay(&self) -> Option<u64> {
        let (timer, key) = self.earliest()?;
        if key == TimerKey::Disarmed {
            return None;
        }
        let remaining = timer.remaining().ok()?;
        Some(u64::try_from(remaining.max(0)).unwrap_or(0))
    }

    /// Returns `true` if the soonest armed timer has reached its deadline.
    pub(crate) fn has_expired(&self) -> bool {
        self.next_delay() == Some(0)
    }

    /// Takes the soonest timer if it has expired, disarming it.
    ///
    /// The timer stays registered so the caller can simply reschedule it.
    pub(crate) fn pop_expired(&mut self) -> Option<Timer> {
        if !self.has_expired() {
            return None;
        }
        let (timer, _) = self.earliest()?;
        let timer = timer.clone();
        timer.cancel();
        Some(timer)
    }
}
