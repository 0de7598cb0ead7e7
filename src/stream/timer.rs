//! Restartable one-shot timers for event streams.
//!
//! A [`Timer`] is a shared handle: the stream keeps one clone in its timer
//! queue and the caller keeps another to reschedule or cancel it. All
//! times are relative milliseconds measured on the monotonic clock, so
//! wall-clock adjustments never reorder timers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::StreamError;

/// Priority snapshot of a timer.
///
/// Armed timers order by deadline, soonest first. Every disarmed timer
/// sorts after every armed one, and two disarmed timers compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKey {
    /// Armed, expiring at the given instant.
    Armed(Instant),
    /// Not scheduled.
    Disarmed,
}

/// A restartable, cancellable countdown.
///
/// Created disarmed. [`Timer::schedule`] arms or re-arms it and
/// [`Timer::cancel`] disarms it. An event stream cancels a timer at the
/// moment it yields it, so firing is one-shot; reschedule from the loop
/// body for periodic behaviour:
///
/// ```
/// use zkit::stream::{EventStream, Item, StreamEvent, Timer};
/// use zkit::transport::Interest;
/// use zkit::transport::inproc::Context;
///
/// # fn main() -> Result<(), zkit::error::StreamError> {
/// let mut stream = EventStream::new(Context::new())?;
/// let timer = Timer::new();
/// stream.register(Item::Timer(timer.clone()), Interest::TIMER)?;
/// timer.schedule(5);
/// let StreamEvent::Timer(fired) = stream.next_event()? else {
///     unreachable!();
/// };
/// assert_eq!(fired, timer);
/// assert!(!timer.is_active());
/// # Ok(())
/// # }
/// ```
///
/// Equality and hashing are by identity: two timers with the same deadline
/// are still different timers. Timers are not meant to be shared between
/// threads while registered with a stream; the handle is `Send + Sync` only
/// so a stream can be moved to the thread that drives it.
#[derive(Clone, Default)]
pub struct Timer {
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl Timer {
    /// Creates a new disarmed timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Instant>> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the timer to expire `delay_ms` milliseconds from now.
    ///
    /// Re-scheduling an armed timer replaces its deadline.
    pub fn schedule(&self, delay_ms: u64) {
        let now = Instant::now();
        let deadline = now
            .checked_add(Duration::from_millis(delay_ms))
            .unwrap_or(now + Duration::from_secs(u64::from(u32::MAX)));
        *self.slot() = Some(deadline);
    }

    /// Disarms the timer. Does nothing if it is not armed.
    pub fn cancel(&self) {
        *self.slot() = None;
    }

    /// Returns `true` while the timer is armed, including after expiry
    /// until a stream yields it.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    /// Returns the milliseconds left until expiry.
    ///
    /// Keeps counting into negative values once the deadline has passed
    /// so that expired timers still order correctly.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotScheduled`] if the timer is disarmed.
    pub fn remaining(&self) -> Result<i64, StreamError> {
        let deadline = (*self.slot()).ok_or(StreamError::NotScheduled)?;
        Ok(signed_millis_until(deadline, Instant::now()))
    }

    /// Returns the timer's current priority snapshot.
    #[must_use]
    pub fn key(&self) -> TimerKey {
        match *self.slot() {
            Some(deadline) => TimerKey::Armed(deadline),
            None => TimerKey::Disarmed,
        }
    }

    /// Compares two timers by priority: soonest armed deadline first,
    /// disarmed timers last.
    #[must_use]
    pub fn cmp_priority(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

fn signed_millis_until(deadline: Instant, now: Instant) -> i64 {
    if deadline >= now {
        i64::try_from(deadline.duration_since(now).as_millis()).unwrap_or(i64::MAX)
    } else {
        i64::try_from(now.duration_since(deadline).as_millis())
            .map(|ms| -ms)
            .unwrap_or(i64::MIN)
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.deadline, &other.deadline)
    }
}

impl Eq for Timer {}

impl Hash for Timer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.deadline).hash(state);
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &Arc::as_ptr(&self.deadline))
            .field("remaining_ms", &self.remaining().ok())
            .finish()
    }
}
