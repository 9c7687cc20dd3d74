/*! Time structures.

 - [Instant] is an absolute point in time, in milliseconds.
 - [Duration] is relative time, re-exported from `core`.
 - [Clock] is the time source the blocking loops poll, together with the
   cooperative yield they perform between polls.
*/
use core::{fmt, ops};

pub use core::time::Duration;

/// A representation of an absolute time value.
///
/// The `Instant` type wraps an `i64` number of milliseconds, monotonically
/// increasing since an arbitrary moment in time, such as system startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant {
    millis: i64,
}

impl Instant {
    pub const ZERO: Instant = Instant::from_millis_const(0);

    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant {
            millis: millis.into(),
        }
    }

    pub const fn from_millis_const(millis: i64) -> Instant {
        Instant { millis }
    }

    /// Create a new `Instant` from a number of seconds.
    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant {
            millis: secs.into() * 1000,
        }
    }

    /// The fractional number of milliseconds past the last whole second.
    pub const fn millis(&self) -> i64 {
        self.millis % 1000
    }

    /// The number of whole seconds since the beginning of time.
    pub const fn secs(&self) -> i64 {
        self.millis / 1000
    }

    /// The total number of milliseconds since the beginning of time.
    pub const fn total_millis(&self) -> i64 {
        self.millis
    }

    /// Time passed from `earlier` to `self`, saturating at zero.
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        let millis = self.millis.saturating_sub(earlier.millis);
        Duration::from_millis(millis.max(0) as u64)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis + rhs.as_millis() as i64)
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.millis += rhs.as_millis() as i64;
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.duration_since(rhs)
    }
}

/// A millisecond time source for the polling loops.
pub trait Clock {
    /// The current time.
    fn now(&self) -> Instant;

    /// Give other cooperative tasks a chance to run.
    ///
    /// Called once per iteration of every busy-wait. The default does nothing.
    fn relax(&self) {}
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn relax(&self) {
        (**self).relax()
    }
}

/// A [Clock] backed by `std::time::Instant`, counting from its creation.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    epoch: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> StdClock {
        StdClock {
            epoch: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.epoch.elapsed().as_millis() as i64)
    }

    fn relax(&self) {
        std::thread::yield_now()
    }
}

/// A clock that moves forward by a fixed step every time it is read.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct TickClock {
    now: core::cell::Cell<i64>,
    step: i64,
}

#[cfg(test)]
impl TickClock {
    pub(crate) fn new(step: i64) -> TickClock {
        TickClock {
            now: core::cell::Cell::new(0),
            step,
        }
    }

    pub(crate) fn advance(&self, millis: i64) {
        self.now.set(self.now.get() + millis);
    }
}

#[cfg(test)]
impl Clock for TickClock {
    fn now(&self) -> Instant {
        let now = self.now.get();
        self.now.set(now + self.step);
        Instant::from_millis(now)
    }
}
