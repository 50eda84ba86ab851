//! Wall-clock sources for lease deadlines.
//!
//! Lease deadlines are absolute Unix timestamps shared between processes, so
//! every participant must read the same kind of clock. The [`TimeSource`]
//! trait lets the lease protocol take that clock as an injected dependency.
//!
//! Use [`SystemTimeSource`] in production and [`SimulatedTimeSource`] (behind
//! the `simulation` feature) in tests that need to step past a deadline
//! without sleeping.
//!
//! # Tiger Style
//!
//! - No `.expect()` or `.unwrap()`; a clock before the epoch reads as 0
//! - Saturating arithmetic when advancing simulated time

#[cfg(feature = "simulation")]
use std::sync::Arc;
#[cfg(feature = "simulation")]
use std::sync::atomic::AtomicU64;
#[cfg(feature = "simulation")]
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Get current Unix timestamp in milliseconds.
///
/// Returns 0 if system time is before UNIX epoch.
#[inline]
pub fn current_time_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

// ============================================================================
// TimeSource Trait
// ============================================================================

/// Source of wall-clock time for lease deadlines.
///
/// # Example
///
/// ```
/// use slotlease_time::{SystemTimeSource, TimeSource};
///
/// fn is_past<T: TimeSource>(clock: &T, deadline_ms: u64) -> bool {
///     clock.now_unix_ms() > deadline_ms
/// }
///
/// assert!(is_past(&SystemTimeSource, 0));
/// ```
pub trait TimeSource: Send + Sync {
    /// Current Unix timestamp in milliseconds.
    fn now_unix_ms(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        (**self).now_unix_ms()
    }
}

// ============================================================================
// SystemTimeSource (Production)
// ============================================================================

/// Production time source backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        current_time_ms()
    }
}

// ============================================================================
// SimulatedTimeSource (Testing)
// ============================================================================

/// Manually driven clock for deterministic tests.
///
/// Clones share the same underlying instant, so a test can hand one copy to a
/// lease manager and keep another to advance time.
///
/// # Example
///
/// ```ignore
/// use slotlease_time::{SimulatedTimeSource, TimeSource};
///
/// let clock = SimulatedTimeSource::new(1_000_000);
/// clock.advance_ms(11_000);
/// assert_eq!(clock.now_unix_ms(), 1_011_000);
/// ```
#[cfg(feature = "simulation")]
#[derive(Debug, Clone)]
pub struct SimulatedTimeSource {
    current_time_ms: Arc<AtomicU64>,
}

#[cfg(feature = "simulation")]
impl SimulatedTimeSource {
    /// Create a simulated clock starting at the given timestamp.
    pub fn new(initial_time_ms: u64) -> Self {
        Self {
            current_time_ms: Arc::new(AtomicU64::new(initial_time_ms)),
        }
    }

    /// Create a simulated clock starting at the current system time.
    pub fn from_system_time() -> Self {
        Self::new(current_time_ms())
    }

    /// Advance time by the given number of milliseconds.
    pub fn advance_ms(&self, delta_ms: u64) {
        let _ = self
            .current_time_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(now.saturating_add(delta_ms)));
    }

    /// Advance time by the given number of seconds.
    pub fn advance_secs(&self, delta_secs: u64) {
        self.advance_ms(delta_secs.saturating_mul(1000));
    }

    /// Set the current time to a specific value.
    pub fn set_ms(&self, time_ms: u64) {
        self.current_time_ms.store(time_ms, Ordering::SeqCst);
    }
}

#[cfg(feature = "simulation")]
impl Default for SimulatedTimeSource {
    fn default() -> Self {
        Self::from_system_time()
    }
}

#[cfg(feature = "simulation")]
impl TimeSource for SimulatedTimeSource {
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        self.current_time_ms.load(Ordering::SeqCst)
    }
}


#[cfg(all(test, feature = "simulation"))]
mod simulation_tests {
    use super::*;

    #[test]
    fn simulated_time_advance() {
        let clock = SimulatedTimeSource::new(1_000_000);
        clock.advance_ms(500);
        assert_eq!(clock.now_unix_ms(), 1_000_500);
        clock.advance_secs(2);
        assert_eq!(clock.now_unix_ms(), 1_002_500);
    }

    #[test]
    fn simulated_time_clone_shares_state() {
        let clock = SimulatedTimeSource::new(1_000_000);
        let other = clock.clone();
        clock.set_ms(5_000);
        assert_eq!(other.now_unix_ms(), 5_000);
    }

    #[test]
    fn simulated_time_advance_saturates() {
        let clock = SimulatedTimeSource::new(u64::MAX - 100);
        clock.advance_ms(200);
        assert_eq!(clock.now_unix_ms(), u64::MAX);
    }
}
