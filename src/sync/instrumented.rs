// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A mutex that keeps track of how long it is held.
//!
//! Every critical section is timed. A rolling average above the configured
//! budget is logged, as is any acquisition that has to wait longer than the
//! budget. Waiting never gives up; the warning is the alarm.

use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::warn;

/// Weight of the newest sample in the rolling average.
const AVERAGE_WEIGHT: f64 = 0.1;

/// Minimum time between repeated warnings about the average.
const WARN_INTERVAL: Duration = Duration::from_secs(5);

/// A snapshot of lock timing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LockStats {
    pub acquisitions: u64,
    pub average_hold: Duration,
    pub max_hold: Duration,
    pub last_hold: Duration,
    /// Acquisitions that waited longer than the budget.
    pub slow_acquisitions: u64,
}

#[derive(Default)]
struct HoldStats {
    acquisitions: u64,
    average_nanos: f64,
    max_hold: Duration,
    last_hold: Duration,
    slow_acquisitions: u64,
    last_warning: Option<Instant>,
}

pub struct InstrumentedMutex<T> {
    name: &'static str,
    budget: Duration,
    inner: Mutex<T>,
    stats: Mutex<HoldStats>,
}

impl<T> InstrumentedMutex<T> {
    pub fn new(name: &'static str, value: T, budget: Duration) -> Self {
        Self {
            name,
            budget,
            inner: Mutex::new(value),
            stats: Mutex::new(HoldStats::default()),
        }
    }

    /// Locks the mutex, warning if that takes longer than the budget.
    pub fn lock(&self) -> InstrumentedGuard<'_, T> {
        let guard = match self.inner.try_lock_for(self.budget) {
            Some(guard) => guard,
            None => {
                self.stats.lock().slow_acquisitions += 1;
                warn!(
                    lock = self.name,
                    budget = ?self.budget,
                    "Lock held past its budget, still waiting"
                );
                self.inner.lock()
            }
        };

        InstrumentedGuard {
            guard,
            acquired: Instant::now(),
            owner: self,
        }
    }

    pub fn stats(&self) -> LockStats {
        let stats = self.stats.lock();
        LockStats {
            acquisitions: stats.acquisitions,
            average_hold: Duration::from_nanos(stats.average_nanos as u64),
            max_hold: stats.max_hold,
            last_hold: stats.last_hold,
            slow_acquisitions: stats.slow_acquisitions,
        }
    }

    fn record(&self, held: Duration) {
        let mut stats = self.stats.lock();
        let nanos = held.as_nanos() as f64;
        stats.average_nanos = if stats.acquisitions == 0 {
            nanos
        } else {
            stats.average_nanos * (1.0 - AVERAGE_WEIGHT) + nanos * AVERAGE_WEIGHT
        };
        stats.acquisitions += 1;
        stats.last_hold = held;
        stats.max_hold = stats.max_hold.max(held);

        let average = Duration::from_nanos(stats.average_nanos as u64);
        if average <= self.budget {
            return;
        }
        let now = Instant::now();
        if stats
            .last_warning
            .is_some_and(|last| now.duration_since(last) < WARN_INTERVAL)
        {
            return;
        }
        stats.last_warning = Some(now);
        warn!(
            lock = self.name,
            ?average,
            budget = ?self.budget,
            "Average lock hold time over budget"
        );
    }
}

/// Timed access to the value behind an `InstrumentedMutex`.
pub struct InstrumentedGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    acquired: Instant,
    owner: &'a InstrumentedMutex<T>,
}

impl<T> Deref for InstrumentedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for InstrumentedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for InstrumentedGuard<'_, T> {
    fn drop(&mut self) {
        self.owner.record(self.acquired.elapsed());
    }
}
