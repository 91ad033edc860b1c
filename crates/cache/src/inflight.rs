//! In-flight decode tracking
//!
//! At most one decode runs per cache key. The first requester becomes the
//! owner of a [`Flight`]; everyone arriving while it is outstanding joins as a
//! waiter and blocks until the owner settles it with a shared result.
//!
//! An owner that goes away without settling (its decode panicked) abandons
//! the flight: the key is unregistered and waiters wake empty-handed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::CacheKey;

enum Slot<T> {
    Pending,
    Settled(T),
    Abandoned,
}

/// One outstanding decode and the slot its result lands in
pub struct Flight<T> {
    slot: Mutex<Slot<T>>,
    cv: Condvar,
    waiters: AtomicUsize,
}

impl<T: Clone> Flight<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            cv: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Number of requesters that joined this flight besides its owner
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    fn finish(&self, slot: Slot<T>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = slot;
        self.cv.notify_all();
    }

    /// Block until the owner settles the flight
    ///
    /// Returns `None` if the owner abandoned it.
    pub fn wait(&self) -> Option<T> {
        let mut guard = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*guard {
                Slot::Pending => {}
                Slot::Settled(result) => return Some(result.clone()),
                Slot::Abandoned => return None,
            }
            guard = self.cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// The owner's side of a flight
///
/// Dropping it without calling [`FlightOwner::settle_with`] abandons the
/// flight.
pub struct FlightOwner<'a, T: Clone> {
    tracker: &'a InflightTracker<T>,
    key: CacheKey,
    flight: Arc<Flight<T>>,
    settled: bool,
}

impl<T: Clone> FlightOwner<'_, T> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn waiters(&self) -> usize {
        self.flight.waiters()
    }

    /// Unregister the flight and wake its waiters with the result of `settle`
    ///
    /// `settle` runs with the flight map locked and receives the final waiter
    /// count.
    pub fn settle_with<F>(mut self, settle: F) -> T
    where
        F: FnOnce(usize) -> T,
    {
        let result = {
            let mut flights = self.tracker.lock();
            flights.remove(&self.key);
            settle(self.flight.waiters())
        };
        self.flight.finish(Slot::Settled(result.clone()));
        self.settled = true;
        result
    }
}

impl<T: Clone> Drop for FlightOwner<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        log::warn!(
            "decode of {} abandoned with {} waiters",
            self.key,
            self.flight.waiters()
        );
        {
            let mut flights = self.tracker.lock();
            if flights
                .get(&self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.flight))
            {
                flights.remove(&self.key);
            }
        }
        self.flight.finish(Slot::Abandoned);
    }
}

/// Role of a requester after joining
pub enum Join<'a, T: Clone> {
    /// No decode was running; the caller must run it and settle the flight
    Owner(FlightOwner<'a, T>),
    /// A decode is already running; the caller waits on it
    Waiter(Arc<Flight<T>>),
}

pub(crate) type FlightMap<T> = HashMap<CacheKey, Arc<Flight<T>>>;

/// Deduplicates concurrent decode requests per [`CacheKey`]
pub struct InflightTracker<T> {
    flights: Mutex<FlightMap<T>>,
}

impl<T: Clone> InflightTracker<T> {
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, FlightMap<T>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if a decode for `key` is outstanding
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of outstanding decodes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Become the owner of a new flight for `key`, or join the existing one
    ///
    /// `flights` is this tracker's map, already locked by the caller. Waiter
    /// counts only change while the map lock is held, so once a flight is
    /// removed under that lock its count is final.
    pub(crate) fn join_locked(&self, flights: &mut FlightMap<T>, key: &CacheKey) -> Join<'_, T> {
        if let Some(existing) = flights.get(key) {
            existing.waiters.fetch_add(1, Ordering::AcqRel);
            return Join::Waiter(Arc::clone(existing));
        }

        let flight = Arc::new(Flight::new());
        flights.insert(key.clone(), Arc::clone(&flight));
        Join::Owner(FlightOwner {
            tracker: self,
            key: key.clone(),
            flight,
            settled: false,
        })
    }
}

impl<T: Clone> Default for InflightTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}
