// src/resources/pool.rs

//! Process and thread slot accounting shared by all workers.
//!
//! One `Mutex` covers both the capacity check and the reservation, so a
//! request either takes both kinds of slots or neither. Waiters park on a
//! [`Notify`] and are woken on every release.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Slots one job holds while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reservation {
    /// Process slots (MPI ranks).
    pub procs: u32,
    /// Threads per process.
    pub threads_per_proc: u32,
}

impl Reservation {
    pub fn new(procs: u32, threads_per_proc: u32) -> Self {
        Self {
            procs,
            threads_per_proc,
        }
    }

    /// Thread slots taken from the pool: `procs * threads_per_proc`.
    pub fn thread_slots(&self) -> u32 {
        self.procs.saturating_mul(self.threads_per_proc)
    }
}

/// Total slots a pool was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCapacity {
    pub procs: u32,
    pub threads: u32,
}

impl PoolCapacity {
    /// Whether a request could ever be satisfied by this pool.
    pub fn admits(&self, procs: u32, threads: u32) -> bool {
        procs <= self.procs && threads <= self.threads
    }
}

/// Request larger than the pool's total capacity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "request for {procs} process slot(s) and {threads} thread slot(s) exceeds pool capacity \
     ({} / {})", capacity.procs, capacity.threads
)]
pub struct CapacityError {
    pub procs: u32,
    pub threads: u32,
    pub capacity: PoolCapacity,
}

#[derive(Debug)]
struct Slots {
    procs_free: u32,
    threads_free: u32,
    peak_procs: u32,
    peak_threads: u32,
}

/// Counting pool of process slots and thread slots.
#[derive(Debug)]
pub struct ResourcePool {
    capacity: PoolCapacity,
    slots: Mutex<Slots>,
    released: Notify,
}

impl ResourcePool {
    pub fn new(procs: u32, threads: u32) -> Self {
        Self {
            capacity: PoolCapacity { procs, threads },
            slots: Mutex::new(Slots {
                procs_free: procs,
                threads_free: threads,
                peak_procs: 0,
                peak_threads: 0,
            }),
            released: Notify::new(),
        }
    }

    pub fn capacity(&self) -> PoolCapacity {
        self.capacity
    }

    /// Slots currently held, as `(procs, threads)`.
    pub fn in_use(&self) -> (u32, u32) {
        let slots = self.lock();
        (
            self.capacity.procs - slots.procs_free,
            self.capacity.threads - slots.threads_free,
        )
    }

    /// Highest simultaneous usage seen, as `(procs, threads)`.
    pub fn peak(&self) -> (u32, u32) {
        let slots = self.lock();
        (slots.peak_procs, slots.peak_threads)
    }

    /// Take both kinds of slots if both are available right now.
    pub fn try_acquire(&self, procs: u32, threads: u32) -> bool {
        let mut slots = self.lock();
        if procs > slots.procs_free || threads > slots.threads_free {
            return false;
        }

        slots.procs_free -= procs;
        slots.threads_free -= threads;

        let used_procs = self.capacity.procs - slots.procs_free;
        let used_threads = self.capacity.threads - slots.threads_free;
        slots.peak_procs = slots.peak_procs.max(used_procs);
        slots.peak_threads = slots.peak_threads.max(used_threads);

        trace!(procs, threads, used_procs, used_threads, "slots acquired");
        true
    }

    /// Wait until the slots can be taken.
    ///
    /// Refuses requests the pool could never satisfy instead of waiting
    /// forever.
    pub async fn acquire(&self, procs: u32, threads: u32) -> Result<(), CapacityError> {
        if !self.capacity.admits(procs, threads) {
            return Err(CapacityError {
                procs,
                threads,
                capacity: self.capacity,
            });
        }

        loop {
            // Register interest before checking so a release between the
            // check and the await is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_acquire(procs, threads) {
                return Ok(());
            }

            debug!(procs, threads, "waiting for free slots");
            notified.await;
        }
    }

    /// Return slots to the pool and wake every waiter.
    pub fn release(&self, procs: u32, threads: u32) {
        {
            let mut slots = self.lock();
            slots.procs_free = (slots.procs_free + procs).min(self.capacity.procs);
            slots.threads_free = (slots.threads_free + threads).min(self.capacity.threads);
        }
        trace!(procs, threads, "slots released");
        self.released.notify_waiters();
    }

    /// Acquire slots for a reservation and hold them until the lease drops.
    pub async fn lease(
        self: &Arc<Self>,
        reservation: Reservation,
    ) -> Result<SlotLease, CapacityError> {
        let procs = reservation.procs;
        let threads = reservation.thread_slots();
        self.acquire(procs, threads).await?;
        Ok(SlotLease {
            pool: Arc::clone(self),
            procs,
            threads,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Slots held by one running job. Released on drop.
#[derive(Debug)]
pub struct SlotLease {
    pool: Arc<ResourcePool>,
    procs: u32,
    threads: u32,
}

impl SlotLease {
    pub fn procs(&self) -> u32 {
        self.procs
    }

    pub fn threads(&self) -> u32 {
        self.threads
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.pool.release(self.procs, self.threads);
    }
}
