// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Binary semaphore over an unnamed POSIX `sem_t`. The release side is
// async-signal-safe, which is what lets the interval-timer tick handler wake
// the sequencer without touching any lock.

use std::cell::UnsafeCell;
use std::io;
use std::time::Duration;

/// A process-private binary semaphore.
///
/// `release` saturates the count at one: a release against an already
/// released semaphore is a no-op, so a slow consumer never accumulates a
/// backlog of wakes; the overrun shows up in its timing ring instead.
///
/// `release` only calls `sem_getvalue` and `sem_post`, both on the
/// async-signal-safe list (signal-safety(7)), so it may be called from a
/// signal handler. The saturation check is not atomic with the post; that is
/// fine under the single-releaser discipline every user of this type follows
/// (one sequencer thread per service gate, one timer handler per tick gate).
pub struct BinarySemaphore {
    // Boxed so the sem_t address stays stable for the lifetime of the
    // semaphore; the kernel keeps pointers into it.
    sem: Box<UnsafeCell<libc::sem_t>>,
}

// Safety: sem_t is the kernel's thread-shared primitive; all access goes
// through sem_* calls.
unsafe impl Send for BinarySemaphore {}
unsafe impl Sync for BinarySemaphore {}

impl BinarySemaphore {
    /// Create a semaphore, optionally already released.
    pub fn new(initially_released: bool) -> io::Result<Self> {
        let sem: Box<UnsafeCell<libc::sem_t>> =
            Box::new(UnsafeCell::new(unsafe { std::mem::zeroed() }));
        let ret =
            unsafe { libc::sem_init(sem.get(), 0, initially_released as libc::c_uint) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { sem })
    }

    fn ptr(&self) -> *mut libc::sem_t {
        self.sem.get()
    }

    /// Make the semaphore available, saturating at one pending wake.
    /// Async-signal-safe; infallible by construction (the only `sem_post`
    /// failure mode is counter overflow, which saturation rules out).
    pub fn release(&self) {
        let mut value: libc::c_int = 0;
        unsafe {
            if libc::sem_getvalue(self.ptr(), &mut value) == 0 && value > 0 {
                return;
            }
            libc::sem_post(self.ptr());
        }
    }

    /// Take the semaphore if it is available right now.
    pub fn try_acquire(&self) -> bool {
        unsafe { libc::sem_trywait(self.ptr()) == 0 }
    }

    /// Block until released or until `timeout` elapses.
    /// Returns `Ok(true)` if acquired, `Ok(false)` on timeout.
    pub fn acquire_timeout(&self, timeout: Duration) -> io::Result<bool> {
        // sem_timedwait takes an absolute CLOCK_REALTIME deadline.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
        let ns_total = ts.tv_nsec as u64 + u64::from(timeout.subsec_nanos());
        ts.tv_sec +=
            timeout.as_secs() as libc::time_t + (ns_total / 1_000_000_000) as libc::time_t;
        ts.tv_nsec = (ns_total % 1_000_000_000) as libc::c_long;

        loop {
            let ret = unsafe { libc::sem_timedwait(self.ptr(), &ts) };
            if ret == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ETIMEDOUT) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => return Err(err),
            }
        }
    }
}

impl Drop for BinarySemaphore {
    fn drop(&mut self) {
        unsafe { libc::sem_destroy(self.ptr()) };
    }
}
