// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Periodic service runtime: a pinned, priority-elevated worker thread that
// blocks on a binary release gate, runs its body once per release, and
// records release-error and execution-time samples.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::error::FrameError;
use crate::placement::Placement;
use crate::signal::BinarySemaphore;
use crate::stats::StatTracker;

/// Consecutive release misses after which a worker gives up and stops itself.
const MISS_LIMIT: u32 = 100;

/// Samples held per timing ring.
const STAT_CAPACITY: usize = 1000;

/// The body a service runs once per release.
pub trait Periodic: Send {
    fn run_once(&mut self) -> Result<(), FrameError>;
}

impl<F> Periodic for F
where
    F: FnMut() -> Result<(), FrameError> + Send,
{
    fn run_once(&mut self) -> Result<(), FrameError> {
        self()
    }
}

struct Shared {
    name: String,
    period_ms: u64,
    running: AtomicBool,
    started: AtomicBool,
    epoch: Instant,
    first_release_ns: AtomicU64,
    releases: AtomicU64,
    gate: BinarySemaphore,
    release_error: Mutex<StatTracker>,
    execution: Mutex<StatTracker>,
}

/// A periodic service: immutable descriptor plus an owned worker thread.
///
/// The worker is spawned at construction but blocks on the release gate
/// until the sequencer's first `release`. Dropping the service stops and
/// joins the worker.
pub struct Service {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Service {
    /// Spawn a service worker.
    ///
    /// The worker applies `placement` to itself before its first wait; a
    /// placement failure is an unrecoverable setup error and aborts the
    /// process with a non-zero exit.
    pub fn spawn<B>(
        name: impl Into<String>,
        period_ms: u64,
        placement: Placement,
        body: B,
    ) -> io::Result<Self>
    where
        B: Periodic + 'static,
    {
        let shared = Arc::new(Shared {
            name: name.into(),
            period_ms,
            running: AtomicBool::new(true),
            started: AtomicBool::new(false),
            epoch: Instant::now(),
            first_release_ns: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            gate: BinarySemaphore::new(false)?,
            release_error: Mutex::new(StatTracker::new(STAT_CAPACITY)),
            execution: Mutex::new(StatTracker::new(STAT_CAPACITY)),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(shared.name.clone())
                .spawn(move || worker_loop(shared, body, placement))?
        };

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn period_ms(&self) -> u64 {
        self.shared.period_ms
    }

    /// False once the service has been stopped or has stopped itself after
    /// a sustained release-miss burst.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Total releases issued so far.
    pub fn releases(&self) -> u64 {
        self.shared.releases.load(Ordering::Relaxed)
    }

    /// Make the service runnable for exactly one period. Non-blocking.
    ///
    /// The gate saturates at one pending wake, so releasing a service that
    /// has not finished its previous period is a no-op. The first release
    /// stamps the reference time; every later release records the deviation
    /// from `release_number * period` into the release-error ring.
    pub fn release(&self) {
        let s = &*self.shared;
        if !s.started.swap(true, Ordering::AcqRel) {
            s.first_release_ns
                .store(s.epoch.elapsed().as_nanos() as u64, Ordering::Release);
        } else {
            let now_ns = s.epoch.elapsed().as_nanos() as u64;
            let first_ns = s.first_release_ns.load(Ordering::Acquire);
            let release_number = s.releases.load(Ordering::Relaxed);
            let expected_ns = release_number * s.period_ms * 1_000_000;
            let error_ms =
                ((now_ns.saturating_sub(first_ns)) as f64 - expected_ns as f64) / 1e6;
            s.release_error.lock().unwrap().add(error_ms);
        }
        s.releases.fetch_add(1, Ordering::Relaxed);
        s.gate.release();
    }

    /// Stop the worker and join it. One extra gate release wakes the worker
    /// out of its timed wait immediately. Safe to call more than once.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.gate.release();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(service = %self.shared.name, "worker panicked");
            }
        }
    }

    /// Snapshot of the release-error ring.
    pub fn release_error_stats(&self) -> StatTracker {
        self.shared.release_error.lock().unwrap().clone()
    }

    /// Snapshot of the execution-time ring.
    pub fn execution_stats(&self) -> StatTracker {
        self.shared.execution.lock().unwrap().clone()
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<B: Periodic>(shared: Arc<Shared>, mut body: B, placement: Placement) {
    if let Err(err) = placement.apply() {
        error!(service = %shared.name, error = %err, "real-time placement failed");
        std::process::exit(1);
    }

    let timeout = Duration::from_millis(shared.period_ms.saturating_mul(2));
    let mut consecutive_misses = 0u32;

    while shared.running.load(Ordering::Acquire) {
        let acquired = match shared.gate.acquire_timeout(timeout) {
            Ok(acquired) => acquired,
            Err(err) => {
                error!(service = %shared.name, error = %err, "release gate broken");
                break;
            }
        };

        if !shared.running.load(Ordering::Acquire) {
            info!(service = %shared.name, "service exited");
            break;
        }

        if !acquired {
            consecutive_misses += 1;
            error!(
                service = %shared.name,
                window_ms = shared.period_ms * 2,
                "no release within twice the period"
            );
            if consecutive_misses >= MISS_LIMIT {
                error!(
                    service = %shared.name,
                    "missed {MISS_LIMIT} consecutive releases, stopping"
                );
                shared.running.store(false, Ordering::Release);
            }
            continue;
        }
        consecutive_misses = 0;

        let started = Instant::now();
        if let Err(err) = body.run_once() {
            error!(service = %shared.name, error = %err, "cycle failed");
        }
        let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;
        shared.execution.lock().unwrap().add(elapsed_ms);
    }
}
