// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Master tick generator. Releases every service whose period divides the
// elapsed tick count, records its own tick-time error, and on shutdown
// joins the services and appends the run statistics to a file.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{IncompatiblePeriod, SequencerError, SetupError};
use crate::logging;
use crate::placement::Placement;
use crate::service::Service;
use crate::signal::BinarySemaphore;
use crate::stats::StatTracker;

/// Samples held in the tick-error ring.
const STAT_CAPACITY: usize = 1000;

/// How the master tick is produced. Both variants honor the same release
/// contract; they differ only in drift behavior and failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSource {
    /// Sleep `period` between passes (no sleep before the first, so tick 0
    /// timestamps t=0). Accumulates monotonic drift, which the tick-error
    /// ring measures.
    Sleep,
    /// A kernel interval timer delivers SIGALRM; the handler releases the
    /// tick gate. A missed watchdog deadline on this gate is fatal.
    IntervalTimer,
}

/// Rate-monotonic sequencer: owns its services and releases each one on the
/// ticks its period lands on.
pub struct Sequencer {
    period_ms: u64,
    placement: Placement,
    source: TickSource,
    services: Vec<Service>,
    tick_error: StatTracker,
    ticks: u64,
}

impl Sequencer {
    pub fn new(period_ms: u64, placement: Placement, source: TickSource) -> Self {
        Self {
            period_ms,
            placement,
            source,
            services: Vec::new(),
            tick_error: StatTracker::new(STAT_CAPACITY),
            ticks: 0,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Register a service. Its period must be an integer multiple of the
    /// master period, otherwise the rate-monotonic release rule cannot hit
    /// it and registration is rejected.
    pub fn add_service(&mut self, service: Service) -> Result<(), IncompatiblePeriod> {
        if service.period_ms() % self.period_ms != 0 {
            return Err(IncompatiblePeriod {
                service: service.name().to_owned(),
                service_period: service.period_ms(),
                sequencer_period: self.period_ms,
            });
        }
        self.services.push(service);
        Ok(())
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Snapshot of the tick-error ring.
    pub fn tick_error_stats(&self) -> StatTracker {
        self.tick_error.clone()
    }

    /// Run the release loop on the calling thread until `keep_running`
    /// clears or the tick watchdog fires.
    ///
    /// Each tick records `(now - t0) - ticks * period` into the tick-error
    /// ring, then releases every service with `period * ticks` divisible by
    /// its period, so every registered service is released on tick 0.
    pub fn run(&mut self, keep_running: &AtomicBool) -> Result<(), SequencerError> {
        self.placement.apply()?;
        let mut ticker = Ticker::start(self.source, self.period_ms)?;
        let mut t0: Option<Instant> = None;

        while keep_running.load(Ordering::Acquire) {
            ticker.wait(self.period_ms)?;

            let start = *t0.get_or_insert_with(Instant::now);
            let error_ms =
                start.elapsed().as_secs_f64() * 1e3 - (self.ticks * self.period_ms) as f64;
            self.tick_error.add(error_ms);

            for service in &self.services {
                if (self.period_ms * self.ticks) % service.period_ms() == 0 {
                    service.release();
                }
            }
            self.ticks += 1;
        }
        Ok(())
    }

    /// Stop every service in registration order, join the workers, and
    /// append the run statistics to `statistics` if given. Stopping an idle
    /// sequencer is a no-op; stopping twice is safe.
    pub fn shutdown(&mut self, statistics: Option<&Path>) -> io::Result<()> {
        for service in &mut self.services {
            service.stop();
        }
        if let Some(path) = statistics {
            self.append_statistics(path)?;
        }
        Ok(())
    }

    fn append_statistics(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        write_sequencer_block(&mut file, &self.tick_error)?;
        for service in &self.services {
            write_service_block(&mut file, service)?;
        }
        writeln!(file)
    }
}

const RULE: &str = "================================================================";

fn write_sequencer_block(out: &mut impl Write, tick_error: &StatTracker) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Sequencer Execution Statistics")?;
    writeln!(out, "Execution Time Error Average: {}ms", tick_error.mean_ms())?;
    writeln!(out, "Execution Time Error Max: {}ms", tick_error.max_ms())?;
    writeln!(out, "Execution Time Error Min: {}ms", tick_error.min_ms())?;
    writeln!(out, "{RULE}")
}

fn write_service_block(out: &mut impl Write, service: &Service) -> io::Result<()> {
    let execution = service.execution_stats();
    let release = service.release_error_stats();
    writeln!(out, "{RULE}")?;
    writeln!(out, "Service {} Execution Statistics", service.name())?;
    writeln!(out, "Execution Time Average: {}ms", execution.mean_ms())?;
    writeln!(out, "Execution Time Max: {}ms", execution.max_ms())?;
    writeln!(out, "Execution Time Min: {}ms", execution.min_ms())?;
    writeln!(out, "Release Time Average Error: {}ms", release.mean_ms())?;
    writeln!(
        out,
        "Executions that met deadline: {}/{}",
        execution.completed_within(service.period_ms() as f64),
        execution.len()
    )?;
    writeln!(out, "{RULE}")
}

// ---------------------------------------------------------------------------
// Tick sources
// ---------------------------------------------------------------------------

enum Ticker {
    Sleep { first: bool },
    Timer(IntervalTimer),
}

impl Ticker {
    fn start(source: TickSource, period_ms: u64) -> Result<Self, SetupError> {
        match source {
            TickSource::Sleep => Ok(Ticker::Sleep { first: true }),
            TickSource::IntervalTimer => Ok(Ticker::Timer(IntervalTimer::start(period_ms)?)),
        }
    }

    fn wait(&mut self, period_ms: u64) -> Result<(), SequencerError> {
        match self {
            Ticker::Sleep { first } => {
                if *first {
                    *first = false;
                } else {
                    thread::sleep(Duration::from_millis(period_ms));
                }
                Ok(())
            }
            Ticker::Timer(timer) => timer.wait_tick(period_ms),
        }
    }
}

/// A CLOCK_MONOTONIC kernel timer delivering SIGALRM every period. The
/// handler recovers the tick gate through the timer's user-data pointer and
/// posts it, nothing else, so the handler stays async-signal-safe.
struct IntervalTimer {
    id: libc::timer_t,
    // Boxed so the address stashed in the timer's sigev_value outlives every
    // signal delivery.
    tick: Box<BinarySemaphore>,
}

impl IntervalTimer {
    fn start(period_ms: u64) -> Result<Self, SetupError> {
        let tick = Box::new(BinarySemaphore::new(false).map_err(SetupError::Gate)?);

        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_flags = libc::SA_SIGINFO;
            action.sa_sigaction = on_tick
                as extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void)
                as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(libc::SIGALRM, &action, std::ptr::null_mut()) != 0 {
                return Err(SetupError::SignalHandler(io::Error::last_os_error()));
            }

            let mut event: libc::sigevent = std::mem::zeroed();
            event.sigev_notify = libc::SIGEV_SIGNAL;
            event.sigev_signo = libc::SIGALRM;
            event.sigev_value = libc::sigval {
                sival_ptr: &*tick as *const BinarySemaphore as *mut libc::c_void,
            };

            let mut id: libc::timer_t = std::mem::zeroed();
            if libc::timer_create(libc::CLOCK_MONOTONIC, &mut event, &mut id) != 0 {
                return Err(SetupError::Timer(io::Error::last_os_error()));
            }

            let its = libc::itimerspec {
                // Arm essentially immediately; zero would disarm.
                it_value: libc::timespec {
                    tv_sec: 0,
                    tv_nsec: 1,
                },
                it_interval: libc::timespec {
                    tv_sec: (period_ms / 1000) as libc::time_t,
                    tv_nsec: ((period_ms % 1000) * 1_000_000) as libc::c_long,
                },
            };
            if libc::timer_settime(id, 0, &its, std::ptr::null_mut()) != 0 {
                let err = io::Error::last_os_error();
                libc::timer_delete(id);
                return Err(SetupError::Timer(err));
            }

            Ok(Self { id, tick })
        }
    }

    fn wait_tick(&self, period_ms: u64) -> Result<(), SequencerError> {
        let deadline_ms = period_ms.saturating_mul(2);
        match self
            .tick
            .acquire_timeout(Duration::from_millis(deadline_ms))
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                // Raw syslog: this path must not enter the tracing stack.
                logging::syslog_error("sequencer tick missed its watchdog deadline");
                Err(SequencerError::TickMiss(deadline_ms))
            }
            Err(err) => Err(SequencerError::TickGate(err)),
        }
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        unsafe { libc::timer_delete(self.id) };
    }
}

extern "C" fn on_tick(
    signum: libc::c_int,
    info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    if signum != libc::SIGALRM || info.is_null() {
        return;
    }
    let gate = unsafe { (*info).si_value().sival_ptr } as *const BinarySemaphore;
    if let Some(gate) = unsafe { gate.as_ref() } {
        gate.release();
    }
}
