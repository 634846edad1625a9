// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Error taxonomy. Setup errors are unrecoverable and abort launch; frame
// errors are confined to a single period of a service body and only logged.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Unrecoverable launch-time failure.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("must run as root (effective uid {0})")]
    NotRoot(u32),

    #[error("could not read kernel command line at {path}")]
    BootConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to pin thread to cpu {cpu}")]
    Affinity {
        cpu: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to set SCHED_FIFO priority {priority}")]
    Priority {
        priority: i32,
        #[source]
        source: io::Error,
    },

    #[error("failed to create a release gate")]
    Gate(#[source] io::Error),

    #[error("failed to install the tick signal handler")]
    SignalHandler(#[source] io::Error),

    #[error("failed to create the interval timer")]
    Timer(#[source] io::Error),

    #[error("could not open output device {path}")]
    OutputDevice {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Rejected at `Sequencer::add_service`: every service period must be an
/// integer multiple of the master period.
#[derive(Debug, Error)]
#[error(
    "service {service}: period {service_period}ms is not a multiple of the \
     sequencer period {sequencer_period}ms"
)]
pub struct IncompatiblePeriod {
    pub service: String,
    pub service_period: u64,
    pub sequencer_period: u64,
}

/// A failure confined to a single period of a service body. The worker logs
/// it and keeps running; the next release starts a fresh cycle.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("capture overrun")]
    Overrun,

    #[error("capture device read failed")]
    Device(#[source] io::Error),

    #[error("short read: {got}/{want} frames")]
    ShortRead { got: usize, want: usize },

    #[error("{0} handshake timed out")]
    Rendezvous(&'static str),

    #[error("release gate broken")]
    Gate(#[source] io::Error),

    #[error("output sink write failed")]
    Sink(#[source] io::Error),
}

/// Failure of the sequencer release loop itself.
///
/// A tick miss is fatal only for the interval-timer variant: its tick is
/// delivered by the kernel, so a missed watchdog deadline means the timer or
/// the clock is gone, not that a service ran long.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("tick signal missed its {0}ms watchdog deadline")]
    TickMiss(u64),

    #[error("tick gate broken")]
    TickGate(#[source] io::Error),
}
