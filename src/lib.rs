// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Rate-monotonic sequencer and periodic service runtime driving a
// double-buffered audio analysis pipeline on an isolated-core Linux host.

pub mod bootcfg;
pub mod buffer;
pub mod capture;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod placement;
pub mod sequencer;
pub mod service;
pub mod signal;
pub mod sink;
pub mod stats;

pub use buffer::FrameBuffer;
pub use error::{FrameError, IncompatiblePeriod, SequencerError, SetupError};
pub use pipeline::{BandLevels, Rendezvous, NUM_BANDS};
pub use placement::Placement;
pub use sequencer::{Sequencer, TickSource};
pub use service::{Periodic, Service};
pub use signal::BinarySemaphore;
pub use stats::StatTracker;
