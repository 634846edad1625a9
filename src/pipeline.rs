// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Producer/consumer coordination between the capture and analysis stages,
// and the service bodies that make up the audio pipeline. One frame in
// flight at a time: capture fills the write side, takes Done, flips,
// hands over Ready; analysis takes Ready, reads the read side, hands back
// Done.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use crate::buffer::FrameBuffer;
use crate::error::FrameError;
use crate::service::Periodic;
use crate::signal::BinarySemaphore;

/// Bands the analysis stage folds a frame into: the width of the LED
/// matrix on the reference host.
pub const NUM_BANDS: usize = 8;

/// One level per band on a 0..=96 normalized dB scale.
pub type BandLevels = [u32; NUM_BANDS];

/// The Ready/Done token pair.
///
/// Both gates are binary, so `ready + done <= 1` always and the two stages
/// alternate in lockstep. Done starts released: the consumer is vacuously
/// done at t=0, which is what lets the producer run its first period.
/// Neither token can underflow, so a missed window self-heals on the next
/// period.
pub struct Rendezvous {
    ready: BinarySemaphore,
    done: BinarySemaphore,
}

impl Rendezvous {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            ready: BinarySemaphore::new(false)?,
            done: BinarySemaphore::new(true)?,
        })
    }

    /// Consumer side: wait for a flipped frame.
    pub fn await_ready(&self, window: Duration) -> io::Result<bool> {
        self.ready.acquire_timeout(window)
    }

    /// Producer side: publish the frame just flipped in.
    pub fn signal_ready(&self) {
        self.ready.release();
    }

    /// Producer side: wait for the consumer to finish the previous frame.
    pub fn await_done(&self, window: Duration) -> io::Result<bool> {
        self.done.acquire_timeout(window)
    }

    /// Consumer side: hand the buffer back.
    pub fn signal_done(&self) {
        self.done.release();
    }

    /// Non-blocking Ready take (test hook).
    pub fn try_ready(&self) -> bool {
        self.ready.try_acquire()
    }

    /// Non-blocking Done take (test hook).
    pub fn try_done(&self) -> bool {
        self.done.try_acquire()
    }
}

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// A capture backend. Fills `frame` with interleaved samples and returns the
/// number of frames written; device overruns surface as `FrameError::Overrun`.
pub trait FrameSource: Send {
    fn get_frames(&mut self, frame: &mut [u8]) -> Result<usize, FrameError>;
}

/// Folds a raw frame into per-band levels.
pub trait BandAnalyzer: Send {
    fn analyze(&mut self, frame: &[u8], out: &mut BandLevels) -> Result<(), FrameError>;
}

/// Presentation endpoint for the band levels.
pub trait BandSink: Send {
    fn set(&mut self, levels: &BandLevels) -> Result<(), FrameError>;
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Capture body: read the device into the write side, wait out the
/// consumer, flip, publish.
pub struct CaptureStage {
    buffer: Arc<FrameBuffer>,
    handshake: Arc<Rendezvous>,
    source: Box<dyn FrameSource>,
    window: Duration,
}

impl CaptureStage {
    pub fn new(
        buffer: Arc<FrameBuffer>,
        handshake: Arc<Rendezvous>,
        source: Box<dyn FrameSource>,
        period_ms: u64,
    ) -> Self {
        Self {
            buffer,
            handshake,
            source,
            window: Duration::from_millis(period_ms.saturating_mul(2)),
        }
    }
}

impl Periodic for CaptureStage {
    fn run_once(&mut self) -> Result<(), FrameError> {
        {
            // Sole writer of the write side; the consumer only ever touches
            // the other side while it holds Ready.
            let frame = unsafe { self.buffer.write_side() };
            self.source.get_frames(frame)?;
        }
        if !self.handshake.await_done(self.window).map_err(FrameError::Gate)? {
            warn!("previous frame still in flight, dropping this one");
            return Err(FrameError::Rendezvous("done"));
        }
        self.buffer.flip();
        self.handshake.signal_ready();
        Ok(())
    }
}

/// Analysis body: wait for a published frame, fold the read side into band
/// levels, hand the buffer back, then store the levels for the display.
pub struct AnalysisStage {
    buffer: Arc<FrameBuffer>,
    handshake: Arc<Rendezvous>,
    analyzer: Box<dyn BandAnalyzer>,
    output: Arc<Mutex<BandLevels>>,
    window: Duration,
}

impl AnalysisStage {
    pub fn new(
        buffer: Arc<FrameBuffer>,
        handshake: Arc<Rendezvous>,
        analyzer: Box<dyn BandAnalyzer>,
        output: Arc<Mutex<BandLevels>>,
        period_ms: u64,
    ) -> Self {
        Self {
            buffer,
            handshake,
            analyzer,
            output,
            window: Duration::from_millis(period_ms.saturating_mul(2)),
        }
    }
}

impl Periodic for AnalysisStage {
    fn run_once(&mut self) -> Result<(), FrameError> {
        if !self
            .handshake
            .await_ready(self.window)
            .map_err(FrameError::Gate)?
        {
            warn!("no frame became ready within the window");
            return Err(FrameError::Rendezvous("ready"));
        }
        let mut levels = BandLevels::default();
        let outcome = {
            // Ready is held: the producer cannot flip or write this side.
            let frame = unsafe { self.buffer.read_side() };
            self.analyzer.analyze(frame, &mut levels)
        };
        self.handshake.signal_done();
        outcome?;
        *self.output.lock().unwrap() = levels;
        Ok(())
    }
}

/// Display body: copy the latest levels out under the lock and present them.
pub struct DisplayStage {
    output: Arc<Mutex<BandLevels>>,
    sink: Box<dyn BandSink>,
}

impl DisplayStage {
    pub fn new(output: Arc<Mutex<BandLevels>>, sink: Box<dyn BandSink>) -> Self {
        Self { output, sink }
    }
}

impl Periodic for DisplayStage {
    fn run_once(&mut self) -> Result<(), FrameError> {
        let levels = *self.output.lock().unwrap();
        self.sink.set(&levels)
    }
}

// ---------------------------------------------------------------------------
// Default analyzer
// ---------------------------------------------------------------------------

/// Time-domain per-band peak meter over interleaved S16LE samples.
///
/// Splits the frame into `NUM_BANDS` equal runs and reports each run's peak
/// on the 0..=96 normalized dB scale. A spectral analyzer drops in behind
/// the same `BandAnalyzer` seam.
pub struct PeakBands;

impl BandAnalyzer for PeakBands {
    fn analyze(&mut self, frame: &[u8], out: &mut BandLevels) -> Result<(), FrameError> {
        let total_samples = frame.len() / 2;
        if total_samples == 0 {
            out.fill(0);
            return Ok(());
        }
        let band_len = total_samples.div_ceil(NUM_BANDS);
        for (band, slot) in out.iter_mut().enumerate() {
            let lo = band * band_len;
            let hi = ((band + 1) * band_len).min(total_samples);
            if lo >= hi {
                *slot = 0;
                continue;
            }
            let mut peak = 0u32;
            for sample in frame[lo * 2..hi * 2].chunks_exact(2) {
                let value = i16::from_le_bytes([sample[0], sample[1]]);
                peak = peak.max((value as i32).unsigned_abs());
            }
            *slot = scaled_db(peak);
        }
        Ok(())
    }
}

/// Map a peak magnitude to 0..=96: 0 dBFS -> 96, the -96 dB floor -> 0.
fn scaled_db(peak: u32) -> u32 {
    const FULL_SCALE: f64 = 32768.0;
    if peak == 0 {
        return 0;
    }
    let db = (20.0 * (peak as f64 / FULL_SCALE).log10()).max(-96.0);
    (db + 96.0) as u32
}
