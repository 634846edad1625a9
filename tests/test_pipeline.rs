// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Tests for the Ready/Done rendezvous and the pipeline stages, driven
// directly (no sequencer) so every step is deterministic.

use std::sync::{Arc, Mutex};

use rmseq::error::FrameError;
use rmseq::pipeline::{
    AnalysisStage, BandAnalyzer, CaptureStage, FrameSource, PeakBands, Rendezvous,
};
use rmseq::{BandLevels, FrameBuffer, Periodic, NUM_BANDS};

const PERIOD_MS: u64 = 5;

/// Writes a fixed byte pattern into every frame.
struct PatternSource(u8);

impl FrameSource for PatternSource {
    fn get_frames(&mut self, frame: &mut [u8]) -> Result<usize, FrameError> {
        frame.fill(self.0);
        Ok(frame.len() / 2)
    }
}

/// Stashes a copy of every frame it is handed.
struct CopyAnalyzer(Arc<Mutex<Vec<u8>>>);

impl BandAnalyzer for CopyAnalyzer {
    fn analyze(&mut self, frame: &[u8], out: &mut BandLevels) -> Result<(), FrameError> {
        *self.0.lock().unwrap() = frame.to_vec();
        out.fill(0);
        Ok(())
    }
}

fn pipeline_pair(
    pattern: u8,
) -> (CaptureStage, AnalysisStage, Arc<Mutex<Vec<u8>>>, Arc<Rendezvous>) {
    let buffer = Arc::new(FrameBuffer::new(32, 1));
    let handshake = Arc::new(Rendezvous::new().expect("rendezvous"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let output = Arc::new(Mutex::new(BandLevels::default()));

    let capture = CaptureStage::new(
        Arc::clone(&buffer),
        Arc::clone(&handshake),
        Box::new(PatternSource(pattern)),
        PERIOD_MS,
    );
    let analysis = AnalysisStage::new(
        buffer,
        Arc::clone(&handshake),
        Box::new(CopyAnalyzer(Arc::clone(&seen))),
        output,
        PERIOD_MS,
    );
    (capture, analysis, seen, handshake)
}

#[test]
fn done_starts_released_and_ready_does_not() {
    let handshake = Rendezvous::new().expect("rendezvous");
    assert!(!handshake.try_ready());
    assert!(handshake.try_done());
    // At most one token existed.
    assert!(!handshake.try_done());
    assert!(!handshake.try_ready());
}

#[test]
fn consumer_observes_exactly_the_produced_pattern() {
    let (mut capture, mut analysis, seen, _handshake) = pipeline_pair(0x5A);

    capture.run_once().expect("capture");
    analysis.run_once().expect("analysis");
    assert_eq!(*seen.lock().unwrap(), vec![0x5A; 32]);

    // Done came back, so the next period flows as well.
    capture.run_once().expect("capture again");
    analysis.run_once().expect("analysis again");
}

#[test]
fn one_token_in_flight_after_capture() {
    let (mut capture, _analysis, _seen, handshake) = pipeline_pair(1);

    capture.run_once().expect("capture");
    // Capture consumed Done and produced Ready.
    assert!(!handshake.try_done());
    assert!(handshake.try_ready());
    assert!(!handshake.try_ready());
}

#[test]
fn analysis_times_out_without_a_produced_frame() {
    let (_capture, mut analysis, seen, _handshake) = pipeline_pair(2);

    let err = analysis.run_once().expect_err("no frame is ready");
    assert!(matches!(err, FrameError::Rendezvous("ready")));
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn capture_times_out_when_the_previous_frame_is_still_in_flight() {
    let (mut capture, _analysis, _seen, handshake) = pipeline_pair(3);

    // Steal Done: the consumer never finished.
    assert!(handshake.try_done());

    let err = capture.run_once().expect_err("consumer still busy");
    assert!(matches!(err, FrameError::Rendezvous("done")));
}

#[test]
fn a_missed_window_self_heals_on_the_next_period() {
    let (mut capture, mut analysis, seen, _handshake) = pipeline_pair(4);

    // Consumer fires early and times out.
    analysis.run_once().expect_err("early");
    // The pair still alternates cleanly afterwards.
    capture.run_once().expect("capture");
    analysis.run_once().expect("analysis");
    assert_eq!(seen.lock().unwrap().len(), 32);
}

#[test]
fn peak_meter_maps_silence_to_zero() {
    let mut analyzer = PeakBands;
    let frame = vec![0u8; 64];
    let mut out = BandLevels::default();
    analyzer.analyze(&frame, &mut out).expect("analyze");
    assert_eq!(out, [0; NUM_BANDS]);
}

#[test]
fn peak_meter_puts_a_loud_leading_band_first() {
    let mut analyzer = PeakBands;
    // 64 samples: the first eight near full scale, the rest silent.
    let mut frame = vec![0u8; 128];
    for sample in 0..8 {
        let bytes = i16::MAX.to_le_bytes();
        frame[sample * 2] = bytes[0];
        frame[sample * 2 + 1] = bytes[1];
    }
    let mut out = BandLevels::default();
    analyzer.analyze(&frame, &mut out).expect("analyze");

    assert!(out[0] >= 90, "leading band {} too quiet", out[0]);
    assert!(out[1..].iter().all(|&level| level == 0));
}

#[test]
fn peak_meter_handles_a_frame_smaller_than_the_band_count() {
    let mut analyzer = PeakBands;
    let frame = [0x10u8, 0x00, 0x20, 0x00];
    let mut out = BandLevels::default();
    analyzer.analyze(&frame, &mut out).expect("analyze");
    // Two samples spread over the leading bands, the rest default to zero.
    assert!(out[2..].iter().all(|&level| level == 0));
}
