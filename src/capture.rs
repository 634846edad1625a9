// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Capture backends. The real deployment points a device-backed FrameSource
// at the pipeline; the tone generator here is the deterministic stand-in
// that drives it end to end without hardware.

use std::f64::consts::TAU;

use crate::error::FrameError;
use crate::pipeline::FrameSource;

/// A swept sine generator producing interleaved S16LE frames.
///
/// The sweep wanders between 200 Hz and 2 kHz so the band meter has
/// something to show. Fully deterministic for a given construction.
pub struct ToneSource {
    sample_rate: u32,
    channels: u32,
    phase: f64,
    sweep: f64,
}

impl ToneSource {
    pub fn new(sample_rate: u32, channels: u32) -> Self {
        Self {
            sample_rate,
            channels,
            phase: 0.0,
            sweep: 0.0,
        }
    }
}

impl FrameSource for ToneSource {
    fn get_frames(&mut self, frame: &mut [u8]) -> Result<usize, FrameError> {
        let bytes_per_frame = self.channels as usize * 2;
        if bytes_per_frame == 0 {
            return Ok(0);
        }
        let frames = frame.len() / bytes_per_frame;
        for i in 0..frames {
            let hz = 200.0 + 1800.0 * (0.5 + 0.5 * self.sweep.sin());
            self.phase = (self.phase + TAU * hz / self.sample_rate as f64) % TAU;
            self.sweep += 0.35 / self.sample_rate as f64;
            let sample = (self.phase.sin() * 0.6 * f64::from(i16::MAX)) as i16;
            let bytes = sample.to_le_bytes();
            for channel in 0..self.channels as usize {
                let at = i * bytes_per_frame + channel * 2;
                frame[at] = bytes[0];
                frame[at + 1] = bytes[1];
            }
        }
        Ok(frames)
    }
}
