// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Presentation sinks for the band levels: terminal bars, a muted sink, and
// a WS2812 LED strip driven through a spidev node.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::{FrameError, SetupError};
use crate::pipeline::{BandLevels, BandSink, NUM_BANDS};

/// Full-scale value of the normalized dB levels.
const LEVEL_SPAN: u32 = 96;

// ---------------------------------------------------------------------------
// Terminal bars
// ---------------------------------------------------------------------------

/// Renders the bands as one line of block glyphs, redrawn in place.
pub struct ConsoleBars {
    out: io::Stdout,
}

impl ConsoleBars {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for ConsoleBars {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConsoleBars {
    fn drop(&mut self) {
        // Leave the shell prompt on its own line.
        let mut out = self.out.lock();
        let _ = out.write_all(b"\n");
        let _ = out.flush();
    }
}

impl BandSink for ConsoleBars {
    fn set(&mut self, levels: &BandLevels) -> Result<(), FrameError> {
        const GLYPHS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
        let mut line = String::with_capacity(4 * NUM_BANDS + 2);
        line.push('\r');
        for &level in levels {
            let index = (level.min(LEVEL_SPAN) as usize * (GLYPHS.len() - 1)) / LEVEL_SPAN as usize;
            line.push(GLYPHS[index]);
            line.push(' ');
        }
        let mut out = self.out.lock();
        out.write_all(line.as_bytes())
            .and_then(|()| out.flush())
            .map_err(FrameError::Sink)
    }
}

// ---------------------------------------------------------------------------
// Muted
// ---------------------------------------------------------------------------

/// Discards the levels; keeps the pipeline shape without presentation.
pub struct Muted;

impl BandSink for Muted {
    fn set(&mut self, _levels: &BandLevels) -> Result<(), FrameError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WS2812 strip over spidev
// ---------------------------------------------------------------------------

const SPI_SPEED_HZ: u32 = 2_400_000;
const SPI_IOC_WR_MODE: libc::c_ulong = 0x4001_6B01;
const SPI_IOC_WR_MAX_SPEED_HZ: libc::c_ulong = 0x4004_6B04;

/// SPI bytes per LED: 24 color bits, each stretched to 3 SPI bits.
const SPI_BYTES_PER_LED: usize = 9;

/// Trailing low time that latches the strip: >280 us at 2.4 MHz.
const RESET_BYTES: usize = 90;

/// One LED per band on a WS2812 GRB strip behind the SPI MOSI pin.
///
/// At 2.4 MHz each data bit becomes three SPI bits (`100` for zero, `110`
/// for one), which lands inside the WS2812 timing tolerances without a
/// dedicated PWM peripheral.
pub struct LedStrip {
    device: File,
    led_count: usize,
    frame: Vec<u8>,
}

impl LedStrip {
    /// Open and configure the spidev node. Fails with a setup error when
    /// the device is absent or rejects the mode/speed ioctls.
    pub fn open(path: &Path, led_count: usize) -> Result<Self, SetupError> {
        let device = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| SetupError::OutputDevice {
                path: path.to_owned(),
                source,
            })?;

        let fd = device.as_raw_fd();
        let mode: u8 = 0;
        let speed: u32 = SPI_SPEED_HZ;
        let configured = unsafe {
            libc::ioctl(fd, SPI_IOC_WR_MODE, &mode) == 0
                && libc::ioctl(fd, SPI_IOC_WR_MAX_SPEED_HZ, &speed) == 0
        };
        if !configured {
            return Err(SetupError::OutputDevice {
                path: PathBuf::from(path),
                source: io::Error::last_os_error(),
            });
        }

        Ok(Self {
            device,
            led_count,
            frame: vec![0u8; led_count * SPI_BYTES_PER_LED + RESET_BYTES],
        })
    }

    fn encode(&mut self, colors: &[(u8, u8, u8)]) {
        self.frame.fill(0);
        let mut cursor = 0usize;
        for &(r, g, b) in colors.iter().take(self.led_count) {
            // GRB wire order.
            for byte in [g, r, b] {
                for bit in (0..8).rev() {
                    let one = byte >> bit & 1 == 1;
                    push_bit(&mut self.frame, &mut cursor, true);
                    push_bit(&mut self.frame, &mut cursor, one);
                    push_bit(&mut self.frame, &mut cursor, false);
                }
            }
        }
    }
}

fn push_bit(frame: &mut [u8], cursor: &mut usize, bit: bool) {
    if bit {
        frame[*cursor / 8] |= 0x80 >> (*cursor % 8);
    }
    *cursor += 1;
}

/// Green through yellow to red as the band gets louder. Brightness is
/// capped so the strip stays within what USB power can feed it.
fn color_for(level: u32) -> (u8, u8, u8) {
    let level = level.min(LEVEL_SPAN);
    let value = (level * 64 / LEVEL_SPAN) as u8;
    if level == 0 {
        (0, 0, 0)
    } else if level < LEVEL_SPAN / 2 {
        (0, value.max(2), 0)
    } else if level < LEVEL_SPAN * 3 / 4 {
        (value, value, 0)
    } else {
        (value.max(2), 0, 0)
    }
}

impl BandSink for LedStrip {
    fn set(&mut self, levels: &BandLevels) -> Result<(), FrameError> {
        let mut colors = [(0u8, 0u8, 0u8); NUM_BANDS];
        for (color, &level) in colors.iter_mut().zip(levels.iter()) {
            *color = color_for(level);
        }
        self.encode(&colors);
        self.device.write_all(&self.frame).map_err(FrameError::Sink)
    }
}
