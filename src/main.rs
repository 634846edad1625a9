// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Entry point: verify the real-time environment, wire the audio pipeline
// services onto the sequencer, run until SIGINT, dump statistics.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::{Parser, ValueEnum};
use tracing::info;

use rmseq::bootcfg;
use rmseq::capture::ToneSource;
use rmseq::logging::{self, DeferredSink, LogFlush};
use rmseq::pipeline::{
    AnalysisStage, BandSink, CaptureStage, DisplayStage, PeakBands, Rendezvous,
};
use rmseq::placement::{self, Placement};
use rmseq::sink::{ConsoleBars, LedStrip, Muted};
use rmseq::{BandLevels, FrameBuffer, Sequencer, Service, TickSource, NUM_BANDS};

/// The sequencer gets its own core so a service can never preempt the tick.
const SEQUENCER_CPU: usize = 2;
/// All services share one core in strict priority order.
const SERVICE_CPU: usize = 3;

const MASTER_PERIOD_MS: u64 = 10;
const DISPLAY_PERIOD_MS: u64 = 100;
const LOG_PERIOD_MS: u64 = 200;

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u32 = 1;
/// 480 frames of mono S16LE per 10 ms at 48 kHz.
const FRAME_BYTES: usize = 960;

#[derive(Parser)]
#[command(name = "rmseq", about = "Rate-monotonic audio analysis pipeline")]
struct Cli {
    /// Tick source for the master sequencer.
    #[arg(value_enum)]
    variant: Variant,

    /// Where the band levels go.
    #[arg(value_enum)]
    output: Output,

    /// Kernel command line checked before launch.
    #[arg(long, default_value = "/boot/firmware/cmdline.txt")]
    cmdline: PathBuf,

    /// Statistics file appended to on shutdown.
    #[arg(long, default_value = "statistics.txt")]
    statistics: PathBuf,

    /// spidev node driving the LED strip.
    #[arg(long, default_value = "/dev/spidev0.0")]
    led_device: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Variant {
    /// Sleep-paced sequencer.
    Sleep,
    /// Kernel interval timer + signal handler.
    Isr,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    Led,
    Console,
    Muted,
}

/// The only process-global the signal handler is allowed to touch.
static KEEP_RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn on_interrupt(signum: libc::c_int) {
    if signum == libc::SIGINT {
        KEEP_RUNNING.store(false, Ordering::Release);
    }
}

fn install_interrupt_handler() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction =
            on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let sink = logging::init_deferred();
    let code = match run(&cli, sink.clone()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(err.as_ref());
            ExitCode::FAILURE
        }
    };

    // Whatever the flusher did not get to.
    let pending = sink.drain();
    if !pending.is_empty() {
        let _ = io::stderr().write_all(&pending);
    }
    code
}

fn report(err: &dyn Error) {
    eprintln!("rmseq: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

fn run(cli: &Cli, sink: DeferredSink) -> Result<(), Box<dyn Error>> {
    bootcfg::require_root()?;
    let report = bootcfg::verify(&cli.cmdline)?;
    if report.is_clean() {
        info!("boot configuration matches the real-time expectations");
    }
    install_interrupt_handler()?;

    let max = placement::max_fifo_priority();
    let min = placement::min_fifo_priority();

    let buffer = Arc::new(FrameBuffer::new(FRAME_BYTES, CHANNELS));
    let handshake = Arc::new(Rendezvous::new()?);
    let output = Arc::new(Mutex::new(BandLevels::default()));

    let band_sink: Box<dyn BandSink> = match cli.output {
        Output::Led => Box::new(LedStrip::open(&cli.led_device, NUM_BANDS)?),
        Output::Console => Box::new(ConsoleBars::new()),
        Output::Muted => Box::new(Muted),
    };

    let tick_source = match cli.variant {
        Variant::Sleep => TickSource::Sleep,
        Variant::Isr => TickSource::IntervalTimer,
    };
    let mut sequencer = Sequencer::new(
        MASTER_PERIOD_MS,
        Placement::pinned(SEQUENCER_CPU, max),
        tick_source,
    );

    let capture = Service::spawn(
        "capture",
        MASTER_PERIOD_MS,
        Placement::pinned(SERVICE_CPU, max),
        CaptureStage::new(
            Arc::clone(&buffer),
            Arc::clone(&handshake),
            Box::new(ToneSource::new(SAMPLE_RATE, CHANNELS)),
            MASTER_PERIOD_MS,
        ),
    )?;
    let analysis = Service::spawn(
        "analysis",
        MASTER_PERIOD_MS,
        Placement::pinned(SERVICE_CPU, max - 1),
        AnalysisStage::new(
            Arc::clone(&buffer),
            Arc::clone(&handshake),
            Box::new(PeakBands),
            Arc::clone(&output),
            MASTER_PERIOD_MS,
        ),
    )?;
    let display = Service::spawn(
        "display",
        DISPLAY_PERIOD_MS,
        Placement::pinned(SERVICE_CPU, max - 2),
        DisplayStage::new(Arc::clone(&output), band_sink),
    )?;
    let flusher = Service::spawn(
        "logflush",
        LOG_PERIOD_MS,
        Placement::pinned(SERVICE_CPU, min),
        LogFlush::new(sink),
    )?;

    sequencer.add_service(capture)?;
    sequencer.add_service(analysis)?;
    sequencer.add_service(display)?;
    sequencer.add_service(flusher)?;

    info!(variant = ?cli.variant, output = ?cli.output, "starting sequencer");
    let outcome = sequencer.run(&KEEP_RUNNING);

    // Join everything and dump statistics even when the run loop bailed.
    sequencer.shutdown(Some(&cli.statistics))?;
    outcome?;

    info!(ticks = sequencer.ticks(), "clean shutdown");
    Ok(())
}
