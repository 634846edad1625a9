// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Logging plumbing. Service-context logs go through tracing into a deferred
// buffer that the low-priority flusher stage drains, so a formatting or
// stderr stall never lands on a high-priority thread. The one path that
// cannot afford even that, the tick watchdog, writes straight to syslog.

use std::ffi::CString;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::error::FrameError;
use crate::service::Periodic;

/// Shared byte buffer behind the deferred tracing writer.
#[derive(Clone, Default)]
pub struct DeferredSink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl DeferredSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the buffered bytes out, leaving the buffer empty.
    pub fn drain(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buffer.lock().unwrap())
    }
}

pub struct DeferredWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for DeferredWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DeferredSink {
    type Writer = DeferredWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DeferredWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber writing into a deferred buffer. Returns
/// the sink; hand a clone to a `LogFlush` stage and keep one for a final
/// drain at exit.
pub fn init_deferred() -> DeferredSink {
    let sink = DeferredSink::new();
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_ansi(false)
        .with_writer(sink.clone())
        .init();
    sink
}

/// Immediate stderr subscriber, for tools that have no flusher stage.
pub fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_ansi(false)
        .with_writer(io::stderr)
        .init();
}

/// Minimum-priority stage that drains the deferred buffer to stderr.
pub struct LogFlush {
    sink: DeferredSink,
}

impl LogFlush {
    pub fn new(sink: DeferredSink) -> Self {
        Self { sink }
    }
}

impl Periodic for LogFlush {
    fn run_once(&mut self) -> Result<(), FrameError> {
        let pending = self.sink.drain();
        if pending.is_empty() {
            return Ok(());
        }
        let mut err = io::stderr().lock();
        err.write_all(&pending)
            .and_then(|()| err.flush())
            .map_err(FrameError::Sink)
    }
}

/// One line straight to syslog(3), bypassing the tracing stack entirely.
/// For paths where formatting-machinery jitter is unacceptable.
pub fn syslog_error(message: &str) {
    if let Ok(text) = CString::new(message) {
        unsafe {
            libc::syslog(libc::LOG_ERR, c"%s".as_ptr(), text.as_ptr());
        }
    }
}
