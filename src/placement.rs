// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// CPU affinity and SCHED_FIFO priority for the calling thread.

use std::io;

use crate::error::SetupError;

/// Highest priority the host accepts for SCHED_FIFO threads.
pub fn max_fifo_priority() -> i32 {
    unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) }
}

/// Lowest priority the host accepts for SCHED_FIFO threads.
pub fn min_fifo_priority() -> i32 {
    unsafe { libc::sched_get_priority_min(libc::SCHED_FIFO) }
}

/// Pin the calling thread to a single CPU.
pub fn pin_current_thread(cpu: usize) -> io::Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        let eno = libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set,
        );
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
    }
    Ok(())
}

/// Switch the calling thread to SCHED_FIFO at `priority`.
/// Requires root or CAP_SYS_NICE.
pub fn set_fifo_priority(priority: i32) -> io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let eno = unsafe {
        libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param)
    };
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }
    Ok(())
}

/// Where a thread runs: pinned to a CPU at a fixed SCHED_FIFO priority, or
/// inheriting whatever the parent had (the form tests use, since the
/// real-time placement needs root).
#[derive(Debug, Clone, Copy, Default)]
pub struct Placement {
    pub cpu: Option<usize>,
    pub fifo_priority: Option<i32>,
}

impl Placement {
    /// No pinning, no priority change.
    pub const fn inherit() -> Self {
        Self {
            cpu: None,
            fifo_priority: None,
        }
    }

    /// Pin to `cpu` and elevate to SCHED_FIFO `priority`.
    pub const fn pinned(cpu: usize, priority: i32) -> Self {
        Self {
            cpu: Some(cpu),
            fifo_priority: Some(priority),
        }
    }

    /// Apply to the calling thread.
    pub fn apply(&self) -> Result<(), SetupError> {
        if let Some(cpu) = self.cpu {
            pin_current_thread(cpu).map_err(|source| SetupError::Affinity { cpu, source })?;
        }
        if let Some(priority) = self.fifo_priority {
            set_fifo_priority(priority)
                .map_err(|source| SetupError::Priority { priority, source })?;
        }
        Ok(())
    }
}
