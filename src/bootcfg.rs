// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Launch-time environment verification: root privilege and the boot-time
// core isolation / tickless / RCU-offload options the deployment expects.
// Missing or mismatched boot options are warnings, not errors; the host
// still runs, just with worse timing.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::SetupError;

/// `key=cpu-range` options the kernel command line is expected to carry,
/// with the cpus each one must cover.
const EXPECTED_CPU_OPTIONS: &[(&str, &[usize])] = &[
    ("isolcpus", &[2, 3]),
    ("rcu_nocbs", &[2, 3]),
    ("nohz_full", &[1, 3]),
    ("kthread_cpus", &[0, 1]),
];

/// Bare flags the kernel command line is expected to carry.
const EXPECTED_FLAGS: &[&str] = &["nosoftlockup", "rcu_nocb_poll"];

/// Outcome of the boot-option check.
#[derive(Debug, Default)]
pub struct BootReport {
    /// Expected tokens absent from the command line.
    pub missing: Vec<String>,
    /// Options present but not covering the expected cpus.
    pub mismatched: Vec<String>,
}

impl BootReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Abort unless the process runs with effective uid 0; SCHED_FIFO and the
/// core pinning need it.
pub fn require_root() -> Result<(), SetupError> {
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(SetupError::NotRoot(euid));
    }
    Ok(())
}

/// Read the kernel command line at `path` and check it against the
/// expectation tables, logging a warning per missing or mismatched token.
/// An unreadable file is a setup error; a bad option set is not.
pub fn verify(path: &Path) -> Result<BootReport, SetupError> {
    let cmdline = fs::read_to_string(path).map_err(|source| SetupError::BootConfig {
        path: path.to_owned(),
        source,
    })?;
    let report = check_tokens(&cmdline);
    for option in &report.missing {
        warn!(option = %option, "expected boot option not present");
    }
    for option in &report.mismatched {
        warn!(option = %option, "boot option does not cover the expected cpus");
    }
    Ok(report)
}

/// Check a raw command line (space/newline separated tokens).
pub fn check_tokens(cmdline: &str) -> BootReport {
    let mut report = BootReport::default();
    let tokens: Vec<&str> = cmdline.split_whitespace().collect();

    for (key, expected) in EXPECTED_CPU_OPTIONS {
        let value = tokens.iter().find_map(|token| {
            let (name, value) = token.split_once('=')?;
            (name == *key).then_some(value)
        });
        match value {
            None => report.missing.push((*key).to_owned()),
            Some(value) => match parse_cpu_range(value) {
                Some(cpus) if expected.iter().all(|cpu| cpus.contains(cpu)) => {}
                _ => report.mismatched.push((*key).to_owned()),
            },
        }
    }

    for flag in EXPECTED_FLAGS {
        if !tokens.iter().any(|token| token == flag) {
            report.missing.push((*flag).to_owned());
        }
    }

    report
}

/// Parse a cpu value: a single cpu (`2`) or an inclusive range (`2-3`).
/// The comma-separated list form is reserved and currently rejected.
pub fn parse_cpu_range(value: &str) -> Option<Vec<usize>> {
    if value.contains(',') {
        return None;
    }
    if let Some((lo, hi)) = value.split_once('-') {
        let lo: usize = lo.parse().ok()?;
        let hi: usize = hi.parse().ok()?;
        if hi < lo {
            return None;
        }
        return Some((lo..=hi).collect());
    }
    value.parse::<usize>().ok().map(|cpu| vec![cpu])
}
