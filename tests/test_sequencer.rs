// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Tests for the release loop, registration rules, and the statistics dump.
// Cadence assertions are deliberately loose: these run on a loaded, non
// real-time test host.

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rmseq::error::FrameError;
use rmseq::{Placement, Sequencer, Service, TickSource};

fn counting_service(name: &str, period_ms: u64, counter: Arc<AtomicU64>) -> Service {
    Service::spawn(name, period_ms, Placement::inherit(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<(), FrameError>(())
    })
    .expect("spawn")
}

/// Run the sequencer on a helper thread for `for_ms`, then hand it back.
fn run_for(mut sequencer: Sequencer, for_ms: u64) -> Sequencer {
    let keep_running = Arc::new(AtomicBool::new(true));
    let handle = {
        let keep_running = Arc::clone(&keep_running);
        thread::spawn(move || {
            sequencer.run(&keep_running).expect("run");
            sequencer
        })
    };
    thread::sleep(Duration::from_millis(for_ms));
    keep_running.store(false, Ordering::Release);
    handle.join().expect("join")
}

#[test]
fn rejects_a_period_that_the_master_period_does_not_divide() {
    let mut sequencer = Sequencer::new(10, Placement::inherit(), TickSource::Sleep);
    let service = Service::spawn("odd", 15, Placement::inherit(), || {
        Ok::<(), FrameError>(())
    })
    .expect("spawn");

    let err = sequencer.add_service(service).expect_err("must reject");
    assert_eq!(err.service, "odd");
    assert_eq!(err.service_period, 15);
    assert_eq!(err.sequencer_period, 10);
    assert!(sequencer.services().is_empty());
}

#[test]
fn accepts_exact_multiples() {
    let mut sequencer = Sequencer::new(10, Placement::inherit(), TickSource::Sleep);
    for period in [10, 20, 50, 100] {
        let service = Service::spawn(format!("p{period}"), period, Placement::inherit(), || {
            Ok::<(), FrameError>(())
        })
        .expect("spawn");
        sequencer.add_service(service).expect("register");
    }
    assert_eq!(sequencer.services().len(), 4);
}

#[test]
fn every_service_releases_on_the_first_tick() {
    let a = Arc::new(AtomicU64::new(0));
    let b = Arc::new(AtomicU64::new(0));

    let mut sequencer = Sequencer::new(10, Placement::inherit(), TickSource::Sleep);
    sequencer
        .add_service(counting_service("a", 10, Arc::clone(&a)))
        .expect("register");
    sequencer
        .add_service(counting_service("b", 100, Arc::clone(&b)))
        .expect("register");

    let mut sequencer = run_for(sequencer, 35);
    sequencer.shutdown(None).expect("shutdown");

    assert!(sequencer.ticks() >= 1);
    assert!(sequencer.services()[0].releases() >= 1);
    assert_eq!(sequencer.services()[1].releases(), 1);
}

#[test]
fn release_cadence_follows_the_period_ratio() {
    let fast = Arc::new(AtomicU64::new(0));
    let slow = Arc::new(AtomicU64::new(0));

    let mut sequencer = Sequencer::new(10, Placement::inherit(), TickSource::Sleep);
    sequencer
        .add_service(counting_service("fast", 10, Arc::clone(&fast)))
        .expect("register");
    sequencer
        .add_service(counting_service("slow", 50, Arc::clone(&slow)))
        .expect("register");

    let mut sequencer = run_for(sequencer, 530);
    let ticks = sequencer.ticks();
    let fast_releases = sequencer.services()[0].releases();
    let slow_releases = sequencer.services()[1].releases();
    sequencer.shutdown(None).expect("shutdown");

    // The fast service releases on every tick, the slow one on every fifth.
    assert_eq!(fast_releases, ticks);
    assert_eq!(slow_releases, ticks.div_ceil(5));
    assert!(ticks >= 20, "only {ticks} ticks in 530ms");
}

#[test]
fn a_slow_body_does_not_stall_the_sequencer() {
    let executed = Arc::new(AtomicU64::new(0));
    let mut sequencer = Sequencer::new(10, Placement::inherit(), TickSource::Sleep);
    let service = {
        let executed = Arc::clone(&executed);
        Service::spawn("slowbody", 10, Placement::inherit(), move || {
            executed.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(15));
            Ok::<(), FrameError>(())
        })
        .expect("spawn")
    };
    sequencer.add_service(service).expect("register");

    let mut sequencer = run_for(sequencer, 400);
    let ticks = sequencer.ticks();
    let releases = sequencer.services()[0].releases();
    let ran = executed.load(Ordering::SeqCst);
    sequencer.shutdown(None).expect("shutdown");

    // Releases track ticks; the 15ms body can only keep up with every other
    // one, the rest saturate against the binary gate.
    assert_eq!(releases, ticks);
    assert!(ran >= 2);
    assert!(ran < releases, "ran {ran} of {releases} releases");
}

#[test]
fn shutting_down_an_idle_sequencer_is_a_no_op() {
    let mut sequencer = Sequencer::new(10, Placement::inherit(), TickSource::Sleep);
    sequencer.shutdown(None).expect("first");
    sequencer.shutdown(None).expect("second");
    assert_eq!(sequencer.ticks(), 0);
}

#[test]
fn statistics_file_gains_one_block_per_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("statistics.txt");

    let mut sequencer = Sequencer::new(10, Placement::inherit(), TickSource::Sleep);
    sequencer
        .add_service(counting_service("alpha", 10, Arc::new(AtomicU64::new(0))))
        .expect("register");
    sequencer
        .add_service(counting_service("beta", 20, Arc::new(AtomicU64::new(0))))
        .expect("register");

    let mut sequencer = run_for(sequencer, 80);
    sequencer.shutdown(Some(&path)).expect("shutdown");

    let content = fs::read_to_string(&path).expect("read");
    assert_eq!(content.matches("Sequencer Execution Statistics").count(), 1);
    assert!(content.contains("Service alpha Execution Statistics"));
    assert!(content.contains("Service beta Execution Statistics"));
    assert!(content.contains("Execution Time Error Average: "));
    assert!(content.contains("Release Time Average Error: "));
    assert!(content.contains("Executions that met deadline: "));

    // A second run appends rather than truncates.
    let mut sequencer = Sequencer::new(10, Placement::inherit(), TickSource::Sleep);
    sequencer.shutdown(Some(&path)).expect("append");
    let content = fs::read_to_string(&path).expect("read");
    assert_eq!(content.matches("Sequencer Execution Statistics").count(), 2);
}

#[test]
fn interval_timer_variant_ticks_and_stops() {
    let count = Arc::new(AtomicU64::new(0));
    let mut sequencer = Sequencer::new(10, Placement::inherit(), TickSource::IntervalTimer);
    sequencer
        .add_service(counting_service("timed", 10, Arc::clone(&count)))
        .expect("register");

    let mut sequencer = run_for(sequencer, 150);
    let ticks = sequencer.ticks();
    sequencer.shutdown(None).expect("shutdown");

    assert!(ticks >= 5, "only {ticks} ticks in 150ms");
    assert!(count.load(Ordering::SeqCst) >= 1);
}

#[test]
fn tick_error_ring_fills_as_the_sequencer_runs() {
    let sequencer = Sequencer::new(10, Placement::inherit(), TickSource::Sleep);
    let mut sequencer = run_for(sequencer, 100);
    sequencer.shutdown(None).expect("shutdown");

    let stats = sequencer.tick_error_stats();
    assert_eq!(stats.len() as u64, sequencer.ticks());
    // Sleep pacing drifts forward only.
    assert!(stats.min_ms() > -1.0);
}
