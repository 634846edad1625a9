// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Tests for the fixed-capacity timing ring.

use rmseq::StatTracker;

#[test]
fn rollover_keeps_the_newest_capacity_samples() {
    let mut stats = StatTracker::new(4);
    for v in 1..=7 {
        stats.add(v as f64);
    }
    // Ring holds 4, 5, 6, 7.
    assert_eq!(stats.len(), 4);
    assert_eq!(stats.mean_ms(), 5.5);
    assert_eq!(stats.min_ms(), 4.0);
    assert_eq!(stats.max_ms(), 7.0);
}

#[test]
fn empty_ring_defaults() {
    let stats = StatTracker::new(16);
    assert!(stats.is_empty());
    assert_eq!(stats.len(), 0);
    assert_eq!(stats.mean_ms(), 0.0);
    assert_eq!(stats.max_ms(), 0.0);
    assert_eq!(stats.min_ms(), f64::MAX);
    assert_eq!(stats.completed_within(1000.0), 0);
}

#[test]
fn count_saturates_at_capacity() {
    let mut stats = StatTracker::new(8);
    for i in 0..5 {
        stats.add(i as f64);
    }
    assert_eq!(stats.len(), 5);
    for i in 0..100 {
        stats.add(i as f64);
    }
    assert_eq!(stats.len(), 8);
    assert_eq!(stats.capacity(), 8);
}

#[test]
fn mean_sits_between_min_and_max() {
    let mut stats = StatTracker::new(32);
    for v in [3.5, 0.25, 9.0, 4.75, 1.0, 6.5] {
        stats.add(v);
    }
    assert!(stats.min_ms() <= stats.mean_ms());
    assert!(stats.mean_ms() <= stats.max_ms());
}

#[test]
fn running_sum_tracks_the_ring_contents() {
    let mut stats = StatTracker::new(10);
    // Push enough to wrap several times with awkward values.
    let mut expected = Vec::new();
    for i in 0..137 {
        let v = (i as f64) * 0.3 - 7.0;
        stats.add(v);
        expected.push(v);
    }
    let tail: Vec<f64> = expected[expected.len() - 10..].to_vec();
    let true_mean = tail.iter().sum::<f64>() / tail.len() as f64;
    assert!((stats.mean_ms() - true_mean).abs() < 1e-9 * tail.len() as f64);
}

#[test]
fn percentile_indexes_the_sorted_ring() {
    let mut stats = StatTracker::new(4);
    for v in [40.0, 10.0, 30.0, 20.0] {
        stats.add(v);
    }
    assert_eq!(stats.percentile_ms(0.0), 10.0);
    assert_eq!(stats.percentile_ms(0.25), 20.0);
    assert_eq!(stats.percentile_ms(0.5), 30.0);
    // Index clamps to the last slot.
    assert_eq!(stats.percentile_ms(1.0), 40.0);
}

#[test]
fn completed_within_is_inclusive() {
    let mut stats = StatTracker::new(8);
    for v in [1.0, 2.0, 3.0, 10.0] {
        stats.add(v);
    }
    assert_eq!(stats.completed_within(3.0), 3);
    assert_eq!(stats.completed_within(0.5), 0);
    assert_eq!(stats.completed_within(10.0), 4);
}

#[test]
#[should_panic]
fn zero_capacity_is_rejected() {
    let _ = StatTracker::new(0);
}
