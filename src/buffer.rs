// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Double-buffered sample region shared by the capture and analysis stages.
// The flip is the only synchronization the buffer itself provides; the
// Ready/Done rendezvous in pipeline.rs orders writer and reader around it.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Two equally sized byte regions and an index naming the current write side.
///
/// Discipline: one thread (the capture stage) writes the write side and
/// performs the flip; one thread (the analysis stage) reads the read side,
/// and only between the Ready release and the Done release. Under that
/// discipline the two sides never alias and the buffer needs no lock.
pub struct FrameBuffer {
    sides: [UnsafeCell<Box<[u8]>>; 2],
    active: AtomicUsize,
    capacity: usize,
    channels: u32,
}

// Safety: concurrent access is ordered externally by the rendezvous; the
// active index itself is atomic.
unsafe impl Send for FrameBuffer {}
unsafe impl Sync for FrameBuffer {}

impl FrameBuffer {
    /// Allocate both regions at `capacity` bytes.
    pub fn new(capacity: usize, channels: u32) -> Self {
        Self {
            sides: [
                UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
                UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            ],
            active: AtomicUsize::new(0),
            capacity,
            channels,
        }
    }

    /// Size in bytes of each side.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Interleaved channel count of the stored samples. Stored for the
    /// producer and consumer to agree on; the buffer does not interpret it.
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Index in {0, 1} of the current write side.
    pub fn write_index(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Exchange the write and read sides. Called by the flip owner only,
    /// after write completion and before the Ready release.
    pub fn flip(&self) {
        let current = self.active.load(Ordering::Relaxed);
        self.active.store(1 - current, Ordering::Release);
    }

    /// The side the producer fills this period.
    ///
    /// # Safety
    /// The caller must be the single writer, and must not hold the slice
    /// across a `flip` or `resize`.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn write_side(&self) -> &mut [u8] {
        &mut *self.sides[self.active.load(Ordering::Acquire)].get()
    }

    /// The side the consumer reads this period.
    ///
    /// # Safety
    /// The caller must hold the Ready token (so no flip or write to this
    /// side is in flight) and must not hold the slice across a `flip`.
    pub unsafe fn read_side(&self) -> &[u8] {
        &*self.sides[1 - self.active.load(Ordering::Acquire)].get()
    }

    /// Reallocate both sides at `capacity` bytes if it changed. Exclusive
    /// access is enforced by the `&mut` receiver.
    pub fn resize(&mut self, capacity: usize) {
        if capacity == self.capacity {
            return;
        }
        for side in &mut self.sides {
            *side.get_mut() = vec![0u8; capacity].into_boxed_slice();
        }
        self.capacity = capacity;
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("capacity", &self.capacity)
            .field("channels", &self.channels)
            .field("write_index", &self.write_index())
            .finish()
    }
}
