// SPDX-License-Identifier: MPL-2.0
//! Bounded frame ring buffer shared by the decode thread and a consumer.
//!
//! # Design
//!
//! - **Fixed slots**: `N` frame slots allocated once and reused forever
//! - **Validity tags**: a slot is readable iff its tag is non-zero; the writer
//!   only fills empty slots, so it never laps the reader
//! - **Lock-free cursors**: `put`/`get`/`got` never wait; only the producer's
//!   backpressure loop sleeps on the condition variable
//!
//! One producer (the decode thread) and one consumer per buffer. Each slot
//! sits behind an `RwLock`: the consumer takes recursive read guards, so
//! holding one frame while calling [`MediaBuffer::get`] again is fine.
//!
//! The read cursor carries a flush epoch in its high bits and every valid
//! slot is tagged with the epoch it was written in. An acknowledgement that
//! races with [`MediaBuffer::flush`] then fails its compare-exchange and
//! leaves the rewound cursor alone.

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::buffer_capacity::BufferCapacity;
use super::frame::MediaFrame;

/// Shared borrow of the slot currently under the read cursor.
pub type FrameGuard<'a, T = MediaFrame> = RwLockReadGuard<'a, T>;

/// Lock held by the producer while it waits for a free slot.
pub type WaitGuard<'a> = MutexGuard<'a, ()>;

const POS_BITS: u32 = 16;
const POS_MASK: usize = (1 << POS_BITS) - 1;
const EMPTY: usize = 0;

fn epoch_of(cursor: usize) -> usize {
    cursor >> POS_BITS
}

fn pos_of(cursor: usize) -> usize {
    cursor & POS_MASK
}

fn cursor(epoch: usize, pos: usize) -> usize {
    (epoch << POS_BITS) | pos
}

/// Tag of a slot written during `epoch`; never `EMPTY`.
fn slot_tag(epoch: usize) -> usize {
    (epoch << 1) | 1
}

#[derive(Debug)]
pub struct MediaBuffer<T = MediaFrame> {
    slots: Box<[RwLock<T>]>,
    valid: Box<[AtomicUsize]>,
    read_cursor: AtomicUsize,
    write_pos: AtomicUsize,
    wait_lock: Mutex<()>,
    cond: Condvar,
}

impl<T: Default> MediaBuffer<T> {
    #[must_use]
    pub fn new(capacity: BufferCapacity) -> Self {
        let size = capacity.value();
        Self {
            slots: (0..size).map(|_| RwLock::new(T::default())).collect(),
            valid: (0..size).map(|_| AtomicUsize::new(EMPTY)).collect(),
            read_cursor: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            wait_lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }
}

impl<T> MediaBuffer<T> {
    /// Fills the slot under the write cursor.
    ///
    /// Returns `false` without touching anything if that slot still holds an
    /// unacknowledged frame.
    pub fn put_with(&self, fill: impl FnOnce(&mut T)) -> bool {
        let pos = self.write_pos.load(Ordering::Acquire);
        if self.valid[pos].load(Ordering::Acquire) != EMPTY {
            return false;
        }

        {
            let mut slot = self.slots[pos].write();
            fill(&mut *slot);
        }
        let epoch = epoch_of(self.read_cursor.load(Ordering::Acquire));
        self.valid[pos].store(slot_tag(epoch), Ordering::Release);
        self.write_pos
            .store((pos + 1) % self.slots.len(), Ordering::Release);
        true
    }

    /// Returns the frame under the read cursor, if one is ready.
    ///
    /// Does not advance: repeated calls return the same frame until
    /// [`got`](Self::got), also while an earlier guard is still alive.
    pub fn get(&self) -> Option<FrameGuard<'_, T>> {
        let pos = self.read_pos();
        if self.valid[pos].load(Ordering::Acquire) == EMPTY {
            // Empty: make sure a producer parked on a stale full buffer rechecks.
            self.cond.notify_one();
            return None;
        }
        Some(self.slots[pos].read_recursive())
    }

    /// Acknowledges the frame under the read cursor and advances past it.
    ///
    /// Does nothing if the read slot is empty or a concurrent
    /// [`flush`](Self::flush) already discarded it.
    pub fn got(&self) {
        self.acknowledge(self.read_cursor.load(Ordering::Acquire));
    }

    fn acknowledge(&self, current: usize) {
        let (epoch, pos) = (epoch_of(current), pos_of(current));
        if self.valid[pos]
            .compare_exchange(slot_tag(epoch), EMPTY, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let next = cursor(epoch, (pos + 1) % self.slots.len());
        // Fails only if a flush rewound the cursor meanwhile; keep the rewind.
        let _ = self.read_cursor.compare_exchange(
            current,
            next,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.cond.notify_one();
    }

    /// Drops every buffered frame and rewinds both cursors to slot 0.
    ///
    /// Producer side: must not run concurrently with `put_with`. Takes the
    /// wait lock, so it must not be called by a thread that holds a
    /// [`WaitGuard`] of this buffer.
    pub fn flush(&self) {
        let _guard = self.wait_lock.lock();
        let epoch = epoch_of(self.read_cursor.load(Ordering::Acquire)).wrapping_add(1);
        self.read_cursor
            .store(cursor(epoch, 0), Ordering::Release);
        for flag in self.valid.iter() {
            flag.store(EMPTY, Ordering::Release);
        }
        self.write_pos.store(0, Ordering::Release);
        self.cond.notify_one();
    }

    /// Takes the lock used for waiting on free slots.
    pub fn lock(&self) -> WaitGuard<'_> {
        self.wait_lock.lock()
    }

    /// Waits until a slot is released or `timeout` elapses.
    ///
    /// Returns `true` if the wait timed out.
    pub fn wait_for_space(&self, guard: &mut WaitGuard<'_>, timeout: Duration) -> bool {
        self.cond.wait_for(guard, timeout).timed_out()
    }

    /// Wakes a producer blocked in [`wait_for_space`](Self::wait_for_space).
    pub fn notify(&self) {
        self.cond.notify_one();
    }

    #[must_use]
    pub fn read_pos(&self) -> usize {
        pos_of(self.read_cursor.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn write_pos(&self) -> usize {
        self.write_pos.load(Ordering::Acquire)
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of frames produced but not yet acknowledged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.valid
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire) != EMPTY)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MediaBuffer<MediaFrame> {
    /// Copies up to three planes into the next free slot.
    ///
    /// Returns `false` if the buffer is full.
    pub fn put(&self, planes: &[&[u8]], pts_secs: f64) -> bool {
        self.put_with(|frame| frame.store_planar(planes.iter().copied(), pts_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn buffer(capacity: usize) -> MediaBuffer {
        MediaBuffer::new(BufferCapacity::new(capacity))
    }

    #[test]
    fn rejects_put_when_full_and_accepts_after_one_got() {
        let buf = buffer(4);
        for i in 0..4 {
            assert!(buf.put(&[&[i]], f64::from(i)));
        }
        assert!(!buf.put(&[&[9]], 9.0));
        assert_eq!(buf.len(), 4);

        buf.got();
        assert!(buf.put(&[&[4]], 4.0));
        assert!(!buf.put(&[&[5]], 5.0));
    }

    #[test]
    fn rejected_put_does_not_mutate() {
        let buf = buffer(1);
        assert!(buf.put(&[&[1]], 1.0));
        let mut called = false;
        assert!(!buf.put_with(|_| called = true));
        assert!(!called);
        assert_eq!(buf.write_pos(), 0);
        assert_eq!(buf.get().map(|f| f.pts_secs), Some(1.0));
    }

    #[test]
    fn get_does_not_advance_until_got() {
        let buf = buffer(4);
        buf.put(&[&[1]], 0.1);
        buf.put(&[&[2]], 0.2);

        assert_eq!(buf.get().map(|f| f.pts_secs), Some(0.1));
        assert_eq!(buf.get().map(|f| f.pts_secs), Some(0.1));
        buf.got();
        assert_eq!(buf.get().map(|f| f.pts_secs), Some(0.2));
        buf.got();
        assert!(buf.get().is_none());
    }

    #[test]
    fn got_on_empty_buffer_is_noop() {
        let buf = buffer(2);
        buf.got();
        assert_eq!(buf.read_pos(), 0);
        assert!(buf.put(&[&[1]], 1.0));
        assert_eq!(buf.get().map(|f| f.pts_secs), Some(1.0));
    }

    #[test]
    fn cursors_wrap_modulo_capacity() {
        let buf = buffer(3);
        for i in 0..7u8 {
            assert!(buf.put(&[&[i]], f64::from(i)));
            assert_eq!(buf.get().map(|f| f.data()[0]), Some(i));
            buf.got();
        }
        assert_eq!(buf.write_pos(), 7 % 3);
        assert_eq!(buf.read_pos(), 7 % 3);
    }

    #[test]
    fn flush_empties_and_rewinds() {
        let buf = buffer(4);
        buf.put(&[&[1]], 1.0);
        buf.put(&[&[2]], 2.0);
        buf.put(&[&[3]], 3.0);
        buf.got();

        buf.flush();
        assert!(buf.get().is_none());
        assert!(buf.is_empty());
        assert_eq!(buf.read_pos(), 0);
        assert_eq!(buf.write_pos(), 0);

        assert!(buf.put(&[&[7]], 7.0));
        assert_eq!(buf.write_pos(), 1);
        assert_eq!(buf.get().map(|f| f.pts_secs), Some(7.0));
    }

    #[test]
    fn overlapping_guards_see_the_same_frame() {
        let buf = buffer(2);
        buf.put(&[&[5]], 0.5);

        let first = buf.get().expect("frame ready");
        let second = buf.get().expect("same frame again");
        assert_eq!(first.pts_secs, second.pts_secs);
        assert_eq!(second.data()[0], 5);
    }

    #[test]
    fn acknowledgement_from_before_flush_is_discarded() {
        let buf = buffer(4);
        buf.put(&[&[1]], 1.0);
        buf.put(&[&[2]], 2.0);
        let stale = buf.read_cursor.load(Ordering::Acquire);

        buf.flush();
        assert!(buf.put(&[&[7]], 7.0));
        buf.acknowledge(stale);

        assert_eq!(buf.read_pos(), 0);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.get().map(|f| f.pts_secs), Some(7.0));
        buf.got();
        assert!(buf.get().is_none());
        assert_eq!(buf.read_pos(), 1);
    }

    #[test]
    fn stale_acknowledgement_ignores_refilled_slot() {
        let buf = buffer(2);
        buf.put(&[&[1]], 1.0);
        buf.got();
        let stale = buf.read_cursor.load(Ordering::Acquire);

        buf.flush();
        for i in 0..2u8 {
            assert!(buf.put(&[&[i]], f64::from(i)));
        }
        buf.acknowledge(stale);

        assert_eq!(buf.len(), 2);
        assert_eq!(buf.get().map(|f| f.pts_secs), Some(0.0));
    }

    #[test]
    fn wait_for_space_times_out_when_nobody_reads() {
        let buf = buffer(1);
        buf.put(&[&[1]], 1.0);

        let mut guard = buf.lock();
        let start = Instant::now();
        assert!(buf.wait_for_space(&mut guard, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn producer_and_consumer_preserve_order() {
        let buf = Arc::new(buffer(4));
        let producer = {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                for i in 0..200u32 {
                    let bytes = i.to_le_bytes();
                    let mut guard = buf.lock();
                    while !buf.put(&[&bytes], f64::from(i)) {
                        buf.wait_for_space(&mut guard, Duration::from_millis(5));
                    }
                }
            })
        };

        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while seen.len() < 200 && Instant::now() < deadline {
            let next = buf.get().map(|f| f.pts_secs);
            match next {
                Some(pts) => {
                    seen.push(pts);
                    buf.got();
                }
                None => thread::yield_now(),
            }
        }
        producer.join().expect("producer panicked");

        let expected: Vec<f64> = (0..200u32).map(f64::from).collect();
        assert_eq!(seen, expected);
    }
}
