//! Lock-free single-producer/single-consumer ring buffer
//!
//! One side (the producer) only ever writes `head`, the other (the consumer)
//! only ever writes `tail`. Each side reads the other's index with acquire
//! ordering and publishes its own with release ordering, so a word stored in
//! a slot is visible before the index that makes it readable.
//!
//! One slot is always left empty: the buffer is empty when `head == tail`
//! and full when `(head + 1) % N == tail`, giving a usable capacity of
//! `N - 1` words without a separate count.
//!
//! The producer is the interrupt handler for RX rings and the foreground
//! writer for TX rings; the consumer is the opposite side.

use core::sync::atomic::Ordering;

use portable_atomic::AtomicUsize;

use uartmux_hal::Word;

#[cfg(not(feature = "nine-bit"))]
type Slot = portable_atomic::AtomicU8;

#[cfg(feature = "nine-bit")]
type Slot = portable_atomic::AtomicU16;

const _: () = assert!(core::mem::size_of::<Slot>() == core::mem::size_of::<Word>());

/// Fixed-capacity FIFO of words shared between one producer and one consumer
pub struct RingBuffer<const N: usize> {
    buf: [Slot; N],
    /// Next slot to write; owned by the producer
    head: AtomicUsize,
    /// Next slot to read; owned by the consumer
    tail: AtomicUsize,
}

impl<const N: usize> RingBuffer<N> {
    const VALID: () = assert!(N >= 2, "ring buffer needs at least two slots");

    /// Create an empty buffer
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID;
        Self {
            buf: [const { Slot::new(0) }; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Append a word (producer side)
    ///
    /// Returns `false` and drops the word if the buffer is full. Never
    /// blocks; counting drops is up to the caller.
    pub fn push(&self, word: Word) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % N;
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }
        self.buf[head].store(word, Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        true
    }

    /// Take the oldest word (consumer side)
    pub fn pop(&self) -> Option<Word> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let word = self.buf[tail].load(Ordering::Relaxed);
        self.tail.store((tail + 1) % N, Ordering::Release);
        Some(word)
    }

    /// Look at the oldest word without consuming it (consumer side)
    pub fn peek(&self) -> Option<Word> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        Some(self.buf[tail].load(Ordering::Relaxed))
    }

    /// Number of queued words
    ///
    /// A snapshot: the other side may have moved on by the time the caller
    /// acts on it.
    pub fn available(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + N - tail) % N
    }

    /// Number of words that can be pushed before the buffer is full
    pub fn free(&self) -> usize {
        self.capacity() - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn is_full(&self) -> bool {
        self.available() == self.capacity()
    }

    /// Usable capacity (`N - 1`)
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Discard everything
    ///
    /// Only valid while the producer is quiesced (interrupts disarmed, or
    /// from inside a critical section that excludes it).
    pub fn clear(&self) {
        self.tail.store(0, Ordering::Release);
        self.head.store(0, Ordering::Release);
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[test]
    fn test_new_is_empty() {
        let ring: RingBuffer<8> = RingBuffer::new();
        assert!(ring.is_empty());
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.capacity(), 7);
        assert_eq!(ring.free(), 7);
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.peek(), None);
    }

    #[test]
    fn test_fifo_order() {
        let ring: RingBuffer<8> = RingBuffer::new();
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));
        assert_eq!(ring.peek(), Some(1));
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_full_keeps_one_slot_empty() {
        let ring: RingBuffer<4> = RingBuffer::new();
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));
        assert!(ring.is_full());
        assert!(!ring.push(4), "fourth push must be refused");
        assert_eq!(ring.available(), 3);

        // Refused word is not stored
        assert_eq!(ring.pop(), Some(1));
        assert!(ring.push(5));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(5));
    }

    #[test]
    fn test_wraparound() {
        let ring: RingBuffer<4> = RingBuffer::new();
        for round in 0..10u8 {
            let (a, b) = (Word::from(round), Word::from(round.wrapping_add(100)));
            assert!(ring.push(a));
            assert!(ring.push(b));
            assert_eq!(ring.pop(), Some(a));
            assert_eq!(ring.pop(), Some(b));
        }
        assert!(ring.is_empty());
    }

    #[cfg(feature = "nine-bit")]
    #[test]
    fn test_nine_bit_words() {
        let ring: RingBuffer<4> = RingBuffer::new();
        assert!(ring.push(0x1FF));
        assert!(ring.push(0x100));
        assert_eq!(ring.peek(), Some(0x1FF));
        assert_eq!(ring.pop(), Some(0x1FF));
        assert_eq!(ring.pop(), Some(0x100));
    }

    #[test]
    fn test_clear() {
        let ring: RingBuffer<8> = RingBuffer::new();
        ring.push(1);
        ring.push(2);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
        assert!(ring.push(3));
        assert_eq!(ring.pop(), Some(3));
    }

    #[test]
    fn test_spsc_threads() {
        const COUNT: usize = 10_000;
        let ring: RingBuffer<16> = RingBuffer::new();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..COUNT {
                    while !ring.push((i % 251) as Word) {
                        std::thread::yield_now();
                    }
                }
            });

            let mut received = Vec::with_capacity(COUNT);
            while received.len() < COUNT {
                match ring.pop() {
                    Some(word) => received.push(word),
                    None => std::thread::yield_now(),
                }
            }

            for (i, word) in received.iter().enumerate() {
                assert_eq!(*word, (i % 251) as Word, "gap or reorder at {}", i);
            }
        });
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u8),
        Pop,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u8>().prop_map(Op::Push), Just(Op::Pop)]
    }

    proptest! {
        #[test]
        fn prop_matches_fifo_model(ops in proptest::collection::vec(op(), 0..200)) {
            let ring: RingBuffer<8> = RingBuffer::new();
            let mut model: VecDeque<Word> = VecDeque::new();

            for op in ops {
                match op {
                    Op::Push(byte) => {
                        let accepted = ring.push(Word::from(byte));
                        prop_assert_eq!(accepted, model.len() < 7);
                        if accepted {
                            model.push_back(Word::from(byte));
                        }
                    }
                    Op::Pop => prop_assert_eq!(ring.pop(), model.pop_front()),
                }
                prop_assert!(ring.available() <= ring.capacity());
                prop_assert_eq!(ring.available(), model.len());
                prop_assert_eq!(ring.free(), 7 - model.len());
            }
        }
    }
}
