use std::sync::atomic::{compiler_fence, Ordering};
use std::thread;
use std::time::Duration;

use crate::counter::CycleCounter;

/// Deltas produced per block (one fewer than counter reads).
pub const BLOCK_DELTAS: usize = 10;

/// One block of back-to-back counter reads, reduced to its deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Differences between adjacent reads, computed with wrapping subtraction.
    pub deltas: [u64; BLOCK_DELTAS],
    /// Reading taken halfway through the block; stands in for the time of
    /// any outlier found in it.
    pub midpoint: u64,
    /// Last read minus first read.
    pub span: u64,
}

impl Block {
    /// True when the counter appeared to run backwards between two reads.
    /// Such a delta wraps to a value above `i64::MAX`.
    pub fn is_inversion(delta: u64) -> bool {
        (delta as i64) < 0
    }
}

/// Takes sample blocks from a counter. Also an endless [`Iterator`] of
/// blocks.
pub struct Sampler<C> {
    counter: C,
    pause: Option<Duration>,
    timing_ticks: u64,
    blocks: u64,
}

impl<C: CycleCounter> Sampler<C> {
    pub fn new(counter: C, pause: Option<Duration>) -> Self {
        Self {
            counter,
            pause,
            timing_ticks: 0,
            blocks: 0,
        }
    }

    /// Single counter read outside any block, for run start/stop stamps.
    #[inline]
    pub fn now(&mut self) -> u64 {
        self.counter.ticks()
    }

    /// Total ticks spent between the first and last read of every block.
    pub fn timing_ticks(&self) -> u64 {
        self.timing_ticks
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Sleep for the configured pause, then take one block.
    ///
    /// Between the first and last read there is no branch, allocation or
    /// store to memory: the eleven reads land in distinct locals and the
    /// fences keep the compiler from moving the surrounding work inside.
    #[inline(never)]
    pub fn next_block(&mut self) -> Block {
        if let Some(pause) = self.pause {
            thread::sleep(pause);
        }

        let counter = &mut self.counter;

        compiler_fence(Ordering::SeqCst);
        let t0 = counter.ticks();
        let t1 = counter.ticks();
        let t2 = counter.ticks();
        let t3 = counter.ticks();
        let t4 = counter.ticks();
        let t5 = counter.ticks();
        let t6 = counter.ticks();
        let t7 = counter.ticks();
        let t8 = counter.ticks();
        let t9 = counter.ticks();
        let t10 = counter.ticks();
        compiler_fence(Ordering::SeqCst);

        let deltas = [
            t1.wrapping_sub(t0),
            t2.wrapping_sub(t1),
            t3.wrapping_sub(t2),
            t4.wrapping_sub(t3),
            t5.wrapping_sub(t4),
            t6.wrapping_sub(t5),
            t7.wrapping_sub(t6),
            t8.wrapping_sub(t7),
            t9.wrapping_sub(t8),
            t10.wrapping_sub(t9),
        ];
        let span = t10.wrapping_sub(t0);

        self.timing_ticks = self.timing_ticks.wrapping_add(span);
        self.blocks += 1;

        Block {
            deltas,
            midpoint: t5,
            span,
        }
    }
}

impl<C: CycleCounter> Iterator for Sampler<C> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        Some(self.next_block())
    }
}
