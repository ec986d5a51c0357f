use std::io::{self, Write};

/// A delta above the knee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outlier {
    /// Counter value near when it happened (the block midpoint).
    pub occurred_at: u64,
    /// Delta size in ticks.
    pub magnitude: u64,
}

/// Fixed-capacity ring of the most recent outliers.
///
/// Allocated once before sampling; recording never allocates.
#[derive(Debug, Clone)]
pub struct OutlierBuffer {
    slots: Vec<Option<Outlier>>,
    cursor: usize,
    wrapped: bool,
}

impl OutlierBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            cursor: 0,
            wrapped: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the next slot to be written.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True once older entries have been overwritten.
    pub fn wrapped(&self) -> bool {
        self.wrapped
    }

    pub fn len(&self) -> usize {
        if self.wrapped {
            self.slots.len()
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn record(&mut self, occurred_at: u64, magnitude: u64) {
        if self.slots.is_empty() {
            return;
        }
        self.slots[self.cursor] = Some(Outlier {
            occurred_at,
            magnitude,
        });
        self.cursor += 1;
        if self.cursor >= self.slots.len() {
            self.cursor = 0;
            self.wrapped = true;
        }
    }

    /// Populated entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Outlier> {
        let (newer, older) = self.slots.split_at(self.cursor);
        older.iter().chain(newer.iter()).flatten()
    }

    /// Remove and return every populated entry, oldest first.
    pub fn drain(&mut self) -> Vec<Outlier> {
        let drained: Vec<Outlier> = self.iter().copied().collect();
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.cursor = 0;
        self.wrapped = false;
        drained
    }
}

/// Write `<time_ms>, <magnitude_us>` lines for each outlier.
///
/// Times are relative to `start_ticks`; `ticks_per_ns` converts ticks to
/// nanoseconds.
pub fn write_log(
    outliers: &[Outlier],
    start_ticks: u64,
    ticks_per_ns: f64,
    out: &mut dyn Write,
) -> io::Result<()> {
    for o in outliers {
        let since_start = o.occurred_at.wrapping_sub(start_ticks) as f64;
        writeln!(
            out,
            "{:.6}, {:.6}",
            since_start / ticks_per_ns / 1_000_000.0,
            o.magnitude as f64 / ticks_per_ns / 1_000.0
        )?;
    }
    Ok(())
}
