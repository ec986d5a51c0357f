use std::time::{Duration, Instant};

use crate::config::SamplingConfig;
use crate::counter::CycleCounter;
use crate::error::Error;
use crate::histogram::Histogram;
use crate::outliers::OutlierBuffer;
use crate::sampler::{Block, Sampler};
use crate::stats::RunningStats;

/// Clock readings bracketing a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunTiming {
    pub start_ticks: u64,
    pub stop_ticks: u64,
    /// Wall-clock time between the start and stop readings.
    pub elapsed: Duration,
    /// Ticks spent inside sample blocks.
    pub timing_ticks: u64,
    pub blocks: u64,
}

impl RunTiming {
    pub fn total_ticks(&self) -> u64 {
        self.stop_ticks.wrapping_sub(self.start_ticks)
    }

    /// Counter rate measured over the whole run. 0 if no time elapsed.
    pub fn ticks_per_ns(&self) -> f64 {
        let ns = self.elapsed.as_nanos() as f64;
        if ns <= 0.0 {
            return 0.0;
        }
        self.total_ticks() as f64 / ns
    }

    pub fn mhz(&self) -> f64 {
        self.ticks_per_ns() * 1_000.0
    }

    /// Share of the run spent inside sample blocks, in percent.
    pub fn timing_percent(&self) -> f64 {
        let total = self.total_ticks();
        if total == 0 {
            return 0.0;
        }
        100.0 * self.timing_ticks as f64 / total as f64
    }
}

/// All mutable state of one measurement: histogram, statistics and the
/// optional outlier buffer. Owned by whoever runs the measurement.
#[derive(Debug, Clone)]
pub struct Session {
    config: SamplingConfig,
    histogram: Histogram,
    stats: RunningStats,
    outliers: Option<OutlierBuffer>,
    inversions: u64,
}

impl Session {
    /// Validate `config` and allocate everything the run needs up front.
    pub fn new(config: &SamplingConfig) -> Result<Self, Error> {
        let histogram = Histogram::build(config)?;
        let outliers = config
            .capture_enabled()
            .then(|| OutlierBuffer::with_capacity(config.outbuf));
        Ok(Self {
            config: config.clone(),
            histogram,
            stats: RunningStats::new(),
            outliers,
            inversions: 0,
        })
    }

    /// Fold one delta into the histogram, statistics and outlier buffer.
    #[inline]
    pub fn record(&mut self, delta: u64, occurred_at: u64) {
        self.histogram.classify(delta);
        self.stats.update(delta);
        if delta > self.config.knee {
            if let Some(ref mut buf) = self.outliers {
                buf.record(occurred_at, delta);
            }
        }
    }

    /// Analyse a finished block. Deltas where the counter ran backwards
    /// are counted and dropped.
    pub fn record_block(&mut self, block: &Block) {
        for &delta in &block.deltas {
            if Block::is_inversion(delta) {
                self.inversions += 1;
                continue;
            }
            self.record(delta, block.midpoint);
        }
    }

    /// Sample blocks until `config.runtime` seconds have passed.
    ///
    /// The deadline is checked once per block, after its analysis.
    pub fn run<C: CycleCounter>(&mut self, counter: C) -> RunTiming {
        let mut sampler = Sampler::new(counter, self.config.pause());
        let runtime = self.config.runtime();

        let start_ticks = sampler.now();
        let start = Instant::now();
        // validate() rejects runtimes past the end of Instant's range.
        let deadline = start.checked_add(runtime);
        log::debug!(
            "sampling for {:?} into {} bins",
            runtime,
            self.histogram.len()
        );

        let inversions_before = self.inversions;
        let (stop_ticks, stopped) = loop {
            let block = sampler.next_block();
            self.record_block(&block);

            let stop_ticks = sampler.now();
            let now = Instant::now();
            if deadline.map_or(true, |d| now >= d) {
                break (stop_ticks, now);
            }
        };

        let new_inversions = self.inversions - inversions_before;
        if new_inversions > 0 {
            log::warn!(
                "counter ran backwards {} times; pin the process to one CPU with --cpu",
                new_inversions
            );
        }

        let timing = RunTiming {
            start_ticks,
            stop_ticks,
            elapsed: stopped - start,
            timing_ticks: sampler.timing_ticks(),
            blocks: sampler.blocks(),
        };
        log::info!(
            "sampled {} blocks, {} deltas in {:?}",
            timing.blocks,
            self.stats.count(),
            timing.elapsed
        );
        log::debug!(
            "mean {:.3} ticks, std dev {:.3} ticks",
            self.stats.mean(),
            self.stats.std_dev()
        );
        timing
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    pub fn outliers(&self) -> Option<&OutlierBuffer> {
        self.outliers.as_ref()
    }

    pub fn outliers_mut(&mut self) -> Option<&mut OutlierBuffer> {
        self.outliers.as_mut()
    }

    /// Deltas discarded because the counter went backwards.
    pub fn inversions(&self) -> u64 {
        self.inversions
    }
}
