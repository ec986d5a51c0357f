use crate::config::SamplingConfig;
use crate::error::Error;

/// One histogram bin: every delta `<= upper_bound` not claimed by an earlier bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bin {
    pub upper_bound: u64,
    pub count: u64,
}

impl Bin {
    pub fn is_sentinel(&self) -> bool {
        self.upper_bound == u64::MAX
    }
}

/// Dual-scale histogram of tick deltas.
///
/// The lower half of the bins divides `(min, knee]` evenly. The upper half
/// steps by alternating x2 and x10 from the knee, so each pair spans one
/// decade. The last bin always ends at `u64::MAX`.
#[derive(Debug, Clone)]
pub struct Histogram {
    bins: Vec<Bin>,
}

/// Upper bounds for `bin_count` bins over `(min, knee]` and beyond.
///
/// Expects `bin_count` even and `knee > min`. Fails with a description of
/// the first exponential bound (other than the sentinel) that overflows.
pub fn upper_bounds(bin_count: usize, min: u64, knee: u64) -> Result<Vec<u64>, String> {
    let half = bin_count / 2;
    let mut bounds = Vec::with_capacity(bin_count);

    // Linear half. u128 keeps (knee - min) * (i + 1) from overflowing
    // while truncating exactly as the u64 formula would.
    let span = knee.saturating_sub(min) as u128;
    for i in 0..half {
        let step = span * (i as u128 + 1) / half as u128;
        bounds.push(min + step as u64);
    }

    // Exponential half: 2k, 10k, 20k, 100k, ...
    let mut mult = knee;
    for j in 0..(bin_count - half) {
        let is_last = half + j == bin_count - 1;
        let bound = if j % 2 == 0 {
            mult.checked_mul(2)
        } else {
            let next = mult.checked_mul(10);
            if let Some(m) = next {
                mult = m;
            }
            next
        };
        match bound {
            Some(b) => bounds.push(b),
            None if is_last => bounds.push(u64::MAX),
            None => {
                return Err(format!(
                    "knee ({}) is too large for {} bins: bin {} upper bound overflows",
                    knee,
                    bin_count,
                    half + j
                ))
            }
        }
    }

    if let Some(last) = bounds.last_mut() {
        *last = u64::MAX;
    }
    Ok(bounds)
}

impl Histogram {
    pub fn build(config: &SamplingConfig) -> Result<Self, Error> {
        config.validate()?;
        Self::with_bounds(config.bins, config.min, config.knee)
    }

    fn with_bounds(bin_count: usize, min: u64, knee: u64) -> Result<Self, Error> {
        let bins = upper_bounds(bin_count, min, knee)
            .map_err(Error::InvalidConfig)?
            .into_iter()
            .map(|upper_bound| Bin {
                upper_bound,
                count: 0,
            })
            .collect();
        Ok(Self { bins })
    }

    /// Count `delta` in the first bin whose upper bound is at least `delta`.
    #[inline]
    pub fn classify(&mut self, delta: u64) {
        // The sentinel bin catches everything, so the scan always finds one.
        if let Some(bin) = self.bins.iter_mut().find(|b| delta <= b.upper_bound) {
            bin.count += 1;
        }
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Number of bins below (and including) the knee.
    pub fn linear_len(&self) -> usize {
        self.bins.len() / 2
    }

    pub fn total(&self) -> u64 {
        self.bins.iter().map(|b| b.count).sum()
    }

    /// Samples in the linear half, i.e. at or below the knee.
    pub fn count_through_knee(&self) -> u64 {
        self.bins[..self.linear_len()].iter().map(|b| b.count).sum()
    }

    pub fn max_count(&self) -> u64 {
        self.bins.iter().map(|b| b.count).max().unwrap_or(0)
    }
}
