/// Streaming summary of tick deltas.
///
/// Mean and variance use Welford's online update, which stays accurate over
/// tens of millions of samples where a naive sum of squares would lose most
/// of its significant digits to cancellation.
#[derive(Debug, Clone)]
pub struct RunningStats {
    count: u64,
    sum: u128,
    min: u64,
    max: u64,
    mean: f64,
    m2: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: u64::MAX,
            max: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    #[inline]
    pub fn update(&mut self, delta: u64) {
        if delta < self.min {
            self.min = delta;
        }
        if delta > self.max {
            self.max = delta;
        }
        self.count += 1;
        self.sum += delta as u128;

        let x = delta as f64;
        let from_old_mean = x - self.mean;
        self.mean += from_old_mean / self.count as f64;
        self.m2 += from_old_mean * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Smallest delta seen, or `None` before the first update.
    pub fn min(&self) -> Option<u64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<u64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Integer mean (sum / count), 0 when empty.
    pub fn mean_ticks(&self) -> u64 {
        if self.count == 0 {
            return 0;
        }
        (self.sum / self.count as u128) as u64
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.m2 / self.count as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::{RngCore, SeedableRng};

    fn batch_mean_variance(values: &[u64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        (mean, var)
    }

    fn assert_close(a: f64, b: f64, rel: f64) {
        let scale = a.abs().max(b.abs()).max(1.0);
        assert!((a - b).abs() <= rel * scale, "{} vs {}", a, b);
    }

    #[test]
    fn test_empty() {
        let s = RunningStats::new();
        assert_eq!(s.count(), 0);
        assert_eq!(s.min(), None);
        assert_eq!(s.max(), None);
        assert_eq!(s.mean_ticks(), 0);
        assert_eq!(s.variance(), 0.0);
        assert_eq!(s.std_dev(), 0.0);
    }

    #[test]
    fn test_single_value() {
        let mut s = RunningStats::new();
        s.update(42);
        assert_eq!(s.count(), 1);
        assert_eq!(s.min(), Some(42));
        assert_eq!(s.max(), Some(42));
        assert_eq!(s.mean(), 42.0);
        assert_eq!(s.variance(), 0.0);
    }

    #[test]
    fn test_known_values() {
        // Population variance of 2,4,4,4,5,5,7,9 is 4
        let mut s = RunningStats::new();
        for v in [2, 4, 4, 4, 5, 5, 7, 9] {
            s.update(v);
        }
        assert_eq!(s.mean_ticks(), 5);
        assert_close(s.mean(), 5.0, 1e-12);
        assert_close(s.variance(), 4.0, 1e-12);
        assert_close(s.std_dev(), 2.0, 1e-12);
        assert_eq!(s.min(), Some(2));
        assert_eq!(s.max(), Some(9));
    }

    #[test]
    fn test_matches_batch_random() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        for n in [1usize, 2, 10, 1_000, 100_000] {
            let values: Vec<u64> = (0..n)
                .map(|_| 20 + (rng.next_u32() % 40) as u64)
                .collect();
            let mut s = RunningStats::new();
            for &v in &values {
                s.update(v);
            }
            let (mean, var) = batch_mean_variance(&values);
            assert_close(s.mean(), mean, 1e-9);
            assert_close(s.variance(), var, 1e-9);
        }
    }

    #[test]
    fn test_stable_over_ten_million() {
        // Two-valued stream with a large offset: the naive sum-of-squares
        // formula loses precision here, Welford does not.
        let mut s = RunningStats::new();
        let n = 10_000_000u64;
        for i in 0..n {
            s.update(if i % 2 == 0 { 1_000_000_036 } else { 1_000_000_046 });
        }
        assert_eq!(s.count(), n);
        assert_close(s.mean(), 1_000_000_041.0, 1e-9);
        assert_close(s.variance(), 25.0, 1e-4);
        assert_close(s.std_dev(), 5.0, 1e-4);
    }

    #[test]
    fn test_outlier_raises_max_and_stddev() {
        let mut s = RunningStats::new();
        for _ in 0..1000 {
            s.update(36);
        }
        let before = s.std_dev();
        s.update(6984);
        assert_eq!(s.max(), Some(6984));
        assert!(s.std_dev() > before);
    }
}
