use std::f64::consts::E;
use std::fmt;
use std::io::{self, Write};

use crate::config::SamplingConfig;
use crate::histogram::{Bin, Histogram};
use crate::outliers::OutlierBuffer;
use crate::session::{RunTiming, Session};
use crate::stats::RunningStats;

/// Column headings that precede the graph column on every row.
pub const GRAPH_HEADER: &str = "Time    Ticks    Count        Percent    Cumulative  ";

/// Longest bar the graph column can draw.
pub const MAX_BAR_WIDTH: usize = 67;

const BAR: &str = "*******************************************************************";

/// Cumulative share of samples at the knee below which the knee is too low.
const KNEE_LOW_PERCENT: f64 = 90.0;
/// Cumulative share of samples at the knee above which the knee is too high.
const KNEE_HIGH_PERCENT: f64 = 99.0;
/// Recommended min as a fraction of the observed minimum.
const MIN_HEADROOM: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanos,
    Micros,
    Millis,
    Secs,
}

impl TimeUnit {
    fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Nanos => "ns",
            TimeUnit::Micros => "us",
            TimeUnit::Millis => "ms",
            TimeUnit::Secs => "s",
        }
    }
}

/// A tick count converted to the largest time unit that keeps it below 1000.
///
/// Displays as three significant digits right-aligned in four columns plus
/// the unit, e.g. `  12ns`, `13.7ns`, `1.67us`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaledTime {
    Finite { value: f64, unit: TimeUnit },
    /// Would round to 1000 seconds or more, or the counter rate is unknown.
    Infinite,
}

impl ScaledTime {
    pub fn from_ticks(ticks: u64, ticks_per_ns: f64) -> Self {
        // A unit holds values that stay below 1000 after rounding to
        // three significant digits.
        const CEIL: f64 = 999.5;
        let ns = ticks as f64 / ticks_per_ns;
        if !ns.is_finite() || ns >= CEIL * 1e9 {
            ScaledTime::Infinite
        } else if ns < CEIL {
            ScaledTime::Finite {
                value: ns,
                unit: TimeUnit::Nanos,
            }
        } else if ns < CEIL * 1e3 {
            ScaledTime::Finite {
                value: ns / 1e3,
                unit: TimeUnit::Micros,
            }
        } else if ns < CEIL * 1e6 {
            ScaledTime::Finite {
                value: ns / 1e6,
                unit: TimeUnit::Millis,
            }
        } else {
            ScaledTime::Finite {
                value: ns / 1e9,
                unit: TimeUnit::Secs,
            }
        }
    }
}

impl fmt::Display for ScaledTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (value, unit) = match *self {
            ScaledTime::Infinite => return f.write_str("Infini"),
            ScaledTime::Finite { value, unit } => (value, unit),
        };

        // Three significant digits with trailing zeros dropped.
        let mut decimals: u32 = if value >= 99.95 {
            0
        } else if value >= 9.995 {
            1
        } else {
            2
        };
        let mut mantissa = (value * 10f64.powi(decimals as i32)).round() as u64;
        while decimals > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            decimals -= 1;
        }
        let pow = 10u64.pow(decimals);
        let whole = mantissa / pow;
        let frac = mantissa % pow;

        let whole_digits = whole.checked_ilog10().unwrap_or(0) as usize + 1;
        let len = if decimals > 0 {
            whole_digits + 1 + decimals as usize
        } else {
            whole_digits
        };
        for _ in len..4 {
            f.write_str(" ")?;
        }
        if decimals > 0 {
            write!(f, "{}.{:0width$}", whole, frac, width = decimals as usize)?;
        } else {
            write!(f, "{}", whole)?;
        }
        f.write_str(unit.suffix())
    }
}

/// Length of the graph bar for `count`, on a `ln(count - e)` scale where
/// `max_count` spans the whole `budget`.
///
/// A nonzero count always gets at least one glyph.
pub fn bar_len(count: u64, max_count: u64, budget: usize) -> usize {
    if count == 0 {
        return 0;
    }
    if count >= max_count {
        return budget;
    }
    let scale = budget as f64 / (max_count as f64 - E).ln();
    let raw = scale * (count as f64 - E).ln();
    let len = if raw.is_finite() && raw > 0.0 {
        raw.floor() as usize
    } else {
        0
    };
    len.clamp(1, budget.max(1))
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    100.0 * part as f64 / whole as f64
}

/// A post-run suggestion for better `min`/`knee` settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advice {
    /// Set `min` to this many ticks.
    SetMin(f64),
    /// Raise the knee from its current value.
    IncreaseKnee(u64),
    /// Lower the knee from its current value.
    DecreaseKnee(u64),
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advice::SetMin(ticks) => write!(f, "Recommend min setting of {:3.0} ticks", ticks),
            Advice::IncreaseKnee(knee) => {
                write!(f, "Recommend increasing knee setting from {} ticks", knee)
            }
            Advice::DecreaseKnee(knee) => {
                write!(f, "Recommend decreasing knee setting from {} ticks", knee)
            }
        }
    }
}

/// Everything the final report is rendered from.
pub struct Report<'a> {
    pub config: &'a SamplingConfig,
    pub histogram: &'a Histogram,
    pub stats: &'a RunningStats,
    pub outliers: Option<&'a OutlierBuffer>,
    pub timing: &'a RunTiming,
    pub inversions: u64,
}

impl<'a> Report<'a> {
    pub fn new(session: &'a Session, timing: &'a RunTiming) -> Self {
        Self {
            config: session.config(),
            histogram: session.histogram(),
            stats: session.stats(),
            outliers: session.outliers(),
            timing,
            inversions: session.inversions(),
        }
    }

    fn scaled(&self, ticks: u64) -> ScaledTime {
        ScaledTime::from_ticks(ticks, self.timing.ticks_per_ns())
    }

    /// Cumulative percentage of samples at or below the knee.
    pub fn knee_percent(&self) -> f64 {
        percent(self.histogram.count_through_knee(), self.histogram.total())
    }

    /// Tuning suggestions in a fixed order: min, knee from the histogram,
    /// knee from outlier buffer usage.
    pub fn advice(&self) -> Vec<Advice> {
        let mut advice = Vec::new();
        let knee = self.config.knee;

        if let Some(observed) = self.stats.min() {
            let observed = observed as f64;
            let configured = self.config.min as f64;
            if observed < configured || configured < MIN_HEADROOM * observed {
                advice.push(Advice::SetMin(MIN_HEADROOM * observed));
            }
        }

        match self.outliers {
            None => {
                if self.histogram.total() > 0 {
                    let at_knee = self.knee_percent();
                    if at_knee < KNEE_LOW_PERCENT {
                        advice.push(Advice::IncreaseKnee(knee));
                    }
                    if at_knee > KNEE_HIGH_PERCENT {
                        advice.push(Advice::DecreaseKnee(knee));
                    }
                }
            }
            Some(buf) => {
                if buf.wrapped() {
                    advice.push(Advice::IncreaseKnee(knee));
                } else if buf.cursor() < buf.capacity() / 4 {
                    advice.push(Advice::DecreaseKnee(knee));
                }
            }
        }

        advice
    }

    pub fn write(&self, out: &mut dyn Write) -> io::Result<()> {
        self.write_histogram(out)?;
        self.write_summary(out)?;
        for advice in self.advice() {
            writeln!(out, "{}", advice)?;
        }
        Ok(())
    }

    fn write_histogram(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}Graph ln(Count-e)", GRAPH_HEADER)?;

        let total = self.histogram.total();
        let max_count = self.histogram.max_count();
        let budget = self.config.width.saturating_sub(GRAPH_HEADER.len());
        let linear = self.histogram.linear_len();

        let mut cumulative = 0u64;
        for (i, bin) in self.histogram.bins().iter().enumerate() {
            cumulative += bin.count;
            self.write_row(out, bin, total, cumulative, bar_len(bin.count, max_count, budget))?;
            if i + 1 == linear {
                writeln!(out)?;
            }
        }
        Ok(())
    }

    fn write_row(
        &self,
        out: &mut dyn Write,
        bin: &Bin,
        total: u64,
        cumulative: u64,
        bar: usize,
    ) -> io::Result<()> {
        write!(out, "{}  ", self.scaled(bin.upper_bound))?;
        if bin.is_sentinel() {
            write!(out, "Infinite")?;
        } else {
            write!(out, "{:<8}", bin.upper_bound)?;
        }
        writeln!(
            out,
            " {:<12} {:7.4}%  {:8.4}%    {}",
            bin.count,
            percent(bin.count, total),
            percent(cumulative, total),
            &BAR[..bar.min(MAX_BAR_WIDTH)]
        )
    }

    fn write_summary(&self, out: &mut dyn Write) -> io::Result<()> {
        let t = self.timing;
        let s = self.stats;
        let min = s.min().unwrap_or(0);
        let max = s.max().unwrap_or(0);
        let mean = s.mean_ticks();
        let std_dev = s.std_dev();

        writeln!(out)?;
        writeln!(
            out,
            "Timing was measured for {}, {:5.2}% of runtime",
            self.scaled(t.timing_ticks),
            t.timing_percent()
        )?;
        writeln!(
            out,
            "CPU speed measured  : {:7.2} MHz over {} iterations",
            t.mhz(),
            s.count()
        )?;
        writeln!(
            out,
            "Min / Average / Std Dev / Max :   {}   /   {}   /  {:3.0}   / {} ticks",
            min, mean, std_dev, max
        )?;
        writeln!(
            out,
            "Min / Average / Std Dev / Max : {} / {} / {} / {}",
            self.scaled(min),
            self.scaled(mean),
            self.scaled(std_dev as u64),
            self.scaled(max)
        )?;
        if self.inversions > 0 {
            writeln!(
                out,
                "Counter ran backwards {} times; those deltas were discarded",
                self.inversions
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn scaled(ticks: u64, tpns: f64) -> String {
        ScaledTime::from_ticks(ticks, tpns).to_string()
    }

    fn timing(ticks_per_ns: f64) -> RunTiming {
        RunTiming {
            start_ticks: 0,
            stop_ticks: (ticks_per_ns * 1e9) as u64,
            elapsed: Duration::from_secs(1),
            timing_ticks: (ticks_per_ns * 0.25e9) as u64,
            blocks: 1,
        }
    }

    /// Session with `below` deltas at 30 ticks and `above` at 5000 ticks.
    fn session_with(config: &SamplingConfig, below: u64, above: u64) -> Session {
        let mut s = Session::new(config).unwrap();
        for _ in 0..below {
            s.record(30, 0);
        }
        for _ in 0..above {
            s.record(5000, 0);
        }
        s
    }

    fn knee_advice(below: u64, above: u64) -> Vec<Advice> {
        // min = 24 is exactly 80% of the observed minimum of 30: no min advice
        let cfg = SamplingConfig {
            min: 24,
            ..Default::default()
        };
        let s = session_with(&cfg, below, above);
        let t = timing(1.0);
        Report::new(&s, &t).advice()
    }

    #[test]
    fn test_scaled_time_units() {
        assert_eq!(scaled(36, 3.0), "  12ns");
        assert_eq!(scaled(41, 3.0), "13.7ns");
        assert_eq!(scaled(5_000, 3.0), "1.67us");
        assert_eq!(scaled(3_000, 1.0), "   3us");
        assert_eq!(scaled(1_500_000, 1.0), " 1.5ms");
        assert_eq!(scaled(229_000_000, 1.0), " 229ms");
        assert_eq!(scaled(2_000_000_000, 1.0), "   2s");
        assert_eq!(scaled(0, 1.0), "   0ns");
        assert_eq!(scaled(u64::MAX, 3.0), "Infini");
    }

    #[test]
    fn test_scaled_time_rounding_carries() {
        // 9.996 rounds to 10.0 then drops the zero
        assert_eq!(scaled(9996, 1000.0), "  10ns");
        assert_eq!(scaled(99_960, 1000.0), " 100ns");
    }

    #[test]
    fn test_scaled_time_promotes_at_unit_edge() {
        assert_eq!(scaled(9994, 10.0), " 999ns");
        assert_eq!(scaled(9996, 10.0), "   1us");
        assert_eq!(scaled(999_600, 1.0), "   1ms");
        assert_eq!(scaled(999_600_000, 1.0), "   1s");
        assert_eq!(scaled(999_600_000_000, 1.0), "Infini");
    }

    #[test]
    fn test_scaled_time_unknown_rate() {
        assert_eq!(ScaledTime::from_ticks(100, 0.0), ScaledTime::Infinite);
    }

    #[test]
    fn test_bar_len_extremes() {
        let budget = 79 - GRAPH_HEADER.len();
        assert_eq!(budget, 26);
        assert_eq!(bar_len(9_634_329, 9_634_329, budget), 26);
        assert_eq!(bar_len(6_997_631, 9_634_329, budget), 25);
        assert_eq!(bar_len(0, 9_634_329, budget), 0);
        assert_eq!(bar_len(1, 9_634_329, budget), 1);
        assert_eq!(bar_len(2, 9_634_329, budget), 1);
        assert_eq!(bar_len(3, 9_634_329, budget), 1);
    }

    #[test]
    fn test_bar_len_small_max() {
        for max in 1..=4u64 {
            assert_eq!(bar_len(max, max, 26), 26);
            for c in 1..max {
                assert!(bar_len(c, max, 26) >= 1);
            }
        }
    }

    #[test]
    fn test_bar_len_max_fills_every_width() {
        for width in SamplingConfig::min_width()..=SamplingConfig::max_width() {
            let budget = width - GRAPH_HEADER.len();
            for max in [5u64, 37, 1_000, 16_632_000] {
                assert_eq!(bar_len(max, max, budget), budget);
                assert!(bar_len(1, max, budget) >= 1);
                assert!(bar_len(max - 1, max, budget) <= budget);
            }
        }
    }

    #[test]
    fn test_knee_advice_thresholds() {
        // 89.9999% at the knee
        assert_eq!(knee_advice(899_999, 100_001), vec![Advice::IncreaseKnee(50)]);
        // 99.0001% at the knee
        assert_eq!(knee_advice(990_001, 9_999), vec![Advice::DecreaseKnee(50)]);
        // 90% to 99% inclusive: nothing to say
        assert!(knee_advice(900_000, 100_000).is_empty());
        assert!(knee_advice(950_000, 50_000).is_empty());
        assert!(knee_advice(990_000, 10_000).is_empty());
    }

    #[test]
    fn test_min_advice() {
        let t = timing(1.0);

        // Observed min below configured min
        let cfg = SamplingConfig {
            min: 40,
            knee: 60,
            ..Default::default()
        };
        let s = session_with(&cfg, 9, 1);
        assert_eq!(Report::new(&s, &t).advice()[0], Advice::SetMin(24.0));

        // Configured min far below observed min
        let cfg = SamplingConfig {
            min: 10,
            ..Default::default()
        };
        let s = session_with(&cfg, 95, 5);
        let advice = Report::new(&s, &t).advice();
        assert_eq!(advice, vec![Advice::SetMin(24.0)]);
        assert_eq!(advice[0].to_string(), "Recommend min setting of  24 ticks");

        // Configured min between 80% and 100% of observed
        let cfg = SamplingConfig {
            min: 25,
            ..Default::default()
        };
        let s = session_with(&cfg, 95, 5);
        assert!(Report::new(&s, &t).advice().is_empty());
    }

    #[test]
    fn test_outlier_buffer_advice() {
        let t = timing(1.0);
        let cfg = SamplingConfig {
            min: 24,
            outbuf: 8,
            outfile: Some(PathBuf::from("/tmp/tickjitter_report_outliers.csv")),
            ..Default::default()
        };

        // Wrapped buffer: knee too low
        let s = session_with(&cfg, 100, 9);
        assert_eq!(Report::new(&s, &t).advice(), vec![Advice::IncreaseKnee(50)]);

        // Fewer than a quarter used: knee too high
        let s = session_with(&cfg, 100, 1);
        assert_eq!(Report::new(&s, &t).advice(), vec![Advice::DecreaseKnee(50)]);

        // Between: no advice, and the histogram checks are skipped even
        // though 100% of samples sit below the knee here
        let s = session_with(&cfg, 100, 4);
        assert!(Report::new(&s, &t).advice().is_empty());
    }

    #[test]
    fn test_advice_display() {
        assert_eq!(
            Advice::IncreaseKnee(50).to_string(),
            "Recommend increasing knee setting from 50 ticks"
        );
        assert_eq!(
            Advice::DecreaseKnee(120).to_string(),
            "Recommend decreasing knee setting from 120 ticks"
        );
    }

    #[test]
    fn test_end_to_end_bimodal_stream() {
        let cfg = SamplingConfig {
            bins: 20,
            knee: 50,
            min: 10,
            outbuf: 0,
            runtime: 1,
            ..Default::default()
        };
        let mut s = Session::new(&cfg).unwrap();
        for _ in 0..6_997_631u64 {
            s.record(36, 0);
        }
        for _ in 0..9_634_329u64 {
            s.record(46, 0);
        }
        let delta_count = 6_997_631u64 + 9_634_329;
        assert_eq!(s.stats().count(), delta_count);

        let t = RunTiming {
            start_ticks: 0,
            stop_ticks: 2_992_580_000,
            elapsed: Duration::from_secs(1),
            timing_ticks: 685_500_000,
            blocks: delta_count / 10,
        };
        let report = Report::new(&s, &t);
        let mut out = Vec::new();
        report.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], format!("{}Graph ln(Count-e)", GRAPH_HEADER));
        // 20 bin rows plus the blank separator after the tenth
        assert_eq!(lines[11], "");

        let rows: Vec<&str> = lines[1..11]
            .iter()
            .chain(lines[12..22].iter())
            .copied()
            .collect();
        assert_eq!(rows.len(), 20);
        for (i, row) in rows.iter().enumerate() {
            match i {
                6 => {
                    assert!(row.starts_with("12.7ns  38       6997631      42.0734%   42.0734%    "), "{}", row);
                    assert!(row.ends_with(&"*".repeat(25)));
                    assert!(!row.ends_with(&"*".repeat(26)));
                }
                8 => {
                    assert!(row.starts_with("15.4ns  46       9634329      57.9266%  100.0000%    "), "{}", row);
                    assert!(row.ends_with(&"*".repeat(26)));
                }
                _ => {
                    assert!(row.contains(&format!(" {:<12} {:7.4}%", 0, 0.0)), "{}", row);
                    assert!(!row.contains('*'));
                }
            }
        }
        assert!(rows[19].starts_with("Infini  Infinite 0 "));

        assert!(text.contains("CPU speed measured  : 2992.58 MHz over 16631960 iterations"));
        assert!(text.contains("Min / Average / Std Dev / Max :   36   /   41   /    5   / 46 ticks"));
        assert!(text.contains("Timing was measured for  229ms, 22.91% of runtime"));

        // Observed min 36 is far above min = 10, and every sample sits below
        // the knee
        assert_eq!(
            report.advice(),
            vec![Advice::SetMin(0.8 * 36.0), Advice::DecreaseKnee(50)]
        );
        assert!(text.ends_with(
            "Recommend min setting of  29 ticks\nRecommend decreasing knee setting from 50 ticks\n"
        ));
    }
}
